//! moldap Core Library
//!
//! The attribute-mapping and transformation engine keeping an
//! organizational master-data system ("MO") and an LDAP directory in sync.
//! This crate covers the conversion core only; event transport, persistence
//! and process bootstrap live with the callers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Mapping   │────▶│  Converter  │────▶│ Destination │
//! │  (schema)   │     │ (resolver)  │     │   record    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use moldap_core::{Converter, Direction, MappingSchema, SchemaOptions};
//!
//! let schema = MappingSchema::load(raw_document, &options)?;
//! let converter = Converter::new(Arc::new(schema));
//! let ldap_record = converter.to_target("Employee", &mo_record)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod converter;
pub mod error;
pub mod expr;
pub mod filters;
pub mod resolver;
pub mod schema;

pub use converter::{convert, ConversionResult, Converter, SOURCE_BINDING};
pub use error::{Error, Result};
pub use expr::Expression;
pub use resolver::{is_truthy, ResolutionContext};
pub use schema::{ClassMapping, Direction, MappingSchema, SchemaOptions, OBJECT_CLASS};
