//! Error types for moldap-core

use thiserror::Error;

use crate::schema::Direction;

/// Result type alias for moldap-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in moldap-core
#[derive(Error, Debug)]
pub enum Error {
    /// Mapping configuration is malformed or incomplete (detected at load)
    #[error("invalid mapping: {message}")]
    InvalidMapping {
        /// Description of what's wrong with the mapping document
        message: String,
    },

    /// Conversion requested for a class not declared in the given direction
    #[error("no mapping for class '{class}' in direction '{direction}'")]
    UnknownClass {
        /// The requested entity class
        class: String,
        /// The requested conversion direction
        direction: Direction,
    },

    /// Template syntax error or unknown filter/function reference
    #[error("invalid expression '{expression}': {message}")]
    Expression {
        /// The offending expression source
        expression: String,
        /// Description of the error
        message: String,
    },

    /// A filter or function received a value of the wrong shape
    #[error("'{helper}' cannot handle input: {message}")]
    Format {
        /// Name of the filter or function
        helper: String,
        /// Description of the error
        message: String,
    },

    /// Conversion produced a record missing its required identity attribute
    #[error("converted '{class}' record has no usable value for '{attribute}'")]
    IncompleteRecord {
        /// The entity class being converted
        class: String,
        /// The attribute that resolved empty
        attribute: String,
    },
}
