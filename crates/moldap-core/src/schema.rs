//! Class-mapping schema loading and validation
//!
//! The mapping document is a three-level structure: direction, entity class,
//! destination attribute, expression. The reserved attribute `objectClass`
//! names the destination schema type of the class. The document is
//! format-agnostic; whoever reads it from disk hands the parsed value here.
//!
//! All validation happens eagerly at load: shape checks, `objectClass` and
//! primary-key presence, and a full parse of every expression. A broken
//! mapping surfaces before any record is processed, never at conversion
//! time.
//!
//! # Example document
//!
//! ```yaml
//! sourceToTarget:
//!   Employee:
//!     objectClass: user
//!     employeeID: "{{source.cpr_no}}"
//!     givenName: "{{source.givenname}}"
//! targetToSource:
//!   Employee:
//!     objectClass: Employee
//!     cpr_no: "{{source.employeeID}}"
//!     givenname: "{{source.givenName or source.name|splitlast|first}}"
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::expr::Expression;

/// Reserved attribute naming the destination schema type of a class.
pub const OBJECT_CLASS: &str = "objectClass";

/// Which system is the expression-evaluation source and which is the write
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Convert a source-system record into a target record
    SourceToTarget,
    /// Convert a target-system record back into a source record
    TargetToSource,
}

impl Direction {
    /// The opposite direction.
    pub fn invert(self) -> Self {
        match self {
            Direction::SourceToTarget => Direction::TargetToSource,
            Direction::TargetToSource => Direction::SourceToTarget,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Direction::SourceToTarget => "sourceToTarget",
            Direction::TargetToSource => "targetToSource",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings applied while loading a mapping document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaOptions {
    /// Destination attribute identifying records written to the target
    /// system (e.g. `employeeID`)
    pub target_primary_key: String,

    /// Destination attribute identifying records written back to the source
    /// system (e.g. `cpr_no`)
    pub source_primary_key: String,

    /// Reject conversions where any mapped attribute resolves empty, not
    /// just the primary key
    #[serde(default)]
    pub require_all_attributes: bool,
}

impl SchemaOptions {
    /// The identity attribute for records produced in the given direction.
    pub fn primary_key(&self, direction: Direction) -> &str {
        match direction {
            Direction::SourceToTarget => &self.target_primary_key,
            Direction::TargetToSource => &self.source_primary_key,
        }
    }
}

/// One entity class in one direction: the destination `objectClass` plus the
/// destination attributes and their compiled expressions, in declaration
/// order.
#[derive(Debug, Clone)]
pub struct ClassMapping {
    object_class: String,
    primary_key: String,
    attributes: Vec<(String, Expression)>,
}

impl ClassMapping {
    /// The destination schema type for this class.
    pub fn object_class(&self) -> &str {
        &self.object_class
    }

    /// The destination attribute holding the record identity.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Destination attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.attributes
            .iter()
            .map(|(name, expr)| (name.as_str(), expr))
    }
}

/// A loaded and validated mapping schema.
///
/// Immutable after load; reloading means building a fresh schema and
/// swapping it in whole, so in-flight conversions never observe a partial
/// update.
#[derive(Debug, Clone)]
pub struct MappingSchema {
    source_to_target: HashMap<String, ClassMapping>,
    target_to_source: HashMap<String, ClassMapping>,
    require_all_attributes: bool,
}

/// Raw document shape (for serde deserialization)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawMapping {
    #[serde(default)]
    source_to_target: HashMap<String, Map<String, Value>>,
    #[serde(default)]
    target_to_source: HashMap<String, Map<String, Value>>,
}

impl MappingSchema {
    /// Load and validate a parsed mapping document.
    ///
    /// Fails with [`Error::InvalidMapping`] on any structural problem and
    /// with [`Error::Expression`] when an attribute expression has a syntax
    /// error or references an unknown filter or function.
    pub fn load(raw: Value, options: &SchemaOptions) -> Result<Self> {
        let raw: RawMapping =
            serde_json::from_value(raw).map_err(|e| Error::InvalidMapping {
                message: e.to_string(),
            })?;

        let schema = Self {
            source_to_target: compile_direction(
                raw.source_to_target,
                Direction::SourceToTarget,
                options,
            )?,
            target_to_source: compile_direction(
                raw.target_to_source,
                Direction::TargetToSource,
                options,
            )?,
            require_all_attributes: options.require_all_attributes,
        };
        tracing::info!(
            "loaded mapping schema: {} class(es) source-to-target, {} class(es) target-to-source",
            schema.source_to_target.len(),
            schema.target_to_source.len()
        );
        Ok(schema)
    }

    /// Look up the mapping for a class in a direction.
    pub fn class_mapping(&self, direction: Direction, class: &str) -> Result<&ClassMapping> {
        self.direction_map(direction)
            .get(class)
            .ok_or_else(|| Error::UnknownClass {
                class: class.to_string(),
                direction,
            })
    }

    /// The classes declared for a direction (unspecified order).
    pub fn classes(&self, direction: Direction) -> impl Iterator<Item = &str> {
        self.direction_map(direction).keys().map(String::as_str)
    }

    /// Whether conversions must produce a non-empty value for every mapped
    /// attribute, not just the primary key.
    pub fn require_all_attributes(&self) -> bool {
        self.require_all_attributes
    }

    fn direction_map(&self, direction: Direction) -> &HashMap<String, ClassMapping> {
        match direction {
            Direction::SourceToTarget => &self.source_to_target,
            Direction::TargetToSource => &self.target_to_source,
        }
    }
}

fn compile_direction(
    classes: HashMap<String, Map<String, Value>>,
    direction: Direction,
    options: &SchemaOptions,
) -> Result<HashMap<String, ClassMapping>> {
    let primary_key = options.primary_key(direction);
    classes
        .into_iter()
        .map(|(class, attributes)| {
            let mapping = compile_class(&class, attributes, direction, primary_key)?;
            Ok((class, mapping))
        })
        .collect()
}

fn compile_class(
    class: &str,
    raw_attributes: Map<String, Value>,
    direction: Direction,
    primary_key: &str,
) -> Result<ClassMapping> {
    // Looked up rather than removed: under preserve_order, Map::remove is a
    // swap-remove and would perturb the declared attribute order.
    let object_class = match raw_attributes.get(OBJECT_CLASS) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(Error::InvalidMapping {
                message: format!(
                    "{OBJECT_CLASS} of class '{class}' in '{direction}' must be a string, got {other}"
                ),
            });
        }
        None => {
            return Err(Error::InvalidMapping {
                message: format!("class '{class}' in '{direction}' declares no {OBJECT_CLASS}"),
            });
        }
    };

    let mut attributes = Vec::with_capacity(raw_attributes.len().saturating_sub(1));
    for (name, value) in raw_attributes {
        if name == OBJECT_CLASS {
            continue;
        }
        let source = match value {
            Value::String(s) => s,
            other => {
                return Err(Error::InvalidMapping {
                    message: format!(
                        "expression for attribute '{name}' of class '{class}' in '{direction}' must be a string, got {other}"
                    ),
                });
            }
        };
        attributes.push((name, Expression::parse(&source)?));
    }

    if !attributes.iter().any(|(name, _)| name == primary_key) {
        return Err(Error::InvalidMapping {
            message: format!(
                "class '{class}' in '{direction}' does not map its primary key attribute '{primary_key}'"
            ),
        });
    }

    tracing::debug!(
        "compiled class '{class}' ({direction}): {} attribute(s)",
        attributes.len()
    );
    Ok(ClassMapping {
        object_class,
        primary_key: primary_key.to_string(),
        attributes,
    })
}
