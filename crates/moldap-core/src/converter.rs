//! Bidirectional record conversion
//!
//! Resolves every destination attribute of a class mapping against an input
//! record, producing the destination record. A pure function of its inputs:
//! the record is never mutated, nothing is cached, and concurrent
//! conversions over the same schema need no coordination.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::resolver::ResolutionContext;
use crate::schema::{Direction, MappingSchema, OBJECT_CLASS};

/// Context name the input record binds to inside mapping expressions.
pub const SOURCE_BINDING: &str = "source";

/// The destination record: attribute name to resolved value, in mapping
/// declaration order, with `objectClass` first.
pub type ConversionResult = Map<String, Value>;

/// Convert one record.
///
/// Looks up `class` in the requested direction, binds `record` as
/// [`SOURCE_BINDING`] next to the `extra` context entries, resolves each
/// destination attribute and verifies the result carries its identity:
/// a record whose primary-key attribute resolves empty cannot be written to
/// the destination system and fails with [`Error::IncompleteRecord`].
pub fn convert(
    schema: &MappingSchema,
    class: &str,
    direction: Direction,
    record: &Value,
    extra: &ResolutionContext,
) -> Result<ConversionResult> {
    let mapping = schema.class_mapping(direction, class)?;

    let mut context = extra.clone();
    context.insert(SOURCE_BINDING, record.clone());

    let mut output = ConversionResult::new();
    output.insert(
        OBJECT_CLASS.to_string(),
        Value::String(mapping.object_class().to_string()),
    );
    for (name, expression) in mapping.attributes() {
        output.insert(name.to_string(), expression.resolve(&context)?);
    }

    match output.get(mapping.primary_key()) {
        Some(value) if !is_empty(value) => {}
        _ => {
            return Err(Error::IncompleteRecord {
                class: class.to_string(),
                attribute: mapping.primary_key().to_string(),
            });
        }
    }
    if schema.require_all_attributes() {
        if let Some((name, _)) = output.iter().find(|(_, value)| is_empty(value)) {
            return Err(Error::IncompleteRecord {
                class: class.to_string(),
                attribute: name.clone(),
            });
        }
    }

    tracing::debug!(
        "converted '{class}' record ({direction}): {} attribute(s)",
        output.len()
    );
    Ok(output)
}

/// Converter bound to a loaded schema.
///
/// The schema sits behind an `Arc`; reload is done by building a fresh
/// schema and handing out a new `Converter`, so in-flight conversions keep
/// the schema they started with.
#[derive(Debug, Clone)]
pub struct Converter {
    schema: Arc<MappingSchema>,
}

impl Converter {
    /// Create a converter over a loaded schema.
    pub fn new(schema: Arc<MappingSchema>) -> Self {
        Self { schema }
    }

    /// The schema this converter resolves against.
    pub fn schema(&self) -> &MappingSchema {
        &self.schema
    }

    /// Convert one record, with extra context entries.
    pub fn convert(
        &self,
        class: &str,
        direction: Direction,
        record: &Value,
        extra: &ResolutionContext,
    ) -> Result<ConversionResult> {
        convert(&self.schema, class, direction, record, extra)
    }

    /// Convert a source-system record into a target record.
    pub fn to_target(&self, class: &str, record: &Value) -> Result<ConversionResult> {
        self.convert(
            class,
            Direction::SourceToTarget,
            record,
            &ResolutionContext::new(),
        )
    }

    /// Convert a target-system record back into a source record.
    pub fn to_source(&self, class: &str, record: &Value) -> Result<ConversionResult> {
        self.convert(
            class,
            Direction::TargetToSource,
            record,
            &ResolutionContext::new(),
        )
    }
}

/// Empty means unusable as a record value: null, empty string, empty list
/// or empty mapping. Zero and `false` are legitimate resolved values.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaOptions;
    use serde_json::json;

    fn load(raw: Value) -> MappingSchema {
        MappingSchema::load(
            raw,
            &SchemaOptions {
                target_primary_key: "employeeID".to_string(),
                source_primary_key: "cpr_no".to_string(),
                require_all_attributes: false,
            },
        )
        .unwrap()
    }

    fn employee_schema() -> MappingSchema {
        load(json!({
            "sourceToTarget": {
                "Employee": {
                    "objectClass": "user",
                    "employeeID": "{{source.cpr_no}}",
                    "givenName": "{{source.givenname}}",
                    "sn": "{{source.surname}}",
                    "displayName": "{{source.surname}}, {{source.givenname}}",
                }
            },
            "targetToSource": {
                "Employee": {
                    "objectClass": "Employee",
                    "cpr_no": "{{source.employeeID}}",
                    "givenname": "{{source.givenName}}",
                    "surname": "{{source.sn or ''}}",
                }
            }
        }))
    }

    #[test]
    fn test_convert_source_to_target() {
        let converter = Converter::new(Arc::new(employee_schema()));
        let record = json!({
            "cpr_no": "0101011234",
            "givenname": "Anne",
            "surname": "Jensen",
        });
        let result = converter.to_target("Employee", &record).unwrap();
        assert_eq!(result["objectClass"], json!("user"));
        assert_eq!(result["employeeID"], json!("0101011234"));
        assert_eq!(result["givenName"], json!("Anne"));
        assert_eq!(result["displayName"], json!("Jensen, Anne"));
    }

    #[test]
    fn test_output_order_is_declaration_order() {
        let converter = Converter::new(Arc::new(employee_schema()));
        let record = json!({"cpr_no": "0101011234", "givenname": "A", "surname": "B"});
        let result = converter.to_target("Employee", &record).unwrap();
        let keys: Vec<_> = result.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["objectClass", "employeeID", "givenName", "sn", "displayName"]
        );
    }

    #[test]
    fn test_unknown_class() {
        let converter = Converter::new(Arc::new(employee_schema()));
        let err = converter.to_target("OrgUnit", &json!({})).unwrap_err();
        assert!(matches!(err, Error::UnknownClass { .. }));
    }

    #[test]
    fn test_missing_primary_key_value_is_incomplete() {
        let converter = Converter::new(Arc::new(employee_schema()));
        let record = json!({"givenname": "Anne", "surname": "Jensen"});
        let err = converter.to_target("Employee", &record).unwrap_err();
        match err {
            Error::IncompleteRecord { class, attribute } => {
                assert_eq!(class, "Employee");
                assert_eq!(attribute, "employeeID");
            }
            other => panic!("expected IncompleteRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_optional_attribute_is_tolerated() {
        let converter = Converter::new(Arc::new(employee_schema()));
        let record = json!({"cpr_no": "0101011234"});
        let result = converter.to_target("Employee", &record).unwrap();
        assert_eq!(result["givenName"], Value::Null);
        // concatenating template renders absent values as empty text
        assert_eq!(result["displayName"], json!(", "));
    }

    #[test]
    fn test_require_all_attributes() {
        let schema = MappingSchema::load(
            json!({
                "sourceToTarget": {
                    "Employee": {
                        "objectClass": "user",
                        "employeeID": "{{source.cpr_no}}",
                        "givenName": "{{source.givenname}}",
                    }
                }
            }),
            &SchemaOptions {
                target_primary_key: "employeeID".to_string(),
                source_primary_key: "cpr_no".to_string(),
                require_all_attributes: true,
            },
        )
        .unwrap();
        let converter = Converter::new(Arc::new(schema));

        let err = converter
            .to_target("Employee", &json!({"cpr_no": "0101011234"}))
            .unwrap_err();
        match err {
            Error::IncompleteRecord { attribute, .. } => assert_eq!(attribute, "givenName"),
            other => panic!("expected IncompleteRecord, got {other:?}"),
        }

        let result = converter
            .to_target(
                "Employee",
                &json!({"cpr_no": "0101011234", "givenname": "Anne"}),
            )
            .unwrap();
        assert_eq!(result["givenName"], json!("Anne"));
    }

    #[test]
    fn test_extra_context_is_available() {
        let schema = load(json!({
            "sourceToTarget": {
                "Engagement": {
                    "objectClass": "user",
                    "employeeID": "{{employee.cpr_no}}",
                    "title": "{{source.job_function}}",
                }
            }
        }));
        let converter = Converter::new(Arc::new(schema));
        let extra = ResolutionContext::new().with("employee", json!({"cpr_no": "0101011234"}));
        let result = converter
            .convert(
                "Engagement",
                Direction::SourceToTarget,
                &json!({"job_function": "Developer"}),
                &extra,
            )
            .unwrap();
        assert_eq!(result["employeeID"], json!("0101011234"));
        assert_eq!(result["title"], json!("Developer"));
    }

    #[test]
    fn test_record_binding_wins_over_extra() {
        let schema = load(json!({
            "sourceToTarget": {
                "Employee": {
                    "objectClass": "user",
                    "employeeID": "{{source.cpr_no}}",
                }
            }
        }));
        let converter = Converter::new(Arc::new(schema));
        let extra = ResolutionContext::new().with(SOURCE_BINDING, json!({"cpr_no": "shadowed"}));
        let result = converter
            .convert(
                "Employee",
                Direction::SourceToTarget,
                &json!({"cpr_no": "0101011234"}),
                &extra,
            )
            .unwrap();
        assert_eq!(result["employeeID"], json!("0101011234"));
    }

    #[test]
    fn test_record_is_not_mutated() {
        let converter = Converter::new(Arc::new(employee_schema()));
        let record = json!({"cpr_no": "0101011234", "givenname": "A", "surname": "B"});
        let before = record.clone();
        converter.to_target("Employee", &record).unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_is_empty_classification() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!("")));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!(false)));
        assert!(!is_empty(&json!("x")));
    }
}
