//! Structural checks on the raw plan document.
//!
//! These run on untyped JSON so a single pass can report every shape problem
//! at once instead of stopping at the first deserialization failure.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonKind {
    String,
    Object,
    Array,
}

impl JsonKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Object => value.is_object(),
            JsonKind::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            JsonKind::String => "a string",
            JsonKind::Object => "an object",
            JsonKind::Array => "an array",
        }
    }
}

const PROCESSOR_FIELDS: &[(&str, JsonKind)] = &[
    ("id", JsonKind::String),
    ("name", JsonKind::String),
    ("type", JsonKind::String),
    ("properties", JsonKind::Object),
    ("scheduling", JsonKind::Object),
    ("auto_terminated_relationships", JsonKind::Array),
];

const CONNECTION_FIELDS: &[(&str, JsonKind)] = &[
    ("from_id", JsonKind::String),
    ("to_id", JsonKind::String),
    ("relationships", JsonKind::Array),
];

/// JSON type name used in messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Checks an untyped plan document for missing fields, wrong types and
/// dangling references.
pub struct StructuralChecker;

impl StructuralChecker {
    /// Returns every structural problem found. An empty result means the
    /// document will deserialize into a [`crate::plan::PipelinePlan`].
    pub fn check(document: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let Some(root) = document.as_object() else {
            errors.push(ValidationError::structural(format!(
                "Plan document must be an object, got {}",
                type_name(document)
            )));
            return errors;
        };

        if let Some(message) = field_problem(root, "plan_summary", JsonKind::String) {
            errors.push(ValidationError::structural(message));
        }

        let details = match root.get("plan_details") {
            None => {
                errors.push(ValidationError::structural(
                    "Missing required field `plan_details`",
                ));
                return errors;
            }
            Some(Value::Object(details)) => details,
            Some(other) => {
                errors.push(ValidationError::structural(format!(
                    "Field `plan_details` must be an object, got {}",
                    type_name(other)
                )));
                return errors;
            }
        };

        if let Some(flow_name) = details.get("flow_name") {
            if !flow_name.is_string() && !flow_name.is_null() {
                errors.push(ValidationError::structural(format!(
                    "Field `flow_name` must be a string, got {}",
                    type_name(flow_name)
                )));
            }
        }

        let processor_ids = match details.get("processors") {
            None => {
                errors.push(ValidationError::structural(
                    "Missing required field `processors`",
                ));
                None
            }
            Some(Value::Array(processors)) => Some(check_processors(processors, &mut errors)),
            Some(other) => {
                errors.push(ValidationError::structural(format!(
                    "Field `processors` must be an array, got {}",
                    type_name(other)
                )));
                None
            }
        };

        match details.get("connections") {
            None => errors.push(ValidationError::structural(
                "Missing required field `connections`",
            )),
            Some(Value::Array(connections)) => {
                check_connections(connections, processor_ids.as_ref(), &mut errors)
            }
            Some(other) => errors.push(ValidationError::structural(format!(
                "Field `connections` must be an array, got {}",
                type_name(other)
            ))),
        }

        errors
    }
}

fn field_problem(object: &Map<String, Value>, field: &str, kind: JsonKind) -> Option<String> {
    match object.get(field) {
        None => Some(format!("Missing required field `{}`", field)),
        Some(value) if !kind.matches(value) => Some(format!(
            "Field `{}` must be {}, got {}",
            field,
            kind.name(),
            type_name(value)
        )),
        Some(_) => None,
    }
}

/// Checks each processor entry and returns the ids seen, mapped to the index
/// that first used them.
fn check_processors(
    processors: &[Value],
    errors: &mut Vec<ValidationError>,
) -> HashMap<String, usize> {
    let mut ids: HashMap<String, usize> = HashMap::new();

    for (index, entry) in processors.iter().enumerate() {
        let push = |errors: &mut Vec<ValidationError>, message: String| {
            errors.push(ValidationError {
                processor_index: Some(index),
                ..ValidationError::structural(format!("Processor[{}]: {}", index, message))
            });
        };

        let Some(processor) = entry.as_object() else {
            push(
                errors,
                format!("Entry must be an object, got {}", type_name(entry)),
            );
            continue;
        };

        for (field, kind) in PROCESSOR_FIELDS {
            if let Some(message) = field_problem(processor, field, *kind) {
                push(errors, message);
            }
        }

        if let Some(Value::Object(properties)) = processor.get("properties") {
            for (key, value) in properties {
                if !value.is_string() {
                    push(
                        errors,
                        format!(
                            "Property `{}` must be a string, got {}",
                            key,
                            type_name(value)
                        ),
                    );
                }
            }
        }

        if let Some(Value::Object(scheduling)) = processor.get("scheduling") {
            for field in ["strategy", "period"] {
                match scheduling.get(field) {
                    Some(value) if !value.is_string() && !value.is_null() => push(
                        errors,
                        format!(
                            "Field `scheduling.{}` must be a string, got {}",
                            field,
                            type_name(value)
                        ),
                    ),
                    _ => {}
                }
            }
            if let Some(tasks) = scheduling.get("concurrent_tasks") {
                let valid = tasks.is_null()
                    || tasks.as_u64().is_some_and(|n| u32::try_from(n).is_ok());
                if !valid {
                    push(
                        errors,
                        format!(
                            "Field `scheduling.concurrent_tasks` must be a non-negative integer, got {}",
                            tasks
                        ),
                    );
                }
            }
        }

        if let Some(Value::Array(relationships)) = processor.get("auto_terminated_relationships") {
            for (position, relationship) in relationships.iter().enumerate() {
                if !relationship.is_string() {
                    push(
                        errors,
                        format!(
                            "Field `auto_terminated_relationships[{}]` must be a string, got {}",
                            position,
                            type_name(relationship)
                        ),
                    );
                }
            }
        }

        if let Some(id) = processor.get("id").and_then(Value::as_str) {
            if let Some(first) = ids.get(id).copied() {
                push(
                    errors,
                    format!(
                        "Duplicate processor id '{}' (first used by Processor[{}])",
                        id, first
                    ),
                );
            } else {
                ids.insert(id.to_string(), index);
            }
        }
    }

    ids
}

fn check_connections(
    connections: &[Value],
    processor_ids: Option<&HashMap<String, usize>>,
    errors: &mut Vec<ValidationError>,
) {
    for (index, entry) in connections.iter().enumerate() {
        let push = |errors: &mut Vec<ValidationError>, message: String| {
            errors.push(ValidationError::for_connection(
                index,
                format!("Connection[{}]: {}", index, message),
            ));
        };

        let Some(connection) = entry.as_object() else {
            push(
                errors,
                format!("Entry must be an object, got {}", type_name(entry)),
            );
            continue;
        };

        for (field, kind) in CONNECTION_FIELDS {
            if let Some(message) = field_problem(connection, field, *kind) {
                push(errors, message);
            }
        }

        match connection.get("id") {
            Some(id) if !id.is_string() && !id.is_null() => push(
                errors,
                format!("Field `id` must be a string, got {}", type_name(id)),
            ),
            _ => {}
        }

        if let Some(Value::Array(relationships)) = connection.get("relationships") {
            if relationships.is_empty() {
                push(errors, "Field `relationships` must not be empty".to_string());
            }
            for (position, relationship) in relationships.iter().enumerate() {
                if !relationship.is_string() {
                    push(
                        errors,
                        format!(
                            "Field `relationships[{}]` must be a string, got {}",
                            position,
                            type_name(relationship)
                        ),
                    );
                }
            }
        }

        // Dangling references are only meaningful once the processor list is sane.
        let Some(ids) = processor_ids else {
            continue;
        };
        for endpoint in ["from_id", "to_id"] {
            if let Some(id) = connection.get(endpoint).and_then(Value::as_str) {
                if !ids.contains_key(id) {
                    push(
                        errors,
                        format!("`{}` '{}' does not reference a known processor", endpoint, id),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_plan() -> Value {
        json!({
            "plan_summary": "Move records",
            "plan_details": {
                "flow_name": "Records",
                "processors": [
                    {
                        "id": "gen",
                        "name": "Generate",
                        "type": "GenerateFlowFile",
                        "properties": {"File Size": "1 KB"},
                        "scheduling": {"strategy": "TIMER_DRIVEN", "period": "1 min", "concurrent_tasks": 1},
                        "auto_terminated_relationships": []
                    },
                    {
                        "id": "log",
                        "name": "Log",
                        "type": "LogAttribute",
                        "properties": {},
                        "scheduling": {},
                        "auto_terminated_relationships": ["success"]
                    }
                ],
                "connections": [
                    {"from_id": "gen", "to_id": "log", "relationships": ["success"]}
                ]
            }
        })
    }

    fn messages(document: &Value) -> Vec<String> {
        StructuralChecker::check(document)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_valid_plan_has_no_errors() {
        assert!(StructuralChecker::check(&valid_plan()).is_empty());
    }

    #[test]
    fn test_valid_plan_deserializes() {
        let plan = crate::plan::parse_plan(&valid_plan());
        assert!(plan.is_ok());
    }

    #[test]
    fn test_missing_plan_details() {
        let document = json!({"plan_summary": "x"});
        assert_eq!(messages(&document), vec!["Missing required field `plan_details`"]);
    }

    #[test]
    fn test_wrong_root_field_types() {
        let document = json!({"plan_summary": 3, "plan_details": []});
        assert_eq!(
            messages(&document),
            vec![
                "Field `plan_summary` must be a string, got number",
                "Field `plan_details` must be an object, got array",
            ]
        );
    }

    #[test]
    fn test_processor_field_errors_carry_index() {
        let mut document = valid_plan();
        document["plan_details"]["processors"][1]["properties"] = json!(["a"]);
        document["plan_details"]["processors"][1]
            .as_object_mut()
            .expect("processor object")
            .remove("type");

        let errors = StructuralChecker::check(&document);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.processor_index == Some(1)));
        assert_eq!(errors[0].message, "Processor[1]: Missing required field `type`");
        assert_eq!(
            errors[1].message,
            "Processor[1]: Field `properties` must be an object, got array"
        );
    }

    #[test]
    fn test_non_string_property_value() {
        let mut document = valid_plan();
        document["plan_details"]["processors"][0]["properties"]["Batch Size"] = json!(10);
        assert_eq!(
            messages(&document),
            vec!["Processor[0]: Property `Batch Size` must be a string, got number"]
        );
    }

    #[test]
    fn test_negative_concurrent_tasks() {
        let mut document = valid_plan();
        document["plan_details"]["processors"][0]["scheduling"]["concurrent_tasks"] = json!(-1);
        assert_eq!(
            messages(&document),
            vec!["Processor[0]: Field `scheduling.concurrent_tasks` must be a non-negative integer, got -1"]
        );
    }

    #[test]
    fn test_duplicate_processor_id() {
        let mut document = valid_plan();
        document["plan_details"]["processors"][1]["id"] = json!("gen");
        let errors = messages(&document);
        assert!(errors
            .iter()
            .any(|m| m == "Processor[1]: Duplicate processor id 'gen' (first used by Processor[0])"));
    }

    #[test]
    fn test_dangling_connection_endpoint() {
        let mut document = valid_plan();
        document["plan_details"]["connections"][0]["to_id"] = json!("missing");
        let errors = StructuralChecker::check(&document);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].connection_index, Some(0));
        assert_eq!(
            errors[0].message,
            "Connection[0]: `to_id` 'missing' does not reference a known processor"
        );
    }

    #[test]
    fn test_empty_connection_relationships() {
        let mut document = valid_plan();
        document["plan_details"]["connections"][0]["relationships"] = json!([]);
        assert_eq!(
            messages(&document),
            vec!["Connection[0]: Field `relationships` must not be empty"]
        );
    }

    #[test]
    fn test_collects_all_problems_in_one_pass() {
        let document = json!({
            "plan_details": {
                "processors": [{"id": "a", "name": 1}],
                "connections": "none"
            }
        });
        let errors = StructuralChecker::check(&document);
        // missing summary, name type, four missing processor fields, connections type
        assert_eq!(errors.len(), 7);
    }
}
