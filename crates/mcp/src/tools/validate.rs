// Argument validation driven by a tool's input schema

use crate::error::{McpError, McpResult};
use serde_json::{Map, Value};

/// Check `arguments` against an object schema built by `json_schema_object`.
///
/// `null` is treated as an empty argument object. Required properties must
/// be present and non-null, declared properties must match their `type` and
/// `enum`, and undeclared properties are rejected when the schema sets
/// `additionalProperties: false`.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> McpResult<()> {
    let empty = Map::new();
    let args = match arguments {
        Value::Null => &empty,
        Value::Object(map) => map,
        _ => return Err(McpError::invalid_params("arguments", "must be an object")),
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match args.get(field) {
                None | Some(Value::Null) => {
                    return Err(McpError::invalid_params(field, "is required"));
                }
                Some(_) => {}
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (field, value) in args {
        match properties.get(field) {
            Some(property) => check_property(field, property, value)?,
            None if closed => {
                return Err(McpError::invalid_params(field.as_str(), "unknown argument"));
            }
            None => {}
        }
    }
    Ok(())
}

fn check_property(field: &str, property: &Value, value: &Value) -> McpResult<()> {
    // Optional arguments may be sent as explicit nulls
    if value.is_null() {
        return Ok(());
    }

    if let Some(expected) = property.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(McpError::invalid_params(
                field,
                format!("expected {}, got {}", expected, type_name(value)),
            ));
        }
    }

    if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return Err(McpError::invalid_params(
                field,
                format!("must be one of {}", names.join(", ")),
            ));
        }
    }

    if let (Some(items), Value::Array(values)) = (property.get("items"), value) {
        for (index, item) in values.iter().enumerate() {
            check_property(&format!("{}[{}]", field, index), items, item)?;
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{json_schema_integer, json_schema_object, json_schema_string};
    use serde_json::json;

    fn schema() -> Value {
        json_schema_object(
            json!({
                "title": json_schema_string("Title"),
                "priority": json_schema_integer("1 (critical) to 4 (low)"),
                "kind": {"type": "string", "description": "Kind", "enum": ["epic", "requirement"]},
                "kinds": {
                    "type": "array",
                    "description": "Kinds",
                    "items": {"type": "string", "enum": ["epic", "requirement"]}
                }
            }),
            vec!["title"],
        )
    }

    fn field_of(err: McpError) -> String {
        match err {
            McpError::InvalidParams { field, .. } => field,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_accepts_valid_arguments() {
        assert!(validate_arguments(&schema(), &json!({"title": "t", "priority": 2})).is_ok());
        assert!(validate_arguments(&schema(), &json!({"title": "t", "priority": null})).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&schema(), &Value::Null).unwrap_err();
        assert_eq!(field_of(err), "title");
        let err = validate_arguments(&schema(), &json!({"title": null})).unwrap_err();
        assert_eq!(field_of(err), "title");
    }

    #[test]
    fn test_wrong_type_and_enum() {
        let err = validate_arguments(&schema(), &json!({"title": 5})).unwrap_err();
        assert_eq!(field_of(err), "title");
        let err = validate_arguments(&schema(), &json!({"title": "t", "priority": 1.5})).unwrap_err();
        assert_eq!(field_of(err), "priority");
        let err = validate_arguments(&schema(), &json!({"title": "t", "kind": "prompt"})).unwrap_err();
        assert_eq!(field_of(err), "kind");
        let err =
            validate_arguments(&schema(), &json!({"title": "t", "kinds": ["epic", "x"]})).unwrap_err();
        assert_eq!(field_of(err), "kinds[1]");
    }

    #[test]
    fn test_unknown_and_non_object() {
        let err = validate_arguments(&schema(), &json!({"title": "t", "owner": "me"})).unwrap_err();
        assert_eq!(field_of(err), "owner");
        assert!(validate_arguments(&schema(), &json!(["title"])).is_err());
    }
}
