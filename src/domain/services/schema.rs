//! Payload schema checking
//!
//! Component payloads are checked against the JSON schema their type was
//! registered with. Only the structural subset of JSON Schema that world
//! modules actually use is understood: `type` (single or list), `properties`,
//! `required`, `additionalProperties: false`, `items`, `enum`, `oneOf`,
//! `minimum`, `maximum`, `minLength` and `maxLength`. Unknown keywords are
//! ignored.

use serde_json::{Map, Value};
use thiserror::Error;

/// A payload failed its schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct SchemaViolation {
    /// JSON pointer to the offending value ("" is the root)
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn at(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            message: message.into(),
        }
    }
}

/// Check `data` against `schema`, returning the first violation found
pub fn validate(schema: &Value, data: &Value) -> Result<(), SchemaViolation> {
    check(schema, data, "")
}

fn check(schema: &Value, data: &Value, path: &str) -> Result<(), SchemaViolation> {
    let Some(schema) = schema.as_object() else {
        // `true` and non-object schemas accept anything
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, data, path)?;
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(data) {
            return Err(SchemaViolation::at(path, format!("{} is not one of the allowed values", data)));
        }
    }

    if let Some(Value::Array(variants)) = schema.get("oneOf") {
        let matching = variants
            .iter()
            .filter(|variant| check(variant, data, path).is_ok())
            .count();
        if matching != 1 {
            return Err(SchemaViolation::at(
                path,
                format!("expected exactly one matching alternative, found {}", matching),
            ));
        }
    }

    match data {
        Value::Object(fields) => check_object(schema, fields, path)?,
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{}/{}", path, index))?;
                }
            }
        }
        Value::Number(number) => {
            let value = number.as_f64().unwrap_or_default();
            if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
                if value < minimum {
                    return Err(SchemaViolation::at(path, format!("{} is below the minimum of {}", value, minimum)));
                }
            }
            if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
                if value > maximum {
                    return Err(SchemaViolation::at(path, format!("{} is above the maximum of {}", value, maximum)));
                }
            }
        }
        Value::String(text) => {
            let length = text.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if length < min {
                    return Err(SchemaViolation::at(path, format!("shorter than {} characters", min)));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if length > max {
                    return Err(SchemaViolation::at(path, format!("longer than {} characters", max)));
                }
            }
        }
        Value::Bool(_) | Value::Null => {}
    }

    Ok(())
}

fn check_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaViolation> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                return Err(SchemaViolation::at(path, format!("missing required field '{}'", name)));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));

    for (name, value) in fields {
        let field_path = format!("{}/{}", path, name);
        match properties.and_then(|props| props.get(name)) {
            Some(field_schema) => check(field_schema, value, &field_path)?,
            None if closed => {
                return Err(SchemaViolation::at(path, format!("unexpected field '{}'", name)));
            }
            None => {}
        }
    }

    Ok(())
}

fn check_type(expected: &Value, data: &Value, path: &str) -> Result<(), SchemaViolation> {
    let accepted: Vec<&str> = match expected {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };

    if accepted.iter().any(|name| is_instance_of(name, data)) {
        Ok(())
    } else {
        Err(SchemaViolation::at(
            path,
            format!("expected {}, found {}", accepted.join(" or "), type_name(data)),
        ))
    }
}

fn is_instance_of(type_name: &str, data: &Value) -> bool {
    match type_name {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        "number" => data.is_number(),
        "integer" => match data {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        _ => false,
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn container_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "capacity": {"type": ["integer", "null"], "minimum": 0}
            },
            "required": ["capacity"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_accepts_matching_payload() {
        assert!(validate(&container_schema(), &json!({"capacity": 3})).is_ok());
        assert!(validate(&container_schema(), &json!({"capacity": null})).is_ok());
    }

    #[test]
    fn test_rejects_missing_required_field() {
        let err = validate(&container_schema(), &json!({})).unwrap_err();
        assert!(err.message.contains("capacity"));
    }

    #[test]
    fn test_rejects_wrong_type_and_bounds() {
        let err = validate(&container_schema(), &json!({"capacity": "lots"})).unwrap_err();
        assert_eq!(err.path, "/capacity");
        assert!(validate(&container_schema(), &json!({"capacity": -1})).is_err());
        assert!(validate(&container_schema(), &json!({"capacity": 1.5})).is_err());
    }

    #[test]
    fn test_rejects_unexpected_field_when_closed() {
        let err = validate(&container_schema(), &json!({"capacity": 1, "size": 2})).unwrap_err();
        assert!(err.message.contains("size"));
    }

    #[test]
    fn test_checks_array_items_and_string_length() {
        let schema = json!({
            "type": "object",
            "properties": {
                "description": {"type": "string", "minLength": 1},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        assert!(validate(&schema, &json!({"description": "A rusty key", "tags": ["metal"]})).is_ok());
        assert!(validate(&schema, &json!({"description": ""})).is_err());

        let err = validate(&schema, &json!({"tags": ["ok", 4]})).unwrap_err();
        assert_eq!(err.path, "/tags/1");
    }

    #[test]
    fn test_enum_and_one_of() {
        let schema = json!({"oneOf": [{"type": "string", "enum": ["north", "south"]}, {"type": "integer"}]});
        assert!(validate(&schema, &json!("north")).is_ok());
        assert!(validate(&schema, &json!(7)).is_ok());
        assert!(validate(&schema, &json!("west")).is_err());
    }
}
