//! Argument checks and typed accessors shared by the built-in handlers.

use serde_json::{Map, Value};

use super::HandlerError;
use crate::discovery::ToolSchema;

/// Check `arguments` against a tool's input schema.
///
/// Only the cheap structural parts are enforced: the arguments must be an
/// object and every `required` property must be present. A value whose JSON
/// type disagrees with the declared primitive `type` is logged, not rejected.
pub fn validate_tool_arguments(schema: &ToolSchema, arguments: &Value) -> Result<(), HandlerError> {
    let args = as_object(arguments)?;

    let missing: Vec<&str> = schema
        .required_parameters()
        .into_iter()
        .filter(|name| args.get(*name).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(HandlerError::InvalidArguments(format!(
            "{}: missing required field(s): {}",
            schema.name,
            missing.join(", ")
        )));
    }

    if let Some(props) = schema.input_schema.get("properties").and_then(|p| p.as_object()) {
        for (name, value) in args {
            let declared = props
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str());
            if let Some(declared) = declared {
                if !matches_json_type(declared, value) {
                    log::warn!(
                        "{}: argument '{}' expected {}, got {}",
                        schema.name,
                        name,
                        declared,
                        json_type_name(value)
                    );
                }
            }
        }
    }

    Ok(())
}

fn matches_json_type(declared: &str, value: &Value) -> bool {
    match declared {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn as_object(arguments: &Value) -> Result<&Map<String, Value>, HandlerError> {
    arguments
        .as_object()
        .ok_or_else(|| HandlerError::InvalidArguments("arguments must be a JSON object".to_string()))
}

pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, HandlerError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerError::InvalidArguments(format!("'{}' must be a string", key)))
}

pub(crate) fn optional_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub(crate) fn u64_or(arguments: &Value, key: &str, default: u64) -> u64 {
    arguments.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub(crate) fn f64_or(arguments: &Value, key: &str, default: f64) -> f64 {
    arguments.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

/// Render a scalar argument the way a CLI `key:value` pair expects it.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
