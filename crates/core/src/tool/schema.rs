//! A small subset of JSON schema validation for tool arguments.
//!
//! Only what tool parameter schemas commonly use is checked: the top-level
//! `object` type, `required` properties and the primitive `type` of each
//! declared property. Everything else is left to deserialization.

use serde_json::{Map, Value};

/// Checks `args` against `schema`, returning a readable reason on mismatch.
pub(crate) fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    let Value::Object(schema) = schema else {
        return Ok(());
    };
    if schema.is_empty() {
        return Ok(());
    }

    if let Some(expected) = schema.get("type") {
        check_type("arguments", expected, args)?;
    }
    let Value::Object(args) = args else {
        return Ok(());
    };

    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(name) {
                return Err(format!("missing required property `{name}`"));
            }
        }
    }

    if let Some(Value::Object(properties)) = schema.get("properties") {
        check_properties(properties, args)?;
    }
    Ok(())
}

fn check_properties(
    properties: &Map<String, Value>,
    args: &Map<String, Value>,
) -> Result<(), String> {
    for (name, value) in args {
        let Some(expected) = properties.get(name).and_then(|p| p.get("type"))
        else {
            continue;
        };
        check_type(&format!("property `{name}`"), expected, value)?;
    }
    Ok(())
}

fn check_type(what: &str, expected: &Value, value: &Value) -> Result<(), String> {
    let matches = match expected {
        Value::String(ty) => is_type(ty, value),
        // `"type": ["number", "null"]`
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|ty| is_type(ty, value)),
        _ => true,
    };
    if matches {
        return Ok(());
    }
    Err(format!(
        "{what} should be {}, got {}",
        describe(expected),
        type_name(value)
    ))
}

fn is_type(ty: &str, value: &Value) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        // Unknown type names are not ours to reject.
        _ => true,
    }
}

fn describe(expected: &Value) -> String {
    match expected {
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.as_str().unwrap_or("valid").to_owned(),
    }
}

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
