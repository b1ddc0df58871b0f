//! Parameter schemas
//!
//! Tools declare their parameters as a JSON-schema object. Only the subset
//! tools actually use is understood: `type`, `properties`, `required`,
//! `default` and `enum`.

use serde_json::{Map, Value};
use thiserror::Error;

/// Argument shape mismatch, reported back as a failed result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required parameter(s): {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("Parameter '{name}' must be of type {expected}")]
    WrongType { name: String, expected: String },

    #[error("Invalid arguments: {0}")]
    Invalid(String),
}

/// Check that a definition's schema is usable
pub fn check_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "parameters must be a JSON object".to_string())?;

    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return Err("parameters must declare \"type\": \"object\"".to_string());
    }

    let empty = Map::new();
    let properties = match obj.get("properties") {
        None => &empty,
        Some(Value::Object(props)) => props,
        Some(_) => return Err("\"properties\" must be an object".to_string()),
    };

    for (name, prop) in properties {
        if !prop.is_object() {
            return Err(format!("property '{}' must be an object", name));
        }
    }

    if let Some(required) = obj.get("required") {
        let names = required
            .as_array()
            .ok_or_else(|| "\"required\" must be an array".to_string())?;
        for name in names {
            let name = name
                .as_str()
                .ok_or_else(|| "\"required\" entries must be strings".to_string())?;
            if !properties.contains_key(name) {
                return Err(format!("required parameter '{}' is not declared", name));
            }
        }
    }

    Ok(())
}

/// Validate `args` against `schema`, returning the coerced arguments.
///
/// Numeric strings become numbers, `"true"`/`"false"` become booleans and
/// missing parameters with a `default` are filled in.
pub fn validate_arguments(schema: &Value, args: Value) -> Result<Value, ValidationError> {
    let mut args = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ValidationError::Invalid(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            )))
        }
    };

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    for (name, prop) in properties {
        if !args.contains_key(name) {
            if let Some(default) = prop.get("default") {
                args.insert(name.clone(), default.clone());
            }
        }
    }

    let missing: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|name| args.get(*name).map_or(true, Value::is_null))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingRequired(missing));
    }

    for (name, prop) in properties {
        let Some(value) = args.get_mut(name) else {
            continue;
        };

        if let Some(types) = declared_types(prop) {
            if value.is_null() && !types.contains(&"null") {
                // Optional parameter passed as null
                continue;
            }
            match types.iter().find_map(|ty| coerce(value, ty)) {
                Some(coerced) => *value = coerced,
                None => {
                    return Err(ValidationError::WrongType {
                        name: name.clone(),
                        expected: types.join(" or "),
                    })
                }
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(ValidationError::Invalid(format!(
                    "'{}' must be one of {}",
                    name,
                    Value::Array(allowed.clone())
                )));
            }
        }
    }

    Ok(Value::Object(args))
}

fn declared_types(prop: &Value) -> Option<Vec<&str>> {
    match prop.get("type")? {
        Value::String(ty) => Some(vec![ty.as_str()]),
        Value::Array(types) => Some(types.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Coerce a value to a schema type, or `None` if it does not fit
fn coerce(value: &Value, ty: &str) -> Option<Value> {
    match (ty, value) {
        ("string", Value::String(_))
        | ("boolean", Value::Bool(_))
        | ("array", Value::Array(_))
        | ("object", Value::Object(_))
        | ("null", Value::Null) => Some(value.clone()),
        ("number", Value::Number(_)) => Some(value.clone()),
        ("integer", Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| Value::from(f as i64))
            }
        }
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
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
