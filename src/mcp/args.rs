//! Validation of tool arguments against the JSON schema a tool declares.
//!
//! Supports the subset of JSON Schema used by the tool definitions: `type`,
//! `properties`, `required`, `additionalProperties: false`, `enum`,
//! `minimum`, `maximum`, `items` and `default`. Defaults are filled in for
//! missing properties; an explicit `null` counts as missing.

use serde_json::{Map, Value};

use crate::errors::{FdepError, Result};

/// Validated tool arguments with schema defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    map: Map<String, Value>,
}

impl Args {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    pub fn required_str(&self, key: &str) -> Result<&str> {
        self.str(key)
            .ok_or_else(|| FdepError::validation(format!("missing required parameter: {key}")))
    }

    pub fn usize_or(&self, key: &str, default: usize) -> usize {
        self.map
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    pub fn required_i64(&self, key: &str) -> Result<i64> {
        self.map
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| FdepError::validation(format!("missing required parameter: {key}")))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.map.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.map.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// String items of an array argument; non-strings are ignored.
    pub fn str_list(&self, key: &str) -> Vec<String> {
        self.map
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Validates `args` against a tool `schema` and applies defaults.
pub fn validate_arguments(schema: &Value, args: Value) -> Result<Args> {
    let map = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        _ => return Err(FdepError::validation("arguments must be a JSON object")),
    };
    Ok(Args {
        map: validate_object("arguments", schema, map)?,
    })
}

fn validate_object(path: &str, schema: &Value, mut map: Map<String, Value>) -> Result<Map<String, Value>> {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .unwrap_or(&empty);

    map.retain(|_, v| !v.is_null());

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        if let Some(unknown) = map.keys().find(|k| !properties.contains_key(k.as_str())) {
            return Err(FdepError::validation(format!(
                "unexpected property '{unknown}' in {path}"
            )));
        }
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|r| r.as_str()) {
            if !map.contains_key(name) {
                return Err(FdepError::validation(format!(
                    "missing required parameter: {name}"
                )));
            }
        }
    }

    let mut out = Map::new();
    for (name, value) in map {
        let validated = match properties.get(&name) {
            Some(prop) => validate_value(&format!("{path}.{name}"), prop, value)?,
            None => value,
        };
        out.insert(name, validated);
    }

    for (name, prop) in properties {
        if !out.contains_key(name) {
            if let Some(default) = prop.get("default") {
                out.insert(name.clone(), default.clone());
            }
        }
    }

    Ok(out)
}

fn validate_value(path: &str, schema: &Value, value: Value) -> Result<Value> {
    let value = match schema.get("type").and_then(|t| t.as_str()) {
        Some(expected) => coerce(path, expected, value)?,
        None => value,
    };

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(&value) {
            let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return Err(FdepError::validation(format!(
                "{path} must be one of: {}",
                names.join(", ")
            )));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
            if n < min {
                return Err(FdepError::validation(format!("{path} must be >= {min}")));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
            if n > max {
                return Err(FdepError::validation(format!("{path} must be <= {max}")));
            }
        }
    }

    match value {
        Value::Array(items) => {
            let item_schema = schema.get("items");
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(match item_schema {
                    Some(s) => validate_value(&format!("{path}[{i}]"), s, item)?,
                    None => item,
                });
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) if schema.get("properties").is_some() => {
            Ok(Value::Object(validate_object(path, schema, map)?))
        }
        other => Ok(other),
    }
}

/// Checks `value` against a JSON type name. Integral floats are accepted as
/// integers.
fn coerce(path: &str, expected: &str, value: Value) -> Result<Value> {
    let ok = match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "integer" => {
            if value.is_i64() || value.is_u64() {
                true
            } else if let Some(f) = value.as_f64().filter(|f| f.fract() == 0.0) {
                return Ok(Value::from(f as i64));
            } else {
                false
            }
        }
        _ => true,
    };
    if ok {
        Ok(value)
    } else {
        Err(FdepError::validation(format!(
            "{path} must be of type {expected}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 },
                "format": { "type": "string", "enum": ["tree", "flat"], "default": "tree" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_defaults_filled() {
        let args = validate_arguments(&schema(), json!({"name": "x"})).unwrap();
        assert_eq!(args.usize_or("limit", 0), 10);
        assert_eq!(args.str("format"), Some("tree"));
    }

    #[test]
    fn test_rejections() {
        assert!(validate_arguments(&schema(), json!({})).is_err());
        assert!(validate_arguments(&schema(), json!({"name": 1})).is_err());
        assert!(validate_arguments(&schema(), json!({"name": "x", "limit": 0})).is_err());
        assert!(validate_arguments(&schema(), json!({"name": "x", "format": "dot"})).is_err());
        assert!(validate_arguments(&schema(), json!({"name": "x", "bogus": true})).is_err());
        assert!(validate_arguments(&schema(), json!([1])).is_err());
    }

    #[test]
    fn test_required_integer() {
        let schema = json!({
            "type": "object",
            "properties": { "line": { "type": "integer" } },
            "additionalProperties": false
        });
        let args = validate_arguments(&schema, json!({"line": 12.0})).unwrap();
        assert_eq!(args.required_i64("line").unwrap(), 12);
        let empty = validate_arguments(&schema, json!({})).unwrap();
        assert!(empty.required_i64("line").is_err());
    }

    #[test]
    fn test_integral_float_accepted() {
        let args = validate_arguments(&schema(), json!({"name": "x", "limit": 5.0})).unwrap();
        assert_eq!(args.usize_or("limit", 0), 5);
    }

    #[test]
    fn test_null_counts_as_missing() {
        let args = validate_arguments(&schema(), json!({"name": "x", "limit": null})).unwrap();
        assert_eq!(args.usize_or("limit", 0), 10);
    }
}
