//! Ready-made output parsers for specs with declared outputs.
//!
//! Both parsers return every field they find; the engine then checks the
//! fields against the spec's declared outputs and drops the rest.

use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeMap;

use crate::core::Value;

/// Parse a JSON object, as printed by `gh ... --json a,b,c`.
///
/// Strings, integers and booleans map to the matching [`Value`]; nested
/// objects become [`Value::Map`]; `null` fields are skipped. Floats and
/// arrays are rejected with the offending field named.
///
/// ```
/// use ghflow::core::Value;
/// use ghflow::parsers::json_object;
///
/// let parsed = json_object(r#"{"number": 7, "title": "Fix login"}"#).unwrap();
/// assert_eq!(parsed["number"], Value::Int(7));
/// ```
pub fn json_object(raw: &str) -> Result<BTreeMap<String, Value>> {
    let json: serde_json::Value =
        serde_json::from_str(raw.trim()).context("Command output is not valid JSON")?;

    match json {
        serde_json::Value::Object(map) => convert_object(map),
        other => bail!("Expected a JSON object, got {}", json_kind(&other)),
    }
}

fn convert_object(
    map: serde_json::Map<String, serde_json::Value>,
) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let converted = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Number(n) => Value::Int(
                n.as_i64().ok_or_else(|| anyhow!("Field '{key}' is not an integer: {n}"))?,
            ),
            serde_json::Value::Object(inner) => Value::Map(
                convert_object(inner).with_context(|| format!("In field '{key}'"))?,
            ),
            serde_json::Value::Array(_) => bail!("Field '{key}' is an array"),
        };
        out.insert(key, converted);
    }
    Ok(out)
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Parse `key=value` lines into string outputs.
///
/// Blank lines and lines starting with `#` are ignored. Keys and values are
/// trimmed; a later line overrides an earlier one with the same key.
pub fn key_value_lines(raw: &str) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("Line {} has no '=': {line}", number + 1))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Line {} has an empty key", number + 1);
        }
        out.insert(key.to_string(), Value::Str(value.trim().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_object_scalars() {
        let parsed =
            json_object(r#"{"title":"Fix login","number":7,"closed":false,"milestone":null}"#)
                .unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["title"], Value::from("Fix login"));
        assert_eq!(parsed["number"], Value::Int(7));
        assert_eq!(parsed["closed"], Value::Bool(false));
    }

    #[test]
    fn test_json_object_nested() {
        let parsed = json_object(r#"{"author":{"login":"octocat"}}"#).unwrap();
        let author = parsed["author"].as_map().unwrap();
        assert_eq!(author["login"], Value::from("octocat"));
    }

    #[test]
    fn test_json_object_rejects_non_objects() {
        let err = json_object("[1, 2]").unwrap_err();
        assert_eq!(err.to_string(), "Expected a JSON object, got an array");

        assert!(json_object("not json").is_err());
    }

    #[test]
    fn test_json_object_rejects_floats_and_arrays() {
        let err = json_object(r#"{"ratio": 0.5}"#).unwrap_err();
        assert!(err.to_string().contains("'ratio'"));

        let err = json_object(r#"{"labels": []}"#).unwrap_err();
        assert_eq!(err.to_string(), "Field 'labels' is an array");
    }

    #[test]
    fn test_key_value_lines() {
        let parsed = key_value_lines("# remote\nremote_name = origin\n\nremote_url=git@github.com:o/r.git\n")
            .unwrap();
        assert_eq!(parsed["remote_name"], Value::from("origin"));
        assert_eq!(parsed["remote_url"], Value::from("git@github.com:o/r.git"));
    }

    #[test]
    fn test_key_value_lines_errors() {
        let err = key_value_lines("ok=1\nbroken").unwrap_err();
        assert_eq!(err.to_string(), "Line 2 has no '=': broken");

        assert!(key_value_lines("=value").is_err());
    }
}
