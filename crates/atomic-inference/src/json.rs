//! Defensive parsing of model output that is supposed to be one JSON object.

use serde_json::{Map, Value as JsonValue};

use atomic_core::{Error, Result};

/// Parse `raw` as a JSON object, tolerating a surrounding markdown code fence.
///
/// Anything that is not an object after cleanup is an `Extraction` error
/// naming `what` was being parsed.
pub fn parse_json_object(raw: &str, what: &str) -> Result<Map<String, JsonValue>> {
    let value: JsonValue = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            let cleaned = raw
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(cleaned).map_err(|e| {
                Error::Extraction(format!("Invalid JSON in {} response: {}", what, e))
            })?
        }
    };
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::Extraction(format!(
            "Expected a JSON object in {} response, got {}",
            what,
            json_kind(&other)
        ))),
    }
}

/// The array under `key`; absent or null means empty.
pub fn array_field<'a>(
    map: &'a Map<String, JsonValue>,
    key: &str,
    what: &str,
) -> Result<&'a [JsonValue]> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(&[]),
        Some(JsonValue::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(Error::Extraction(format!(
            "Expected '{}' to be an array in {} response, got {}",
            key,
            what,
            json_kind(other)
        ))),
    }
}

/// Non-blank string under `key`, trimmed.
pub fn str_field<'a>(item: &'a JsonValue, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        let map = parse_json_object(r#"{"a": 1}"#, "test").unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_fenced_object() {
        let raw = "```json\n{\"entities\": []}\n```";
        let map = parse_json_object(raw, "test").unwrap();
        assert!(map.contains_key("entities"));
    }

    #[test]
    fn test_invalid_json_is_extraction_error() {
        let err = parse_json_object("{not json", "entity extraction").unwrap_err();
        assert!(matches!(err, Error::Extraction(ref m) if m.contains("entity extraction")));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_json_object("[1, 2]", "test").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_array_field_defaults_and_type_check() {
        let map = parse_json_object(r#"{"xs": [1], "n": null, "s": "no"}"#, "t").unwrap();
        assert_eq!(array_field(&map, "xs", "t").unwrap().len(), 1);
        assert!(array_field(&map, "missing", "t").unwrap().is_empty());
        assert!(array_field(&map, "n", "t").unwrap().is_empty());
        assert!(array_field(&map, "s", "t").is_err());
    }

    #[test]
    fn test_str_field_trims_and_rejects_blank() {
        let item = json!({"name": "  Rust ", "blank": "  ", "num": 3});
        assert_eq!(str_field(&item, "name"), Some("Rust"));
        assert_eq!(str_field(&item, "blank"), None);
        assert_eq!(str_field(&item, "num"), None);
        assert_eq!(str_field(&item, "missing"), None);
    }
}
