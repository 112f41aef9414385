//! Chunk content sanitization.
//!
//! Chunk records produced by the computation module can carry handles that
//! only mean something inside the module (`Reader`, `Chunk`). They are removed
//! before the record is re-encoded for the host.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::error::Result;

/// Keys removed from every chunk record.
pub const STRIPPED_FIELDS: [&str; 2] = ["Reader", "Chunk"];

const INDENT: &[u8] = b"    ";

/// Largest integer an f64 holds exactly (2^53).
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Copy `record` without the denylisted keys, keeping the order of the rest.
pub fn sanitize_record(record: &Map<String, Value>) -> Map<String, Value> {
    record
        .iter()
        .filter(|(key, _)| !STRIPPED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Decode chunk content text, strip module-local handles and re-encode it
/// with four-space indentation.
///
/// Non-object JSON values carry no handles and are re-encoded as is. Floats
/// with no fractional part are written as integers (`1.0` becomes `1`).
pub fn sanitize_content(text: &str) -> Result<String> {
    let value: Value = serde_json::from_str(text)?;
    let mut cleaned = match value {
        Value::Object(record) => Value::Object(sanitize_record(&record)),
        other => other,
    };
    normalize_numbers(&mut cleaned);
    to_indented(&cleaned)
}

fn normalize_numbers(value: &mut Value) {
    if let Some(int) = integral_float(value) {
        *value = Value::from(int);
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

fn integral_float(value: &Value) -> Option<i64> {
    let f = match value {
        Value::Number(n) if n.is_f64() => n.as_f64()?,
        _ => return None,
    };
    (f.fract() == 0.0 && f.abs() <= MAX_EXACT_INT).then_some(f as i64)
}

fn to_indented(value: &Value) -> Result<String> {
    let mut out = Vec::with_capacity(128);
    let formatter = PrettyFormatter::with_indent(INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_reader_and_chunk() {
        let out = sanitize_content(r#"{"Reader":{"pos":4},"Chunk":{"id":9},"Size":10}"#).unwrap();
        let decoded: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(decoded, json!({ "Size": 10 }));
    }

    #[test]
    fn test_missing_fields_are_noop() {
        let out = sanitize_content(r#"{"Size":10,"Name":"cast"}"#).unwrap();
        let decoded: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(decoded, json!({ "Size": 10, "Name": "cast" }));
    }

    #[test]
    fn test_integral_floats_written_as_integers() {
        let out = sanitize_content(r#"{"Size":1.0,"Ratio":0.5,"Rect":[0.0,-2.0,3e2]}"#).unwrap();
        assert_eq!(
            out,
            concat!(
                "{\n    \"Size\": 1,\n    \"Ratio\": 0.5,\n    \"Rect\": [\n",
                "        0,\n        -2,\n        300\n    ]\n}"
            )
        );
    }

    #[test]
    fn test_key_order_preserved() {
        let out =
            sanitize_content(r#"{"Zeta":1,"Reader":null,"Alpha":2,"Chunk":{},"Mid":3}"#).unwrap();
        let decoded: Map<String, Value> = serde_json::from_str(&out).unwrap();
        let keys: Vec<&str> = decoded.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_only_top_level_keys_removed() {
        let out = sanitize_content(r#"{"Members":[{"Reader":1,"Name":"a"}]}"#).unwrap();
        let decoded: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(decoded, json!({ "Members": [{ "Reader": 1, "Name": "a" }] }));
    }

    #[test]
    fn test_record_copy_leaves_original() {
        let original = json!({ "Reader": 1, "Chunk": 2, "Size": 3 });
        let record = original.as_object().unwrap();
        let cleaned = sanitize_record(record);

        assert_eq!(cleaned.len(), 1);
        assert!(record.contains_key("Reader"));
        assert!(record.contains_key("Chunk"));
    }

    #[test]
    fn test_four_space_indent() {
        let out = sanitize_content(r#"{"Size":10}"#).unwrap();
        assert_eq!(out, "{\n    \"Size\": 10\n}");
    }

    #[test]
    fn test_non_object_passes_through() {
        let out = sanitize_content("[1,2]").unwrap();
        assert_eq!(out, "[\n    1,\n    2\n]");
    }

    #[test]
    fn test_malformed_and_empty_fail() {
        assert!(sanitize_content("{\"Size\":").is_err());
        assert!(sanitize_content("").is_err());
    }
}
