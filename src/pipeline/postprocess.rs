//! Post-processing: turn raw annotation text into a [`PartialRecord`].
//!
//! Services are asked for a bare JSON object, but models still wrap it in
//! ```` ```json ```` fences, prepend a sentence ("Here is the extraction:"),
//! or emit a BOM. These rules peel that off before parsing. Anything that is
//! still not a JSON object afterwards is a malformed response.
//!
//! ## Rule Order
//!
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip an outer code fence
//! 3. Cut surrounding prose down to the outermost `{ … }`
//! 4. Parse; require an object

use crate::record::PartialRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse raw annotation text into a partial record.
///
/// Returns a human-readable reason on failure; the caller attaches the window.
pub fn parse_partial_record(raw: &str) -> Result<PartialRecord, String> {
    let s = remove_invisible_chars(raw);
    let s = strip_code_fences(&s);
    let s = extract_outer_object(&s);

    if s.trim().is_empty() {
        return Err("empty response".to_string());
    }

    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Rule 1: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap()
});

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 3: Cut surrounding prose ────────────────────────────────────────────

fn extract_outer_object(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object() {
        let rec = parse_partial_record(r#"{"Title": "X", "n": 3}"#).unwrap();
        assert_eq!(rec["Title"], json!("X"));
        assert_eq!(rec["n"], json!(3));
    }

    #[test]
    fn fenced_json() {
        let raw = "```json\n{\"a\": [1, 2]}\n```";
        let rec = parse_partial_record(raw).unwrap();
        assert_eq!(rec["a"], json!([1, 2]));

        let raw = "```\n{\"a\": null}\n```\n";
        assert!(parse_partial_record(raw).unwrap()["a"].is_null());
    }

    #[test]
    fn prose_around_object() {
        let raw = "Here is the extraction:\n{\"a\": {\"b\": \"c\"}}\nLet me know!";
        let rec = parse_partial_record(raw).unwrap();
        assert_eq!(rec["a"], json!({"b": "c"}));
    }

    #[test]
    fn bom_is_ignored() {
        let rec = parse_partial_record("\u{FEFF}{\"a\": 1}").unwrap();
        assert_eq!(rec["a"], json!(1));
    }

    #[test]
    fn preserves_field_order() {
        let rec = parse_partial_record(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let keys: Vec<&str> = rec.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn rejects_non_objects() {
        assert!(parse_partial_record("").is_err());
        assert!(parse_partial_record("   ").is_err());
        assert!(parse_partial_record("[1, 2]").unwrap_err().contains("array"));
        assert!(parse_partial_record("\"just text\"").is_err());
        assert!(parse_partial_record("{not json}").unwrap_err().contains("invalid JSON"));
    }
}
