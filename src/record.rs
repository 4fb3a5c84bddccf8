//! Record types: what a window yields and what a document persists.
//!
//! The field catalog is open-ended (whatever the response schema asks for),
//! so records are plain ordered JSON maps. Merging and persistence dispatch on
//! the *shape* of each value ([`ValueShape`]), never on field names.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Structured output attributed to one page window.
pub type PartialRecord = Map<String, Value>;

/// Column holding the document fingerprint; the resume join key.
pub const SOURCE_IDENTITY: &str = "source_identity";
/// Column holding the document's file name.
pub const SOURCE_NAME: &str = "source_name";
/// Column holding the RFC 3339 merge timestamp.
pub const PROCESSED_AT: &str = "processed_at";
/// Column holding the number of windows planned for the document.
pub const WINDOWS_TOTAL: &str = "windows_total";
/// Column holding the number of windows that contributed nothing.
pub const WINDOWS_FAILED: &str = "windows_failed";

/// The closed set of value shapes the merge engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// null, blank string, `[]`, `{}`
    Empty,
    /// bool, number, non-blank string
    Scalar,
    /// non-empty array
    List,
    /// non-empty object
    Map,
}

impl ValueShape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueShape::Empty,
            Value::String(s) if s.trim().is_empty() => ValueShape::Empty,
            Value::Array(a) if a.is_empty() => ValueShape::Empty,
            Value::Object(o) if o.is_empty() => ValueShape::Empty,
            Value::Array(_) => ValueShape::List,
            Value::Object(_) => ValueShape::Map,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => ValueShape::Scalar,
        }
    }
}

/// Whether `value` counts as "nothing extracted".
pub fn is_empty(value: &Value) -> bool {
    ValueShape::of(value) == ValueShape::Empty
}

/// One consolidated record per document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub source_identity: Fingerprint,
    pub source_name: String,
    pub processed_at: DateTime<Utc>,
    /// Windows planned for the document.
    pub windows_total: usize,
    /// Windows that failed and contributed nothing.
    pub windows_failed: usize,
    pub fields: PartialRecord,
}

impl MergedRecord {
    /// Flatten into a sink row: extracted fields first, then metadata columns.
    ///
    /// Metadata wins over an extracted field of the same name.
    pub fn to_row(&self) -> PartialRecord {
        let mut row = self.fields.clone();
        row.insert(
            SOURCE_IDENTITY.to_string(),
            Value::String(self.source_identity.to_string()),
        );
        row.insert(
            SOURCE_NAME.to_string(),
            Value::String(self.source_name.clone()),
        );
        row.insert(
            PROCESSED_AT.to_string(),
            Value::String(
                self.processed_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        );
        row.insert(WINDOWS_TOTAL.to_string(), Value::from(self.windows_total));
        row.insert(WINDOWS_FAILED.to_string(), Value::from(self.windows_failed));
        row
    }
}

/// Metadata column names in the order [`MergedRecord::to_row`] appends them.
pub fn metadata_columns() -> [&'static str; 5] {
    [
        SOURCE_IDENTITY,
        SOURCE_NAME,
        PROCESSED_AT,
        WINDOWS_TOTAL,
        WINDOWS_FAILED,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shapes() {
        assert_eq!(ValueShape::of(&json!(null)), ValueShape::Empty);
        assert_eq!(ValueShape::of(&json!("   ")), ValueShape::Empty);
        assert_eq!(ValueShape::of(&json!([])), ValueShape::Empty);
        assert_eq!(ValueShape::of(&json!({})), ValueShape::Empty);
        assert_eq!(ValueShape::of(&json!(0)), ValueShape::Scalar);
        assert_eq!(ValueShape::of(&json!(false)), ValueShape::Scalar);
        assert_eq!(ValueShape::of(&json!("x")), ValueShape::Scalar);
        assert_eq!(ValueShape::of(&json!(["x"])), ValueShape::List);
        assert_eq!(ValueShape::of(&json!({"a": 1})), ValueShape::Map);
    }

    #[test]
    fn to_row_appends_metadata_after_fields() {
        let mut fields = PartialRecord::new();
        fields.insert("Title".into(), json!("On DOACs"));
        let record = MergedRecord {
            source_identity: Fingerprint::from_name("a.pdf"),
            source_name: "a.pdf".into(),
            processed_at: DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            windows_total: 3,
            windows_failed: 1,
            fields,
        };
        let row = record.to_row();
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "Title",
                SOURCE_IDENTITY,
                SOURCE_NAME,
                PROCESSED_AT,
                WINDOWS_TOTAL,
                WINDOWS_FAILED
            ]
        );
        assert_eq!(row[PROCESSED_AT], json!("2025-01-02T03:04:05Z"));
        assert_eq!(row[WINDOWS_FAILED], json!(1));
    }
}
