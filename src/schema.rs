//! Response schema: what the annotation service is asked to return.
//!
//! The schema is an ordinary JSON Schema document owned by the caller; this
//! crate never interprets individual fields. It only needs two things from it:
//! the document itself (forwarded to the service) and the ordered list of
//! top-level property names, which becomes the fixed column list of the row
//! sink.

use crate::error::Pdf2RecError;
use serde_json::Value;
use std::path::Path;

/// A JSON Schema describing one partial record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name sent to services that require one (file stem by default).
    pub name: String,
    /// The JSON Schema document.
    pub schema: Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Load a schema from a JSON file; its name is the file stem.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Pdf2RecError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Pdf2RecError::SchemaLoad {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        let schema: Value = serde_json::from_str(&text).map_err(|e| Pdf2RecError::SchemaLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if !schema.is_object() {
            return Err(Pdf2RecError::SchemaLoad {
                path: path.to_path_buf(),
                detail: "schema must be a JSON object".into(),
            });
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "record".to_string());
        Ok(Self::new(name, schema))
    }

    /// Top-level property names in document order.
    ///
    /// Empty when the schema declares no `properties`.
    pub fn columns(&self) -> Vec<String> {
        self.schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Compact JSON rendering for prompts.
    pub fn to_compact_string(&self) -> String {
        self.schema.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn columns_follow_document_order() {
        let schema = ResponseSchema::new(
            "study",
            json!({
                "type": "object",
                "properties": {
                    "Journal": {"type": ["string", "null"]},
                    "Title": {"type": ["string", "null"]},
                    "Clinical Outcomes": {"type": "array", "items": {"type": "string"}}
                }
            }),
        );
        assert_eq!(
            schema.columns(),
            vec!["Journal", "Title", "Clinical Outcomes"]
        );
    }

    #[test]
    fn no_properties_no_columns() {
        let schema = ResponseSchema::new("free", json!({"type": "object"}));
        assert!(schema.columns().is_empty());
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta_design.json");
        std::fs::write(&path, r#"{"type":"object","properties":{"b":{},"a":{}}}"#).unwrap();
        let schema = ResponseSchema::from_file(&path).await.unwrap();
        assert_eq!(schema.name, "meta_design");
        assert_eq!(schema.columns(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn rejects_non_object_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1,2]").unwrap();
        assert!(matches!(
            ResponseSchema::from_file(&path).await,
            Err(Pdf2RecError::SchemaLoad { .. })
        ));
        assert!(ResponseSchema::from_file(dir.path().join("nope.json"))
            .await
            .is_err());
    }
}
