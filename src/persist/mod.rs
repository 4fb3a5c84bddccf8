//! Durable, resumable output.
//!
//! - [`rows`]: CSV row sink; also the source of the resume index
//! - [`columnar`]: schema-stable Parquet sink
//! - [`index`]: identities already persisted by earlier runs
//!
//! [`IncrementalPersister`] owns both sinks and writes one merged record to
//! each. The columnar sink is written first: the row sink is what marks a
//! document as done, so a crash between the two leaves the document
//! reprocessable rather than silently missing from the Parquet file.

pub mod columnar;
pub mod index;
pub mod rows;

pub use columnar::ColumnarSink;
pub use index::ResumableIndex;
pub use rows::RowSink;

use crate::error::Pdf2RecError;
use crate::record::MergedRecord;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug)]
struct Sinks {
    rows: RowSink,
    columns: ColumnarSink,
}

/// Append-only dual sink. Appends are serialized.
#[derive(Debug, Clone)]
pub struct IncrementalPersister {
    sinks: Arc<Mutex<Sinks>>,
    row_path: PathBuf,
    columnar_path: PathBuf,
}

impl IncrementalPersister {
    /// Open both sinks. `columns` is the fixed leading column list of the
    /// row sink (the schema's property names).
    pub async fn open(
        row_path: impl Into<PathBuf>,
        columnar_path: impl Into<PathBuf>,
        columns: Vec<String>,
    ) -> Result<Self, Pdf2RecError> {
        let row_path = row_path.into();
        let columnar_path = columnar_path.into();
        let (rp, cp) = (row_path.clone(), columnar_path.clone());
        let sinks = tokio::task::spawn_blocking(move || -> Result<Sinks, Pdf2RecError> {
            Ok(Sinks {
                rows: RowSink::open(rp, columns)?,
                columns: ColumnarSink::open(cp)?,
            })
        })
        .await
        .map_err(|e| Pdf2RecError::Internal(format!("Sink open task panicked: {e}")))??;

        Ok(Self {
            sinks: Arc::new(Mutex::new(sinks)),
            row_path,
            columnar_path,
        })
    }

    pub fn row_path(&self) -> &Path {
        &self.row_path
    }

    pub fn columnar_path(&self) -> &Path {
        &self.columnar_path
    }

    /// Write one merged record to both sinks.
    pub async fn append(&self, record: &MergedRecord) -> Result<(), Pdf2RecError> {
        let row = record.to_row();
        let name = record.source_name.clone();
        let sinks = Arc::clone(&self.sinks);
        tokio::task::spawn_blocking(move || {
            let mut sinks = sinks
                .lock()
                .map_err(|_| Pdf2RecError::Internal("sink lock poisoned".into()))?;
            sinks.columns.append(&name, &row)?;
            sinks.rows.append(&name, &row)?;
            debug!(doc = %name, "record persisted");
            Ok(())
        })
        .await
        .map_err(|e| Pdf2RecError::Internal(format!("Sink append task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn merged(name: &str, fields: serde_json::Value) -> MergedRecord {
        MergedRecord {
            source_identity: Fingerprint::from_name(name),
            source_name: name.into(),
            processed_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            windows_total: 3,
            windows_failed: 1,
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    #[tokio::test]
    async fn appends_reach_both_sinks_and_feed_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("out/a.csv");
        let cols = dir.path().join("out/a.parquet");
        let persister = IncrementalPersister::open(&rows, &cols, vec!["Title".into()])
            .await
            .unwrap();
        persister
            .append(&merged("one.pdf", json!({"Title": "One"})))
            .await
            .unwrap();
        persister
            .append(&merged("two.pdf", json!({"Title": "Two", "Year": 2020})))
            .await
            .unwrap();

        let index = ResumableIndex::load(&rows).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.should_skip(&Fingerprint::from_name("one.pdf")));

        let reopened = ColumnarSink::open(&cols).unwrap();
        assert_eq!(reopened.row_count(), 2);

        let text = std::fs::read_to_string(&rows).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "Title,source_identity,source_name,processed_at,windows_total,windows_failed"
        );
        assert!(text.contains("2026-01-02T03:04:05Z"));
    }

    #[tokio::test]
    async fn corrupt_columnar_sink_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let cols = dir.path().join("a.parquet");
        std::fs::write(&cols, b"garbage").unwrap();
        let err = IncrementalPersister::open(dir.path().join("a.csv"), &cols, vec![])
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
