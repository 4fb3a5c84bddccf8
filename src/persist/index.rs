//! Resume index: identities already present in the row sink.
//!
//! Loaded once per run and never updated while the run is going; the sinks
//! themselves are the durable record of what has been processed.

use crate::error::Pdf2RecError;
use crate::fingerprint::Fingerprint;
use crate::record::SOURCE_IDENTITY;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ResumableIndex {
    seen: HashSet<Fingerprint>,
}

impl ResumableIndex {
    /// An index that skips nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the `source_identity` column of the row sink at `path`.
    ///
    /// A missing or empty file yields an empty index. A file without the
    /// identity column is not a sink this crate wrote and is reported as
    /// corrupt.
    pub fn load(path: &Path) -> Result<Self, Pdf2RecError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Ok(Self::empty()),
        }
        let corrupt = |detail: String| Pdf2RecError::SinkCorrupt {
            path: path.to_path_buf(),
            detail,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| corrupt(e.to_string()))?;
        let column = reader
            .headers()
            .map_err(|e| corrupt(e.to_string()))?
            .iter()
            .position(|h| h == SOURCE_IDENTITY)
            .ok_or_else(|| corrupt(format!("no '{SOURCE_IDENTITY}' column")))?;

        let mut seen = HashSet::new();
        for (line, record) in reader.byte_records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), line = line + 2, "unreadable row ignored: {e}");
                    continue;
                }
            };
            let Some(cell) = record.get(column) else {
                continue;
            };
            let value = String::from_utf8_lossy(cell);
            let value = value.trim();
            if !value.is_empty() {
                seen.insert(Fingerprint::from_persisted(value));
            }
        }
        debug!(path = %path.display(), identities = seen.len(), "resume index loaded");
        Ok(Self { seen })
    }

    pub fn should_skip(&self, identity: &Fingerprint) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = ResumableIndex::load(&dir.path().join("none.csv")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn reads_identity_column_ignoring_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let a = Fingerprint::from_name("a.pdf");
        let b = Fingerprint::from_name("b.pdf");
        std::fs::write(
            &path,
            format!("Title,source_identity\nX,{a}\nY,\nZ,{b}\n\"torn"),
        )
        .unwrap();

        let index = ResumableIndex::load(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.should_skip(&a));
        assert!(index.should_skip(&b));
        assert!(!index.should_skip(&Fingerprint::from_name("c.pdf")));
    }

    #[test]
    fn foreign_csv_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "id,name\n1,x\n").unwrap();
        let err = ResumableIndex::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }
}
