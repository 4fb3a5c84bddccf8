//! Row sink: append-only CSV, header on first write.
//!
//! The column list is fixed the moment the header exists: read back from an
//! existing file, or built on the first append from the schema's property
//! names followed by any other keys of that first row. Later rows are written
//! against it (missing keys become empty cells, extra keys are dropped).
//!
//! Each row is rendered into memory and appended with one `write_all`
//! followed by `sync_data`, so a crash leaves at most a torn final record and
//! never interleaves two rows. Opening the sink cuts such a torn record off
//! before anything else reads or appends.

use crate::error::Pdf2RecError;
use crate::record::PartialRecord;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RowSink {
    path: PathBuf,
    /// Externally supplied leading columns (schema properties).
    fixed_columns: Vec<String>,
    /// Established header; `None` until the file has one.
    header: Option<Vec<String>>,
}

impl RowSink {
    /// Open the sink, reading the header of an existing non-empty file.
    pub fn open(path: impl Into<PathBuf>, fixed_columns: Vec<String>) -> Result<Self, Pdf2RecError> {
        let path = path.into();
        truncate_torn_tail(&path)?;
        let header = read_header(&path)?;
        if let Some(ref h) = header {
            debug!(path = %path.display(), columns = h.len(), "row sink has existing header");
        }
        Ok(Self {
            path,
            fixed_columns,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Append one row (emitting the header first if the file has none).
    pub fn append(&mut self, name: &str, row: &PartialRecord) -> Result<(), Pdf2RecError> {
        let persist_err = |detail: String| Pdf2RecError::PersistFailed {
            name: name.to_string(),
            path: self.path.clone(),
            detail,
        };

        let (header, fresh) = match &self.header {
            Some(h) => (h.clone(), false),
            None => (initial_header(&self.fixed_columns, row), true),
        };

        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        if fresh {
            writer.write_record(&header).map_err(|e| persist_err(e.to_string()))?;
        }
        let cells: Vec<String> = header
            .iter()
            .map(|col| row.get(col).map(render_cell).unwrap_or_default())
            .collect();
        writer.write_record(&cells).map_err(|e| persist_err(e.to_string()))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| persist_err(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| persist_err(e.to_string()))?;
        file.write_all(&bytes).map_err(|e| persist_err(e.to_string()))?;
        file.sync_data().map_err(|e| persist_err(e.to_string()))?;

        if fresh {
            self.header = Some(header);
        }
        Ok(())
    }
}

/// Drop a final record that lacks its terminator.
///
/// Every complete record ends in `\n`, so a non-empty file that does not is
/// cut back to the start of its last record (which may be the header).
fn truncate_torn_tail(path: &Path) -> Result<(), Pdf2RecError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(Pdf2RecError::SinkCorrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };
    if bytes.last().is_none_or(|b| *b == b'\n') {
        return Ok(());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());
    let len = bytes.len() as u64;
    let mut record = csv::ByteRecord::new();
    // End of the last record that is followed by more bytes.
    let mut cut = 0u64;
    while let Ok(true) = reader.read_byte_record(&mut record) {
        let end = reader.position().byte();
        if end >= len {
            break;
        }
        cut = end;
    }

    warn!(
        path = %path.display(),
        dropped_bytes = len - cut,
        "row sink ends in a torn record; truncating"
    );
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(cut).and_then(|_| f.sync_data()));
    file.map_err(|e| Pdf2RecError::SinkCorrupt {
        path: path.to_path_buf(),
        detail: format!("could not truncate torn record: {e}"),
    })
}

fn read_header(path: &Path) -> Result<Option<Vec<String>>, Pdf2RecError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => return Ok(None),
    }
    let corrupt = |detail: String| Pdf2RecError::SinkCorrupt {
        path: path.to_path_buf(),
        detail,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| corrupt(e.to_string()))?;
    let header: Vec<String> = reader
        .headers()
        .map_err(|e| corrupt(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if header.iter().all(|h| h.is_empty()) {
        return Err(corrupt("empty header row".into()));
    }
    Ok(Some(header))
}

/// Fixed columns first, then the row's remaining keys in row order.
fn initial_header(fixed: &[String], row: &PartialRecord) -> Vec<String> {
    let mut header: Vec<String> = Vec::with_capacity(fixed.len() + row.len());
    for col in fixed.iter().chain(row.keys()) {
        if !header.contains(col) {
            header.push(col.clone());
        }
    }
    header
}

/// Scalars as text, lists and maps as compact JSON, null as an empty cell.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> PartialRecord {
        v.as_object().cloned().unwrap()
    }

    fn read_all(path: &Path) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn header_is_fixed_columns_then_row_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/rows.csv");
        let mut sink = RowSink::open(&path, vec!["Title".into(), "Year".into()]).unwrap();
        sink.append("a.pdf", &row(json!({"Year": 2020, "Extra": "x", "source_identity": "abc"})))
            .unwrap();

        let rows = read_all(&path);
        assert_eq!(rows[0], vec!["Title", "Year", "Extra", "source_identity"]);
        assert_eq!(rows[1], vec!["", "2020", "x", "abc"]);
    }

    #[test]
    fn later_rows_follow_established_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let mut sink = RowSink::open(&path, vec!["a".into()]).unwrap();
        sink.append("1.pdf", &row(json!({"a": "one", "b": [1, 2]}))).unwrap();
        sink.append("2.pdf", &row(json!({"c": "dropped", "b": {"k": true}}))).unwrap();

        let rows = read_all(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["a", "b"]);
        assert_eq!(rows[1], vec!["one", "[1,2]"]);
        assert_eq!(rows[2], vec!["", r#"{"k":true}"#]);
    }

    #[test]
    fn reopen_keeps_header_and_does_not_repeat_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        RowSink::open(&path, vec!["a".into(), "b".into()])
            .unwrap()
            .append("1.pdf", &row(json!({"a": 1})))
            .unwrap();

        let mut sink = RowSink::open(&path, vec!["zzz".into()]).unwrap();
        assert_eq!(sink.header().unwrap(), &["a".to_string(), "b".to_string()]);
        sink.append("2.pdf", &row(json!({"b": "x, with comma"}))).unwrap();

        let rows = read_all(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["", "x, with comma"]);
    }

    #[test]
    fn multiline_strings_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let mut sink = RowSink::open(&path, vec![]).unwrap();
        sink.append("1.pdf", &row(json!({"note": "line one\nline \"two\""}))).unwrap();
        let rows = read_all(&path);
        assert_eq!(rows[1][0], "line one\nline \"two\"");
    }

    #[test]
    fn torn_final_record_is_dropped_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "Title,source_identity\nA,aaa\n\"Half a ti").unwrap();

        let mut sink = RowSink::open(&path, vec![]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Title,source_identity\nA,aaa\n"
        );
        sink.append("b.pdf", &row(json!({"Title": "B", "source_identity": "bbb"})))
            .unwrap();

        let rows = read_all(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["B", "bbb"]);

        let index = crate::persist::ResumableIndex::load(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.should_skip(&crate::fingerprint::Fingerprint::from_persisted("bbb")));
    }

    #[test]
    fn torn_quoted_record_spanning_lines_is_dropped_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "a,b\n1,2\n\"multi\nline, still open").unwrap();
        RowSink::open(&path, vec![]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn torn_header_leaves_an_empty_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "Title,sour").unwrap();
        let mut sink = RowSink::open(&path, vec!["Title".into()]).unwrap();
        assert!(sink.header().is_none());
        sink.append("a.pdf", &row(json!({"Title": "T"}))).unwrap();
        assert_eq!(read_all(&path), vec![vec!["Title".to_string()], vec!["T".to_string()]]);
    }

    #[test]
    fn cells() {
        assert_eq!(render_cell(&json!(null)), "");
        assert_eq!(render_cell(&json!("s")), "s");
        assert_eq!(render_cell(&json!(1.5)), "1.5");
        assert_eq!(render_cell(&json!(false)), "false");
        assert_eq!(render_cell(&json!(["a", "b"])), r#"["a","b"]"#);
    }
}
