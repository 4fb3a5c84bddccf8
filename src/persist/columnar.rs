//! Columnar sink: schema-stable Parquet, appended one row at a time.
//!
//! The persisted schema is whatever the existing file declares, or, for a
//! fresh sink, what the first row's values infer to. Every later row is
//! conformed to it before writing:
//!
//! * columns the row lacks are null,
//! * keys the schema lacks are dropped,
//! * columns typed `Null` (or lists of `Null`) stay null forever, so a later
//!   row cannot retroactively give a never-populated column a type,
//! * values of another type are cast (`safe` mode); a failed cast is null.
//!
//! Parquet files cannot be appended to in place. Each append writes the full
//! dataset to a temp file next to the sink and renames it over the sink, so
//! readers only ever see the previous or the new complete file.

use crate::error::Pdf2RecError;
use crate::record::PartialRecord;
use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray,
    NullArray, StringArray,
};
use arrow::buffer::OffsetBuffer;
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const LIST_ITEM: &str = "item";

#[derive(Debug)]
pub struct ColumnarSink {
    path: PathBuf,
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
}

impl ColumnarSink {
    /// Open the sink, loading an existing non-empty file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Pdf2RecError> {
        let path = path.into();
        let (schema, batches) = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => {
                let (schema, batches) = read_parquet(&path).map_err(|detail| {
                    Pdf2RecError::SinkCorrupt {
                        path: path.clone(),
                        detail,
                    }
                })?;
                debug!(
                    path = %path.display(),
                    columns = schema.fields().len(),
                    rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
                    "columnar sink loaded"
                );
                (Some(schema), batches)
            }
            _ => (None, Vec::new()),
        };
        Ok(Self {
            path,
            schema,
            batches,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted schema, once established.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Conform `row` to the persisted schema and durably append it.
    pub fn append(&mut self, name: &str, row: &PartialRecord) -> Result<(), Pdf2RecError> {
        let persist_err = |detail: String| Pdf2RecError::PersistFailed {
            name: name.to_string(),
            path: self.path.clone(),
            detail,
        };

        let schema = match &self.schema {
            Some(s) => Arc::clone(s),
            None => infer_schema(row),
        };
        let batch = conform_row(&schema, row).map_err(|e| persist_err(e.to_string()))?;

        let mut all = self.batches.clone();
        all.push(batch.clone());
        write_atomically(&self.path, &schema, &all).map_err(persist_err)?;

        self.schema = Some(schema);
        self.batches.push(batch);
        Ok(())
    }
}

fn read_parquet(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| e.to_string())?;
    let schema = Arc::clone(builder.schema());
    let reader = builder.build().map_err(|e| e.to_string())?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    Ok((schema, batches))
}

fn write_atomically(path: &Path, schema: &SchemaRef, batches: &[RecordBatch]) -> Result<(), String> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| e.to_string())?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();
    {
        let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), Arc::clone(schema), Some(props))
            .map_err(|e| e.to_string())?;
        for batch in batches {
            writer.write(batch).map_err(|e| e.to_string())?;
        }
        writer.close().map_err(|e| e.to_string())?;
    }
    tmp.as_file().sync_all().map_err(|e| e.to_string())?;
    tmp.persist(path).map_err(|e| e.error.to_string())?;
    Ok(())
}

// ── Type inference ───────────────────────────────────────────────────────────

fn infer_schema(row: &PartialRecord) -> SchemaRef {
    let fields: Vec<Field> = row
        .iter()
        .map(|(name, value)| Field::new(name, infer_type(value), true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Arrow type of one JSON value; maps are stored as JSON text.
pub fn infer_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Null,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(n) if n.is_i64() => DataType::Int64,
        Value::Number(_) => DataType::Float64,
        Value::String(_) | Value::Object(_) => DataType::Utf8,
        Value::Array(items) => list_of(infer_item_type(items)),
    }
}

fn list_of(item: DataType) -> DataType {
    DataType::List(Arc::new(Field::new(LIST_ITEM, item, true)))
}

fn infer_item_type(items: &[Value]) -> DataType {
    items.iter().fold(DataType::Null, |acc, item| {
        let t = match item {
            Value::Array(_) | Value::Object(_) => DataType::Utf8,
            scalar => infer_type(scalar),
        };
        unify(acc, t)
    })
}

fn unify(a: DataType, b: DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a,
        (DataType::Null, t) | (t, DataType::Null) => t,
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

/// `Null`, or a list whose items are (recursively) `Null`.
pub fn is_all_null_type(dt: &DataType) -> bool {
    match dt {
        DataType::Null => true,
        DataType::List(f) | DataType::LargeList(f) => is_all_null_type(f.data_type()),
        _ => false,
    }
}

// ── Row → single-row batch ───────────────────────────────────────────────────

fn conform_row(schema: &SchemaRef, row: &PartialRecord) -> Result<RecordBatch, arrow::error::ArrowError> {
    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| conform_value(row.get(field.name()), field.data_type()))
        .collect();
    RecordBatch::try_new(Arc::clone(schema), columns)
}

fn conform_value(value: Option<&Value>, target: &DataType) -> ArrayRef {
    if is_all_null_type(target) {
        return new_null_array(target, 1);
    }
    let value = match value {
        None | Some(Value::Null) => return new_null_array(target, 1),
        Some(v) => v,
    };
    if matches!(target, DataType::Utf8 | DataType::LargeUtf8)
        && matches!(value, Value::Array(_) | Value::Object(_))
    {
        let text: ArrayRef = Arc::new(StringArray::from(vec![value.to_string()]));
        return cast_or_null(&text, target);
    }
    let natural = value_array(value);
    if natural.data_type() == target {
        return natural;
    }
    cast_or_null(&natural, target)
}

fn cast_or_null(array: &ArrayRef, target: &DataType) -> ArrayRef {
    if array.data_type() == target {
        return Arc::clone(array);
    }
    let options = CastOptions {
        safe: true,
        ..Default::default()
    };
    cast_with_options(array, target, &options).unwrap_or_else(|_| new_null_array(target, 1))
}

fn value_array(value: &Value) -> ArrayRef {
    match value {
        Value::Null => Arc::new(NullArray::new(1)),
        Value::Bool(b) => Arc::new(BooleanArray::from(vec![*b])),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Arc::new(Int64Array::from(vec![i])),
            None => Arc::new(Float64Array::from(vec![n.as_f64()])),
        },
        Value::String(s) => Arc::new(StringArray::from(vec![s.as_str()])),
        Value::Object(_) => Arc::new(StringArray::from(vec![value.to_string()])),
        Value::Array(items) => {
            let item_type = infer_item_type(items);
            let values = items_array(items, &item_type);
            Arc::new(ListArray::new(
                Arc::new(Field::new(LIST_ITEM, item_type, true)),
                OffsetBuffer::from_lengths([items.len()]),
                values,
                None,
            ))
        }
    }
}

fn items_array(items: &[Value], item_type: &DataType) -> ArrayRef {
    match item_type {
        DataType::Null => Arc::new(NullArray::new(items.len())),
        DataType::Boolean => Arc::new(BooleanArray::from(
            items.iter().map(Value::as_bool).collect::<Vec<_>>(),
        )),
        DataType::Int64 => Arc::new(Int64Array::from(
            items.iter().map(Value::as_i64).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            items.iter().map(Value::as_f64).collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            items
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::compute::concat_batches;
    use arrow::datatypes::Int64Type;
    use serde_json::json;

    fn row(v: Value) -> PartialRecord {
        v.as_object().cloned().unwrap()
    }

    fn read_back(path: &Path) -> RecordBatch {
        let (schema, batches) = read_parquet(path).unwrap();
        concat_batches(&schema, &batches).unwrap()
    }

    #[test]
    fn first_row_establishes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let mut sink = ColumnarSink::open(&path).unwrap();
        assert!(sink.schema().is_none());

        sink.append(
            "a.pdf",
            &row(json!({
                "Title": "A",
                "Year": 2020,
                "Score": 0.5,
                "Blinded": true,
                "Outcomes": ["x", "y"],
                "Design": {"arms": 2},
                "Notes": null,
                "Empty": []
            })),
        )
        .unwrap();

        let schema = sink.schema().unwrap();
        let types: Vec<DataType> = schema.fields().iter().map(|f| f.data_type().clone()).collect();
        assert_eq!(
            types,
            vec![
                DataType::Utf8,
                DataType::Int64,
                DataType::Float64,
                DataType::Boolean,
                list_of(DataType::Utf8),
                DataType::Utf8,
                DataType::Null,
                list_of(DataType::Null),
            ]
        );

        let batch = read_back(&path);
        assert_eq!(batch.num_rows(), 1);
        let design = batch.column_by_name("Design").unwrap().as_string::<i32>();
        assert_eq!(design.value(0), r#"{"arms":2}"#);
    }

    #[test]
    fn subset_rows_get_nulls_and_extra_keys_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let mut sink = ColumnarSink::open(&path).unwrap();
        sink.append("a.pdf", &row(json!({"Title": "A", "Year": 2020}))).unwrap();
        sink.append("b.pdf", &row(json!({"Year": 2021, "Unknown": "zzz"}))).unwrap();

        let batch = read_back(&path);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 2);
        assert!(batch.column_by_name("Unknown").is_none());
        let title = batch.column_by_name("Title").unwrap();
        assert!(title.is_null(1));
        let year = batch.column_by_name("Year").unwrap().as_primitive::<Int64Type>();
        assert_eq!(year.value(1), 2021);
    }

    #[test]
    fn null_typed_columns_stay_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let mut sink = ColumnarSink::open(&path).unwrap();
        sink.append("a.pdf", &row(json!({"Notes": null, "Tags": []}))).unwrap();
        sink.append("b.pdf", &row(json!({"Notes": "now filled", "Tags": ["t"]})))
            .unwrap();

        let batch = read_back(&path);
        assert_eq!(batch.column_by_name("Notes").unwrap().logical_null_count(), 2);
        assert_eq!(batch.column_by_name("Tags").unwrap().logical_null_count(), 2);
        assert_eq!(sink.schema().unwrap().field(0).data_type(), &DataType::Null);
    }

    #[test]
    fn mismatched_values_are_cast_or_nulled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let mut sink = ColumnarSink::open(&path).unwrap();
        sink.append("a.pdf", &row(json!({"Year": 2020, "Title": "A"}))).unwrap();
        sink.append("b.pdf", &row(json!({"Year": "2021", "Title": 7}))).unwrap();
        sink.append("c.pdf", &row(json!({"Year": "n/a", "Title": ["x"]}))).unwrap();

        let batch = read_back(&path);
        let year = batch.column_by_name("Year").unwrap().as_primitive::<Int64Type>();
        assert_eq!(year.value(1), 2021);
        assert!(year.is_null(2));
        let title = batch.column_by_name("Title").unwrap().as_string::<i32>();
        assert_eq!(title.value(1), "7");
        assert_eq!(title.value(2), r#"["x"]"#);
    }

    #[test]
    fn reopen_uses_existing_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        ColumnarSink::open(&path)
            .unwrap()
            .append("a.pdf", &row(json!({"Year": 2020, "Title": "A"})))
            .unwrap();

        let mut sink = ColumnarSink::open(&path).unwrap();
        assert_eq!(sink.row_count(), 1);
        sink.append("b.pdf", &row(json!({"Title": "B", "Year": 1999.0, "More": 1})))
            .unwrap();

        let batch = read_back(&path);
        assert_eq!(batch.num_rows(), 2);
        let names: Vec<&str> = batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["Year", "Title"]);
        let year = batch.column_by_name("Year").unwrap().as_primitive::<Int64Type>();
        assert_eq!(year.value(1), 1999);
    }

    #[test]
    fn unreadable_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        std::fs::write(&path, b"not parquet at all").unwrap();
        let err = ColumnarSink::open(&path).unwrap_err();
        assert!(matches!(err, Pdf2RecError::SinkCorrupt { .. }));
    }

    #[test]
    fn list_item_types_unify() {
        assert_eq!(infer_type(&json!([1, 2.5])), list_of(DataType::Float64));
        assert_eq!(infer_type(&json!([1, "a"])), list_of(DataType::Utf8));
        assert_eq!(infer_type(&json!([null, true])), list_of(DataType::Boolean));
        assert_eq!(infer_type(&json!([{"k": 1}])), list_of(DataType::Utf8));
        assert!(is_all_null_type(&infer_type(&json!([null]))));
        assert!(!is_all_null_type(&DataType::Utf8));
    }
}
