//! Columnar (parquet) row sink with lazy schema capture.

use std::path::Path;
use std::sync::Arc;

use arrow_array::builder::{BooleanBuilder, Float64Builder, StringBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;

use crate::error::Result;
use crate::io::atomic::AtomicFile;
use crate::io::ports::RowSink;
use crate::model::{CellValue, Frame};

/// Streams row batches into a parquet file.
///
/// The underlying writer is created lazily on the first non-empty batch so
/// the schema can be captured from real data. A stream that stays empty
/// commits a zero-row file built from the last empty batch's columns.
pub struct ParquetRowSink {
    out: Option<AtomicFile>,
    writer: Option<ArrowWriter<AtomicFile>>,
    schema: Option<Arc<Schema>>,
    empty_columns: Option<Vec<String>>,
}

impl ParquetRowSink {
    pub fn create(path: &Path, temp_dir: Option<&Path>) -> Result<Self> {
        Ok(Self {
            out: Some(AtomicFile::create(path, temp_dir)?),
            writer: None,
            schema: None,
            empty_columns: None,
        })
    }
}

impl RowSink for ParquetRowSink {
    fn append(&mut self, batch: &Frame) -> Result<()> {
        if batch.is_empty() {
            if self.writer.is_none() && self.empty_columns.is_none() {
                self.empty_columns = Some(batch.columns.clone());
            }
            return Ok(());
        }

        if self.writer.is_none() {
            if let Some(file) = self.out.take() {
                let schema = Arc::new(infer_schema(batch));
                self.writer = Some(ArrowWriter::try_new(file, schema.clone(), None)?);
                self.schema = Some(schema);
            }
        }

        if let (Some(writer), Some(schema)) = (self.writer.as_mut(), self.schema.as_ref()) {
            let record = to_record_batch(schema, batch)?;
            writer.write(&record)?;
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            return writer.into_inner()?.commit();
        }
        if let Some(file) = self.out.take() {
            // Empty stream: still emit a valid zero-row file.
            let columns = self.empty_columns.take().unwrap_or_default();
            let fields: Vec<Field> = columns
                .iter()
                .map(|name| Field::new(name, DataType::Utf8, true))
                .collect();
            let schema = Arc::new(Schema::new(fields));
            let writer = ArrowWriter::try_new(file, schema, None)?;
            return writer.into_inner()?.commit();
        }
        Ok(())
    }
}

/// Picks a column type from the first non-empty batch: all-numeric columns
/// become Float64, all-boolean become Boolean, anything else Utf8.
fn infer_schema(batch: &Frame) -> Schema {
    let fields: Vec<Field> = batch
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut numeric = true;
            let mut boolean = true;
            let mut populated = false;
            for row in &batch.rows {
                match row.get(idx) {
                    Some(CellValue::Number(_)) => {
                        populated = true;
                        boolean = false;
                    }
                    Some(CellValue::Bool(_)) => {
                        populated = true;
                        numeric = false;
                    }
                    Some(CellValue::Text(_)) => {
                        populated = true;
                        numeric = false;
                        boolean = false;
                    }
                    Some(CellValue::Empty) | None => {}
                }
            }
            let data_type = if populated && numeric {
                DataType::Float64
            } else if populated && boolean {
                DataType::Boolean
            } else {
                DataType::Utf8
            };
            Field::new(name, data_type, true)
        })
        .collect();
    Schema::new(fields)
}

fn to_record_batch(schema: &Arc<Schema>, batch: &Frame) -> Result<RecordBatch> {
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (idx, field) in schema.fields().iter().enumerate() {
        let array: ArrayRef = match field.data_type() {
            DataType::Float64 => {
                let mut builder = Float64Builder::with_capacity(batch.len());
                for row in &batch.rows {
                    match row.get(idx) {
                        Some(CellValue::Number(n)) if !n.is_nan() => builder.append_value(*n),
                        Some(CellValue::Text(s)) => builder.append_option(s.trim().parse().ok()),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Boolean => {
                let mut builder = BooleanBuilder::with_capacity(batch.len());
                for row in &batch.rows {
                    match row.get(idx) {
                        Some(CellValue::Bool(b)) => builder.append_value(*b),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            _ => {
                let mut builder = StringBuilder::new();
                for row in &batch.rows {
                    match row.get(idx) {
                        Some(CellValue::Empty) | None => builder.append_null(),
                        Some(cell) => builder.append_value(cell.to_string()),
                    }
                }
                Arc::new(builder.finish())
            }
        };
        arrays.push(array);
    }
    Ok(RecordBatch::try_new(schema.clone(), arrays)?)
}
