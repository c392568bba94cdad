//! Filesystem-rooted object-storage writer.

use std::path::PathBuf;

use crate::error::Result;
use crate::io::csv_sink::CsvRowSink;
use crate::io::excel::ExcelWriter;
use crate::io::parquet_sink::ParquetRowSink;
use crate::io::ports::{CloudObjectWriter, RowSink, WorkbookWriter};
use crate::plan::OutputFormat;

/// [`CloudObjectWriter`] that mimics object storage by writing keys as files
/// under a root directory, so the engines stay unaware of the real backend.
pub struct LocalCloudObjectWriter {
    root: PathBuf,
    temp_dir: Option<PathBuf>,
    sheet_name: String,
}

impl LocalCloudObjectWriter {
    pub fn new(root: PathBuf, temp_dir: Option<PathBuf>, sheet_name: impl Into<String>) -> Self {
        Self {
            root,
            temp_dir,
            sheet_name: sheet_name.into(),
        }
    }
}

impl CloudObjectWriter for LocalCloudObjectWriter {
    fn stream_object(&self, key: &str, format: OutputFormat) -> Result<Box<dyn RowSink>> {
        let path = self.root.join(key);
        match format {
            // Object stores get plain UTF-8, no byte-order mark.
            OutputFormat::Csv => Ok(Box::new(CsvRowSink::create(
                &path,
                self.temp_dir.as_deref(),
                false,
            )?)),
            OutputFormat::Parquet => Ok(Box::new(ParquetRowSink::create(
                &path,
                self.temp_dir.as_deref(),
            )?)),
            OutputFormat::Xlsx => {
                let writer = ExcelWriter::new(self.temp_dir.clone());
                writer.stream_single_sheet(&path, &self.sheet_name)
            }
        }
    }
}
