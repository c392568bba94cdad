//! Header-once CSV row sink backed by the atomic writer.

use std::io::Write;
use std::path::Path;

use crate::error::{Result, WorkbookError};
use crate::io::atomic::AtomicFile;
use crate::io::ports::RowSink;
use crate::model::Frame;

/// Streams row batches into a CSV file. The header comes from the first
/// appended batch, even an empty one; an entirely empty stream still commits
/// a valid (header-only or empty) file. `add_bom` prefixes the file with a
/// UTF-8 byte-order mark so older spreadsheet tools detect the encoding.
pub struct CsvRowSink {
    writer: csv::Writer<AtomicFile>,
    columns: Option<Vec<String>>,
    header_written: bool,
}

impl CsvRowSink {
    pub fn create(path: &Path, temp_dir: Option<&Path>, add_bom: bool) -> Result<Self> {
        let mut file = AtomicFile::create(path, temp_dir)?;
        if add_bom {
            file.write_all("\u{feff}".as_bytes())?;
        }
        Ok(Self {
            writer: csv::Writer::from_writer(file),
            columns: None,
            header_written: false,
        })
    }

    fn write_header(&mut self) -> Result<()> {
        if let Some(columns) = &self.columns {
            self.writer.write_record(columns)?;
            self.header_written = true;
        }
        Ok(())
    }
}

impl RowSink for CsvRowSink {
    fn append(&mut self, batch: &Frame) -> Result<()> {
        if self.columns.is_none() {
            self.columns = Some(batch.columns.clone());
        }
        if !self.header_written {
            self.write_header()?;
        }
        for row in &batch.rows {
            let record: Vec<String> = row.iter().map(ToString::to_string).collect();
            self.writer.write_record(&record)?;
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        if !self.header_written {
            self.write_header()?;
        }
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|err| WorkbookError::Io(std::io::Error::other(err.to_string())))?;
        file.commit()
    }
}
