//! Capability traits consumed by the engines.
//!
//! The binary spreadsheet codec, the relational writer, and the object-storage
//! writer all sit behind these seams so the engines stay codec-agnostic and
//! tests can substitute in-memory fakes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::Frame;
use crate::plan::{DbWriteMode, OutputFormat, SheetSpec};

/// Incremental destination accepting repeated row batches and finalising once.
///
/// Dropping a sink without finalising discards its partial output; the
/// destination path is only touched by `finalize`.
pub trait RowSink {
    fn append(&mut self, batch: &Frame) -> Result<()>;
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Multi-sheet variant of [`RowSink`] keyed by sheet name.
pub trait SheetSink {
    fn append(&mut self, sheet: &str, batch: &Frame) -> Result<()>;
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Sink that counts nothing and writes nothing, used by dry runs.
pub struct NullSink;

impl RowSink for NullSink {
    fn append(&mut self, _batch: &Frame) -> Result<()> {
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl SheetSink for NullSink {
    fn append(&mut self, _sheet: &str, _batch: &Frame) -> Result<()> {
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Read side of the workbook codec.
pub trait WorkbookReader {
    /// Sheet names in workbook order.
    fn sheet_names(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>>;

    /// Reads one sheet into a frame, first row as header.
    fn read_sheet(&self, path: &Path, sheet: &SheetSpec, password: Option<&str>) -> Result<Frame>;

    /// Expands a directory into workbook paths honouring glob and recursion.
    fn iter_files(&self, root: &Path, glob: Option<&str>, recursive: bool) -> Result<Vec<PathBuf>>;
}

/// Write side of the workbook codec.
pub trait WorkbookWriter {
    fn write_single_sheet(&self, frame: &Frame, out: &Path, sheet_name: &str) -> Result<()>;

    fn write_multi_sheets(&self, sheets: &[(String, Frame)], out: &Path) -> Result<()>;

    fn stream_single_sheet(&self, out: &Path, sheet_name: &str) -> Result<Box<dyn RowSink>>;

    fn stream_multi_sheets(&self, out: &Path) -> Result<Box<dyn SheetSink>>;
}

/// Relational-table destination writer.
pub trait TableWriter {
    fn write_frame(
        &self,
        frame: &Frame,
        table: &str,
        mode: DbWriteMode,
        options: &BTreeMap<String, String>,
        uri: &str,
    ) -> Result<()>;
}

/// Object-storage destination writer.
pub trait CloudObjectWriter {
    fn stream_object(&self, key: &str, format: OutputFormat) -> Result<Box<dyn RowSink>>;
}
