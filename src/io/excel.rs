//! Workbook codec adapters backed by calamine and rust_xlsxwriter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{DataType, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::warn;

use crate::error::{Result, WorkbookError};
use crate::io::atomic::AtomicFile;
use crate::io::ports::{RowSink, SheetSink, WorkbookReader, WorkbookWriter};
use crate::io::fs;
use crate::model::{CellValue, Frame};
use crate::plan::SheetSpec;

/// Calamine-backed [`WorkbookReader`].
///
/// The bundled codec cannot decrypt protected workbooks; a failed open with a
/// resolved password surfaces as a decryption error so callers can tell the
/// cases apart.
pub struct ExcelReader {
    default_glob: String,
}

impl ExcelReader {
    pub fn new(default_glob: impl Into<String>) -> Self {
        Self {
            default_glob: default_glob.into(),
        }
    }

    fn open(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Xlsx<std::io::BufReader<std::fs::File>>> {
        if !path.exists() {
            return Err(WorkbookError::MissingInput(path.to_path_buf()));
        }
        match open_workbook::<Xlsx<_>, _>(path) {
            Ok(workbook) => Ok(workbook),
            Err(err) if password.is_some() => Err(WorkbookError::Decryption(format!(
                "could not open {} with the resolved password: {err}",
                path.display()
            ))),
            Err(err) => Err(err.into()),
        }
    }
}

impl WorkbookReader for ExcelReader {
    fn sheet_names(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>> {
        let workbook = self.open(path, password)?;
        Ok(workbook.sheet_names().to_vec())
    }

    fn read_sheet(&self, path: &Path, sheet: &SheetSpec, password: Option<&str>) -> Result<Frame> {
        let mut workbook = self.open(path, password)?;
        let name = match sheet {
            SheetSpec::Name(name) => name.clone(),
            SheetSpec::Index(index) => workbook
                .sheet_names()
                .get(*index)
                .cloned()
                .ok_or_else(|| {
                    WorkbookError::SheetNotFound(format!(
                        "sheet index {index} is out of range for {}",
                        path.display()
                    ))
                })?,
        };

        let range = workbook
            .worksheet_range(&name)
            .ok_or_else(|| {
                WorkbookError::SheetNotFound(format!("missing sheet '{name}' in {}", path.display()))
            })?
            .map_err(WorkbookError::from)?;

        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header
                .iter()
                .enumerate()
                .map(|(idx, cell)| header_label(cell, idx))
                .collect(),
            None => Vec::new(),
        };

        let mut frame = Frame::new(columns);
        for row in rows {
            frame.push_row(row.iter().map(cell_value).collect());
        }
        Ok(frame)
    }

    fn iter_files(&self, root: &Path, glob: Option<&str>, recursive: bool) -> Result<Vec<PathBuf>> {
        let patterns = glob.unwrap_or(&self.default_glob);
        fs::iter_files(root, patterns, recursive)
    }
}

fn header_label(cell: &DataType, index: usize) -> String {
    let label = cell_value(cell).to_string();
    let trimmed = label.trim();
    if trimmed.is_empty() {
        format!("Column{}", index + 1)
    } else {
        trimmed.to_string()
    }
}

fn cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::Empty => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

/// rust_xlsxwriter-backed [`WorkbookWriter`] routing every save through the
/// atomic writer.
pub struct ExcelWriter {
    temp_dir: Option<PathBuf>,
}

impl ExcelWriter {
    pub fn new(temp_dir: Option<PathBuf>) -> Self {
        Self { temp_dir }
    }

    fn save(&self, mut workbook: Workbook, out: &Path) -> Result<()> {
        macro_policy(out);
        let buffer = workbook.save_to_buffer()?;
        AtomicFile::write_and_commit(out, self.temp_dir.as_deref(), &buffer)
    }
}

/// Writing .xlsm through this codec drops any macros the template carried.
fn macro_policy(out: &Path) {
    let is_xlsm = out
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false);
    if is_xlsm {
        warn!(path = %out.display(), "writing .xlsm drops macros");
    }
}

impl WorkbookWriter for ExcelWriter {
    fn write_single_sheet(&self, frame: &Frame, out: &Path, sheet_name: &str) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;
        write_rows(worksheet, frame, 0, true)?;
        self.save(workbook, out)
    }

    fn write_multi_sheets(&self, sheets: &[(String, Frame)], out: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        for (name, frame) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name)?;
            write_rows(worksheet, frame, 0, true)?;
        }
        self.save(workbook, out)
    }

    fn stream_single_sheet(&self, out: &Path, sheet_name: &str) -> Result<Box<dyn RowSink>> {
        macro_policy(out);
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;
        Ok(Box::new(SingleSheetSink {
            workbook,
            dest: out.to_path_buf(),
            temp_dir: self.temp_dir.clone(),
            next_row: 0,
            header_written: false,
        }))
    }

    fn stream_multi_sheets(&self, out: &Path) -> Result<Box<dyn SheetSink>> {
        macro_policy(out);
        Ok(Box::new(MultiSheetSink {
            workbook: Workbook::new(),
            dest: out.to_path_buf(),
            temp_dir: self.temp_dir.clone(),
            sheets: HashMap::new(),
        }))
    }
}

/// Writes a frame into a worksheet starting at `start_row`; returns the next
/// free row.
fn write_rows(
    worksheet: &mut Worksheet,
    frame: &Frame,
    start_row: u32,
    with_header: bool,
) -> Result<u32> {
    let mut row_idx = start_row;
    if with_header {
        for (col_idx, header) in frame.columns.iter().enumerate() {
            worksheet.write_string(row_idx, col_idx as u16, header)?;
        }
        row_idx += 1;
    }
    for row in &frame.rows {
        for (col_idx, cell) in row.iter().enumerate() {
            let col = col_idx as u16;
            match cell {
                CellValue::Empty => {}
                CellValue::Text(value) => {
                    worksheet.write_string(row_idx, col, value)?;
                }
                CellValue::Number(value) => {
                    worksheet.write_number(row_idx, col, *value)?;
                }
                CellValue::Bool(value) => {
                    worksheet.write_boolean(row_idx, col, *value)?;
                }
            }
        }
        row_idx += 1;
    }
    Ok(row_idx)
}

/// Streaming sink for one sheet: tracks the current row offset and writes the
/// header exactly once. An untouched sink still finalises into a valid
/// workbook with a single empty sheet.
struct SingleSheetSink {
    workbook: Workbook,
    dest: PathBuf,
    temp_dir: Option<PathBuf>,
    next_row: u32,
    header_written: bool,
}

impl RowSink for SingleSheetSink {
    fn append(&mut self, batch: &Frame) -> Result<()> {
        let worksheet = self.workbook.worksheet_from_index(0)?;
        let with_header = !self.header_written;
        self.next_row = write_rows(worksheet, batch, self.next_row, with_header)?;
        self.header_written = true;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        let buffer = self.workbook.save_to_buffer()?;
        AtomicFile::write_and_commit(&self.dest, self.temp_dir.as_deref(), &buffer)
    }
}

/// Streaming sink for many sheets with one row offset per sheet name. Sheets
/// that never receive data still materialise as empty sheets.
struct MultiSheetSink {
    workbook: Workbook,
    dest: PathBuf,
    temp_dir: Option<PathBuf>,
    sheets: HashMap<String, (usize, u32)>,
}

impl SheetSink for MultiSheetSink {
    fn append(&mut self, sheet: &str, batch: &Frame) -> Result<()> {
        let (index, offset) = match self.sheets.get(sheet) {
            Some(entry) => *entry,
            None => {
                let index = self.sheets.len();
                let worksheet = self.workbook.add_worksheet();
                worksheet.set_name(sheet)?;
                self.sheets.insert(sheet.to_string(), (index, 0));
                (index, 0)
            }
        };

        let worksheet = self.workbook.worksheet_from_index(index)?;
        let with_header = offset == 0;
        let next = write_rows(worksheet, batch, offset, with_header)?;
        self.sheets.insert(sheet.to_string(), (index, next));
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        let buffer = self.workbook.save_to_buffer()?;
        AtomicFile::write_and_commit(&self.dest, self.temp_dir.as_deref(), &buffer)
    }
}
