//! Immutable plan value objects describing one operation each.
//!
//! Plans are created once by a front-end (CLI flags or a plan file), validated
//! eagerly, and never mutated afterwards. Destination and target variants are
//! explicit sum types so the engines dispatch by exhaustive match instead of
//! sniffing optional fields.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Result, WorkbookError};

/// Addresses a sheet by name or 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSpec {
    Name(String),
    Index(usize),
}

impl std::fmt::Display for SheetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetSpec::Name(name) => write!(f, "{name}"),
            SheetSpec::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Sheet selection for the combine engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelect {
    All,
    Sheets(Vec<SheetSpec>),
}

/// Sheet selection for the split and delete engines. `Active` means the first
/// sheet of the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Active,
    Spec(SheetSpec),
}

impl SheetSelector {
    /// Parses selectors written as `active`, `index:N`, a bare integer, or a
    /// sheet name.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return Err(WorkbookError::Config(
                "sheet selector cannot be empty".into(),
            ));
        }
        if cleaned.eq_ignore_ascii_case("active") {
            return Ok(SheetSelector::Active);
        }
        if let Some(rest) = cleaned
            .strip_prefix("index:")
            .or_else(|| cleaned.strip_prefix("Index:"))
        {
            let index: usize = rest.trim().parse().map_err(|_| {
                WorkbookError::Config("sheet selector index must be numeric".into())
            })?;
            return Ok(SheetSelector::Spec(SheetSpec::Index(index)));
        }
        if let Ok(index) = cleaned.parse::<usize>() {
            return Ok(SheetSelector::Spec(SheetSpec::Index(index)));
        }
        Ok(SheetSelector::Spec(SheetSpec::Name(cleaned.to_string())))
    }
}

/// References the split column by name or position. Positions are written
/// 1-based in plans (`index:N`) and stored 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

impl ColumnRef {
    /// Parses `index:N` (1-based), `name:X`, or a raw column name.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = raw.trim();
        let lowered = cleaned.to_ascii_lowercase();
        if let Some(rest) = lowered.strip_prefix("index:") {
            let position: usize = rest.trim().parse().map_err(|_| {
                WorkbookError::Config(
                    "column index specifier must include a numeric value after 'index:'".into(),
                )
            })?;
            if position == 0 {
                return Err(WorkbookError::Config(
                    "column index specifiers are 1-based; 'index:0' is invalid".into(),
                ));
            }
            return Ok(ColumnRef::Index(position - 1));
        }
        if lowered.starts_with("name:") {
            let rest = cleaned[5..].trim();
            if !rest.is_empty() {
                return Ok(ColumnRef::Name(rest.to_string()));
            }
        }
        Ok(ColumnRef::Name(cleaned.to_string()))
    }
}

/// Combine output shape: one concatenated table or one sheet per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineMode {
    OneSheet,
    MultiSheets,
}

impl std::fmt::Display for CombineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineMode::OneSheet => write!(f, "one_sheet"),
            CombineMode::MultiSheets => write!(f, "multi_sheets"),
        }
    }
}

/// Split destination shape: many sheets in one workbook or many files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitTarget {
    Sheets,
    Files,
}

impl std::fmt::Display for SplitTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitTarget::Sheets => write!(f, "sheets"),
            SplitTarget::Files => write!(f, "files"),
        }
    }
}

/// File format of a primary or cloud output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(OutputFormat::Xlsx),
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            other => Err(WorkbookError::Config(format!(
                "unsupported output format '{other}' (expected xlsx, csv, or parquet)"
            ))),
        }
    }

    /// File extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => ".xlsx",
            OutputFormat::Csv => ".csv",
            OutputFormat::Parquet => ".parquet",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Xlsx => write!(f, "xlsx"),
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Parquet => write!(f, "parquet"),
        }
    }
}

/// Column-name matching strategy for the delete engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatchStrategy {
    Exact,
    CaseInsensitive,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

impl NameMatchStrategy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(NameMatchStrategy::Exact),
            "ci" | "case_insensitive" => Ok(NameMatchStrategy::CaseInsensitive),
            "contains" => Ok(NameMatchStrategy::Contains),
            "startswith" => Ok(NameMatchStrategy::StartsWith),
            "endswith" => Ok(NameMatchStrategy::EndsWith),
            "regex" => Ok(NameMatchStrategy::Regex),
            other => Err(WorkbookError::Config(format!(
                "unknown match strategy '{other}'"
            ))),
        }
    }
}

/// Policy when a delete target matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    Ignore,
    Error,
}

/// Delete targets: column names (matched per strategy) or 1-based positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTargets {
    Names(Vec<String>),
    Indexes(Vec<usize>),
}

/// Write mode for database destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbWriteMode {
    Replace,
    Append,
}

/// A relational table destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDestination {
    pub uri: String,
    pub table: String,
    pub mode: DbWriteMode,
    pub options: BTreeMap<String, String>,
}

/// An object-storage destination. `key` may contain a `{name}` placeholder or
/// end with `/` to act as a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudDestination {
    pub root: PathBuf,
    pub key: String,
    pub format: Option<OutputFormat>,
    pub options: BTreeMap<String, String>,
}

/// Secondary (or, for cloud split uploads, parallel) output target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Database(DatabaseDestination),
    Cloud(CloudDestination),
}

/// Merge N workbooks into one output.
#[derive(Debug, Clone)]
pub struct CombinePlan {
    pub inputs: Vec<PathBuf>,
    pub glob: Option<String>,
    pub recursive: bool,
    pub mode: CombineMode,
    pub include_sheets: SheetSelect,
    pub output_path: PathBuf,
    pub output_sheet_name: String,
    pub add_source_column: bool,
    pub password: Option<String>,
    pub password_map: Option<BTreeMap<String, String>>,
    pub output_format: OutputFormat,
    pub csv_add_bom: bool,
    pub dry_run: bool,
    pub destination: Option<Destination>,
}

impl CombinePlan {
    /// Checks format/destination legality before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.mode == CombineMode::MultiSheets && self.output_format != OutputFormat::Xlsx {
            return Err(WorkbookError::Config(
                "multi-sheet combine output requires the xlsx format".into(),
            ));
        }
        match &self.destination {
            Some(Destination::Database(_)) if self.mode != CombineMode::OneSheet => {
                Err(WorkbookError::Config(
                    "database destinations are only supported for one-sheet combine mode".into(),
                ))
            }
            Some(Destination::Cloud(_)) if self.mode != CombineMode::OneSheet => {
                Err(WorkbookError::Config(
                    "cloud destinations are only supported for one-sheet combine mode".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Partition one sheet by the distinct values of a column.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub input_file: PathBuf,
    pub sheet: SheetSelector,
    pub by_column: ColumnRef,
    pub to: SplitTarget,
    pub include_nan: bool,
    pub output_dir: PathBuf,
    pub output_filename: Option<PathBuf>,
    pub output_sheet_name: String,
    pub password: Option<String>,
    pub password_map: Option<BTreeMap<String, String>>,
    pub output_format: OutputFormat,
    pub csv_add_bom: bool,
    pub dry_run: bool,
    pub destination: Option<Destination>,
}

impl SplitPlan {
    pub fn validate(&self) -> Result<()> {
        if self.to == SplitTarget::Files && self.output_filename.is_some() {
            return Err(WorkbookError::Config(
                "custom output filenames are only supported when splitting to sheets".into(),
            ));
        }
        if self.to == SplitTarget::Sheets
            && matches!(self.destination, Some(Destination::Database(_)))
        {
            return Err(WorkbookError::Config(
                "database destinations cannot be combined with sheet-mode split output".into(),
            ));
        }
        Ok(())
    }
}

/// Remove matching columns from one or more sheets across one or more files.
#[derive(Debug, Clone)]
pub struct DeleteSpec {
    pub path: PathBuf,
    pub targets: DeleteTargets,
    pub strategy: NameMatchStrategy,
    pub all_sheets: bool,
    pub sheet_selector: Option<SheetSpec>,
    pub inplace: bool,
    pub on_missing: OnMissing,
    pub dry_run: bool,
    pub glob: Option<String>,
    pub recursive: bool,
    pub password: Option<String>,
    pub password_map: Option<BTreeMap<String, String>>,
}

/// Summarize the sheets of one workbook, optionally with sample rows.
#[derive(Debug, Clone)]
pub struct PreviewPlan {
    pub path: PathBuf,
    pub password: Option<String>,
    pub password_map: Option<BTreeMap<String, String>>,
    pub limit: Option<usize>,
}
