use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, WorkbookError>;

/// Error type covering the failure cases that can occur while combining,
/// splitting, cleaning, or routing workbook data.
#[derive(Debug, Error)]
pub enum WorkbookError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a YAML plan document cannot be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Errors bubbled up from the CSV writer or reader.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the parquet writer.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Errors raised while building arrow record batches.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Errors bubbled up from the SQLite table writer.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Raised when a workbook could not be decrypted with the resolved password.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Raised when a requested sheet does not exist in a workbook.
    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    /// Raised when a column-matching pattern fails to compile.
    #[error("invalid target pattern: {0}")]
    InvalidPattern(String),

    /// Raised when the delete engine's missing-column policy is violated.
    #[error("columns not found: {0}")]
    MissingColumns(String),

    /// Raised for invalid plans, illegal format/destination combinations, and
    /// malformed configuration files.
    #[error("configuration error: {0}")]
    Config(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
