//! SQLite-backed relational table writer.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;

use crate::error::{Result, WorkbookError};
use crate::io::ports::TableWriter;
use crate::model::{CellValue, Frame};
use crate::plan::DbWriteMode;

/// [`TableWriter`] persisting frames into a SQLite database file.
///
/// Replace mode drops and recreates the table; append mode creates it only if
/// absent. Each batch goes through one transaction.
pub struct SqliteTableWriter;

impl SqliteTableWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteTableWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TableWriter for SqliteTableWriter {
    fn write_frame(
        &self,
        frame: &Frame,
        table: &str,
        mode: DbWriteMode,
        _options: &BTreeMap<String, String>,
        uri: &str,
    ) -> Result<()> {
        if uri.trim().is_empty() {
            return Err(WorkbookError::Config(
                "database destination requires a non-empty 'uri'".into(),
            ));
        }

        let path = Path::new(uri.strip_prefix("sqlite://").unwrap_or(uri));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut connection = Connection::open(path)?;
        let tx = connection.transaction()?;

        let quoted_table = quote_identifier(table);
        if mode == DbWriteMode::Replace {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {quoted_table}"))?;
        }

        if frame.columns.is_empty() {
            tx.commit()?;
            return Ok(());
        }

        let column_list: Vec<String> = frame.columns.iter().map(|c| quote_identifier(c)).collect();
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {quoted_table} ({})",
            column_list.join(", ")
        ))?;

        let placeholders: Vec<&str> = frame.columns.iter().map(|_| "?").collect();
        let insert = format!(
            "INSERT INTO {quoted_table} ({}) VALUES ({})",
            column_list.join(", "),
            placeholders.join(", ")
        );
        {
            let mut statement = tx.prepare(&insert)?;
            for row in &frame.rows {
                let params: Vec<SqlValue> = frame
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, _)| sql_value(row.get(idx)))
                    .collect();
                statement.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn sql_value(cell: Option<&CellValue>) -> SqlValue {
    match cell {
        Some(CellValue::Text(value)) => SqlValue::Text(value.clone()),
        Some(CellValue::Number(value)) => SqlValue::Real(*value),
        Some(CellValue::Bool(value)) => SqlValue::Integer(i64::from(*value)),
        Some(CellValue::Empty) | None => SqlValue::Null,
    }
}

fn quote_identifier(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}
