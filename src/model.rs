use serde::{Deserialize, Serialize};

/// A single cell value read from or written to a worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    /// Missing or blank cell.
    Empty,
    /// Plain string cell.
    Text(String),
    /// Numeric cell. Excel stores integers as floats as well.
    Number(f64),
    /// Boolean cell.
    Bool(bool),
}

impl CellValue {
    /// Returns true for blank cells and NaN numbers, which the split engine
    /// treats as missing keys.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Converts the cell into the JSON representation used in preview samples.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::Null,
            CellValue::Text(value) => serde_json::Value::String(value.clone()),
            CellValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Bool(value) => serde_json::Value::Bool(*value),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(value) => write!(f, "{value}"),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// An ordered table of rows sharing one header. Frames are the row-batch
/// unit flowing between readers, engines, and sinks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Frame {
    /// Creates an empty frame with the given header.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by trimmed name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.trim() == name.trim())
    }

    /// Inserts a column at the given position with one value per row.
    pub fn insert_column(&mut self, index: usize, name: &str, value: CellValue) {
        self.columns.insert(index, name.to_string());
        for row in &mut self.rows {
            row.insert(index, value.clone());
        }
    }

    /// Returns a copy of the frame without the named columns.
    pub fn without_columns(&self, names: &[String]) -> Frame {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !names.iter().any(|n| n.as_str() == c.trim()))
            .map(|(i, _)| i)
            .collect();

        let columns = keep
            .iter()
            .map(|&i| self.columns[i].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                keep.iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(CellValue::Empty))
                    .collect()
            })
            .collect();

        Frame { columns, rows }
    }

    /// Returns the first `n` rows as a new frame.
    pub fn head(&self, n: usize) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}
