//! Read-only workbook summary with optional sample rows.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::engine::EngineContext;
use crate::error::Result;
use crate::passwords::resolve_password;
use crate::plan::{PreviewPlan, SheetSpec};

#[derive(Debug, Serialize)]
pub struct SheetPreview {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub headers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<Value>>,
}

/// Outcome of one preview run.
#[derive(Debug, Serialize)]
pub struct PreviewReport {
    pub path: String,
    pub sheets: Vec<SheetPreview>,
}

/// Summarises every sheet of one workbook without writing anything.
#[instrument(skip_all, fields(path = %plan.path.display()))]
pub fn preview(plan: &PreviewPlan, ctx: &EngineContext<'_>) -> Result<PreviewReport> {
    let password = resolve_password(&plan.path, plan.password.as_deref(), plan.password_map.as_ref());
    let names = ctx.reader.sheet_names(&plan.path, password)?;

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let frame = ctx
            .reader
            .read_sheet(&plan.path, &SheetSpec::Name(name.clone()), password)?;
        let sample = plan.limit.map(|limit| {
            frame
                .head(limit)
                .rows
                .iter()
                .map(|row| {
                    let mut record = Map::new();
                    for (idx, column) in frame.columns.iter().enumerate() {
                        let value = row
                            .get(idx)
                            .map(|cell| cell.to_json())
                            .unwrap_or(Value::Null);
                        record.insert(column.clone(), value);
                    }
                    Value::Object(record)
                })
                .collect()
        });
        sheets.push(SheetPreview {
            name,
            rows: frame.len(),
            columns: frame.columns.len(),
            headers: frame.columns.clone(),
            sample,
        });
    }

    Ok(PreviewReport {
        path: plan.path.display().to_string(),
        sheets,
    })
}
