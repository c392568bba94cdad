//! Plan-file loading and multi-operation execution.
//!
//! A plan file is JSON or YAML: either a bare list of operation records or an
//! object with an `operations` list. Each record carries a `type`, an optional
//! `name`, and its settings either inline or under `options`. Relative paths
//! resolve against the plan file's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::config::Config;
use crate::engine::{EngineContext, combine, delete_columns, preview, split};
use crate::error::{Result, WorkbookError};
use crate::io::cloud::LocalCloudObjectWriter;
use crate::io::database::SqliteTableWriter;
use crate::io::ports::{WorkbookReader, WorkbookWriter};
use crate::passwords::load_password_map;
use crate::plan::{
    CloudDestination, ColumnRef, CombineMode, CombinePlan, DatabaseDestination, DbWriteMode,
    DeleteSpec, DeleteTargets, Destination, NameMatchStrategy, OnMissing, OutputFormat,
    PreviewPlan, SheetSelect, SheetSelector, SheetSpec, SplitPlan, SplitTarget,
};
use crate::progress::ProgressBus;

/// One operation parsed out of a plan file.
#[derive(Debug)]
pub struct PlanOperation {
    pub name: Option<String>,
    pub plan: OperationPlan,
}

#[derive(Debug)]
pub enum OperationPlan {
    Combine(CombinePlan),
    Split(SplitPlan),
    Delete(DeleteSpec),
    Preview(PreviewPlan),
}

impl OperationPlan {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationPlan::Combine(_) => "combine",
            OperationPlan::Split(_) => "split",
            OperationPlan::Delete(_) => "delete",
            OperationPlan::Preview(_) => "preview",
        }
    }

    fn destination(&self) -> Option<&Destination> {
        match self {
            OperationPlan::Combine(plan) => plan.destination.as_ref(),
            OperationPlan::Split(plan) => plan.destination.as_ref(),
            _ => None,
        }
    }
}

/// Result entry for one executed operation.
#[derive(Debug, Serialize)]
pub struct OperationOutcome {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub result: Value,
}

/// Parses a JSON or YAML plan file into operations.
pub fn load_plan_file(path: &Path) -> Result<Vec<PlanOperation>> {
    if !path.exists() {
        return Err(WorkbookError::Config(format!(
            "plan file not found: {}",
            path.display()
        )));
    }
    let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let text = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let data: Value = if extension == "yaml" || extension == "yml" {
        serde_yaml::from_str(&text)?
    } else {
        serde_json::from_str(&text)?
    };

    let records = match &data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("operations") {
            Some(Value::Array(items)) => items.clone(),
            Some(_) | None => {
                return Err(WorkbookError::Config(
                    "plan file must include an 'operations' list".into(),
                ));
            }
        },
        _ => {
            return Err(WorkbookError::Config(
                "plan file must be a list of operations or contain an 'operations' list".into(),
            ));
        }
    };

    let mut operations = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let Some(record) = record.as_object() else {
            return Err(WorkbookError::Config(format!(
                "operation #{} must be a mapping",
                idx + 1
            )));
        };
        let kind = record.get("type").and_then(Value::as_str).unwrap_or("");
        let entry = match record.get("options") {
            Some(Value::Object(options)) => options,
            Some(_) => {
                return Err(WorkbookError::Config(format!(
                    "operation #{} options must be a mapping",
                    idx + 1
                )));
            }
            None => record,
        };
        let plan = match kind {
            "combine" => OperationPlan::Combine(build_combine_plan(entry, &base_dir)?),
            "split" => OperationPlan::Split(build_split_plan(entry, &base_dir)?),
            "delete" => OperationPlan::Delete(build_delete_plan(entry, &base_dir)?),
            "preview" => OperationPlan::Preview(build_preview_plan(entry, &base_dir)?),
            other => {
                return Err(WorkbookError::Config(format!(
                    "operation type must be one of combine, split, delete, preview (got '{other}')"
                )));
            }
        };
        operations.push(PlanOperation {
            name: record
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            plan,
        });
    }
    Ok(operations)
}

/// Executes operations in order, failing fast on the first error.
#[instrument(skip_all, fields(operations = operations.len()))]
pub fn execute_plan(
    operations: &[PlanOperation],
    reader: &dyn WorkbookReader,
    writer: &dyn WorkbookWriter,
    config: &Config,
    progress: &ProgressBus,
) -> Result<Vec<OperationOutcome>> {
    let mut outcomes = Vec::with_capacity(operations.len());
    for op in operations {
        let destination = op.plan.destination();
        let table_writer = match destination {
            Some(Destination::Database(_)) => Some(SqliteTableWriter::new()),
            _ => None,
        };
        let cloud_writer = match destination {
            Some(Destination::Cloud(cloud)) => Some(LocalCloudObjectWriter::new(
                cloud.root.clone(),
                config.temp_dir.clone(),
                config.default_sheet_name.clone(),
            )),
            _ => None,
        };

        let mut ctx = EngineContext::new(reader, writer, config, progress);
        if let Some(table_writer) = table_writer.as_ref() {
            ctx = ctx.with_table_writer(table_writer);
        }
        if let Some(cloud_writer) = cloud_writer.as_ref() {
            ctx = ctx.with_cloud_writer(cloud_writer);
        }

        info!(kind = op.plan.kind(), name = op.name.as_deref(), "running plan operation");
        let result = match &op.plan {
            OperationPlan::Combine(plan) => serde_json::to_value(combine(plan, &ctx)?)?,
            OperationPlan::Split(plan) => serde_json::to_value(split(plan, &ctx)?)?,
            OperationPlan::Delete(plan) => serde_json::to_value(delete_columns(plan, &ctx)?)?,
            OperationPlan::Preview(plan) => serde_json::to_value(preview(plan, &ctx)?)?,
        };
        outcomes.push(OperationOutcome {
            kind: op.plan.kind().to_string(),
            name: op.name.clone(),
            result,
        });
    }
    Ok(outcomes)
}

fn build_combine_plan(entry: &Map<String, Value>, base_dir: &Path) -> Result<CombinePlan> {
    let Some(inputs) = entry.get("inputs").and_then(Value::as_array) else {
        return Err(WorkbookError::Config(
            "combine operation requires an 'inputs' list".into(),
        ));
    };
    let mut paths = Vec::with_capacity(inputs.len());
    for item in inputs {
        let Some(raw) = scalar_string(item) else {
            return Err(WorkbookError::Config(
                "combine 'inputs' entries must be paths".into(),
            ));
        };
        paths.push(resolve_path(base_dir, &raw));
    }

    let mode = match string_field(entry, "mode").as_deref().unwrap_or("one_sheet") {
        "one_sheet" => CombineMode::OneSheet,
        "multi_sheets" => CombineMode::MultiSheets,
        other => {
            return Err(WorkbookError::Config(format!(
                "combine 'mode' must be 'one_sheet' or 'multi_sheets' (got '{other}')"
            )));
        }
    };

    let output_path = string_field(entry, "output_path").unwrap_or_else(|| "combined.xlsx".into());
    let sheet_name = string_field(entry, "sheet_name")
        .or_else(|| string_field(entry, "output_sheet_name"))
        .unwrap_or_else(|| "Data".into());
    let output_format = match string_field(entry, "output_format") {
        Some(raw) => OutputFormat::parse(&raw)?,
        None => OutputFormat::Xlsx,
    };

    Ok(CombinePlan {
        inputs: paths,
        glob: string_field(entry, "glob"),
        recursive: bool_field(entry, "recursive"),
        mode,
        include_sheets: parse_sheet_specs(entry.get("include_sheets"))?,
        output_path: resolve_path(base_dir, &output_path),
        output_sheet_name: sheet_name,
        add_source_column: bool_field(entry, "add_source_column"),
        password: string_field(entry, "password"),
        password_map: parse_password_map(entry.get("password_map"), base_dir)?,
        output_format,
        csv_add_bom: bool_field(entry, "csv_add_bom"),
        dry_run: bool_field(entry, "dry_run"),
        destination: parse_destination(entry.get("destination"), base_dir)?,
    })
}

fn build_split_plan(entry: &Map<String, Value>, base_dir: &Path) -> Result<SplitPlan> {
    let input = string_field(entry, "input").or_else(|| string_field(entry, "input_file"));
    let Some(input) = input else {
        return Err(WorkbookError::Config(
            "split operation requires an 'input' path".into(),
        ));
    };

    let by_raw = entry.get("by").or_else(|| entry.get("by_column"));
    let by_column = match by_raw {
        None => {
            return Err(WorkbookError::Config(
                "split operation requires a 'by' column".into(),
            ));
        }
        Some(Value::Number(n)) => {
            let Some(index) = n.as_u64() else {
                return Err(WorkbookError::Config(
                    "split 'by' column index must be non-negative".into(),
                ));
            };
            ColumnRef::Index(index as usize)
        }
        Some(value) => match scalar_string(value) {
            Some(raw) => ColumnRef::parse(&raw)?,
            None => {
                return Err(WorkbookError::Config(
                    "split 'by' column must be a name or index".into(),
                ));
            }
        },
    };

    let to = match string_field(entry, "to").as_deref().unwrap_or("files") {
        "sheets" => SplitTarget::Sheets,
        "files" => SplitTarget::Files,
        other => {
            return Err(WorkbookError::Config(format!(
                "split 'to' must be 'sheets' or 'files' (got '{other}')"
            )));
        }
    };

    let output_dir = string_field(entry, "output_dir")
        .or_else(|| string_field(entry, "out"))
        .unwrap_or_else(|| "out".into());
    let sheet_name = string_field(entry, "sheet_name")
        .or_else(|| string_field(entry, "output_sheet_name"))
        .unwrap_or_else(|| "Data".into());
    let output_format = match string_field(entry, "output_format") {
        Some(raw) => OutputFormat::parse(&raw)?,
        None => OutputFormat::Xlsx,
    };

    Ok(SplitPlan {
        input_file: resolve_path(base_dir, &input),
        sheet: parse_sheet_selector(entry.get("sheet"))?,
        by_column,
        to,
        include_nan: bool_field(entry, "include_nan"),
        output_dir: resolve_path(base_dir, &output_dir),
        output_filename: string_field(entry, "output_filename")
            .or_else(|| string_field(entry, "out_file"))
            .map(PathBuf::from),
        output_sheet_name: sheet_name,
        password: string_field(entry, "password"),
        password_map: parse_password_map(entry.get("password_map"), base_dir)?,
        output_format,
        csv_add_bom: bool_field(entry, "csv_add_bom"),
        dry_run: bool_field(entry, "dry_run"),
        destination: parse_destination(entry.get("destination"), base_dir)?,
    })
}

fn build_delete_plan(entry: &Map<String, Value>, base_dir: &Path) -> Result<DeleteSpec> {
    let Some(path) = string_field(entry, "path") else {
        return Err(WorkbookError::Config(
            "delete operation requires a 'path'".into(),
        ));
    };
    let Some(raw_targets) = entry.get("targets").and_then(Value::as_array) else {
        return Err(WorkbookError::Config(
            "delete operation requires 'targets'".into(),
        ));
    };

    let match_kind = string_field(entry, "match")
        .or_else(|| string_field(entry, "match_kind"))
        .unwrap_or_else(|| "names".into());
    let targets = match match_kind.as_str() {
        "index" => {
            let mut indexes = Vec::with_capacity(raw_targets.len());
            for item in raw_targets {
                let parsed = match item {
                    Value::Number(n) => n.as_u64().map(|v| v as usize),
                    Value::String(s) => s.trim().parse::<usize>().ok(),
                    _ => None,
                };
                let Some(index) = parsed else {
                    return Err(WorkbookError::Config(
                        "delete index targets must be positive integers".into(),
                    ));
                };
                indexes.push(index);
            }
            DeleteTargets::Indexes(indexes)
        }
        "names" => {
            let mut names = Vec::with_capacity(raw_targets.len());
            for item in raw_targets {
                let Some(raw) = scalar_string(item) else {
                    return Err(WorkbookError::Config(
                        "delete name targets must be strings".into(),
                    ));
                };
                names.push(raw.trim().to_string());
            }
            DeleteTargets::Names(names)
        }
        other => {
            return Err(WorkbookError::Config(format!(
                "delete 'match' must be 'names' or 'index' (got '{other}')"
            )));
        }
    };

    let strategy = match string_field(entry, "strategy") {
        Some(raw) => NameMatchStrategy::parse(&raw)?,
        None => NameMatchStrategy::Exact,
    };
    let on_missing = match string_field(entry, "on_missing").as_deref() {
        None | Some("ignore") => OnMissing::Ignore,
        Some("error") => OnMissing::Error,
        Some(other) => {
            return Err(WorkbookError::Config(format!(
                "delete 'on_missing' must be 'ignore' or 'error' (got '{other}')"
            )));
        }
    };

    Ok(DeleteSpec {
        path: resolve_path(base_dir, &path),
        targets,
        strategy,
        all_sheets: bool_field(entry, "all_sheets"),
        sheet_selector: parse_delete_selector(entry.get("sheet"))?,
        inplace: bool_field(entry, "inplace"),
        on_missing,
        dry_run: bool_field(entry, "dry_run"),
        glob: string_field(entry, "glob"),
        recursive: bool_field(entry, "recursive"),
        password: string_field(entry, "password"),
        password_map: parse_password_map(entry.get("password_map"), base_dir)?,
    })
}

fn build_preview_plan(entry: &Map<String, Value>, base_dir: &Path) -> Result<PreviewPlan> {
    let Some(path) = string_field(entry, "path") else {
        return Err(WorkbookError::Config(
            "preview operation requires a 'path'".into(),
        ));
    };
    let limit = entry
        .get("limit")
        .and_then(Value::as_u64)
        .map(|v| v as usize);
    Ok(PreviewPlan {
        path: resolve_path(base_dir, &path),
        password: string_field(entry, "password"),
        password_map: parse_password_map(entry.get("password_map"), base_dir)?,
        limit,
    })
}

fn parse_sheet_specs(raw: Option<&Value>) -> Result<SheetSelect> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(SheetSelect::All),
        Some(Value::String(s)) if s == "all" => return Ok(SheetSelect::All),
        Some(value) => value,
    };
    let Some(items) = raw.as_array() else {
        return Err(WorkbookError::Config(
            "plan field 'include_sheets' must be a sequence or 'all'".into(),
        ));
    };
    let mut specs = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(map) => {
                if let Some(index) = map.get("index").and_then(Value::as_u64) {
                    specs.push(SheetSpec::Index(index as usize));
                } else if let Some(name) = map.get("name").and_then(Value::as_str) {
                    specs.push(SheetSpec::Name(name.to_string()));
                }
            }
            Value::Number(n) => {
                if let Some(index) = n.as_u64() {
                    specs.push(SheetSpec::Index(index as usize));
                }
            }
            Value::String(s) => {
                if let Ok(index) = s.trim().parse::<usize>() {
                    specs.push(SheetSpec::Index(index));
                } else {
                    specs.push(SheetSpec::Name(s.clone()));
                }
            }
            _ => {}
        }
    }
    if specs.is_empty() {
        return Ok(SheetSelect::All);
    }
    Ok(SheetSelect::Sheets(specs))
}

fn parse_sheet_selector(raw: Option<&Value>) -> Result<SheetSelector> {
    match raw {
        None | Some(Value::Null) => Ok(SheetSelector::Active),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(index) => Ok(SheetSelector::Spec(SheetSpec::Index(index as usize))),
            None => Err(WorkbookError::Config(
                "sheet selector index must be non-negative".into(),
            )),
        },
        Some(Value::Object(map)) => match map.get("index").and_then(Value::as_u64) {
            Some(index) => Ok(SheetSelector::Spec(SheetSpec::Index(index as usize))),
            None => Err(WorkbookError::Config(
                "sheet selector mapping requires an 'index'".into(),
            )),
        },
        Some(Value::String(s)) => SheetSelector::parse(s),
        Some(_) => Err(WorkbookError::Config(
            "unsupported sheet selector format in plan file".into(),
        )),
    }
}

fn parse_delete_selector(raw: Option<&Value>) -> Result<Option<SheetSpec>> {
    match parse_sheet_selector(raw)? {
        SheetSelector::Active => match raw {
            None | Some(Value::Null) => Ok(None),
            // "active" written out means the first sheet.
            _ => Ok(Some(SheetSpec::Index(0))),
        },
        SheetSelector::Spec(spec) => Ok(Some(spec)),
    }
}

fn parse_destination(raw: Option<&Value>, base_dir: &Path) -> Result<Option<Destination>> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let Some(map) = raw.as_object() else {
        return Err(WorkbookError::Config(
            "destination entry must be a mapping".into(),
        ));
    };

    match map.get("kind").and_then(Value::as_str) {
        Some("database") => {
            let uri = map.get("uri").and_then(Value::as_str);
            let table = map.get("table").and_then(Value::as_str);
            let (Some(uri), Some(table)) = (uri, table) else {
                return Err(WorkbookError::Config(
                    "database destination requires 'uri' and 'table'".into(),
                ));
            };
            let mode = match map.get("mode").and_then(Value::as_str) {
                Some("append") => DbWriteMode::Append,
                _ => DbWriteMode::Replace,
            };
            Ok(Some(Destination::Database(DatabaseDestination {
                uri: resolve_path(base_dir, uri).display().to_string(),
                table: table.to_string(),
                mode,
                options: parse_options(map.get("options"))?,
            })))
        }
        Some("cloud") => {
            let root = map.get("root").and_then(Value::as_str);
            let key = map.get("key").and_then(Value::as_str);
            let (Some(root), Some(key)) = (root, key) else {
                return Err(WorkbookError::Config(
                    "cloud destination requires 'root' and 'key'".into(),
                ));
            };
            let format = match map.get("format").and_then(Value::as_str) {
                Some(raw) => OutputFormat::parse(raw)?,
                None => OutputFormat::Parquet,
            };
            Ok(Some(Destination::Cloud(CloudDestination {
                root: resolve_path(base_dir, root),
                key: key.to_string(),
                format: Some(format),
                options: parse_options(map.get("options"))?,
            })))
        }
        _ => Err(WorkbookError::Config(
            "destination kind must be 'database' or 'cloud'".into(),
        )),
    }
}

fn parse_options(raw: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(value) => value,
    };
    let Some(map) = raw.as_object() else {
        return Err(WorkbookError::Config(
            "destination 'options' must be a mapping if provided".into(),
        ));
    };
    let mut options = BTreeMap::new();
    for (key, value) in map {
        let rendered = scalar_string(value).unwrap_or_else(|| value.to_string());
        options.insert(key.clone(), rendered);
    }
    Ok(options)
}

fn parse_password_map(
    raw: Option<&Value>,
    base_dir: &Path,
) -> Result<Option<BTreeMap<String, String>>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => {
            let mut parsed = BTreeMap::new();
            for (key, value) in map {
                let rendered = scalar_string(value).unwrap_or_else(|| value.to_string());
                parsed.insert(key.clone(), rendered);
            }
            Ok(Some(parsed))
        }
        Some(Value::String(path)) => Ok(Some(load_password_map(&resolve_path(base_dir, path))?)),
        Some(_) => Err(WorkbookError::Config(
            "plan 'password_map' must be an inline mapping or a file path".into(),
        )),
    }
}

fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn string_field(entry: &Map<String, Value>, key: &str) -> Option<String> {
    entry.get(key).and_then(scalar_string)
}

fn bool_field(entry: &Map<String, Value>, key: &str) -> bool {
    entry.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
