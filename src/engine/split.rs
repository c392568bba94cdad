//! Partitions one sheet by the distinct values of a key column.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::EngineContext;
use crate::engine::route::{DestinationSummary, render_cloud_key};
use crate::error::{Result, WorkbookError};
use crate::io::csv_sink::CsvRowSink;
use crate::io::parquet_sink::ParquetRowSink;
use crate::io::ports::RowSink;
use crate::model::Frame;
use crate::naming::{MAX_SHEET_NAME, dedupe, sanitize};
use crate::passwords::resolve_password;
use crate::plan::{
    ColumnRef, DbWriteMode, Destination, OutputFormat, SheetSelector, SheetSpec, SplitPlan,
    SplitTarget,
};

/// Key used for rows whose split column is blank when `include_nan` is set.
const MISSING_KEY: &str = "NaN";

/// Outcome of one split run.
#[derive(Debug, Serialize)]
pub struct SplitReport {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,
    pub by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<Vec<String>>,
}

/// Runs a split plan against the context's reader and writer.
#[instrument(skip_all, fields(to = %plan.to))]
pub fn split(plan: &SplitPlan, ctx: &EngineContext<'_>) -> Result<SplitReport> {
    plan.validate()?;
    check_destination_writers(plan, ctx)?;

    let sheet = match &plan.sheet {
        SheetSelector::Active => SheetSpec::Index(0),
        SheetSelector::Spec(spec) => spec.clone(),
    };
    let sheet_display = match &plan.sheet {
        SheetSelector::Active => "active".to_string(),
        SheetSelector::Spec(spec) => spec.to_string(),
    };
    ctx.progress.emit(
        "split_start",
        json!({
            "input": plan.input_file.display().to_string(),
            "sheet": sheet_display,
            "mode": plan.to.to_string(),
            "dry_run": plan.dry_run,
        }),
    )?;

    let password = resolve_password(
        &plan.input_file,
        plan.password.as_deref(),
        plan.password_map.as_ref(),
    );
    let frame = ctx.reader.read_sheet(&plan.input_file, &sheet, password)?;

    let (key_idx, key_name) = resolve_key_column(&frame, &plan.by_column, &sheet_display)?;
    let partitions = partition_rows(&frame, key_idx, plan.include_nan);

    match plan.to {
        SplitTarget::Sheets => split_to_sheets(plan, ctx, partitions, &key_name),
        SplitTarget::Files => split_to_files(plan, ctx, partitions, &key_name),
    }
}

fn check_destination_writers(plan: &SplitPlan, ctx: &EngineContext<'_>) -> Result<()> {
    match &plan.destination {
        Some(Destination::Database(_)) if ctx.table_writer.is_none() => {
            Err(WorkbookError::Config(
                "database destination requested but no database writer was provided".into(),
            ))
        }
        Some(Destination::Cloud(_)) if ctx.cloud_writer.is_none() => Err(WorkbookError::Config(
            "cloud destination requested but no cloud writer was provided".into(),
        )),
        _ => Ok(()),
    }
}

fn resolve_key_column(
    frame: &Frame,
    by_column: &ColumnRef,
    sheet_display: &str,
) -> Result<(usize, String)> {
    match by_column {
        ColumnRef::Index(idx) => {
            let name = frame.columns.get(*idx).cloned().ok_or_else(|| {
                WorkbookError::Config(format!(
                    "column index {} is out of range for sheet '{sheet_display}'",
                    idx + 1
                ))
            })?;
            Ok((*idx, name))
        }
        ColumnRef::Name(name) => {
            let idx = frame.column_index(name).ok_or_else(|| {
                WorkbookError::Config(format!(
                    "column '{name}' was not found in sheet '{sheet_display}'"
                ))
            })?;
            Ok((idx, name.clone()))
        }
    }
}

/// Groups rows by the display value of the key column. Rows with a missing
/// key are dropped, or grouped under [`MISSING_KEY`] when `include_nan` is
/// set. Partition order follows the sorted key values.
fn partition_rows(frame: &Frame, key_idx: usize, include_nan: bool) -> BTreeMap<String, Frame> {
    let mut partitions: BTreeMap<String, Frame> = BTreeMap::new();
    for row in &frame.rows {
        let missing = row.get(key_idx).map(|c| c.is_missing()).unwrap_or(true);
        let key = if missing {
            if !include_nan {
                continue;
            }
            MISSING_KEY.to_string()
        } else {
            match row.get(key_idx) {
                Some(cell) => cell.to_string(),
                None => continue,
            }
        };
        partitions
            .entry(key)
            .or_insert_with(|| Frame::new(frame.columns.clone()))
            .push_row(row.clone());
    }
    partitions
}

fn split_to_sheets(
    plan: &SplitPlan,
    ctx: &EngineContext<'_>,
    partitions: BTreeMap<String, Frame>,
    key_name: &str,
) -> Result<SplitReport> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut sheets: Vec<(String, Frame)> = Vec::with_capacity(partitions.len());
    for (key, part) in partitions {
        let name = dedupe(&sanitize(&key), &mut seen, Some(MAX_SHEET_NAME));
        ctx.progress.emit(
            "split_partition",
            json!({ "key": key, "rows": part.len(), "output": name }),
        )?;
        sheets.push((name, part));
    }

    let out_path = sheet_mode_out_path(plan);
    if !plan.dry_run {
        ctx.writer.write_multi_sheets(&sheets, &out_path)?;
    }
    info!(
        partitions = sheets.len(),
        out = %out_path.display(),
        "split sheet into one workbook of partitions"
    );
    ctx.progress.emit(
        "split_complete",
        json!({
            "mode": plan.to.to_string(),
            "partitions": sheets.len(),
            "output": out_path.display().to_string(),
        }),
    )?;

    Ok(SplitReport {
        to: SplitTarget::Sheets.to_string(),
        sheets: Some(sheets.into_iter().map(|(name, _)| name).collect()),
        count: None,
        outputs: None,
        out: Some(out_path.display().to_string()),
        out_dir: None,
        by: key_name.to_string(),
        format: None,
        dry_run: plan.dry_run,
        destination: plan.destination.as_ref().map(DestinationSummary::describe),
        uploaded: None,
    })
}

fn sheet_mode_out_path(plan: &SplitPlan) -> PathBuf {
    if let Some(filename) = &plan.output_filename {
        if filename.is_absolute() {
            return filename.clone();
        }
        return plan.output_dir.join(filename);
    }
    let is_workbook = plan
        .output_dir
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if is_workbook {
        return plan.output_dir.clone();
    }
    let stem = plan
        .input_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    plan.output_dir.join(format!("{stem}_split.xlsx"))
}

fn split_to_files(
    plan: &SplitPlan,
    ctx: &EngineContext<'_>,
    partitions: BTreeMap<String, Frame>,
    key_name: &str,
) -> Result<SplitReport> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut outputs: Vec<String> = Vec::with_capacity(partitions.len());
    let mut uploaded: Vec<String> = Vec::new();
    let mut first_db_batch = true;

    for (key, part) in partitions {
        let unique = dedupe(&sanitize(&key), &mut seen, None);
        let out_path = plan
            .output_dir
            .join(format!("{unique}{}", plan.output_format.extension()));
        ctx.progress.emit(
            "split_partition",
            json!({
                "key": key,
                "rows": part.len(),
                "output": out_path.display().to_string(),
            }),
        )?;

        if !plan.dry_run {
            write_partition(plan, ctx, &part, &out_path)?;
            match &plan.destination {
                None => {}
                Some(Destination::Cloud(cloud)) => {
                    if let Some(writer) = ctx.cloud_writer {
                        let object_key = render_cloud_key(&cloud.key, &unique);
                        let format = cloud.format.unwrap_or(plan.output_format);
                        let mut sink = writer.stream_object(&object_key, format)?;
                        sink.append(&part)?;
                        sink.finalize()?;
                        uploaded.push(object_key);
                    }
                }
                Some(Destination::Database(db)) => {
                    if let Some(writer) = ctx.table_writer {
                        let mode = if first_db_batch {
                            db.mode
                        } else {
                            DbWriteMode::Append
                        };
                        writer.write_frame(&part, &db.table, mode, &db.options, &db.uri)?;
                        first_db_batch = false;
                    }
                }
            }
        }
        outputs.push(out_path.display().to_string());
    }

    info!(
        partitions = outputs.len(),
        out_dir = %plan.output_dir.display(),
        "split sheet into one file per partition"
    );
    ctx.progress.emit(
        "split_complete",
        json!({
            "mode": plan.to.to_string(),
            "partitions": outputs.len(),
            "output": plan.output_dir.display().to_string(),
        }),
    )?;

    Ok(SplitReport {
        to: SplitTarget::Files.to_string(),
        sheets: None,
        count: Some(outputs.len()),
        outputs: Some(outputs),
        out: None,
        out_dir: Some(plan.output_dir.display().to_string()),
        by: key_name.to_string(),
        format: Some(plan.output_format.to_string()),
        dry_run: plan.dry_run,
        destination: plan.destination.as_ref().map(DestinationSummary::describe),
        uploaded: if uploaded.is_empty() {
            None
        } else {
            Some(uploaded)
        },
    })
}

fn write_partition(
    plan: &SplitPlan,
    ctx: &EngineContext<'_>,
    part: &Frame,
    out_path: &std::path::Path,
) -> Result<()> {
    match plan.output_format {
        OutputFormat::Xlsx => {
            ctx.writer
                .write_single_sheet(part, out_path, &plan.output_sheet_name)
        }
        OutputFormat::Csv => {
            let mut sink = Box::new(CsvRowSink::create(
                out_path,
                ctx.config.temp_dir.as_deref(),
                plan.csv_add_bom,
            )?);
            sink.append(part)?;
            sink.finalize()
        }
        OutputFormat::Parquet => {
            let mut sink = Box::new(ParquetRowSink::create(
                out_path,
                ctx.config.temp_dir.as_deref(),
            )?);
            sink.append(part)?;
            sink.finalize()
        }
    }
}
