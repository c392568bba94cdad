//! Merges many workbooks into one table or one workbook of sheets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::EngineContext;
use crate::engine::route::{DestinationRouter, DestinationSummary};
use crate::error::{Result, WorkbookError};
use crate::io::csv_sink::CsvRowSink;
use crate::io::parquet_sink::ParquetRowSink;
use crate::io::ports::{NullSink, RowSink, SheetSink, WorkbookReader};
use crate::model::CellValue;
use crate::naming::{MAX_SHEET_NAME, dedupe, sanitize};
use crate::passwords::resolve_password;
use crate::plan::{CombineMode, CombinePlan, OutputFormat, SheetSelect, SheetSpec};

/// Outcome of one combine run.
#[derive(Debug, Serialize)]
pub struct CombineReport {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    pub files: usize,
    pub out: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationSummary>,
}

/// Runs a combine plan against the context's reader and writer.
#[instrument(skip_all, fields(mode = %plan.mode))]
pub fn combine(plan: &CombinePlan, ctx: &EngineContext<'_>) -> Result<CombineReport> {
    plan.validate()?;
    let files = expand_inputs(plan, ctx.reader)?;
    ctx.progress.emit(
        "combine_start",
        json!({
            "mode": plan.mode.to_string(),
            "files": files.len(),
            "out": plan.output_path.display().to_string(),
            "dry_run": plan.dry_run,
        }),
    )?;

    match plan.mode {
        CombineMode::OneSheet => combine_one_sheet(plan, ctx, &files),
        CombineMode::MultiSheets => combine_multi_sheets(plan, ctx, &files),
    }
}

fn combine_one_sheet(
    plan: &CombinePlan,
    ctx: &EngineContext<'_>,
    files: &[PathBuf],
) -> Result<CombineReport> {
    let mut router = DestinationRouter::open(
        plan.destination.as_ref(),
        ctx.table_writer,
        ctx.cloud_writer,
        plan.output_format,
        plan.dry_run,
    )?;
    let mut sink = open_primary_sink(plan, ctx)?;

    let mut rows = 0usize;
    for file in files {
        let password = resolve_password(file, plan.password.as_deref(), plan.password_map.as_ref());
        let sheets = resolve_sheets(ctx.reader, file, &plan.include_sheets, password)?;
        ctx.progress.emit(
            "combine_file",
            json!({
                "file": file.display().to_string(),
                "sheets": sheets.len(),
            }),
        )?;
        for sheet in &sheets {
            let mut frame =
                ctx.reader
                    .read_sheet(file, &SheetSpec::Name(sheet.clone()), password)?;
            if plan.add_source_column {
                frame.insert_column(0, "source_file", CellValue::Text(file.display().to_string()));
            }
            rows += frame.len();
            sink.append(&frame)?;
            router.route(&frame)?;
            ctx.progress.emit(
                "combine_sheet",
                json!({
                    "file": file.display().to_string(),
                    "sheet": sheet,
                    "rows": frame.len(),
                }),
            )?;
        }
    }

    sink.finalize()?;
    let destination = router.finish()?;
    info!(rows, files = files.len(), "combined workbooks into one table");
    ctx.progress.emit(
        "combine_complete",
        json!({ "rows": rows, "files": files.len() }),
    )?;

    Ok(CombineReport {
        mode: CombineMode::OneSheet.to_string(),
        rows: Some(rows),
        sheets: None,
        files: files.len(),
        out: plan.output_path.display().to_string(),
        format: Some(plan.output_format.to_string()),
        dry_run: plan.dry_run,
        destination,
    })
}

fn combine_multi_sheets(
    plan: &CombinePlan,
    ctx: &EngineContext<'_>,
    files: &[PathBuf],
) -> Result<CombineReport> {
    let mut sink: Option<Box<dyn SheetSink>> = if plan.dry_run {
        None
    } else {
        Some(ctx.writer.stream_multi_sheets(&plan.output_path)?)
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut names: Vec<String> = Vec::new();
    for file in files {
        let password = resolve_password(file, plan.password.as_deref(), plan.password_map.as_ref());
        let sheets = resolve_sheets(ctx.reader, file, &plan.include_sheets, password)?;
        ctx.progress.emit(
            "combine_file",
            json!({
                "file": file.display().to_string(),
                "sheets": sheets.len(),
            }),
        )?;
        for sheet in &sheets {
            let mut frame =
                ctx.reader
                    .read_sheet(file, &SheetSpec::Name(sheet.clone()), password)?;
            if plan.add_source_column {
                frame.insert_column(0, "source_file", CellValue::Text(file.display().to_string()));
            }
            let name = dedupe(&sanitize(sheet), &mut seen, Some(MAX_SHEET_NAME));
            if let Some(sink) = sink.as_mut() {
                sink.append(&name, &frame)?;
            }
            ctx.progress.emit(
                "combine_sheet",
                json!({
                    "file": file.display().to_string(),
                    "sheet": sheet,
                    "rows": frame.len(),
                    "output": name,
                }),
            )?;
            names.push(name);
        }
    }

    if let Some(sink) = sink.take() {
        sink.finalize()?;
    }
    info!(
        sheets = names.len(),
        files = files.len(),
        "combined workbooks into one multi-sheet output"
    );
    ctx.progress.emit(
        "combine_complete",
        json!({ "sheets": names.len(), "files": files.len() }),
    )?;

    Ok(CombineReport {
        mode: CombineMode::MultiSheets.to_string(),
        rows: None,
        sheets: Some(names),
        files: files.len(),
        out: plan.output_path.display().to_string(),
        format: None,
        dry_run: plan.dry_run,
        destination: None,
    })
}

fn open_primary_sink(plan: &CombinePlan, ctx: &EngineContext<'_>) -> Result<Box<dyn RowSink>> {
    if plan.dry_run {
        return Ok(Box::new(NullSink));
    }
    match plan.output_format {
        OutputFormat::Xlsx => ctx
            .writer
            .stream_single_sheet(&plan.output_path, &plan.output_sheet_name),
        OutputFormat::Csv => Ok(Box::new(CsvRowSink::create(
            &plan.output_path,
            ctx.config.temp_dir.as_deref(),
            plan.csv_add_bom,
        )?)),
        OutputFormat::Parquet => Ok(Box::new(ParquetRowSink::create(
            &plan.output_path,
            ctx.config.temp_dir.as_deref(),
        )?)),
    }
}

/// Expands plan inputs into workbook paths: directories honour the glob and
/// recursion settings, lock files (`~$` prefix) are dropped.
fn expand_inputs(plan: &CombinePlan, reader: &dyn WorkbookReader) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for item in &plan.inputs {
        let lock_file = item
            .file_name()
            .map(|name| name.to_string_lossy().starts_with("~$"))
            .unwrap_or(false);
        if lock_file {
            continue;
        }
        if item.is_dir() {
            files.extend(reader.iter_files(item, plan.glob.as_deref(), plan.recursive)?);
        } else {
            files.push(item.clone());
        }
    }
    Ok(files)
}

/// Resolves the sheet selection into concrete sheet names, fetching the
/// workbook's sheet list only when positions need translating.
fn resolve_sheets(
    reader: &dyn WorkbookReader,
    path: &Path,
    include: &SheetSelect,
    password: Option<&str>,
) -> Result<Vec<String>> {
    match include {
        SheetSelect::All => reader.sheet_names(path, password),
        SheetSelect::Sheets(specs) => {
            let needs_lookup = specs.iter().any(|s| matches!(s, SheetSpec::Index(_)));
            let all = if needs_lookup {
                reader.sheet_names(path, password)?
            } else {
                Vec::new()
            };
            let mut resolved = Vec::with_capacity(specs.len());
            for spec in specs {
                match spec {
                    SheetSpec::Name(name) => resolved.push(name.clone()),
                    SheetSpec::Index(index) => {
                        let name = all.get(*index).cloned().ok_or_else(|| {
                            WorkbookError::SheetNotFound(format!(
                                "#{index} in {}",
                                path.display()
                            ))
                        })?;
                        resolved.push(name);
                    }
                }
            }
            Ok(resolved)
        }
    }
}
