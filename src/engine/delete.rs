//! Removes matching columns from sheets across one or more workbooks.
//!
//! The run is two-phase: every workbook is read and matched first, and only
//! once the missing-column policy is satisfied for the whole set do any
//! outputs get written. A strict run therefore either cleans everything or
//! touches nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::EngineContext;
use crate::error::{Result, WorkbookError};
use crate::model::Frame;
use crate::passwords::resolve_password;
use crate::plan::{DeleteSpec, DeleteTargets, NameMatchStrategy, OnMissing, SheetSpec};

/// Match results for one sheet of one workbook.
#[derive(Debug, Serialize)]
pub struct DeleteSheetOutcome {
    pub sheet: String,
    pub removed: Vec<String>,
    pub missing: Vec<String>,
    pub final_columns: Vec<String>,
}

/// Per-workbook entry of the delete report. `out` stays null in dry runs.
#[derive(Debug, Serialize)]
pub struct DeleteItem {
    pub path: String,
    pub out: Option<String>,
    pub sheets: Vec<DeleteSheetOutcome>,
}

/// Outcome of one delete run.
#[derive(Debug, Serialize)]
pub struct DeleteReport {
    pub updated: usize,
    pub items: Vec<DeleteItem>,
    pub removed_total: usize,
    pub missing_total: usize,
    pub dry_run: bool,
}

struct PendingWrite {
    out: PathBuf,
    sheets: Vec<(String, Frame)>,
}

/// Runs a delete spec against the context's reader and writer.
#[instrument(skip_all, fields(path = %spec.path.display()))]
pub fn delete_columns(spec: &DeleteSpec, ctx: &EngineContext<'_>) -> Result<DeleteReport> {
    let regexes = compile_patterns(spec)?;
    let paths = collect_paths(spec, ctx)?;
    ctx.progress.emit(
        "delete_start",
        json!({
            "path": spec.path.display().to_string(),
            "files": paths.len(),
            "dry_run": spec.dry_run,
        }),
    )?;

    let mut items: Vec<DeleteItem> = Vec::with_capacity(paths.len());
    let mut pending: Vec<PendingWrite> = Vec::new();
    let mut missing_records: Vec<String> = Vec::new();

    for path in &paths {
        ctx.progress.emit(
            "delete_workbook",
            json!({ "path": path.display().to_string() }),
        )?;
        let password = resolve_password(path, spec.password.as_deref(), spec.password_map.as_ref());
        let sheet_names = ctx.reader.sheet_names(path, password)?;
        let targets = plan_target_sheets(&sheet_names, spec);

        let mut cache: HashMap<String, Frame> = HashMap::new();
        let mut cleaned: HashMap<String, Frame> = HashMap::new();
        let mut per_sheet: Vec<DeleteSheetOutcome> = Vec::new();
        for (lookup, display) in &targets {
            let frame = match cache.get(display) {
                Some(frame) => frame.clone(),
                None => {
                    let frame = ctx.reader.read_sheet(path, lookup, password)?;
                    cache.insert(display.clone(), frame.clone());
                    frame
                }
            };
            let (removed, missing) = match_columns(&frame.columns, spec, &regexes);
            let new_frame = frame.without_columns(&removed);
            if spec.on_missing == OnMissing::Error && !missing.is_empty() {
                missing_records.push(format!(
                    "{}[{display}] missing {}",
                    path.display(),
                    missing.join(", ")
                ));
            }
            ctx.progress.emit(
                "delete_sheet",
                json!({
                    "path": path.display().to_string(),
                    "sheet": display,
                    "removed": removed,
                    "missing": missing,
                }),
            )?;
            per_sheet.push(DeleteSheetOutcome {
                sheet: display.clone(),
                removed,
                missing,
                final_columns: new_frame.columns.clone(),
            });
            cleaned.insert(display.clone(), new_frame);
        }

        let out = if spec.inplace {
            path.clone()
        } else {
            cleaned_out_path(path)
        };

        if !spec.dry_run && missing_records.is_empty() {
            let ordered = order_output_sheets(
                spec, ctx, path, password, &sheet_names, &targets, cache, cleaned,
            )?;
            pending.push(PendingWrite {
                out: out.clone(),
                sheets: ordered,
            });
        }

        items.push(DeleteItem {
            path: path.display().to_string(),
            out: if spec.dry_run {
                None
            } else {
                Some(out.display().to_string())
            },
            sheets: per_sheet,
        });
    }

    if !missing_records.is_empty() {
        return Err(WorkbookError::MissingColumns(missing_records.join("; ")));
    }

    for write in pending {
        ctx.writer.write_multi_sheets(&write.sheets, &write.out)?;
    }

    let removed_total = items
        .iter()
        .flat_map(|item| &item.sheets)
        .map(|s| s.removed.len())
        .sum();
    let missing_total = items
        .iter()
        .flat_map(|item| &item.sheets)
        .map(|s| s.missing.len())
        .sum();
    info!(
        updated = items.len(),
        removed_total, missing_total, "delete run complete"
    );
    ctx.progress.emit(
        "delete_complete",
        json!({
            "updated": items.len(),
            "removed_total": removed_total,
            "missing_total": missing_total,
        }),
    )?;

    Ok(DeleteReport {
        updated: items.len(),
        items,
        removed_total,
        missing_total,
        dry_run: spec.dry_run,
    })
}

fn compile_patterns(spec: &DeleteSpec) -> Result<Vec<Regex>> {
    let DeleteTargets::Names(names) = &spec.targets else {
        return Ok(Vec::new());
    };
    if spec.strategy != NameMatchStrategy::Regex {
        return Ok(Vec::new());
    }
    names
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .map_err(|err| WorkbookError::InvalidPattern(format!("{pattern}: {err}")))
        })
        .collect()
}

fn collect_paths(spec: &DeleteSpec, ctx: &EngineContext<'_>) -> Result<Vec<PathBuf>> {
    if spec.path.is_dir() {
        ctx.reader
            .iter_files(&spec.path, spec.glob.as_deref(), spec.recursive)
    } else {
        Ok(vec![spec.path.clone()])
    }
}

/// Pairs each targeted sheet's lookup spec with its display name.
fn plan_target_sheets(sheet_names: &[String], spec: &DeleteSpec) -> Vec<(SheetSpec, String)> {
    if sheet_names.is_empty() {
        return Vec::new();
    }
    if spec.all_sheets {
        return sheet_names
            .iter()
            .map(|name| (SheetSpec::Name(name.clone()), name.clone()))
            .collect();
    }
    match &spec.sheet_selector {
        None => {
            let first = sheet_names[0].clone();
            vec![(SheetSpec::Name(first.clone()), first)]
        }
        Some(SheetSpec::Index(index)) => {
            let display = sheet_names
                .get(*index)
                .cloned()
                .unwrap_or_else(|| index.to_string());
            vec![(SheetSpec::Index(*index), display)]
        }
        Some(SheetSpec::Name(name)) => {
            let cleaned = name.trim().to_string();
            vec![(SheetSpec::Name(cleaned.clone()), cleaned)]
        }
    }
}

/// Matches the delete targets against one header, returning the removal list
/// (first-match order, deduplicated) and the targets that matched nothing.
fn match_columns(
    columns: &[String],
    spec: &DeleteSpec,
    regexes: &[Regex],
) -> (Vec<String>, Vec<String>) {
    let normalized: Vec<String> = columns.iter().map(|c| c.trim().to_string()).collect();
    let mut to_remove: Vec<String> = Vec::new();
    let mut not_found: Vec<String> = Vec::new();

    match &spec.targets {
        DeleteTargets::Indexes(indexes) => {
            // 1-based positions
            for position in indexes {
                match position
                    .checked_sub(1)
                    .and_then(|pos| normalized.get(pos))
                {
                    Some(name) => to_remove.push(name.clone()),
                    None => not_found.push(position.to_string()),
                }
            }
        }
        DeleteTargets::Names(names) => {
            for (target_idx, target) in names.iter().enumerate() {
                let wanted = target.trim();
                let mut matched: Vec<String> = Vec::new();
                for column in &normalized {
                    let hit = match spec.strategy {
                        NameMatchStrategy::Exact => column == wanted,
                        NameMatchStrategy::CaseInsensitive => {
                            column.eq_ignore_ascii_case(wanted)
                        }
                        NameMatchStrategy::Contains => column.contains(wanted),
                        NameMatchStrategy::StartsWith => column.starts_with(wanted),
                        NameMatchStrategy::EndsWith => column.ends_with(wanted),
                        NameMatchStrategy::Regex => regexes
                            .get(target_idx)
                            .map(|re| re.is_match(column))
                            .unwrap_or(false),
                    };
                    if hit {
                        matched.push(column.clone());
                    }
                }
                if matched.is_empty() {
                    not_found.push(wanted.to_string());
                } else {
                    to_remove.extend(matched);
                }
            }
        }
    }

    let mut seen: Vec<String> = Vec::with_capacity(to_remove.len());
    for name in to_remove {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    (seen, not_found)
}

/// Builds the full sheet list for the output workbook in original order,
/// carrying untouched sheets forward when only some sheets were targeted.
#[allow(clippy::too_many_arguments)]
fn order_output_sheets(
    spec: &DeleteSpec,
    ctx: &EngineContext<'_>,
    path: &Path,
    password: Option<&str>,
    sheet_names: &[String],
    targets: &[(SheetSpec, String)],
    mut cache: HashMap<String, Frame>,
    mut cleaned: HashMap<String, Frame>,
) -> Result<Vec<(String, Frame)>> {
    if spec.all_sheets {
        let mut ordered = Vec::with_capacity(targets.len());
        for (_, display) in targets {
            if let Some(frame) = cleaned.remove(display) {
                ordered.push((display.clone(), frame));
            }
        }
        return Ok(ordered);
    }

    let mut ordered = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        if let Some(frame) = cleaned.remove(name) {
            ordered.push((name.clone(), frame));
        } else {
            let frame = match cache.remove(name) {
                Some(frame) => frame,
                None => ctx
                    .reader
                    .read_sheet(path, &SheetSpec::Name(name.clone()), password)?,
            };
            ordered.push((name.clone(), frame));
        }
    }
    // A selector targeting a sheet outside the workbook list still counts.
    for (_, display) in targets {
        if let Some(frame) = cleaned.remove(display) {
            ordered.push((display.clone(), frame));
        }
    }
    Ok(ordered)
}

fn cleaned_out_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.cleaned{extension}"))
}
