//! Directory expansion for workbook inputs.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Result, WorkbookError};

/// Lists the files under `root` whose names match any of the comma-separated
/// glob `patterns`, descending into subdirectories when `recursive` is set.
///
/// A file `root` is returned as-is. Spreadsheet lock files (`~$` prefix) are
/// always skipped. Results are sorted for deterministic processing order.
pub fn iter_files(root: &Path, patterns: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let matcher = compile_patterns(patterns)?;
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries: Vec<fs::DirEntry> =
            fs::read_dir(&dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                if recursive {
                    pending.push(path);
                }
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("~$") {
                continue;
            }
            if matcher.is_match(&name) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn compile_patterns(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.split(',') {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        let glob = Glob::new(pattern).map_err(|err| {
            WorkbookError::Config(format!("invalid glob pattern '{pattern}': {err}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| WorkbookError::Config(format!("invalid glob patterns: {err}")))
}
