//! Password resolution and password-map loading.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, WorkbookError};

/// Picks the password for `path` from an explicit default or a path → password
/// map.
///
/// With a map, the first matching candidate wins: the raw path string, its
/// normalised display form, the absolute resolved path, then the bare file
/// name. Without a match (or without a map) the default applies.
pub fn resolve_password<'a>(
    path: &Path,
    default: Option<&'a str>,
    map: Option<&'a BTreeMap<String, String>>,
) -> Option<&'a str> {
    let Some(map) = map else {
        return default;
    };
    if map.is_empty() {
        return default;
    }

    let mut candidates: Vec<String> = Vec::with_capacity(4);
    candidates.push(path.to_string_lossy().into_owned());
    candidates.push(path.display().to_string());
    if let Ok(resolved) = std::fs::canonicalize(path) {
        candidates.push(resolved.to_string_lossy().into_owned());
    }
    if let Some(name) = path.file_name() {
        candidates.push(name.to_string_lossy().into_owned());
    }

    let mut seen: Vec<&str> = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        if seen.contains(&candidate.as_str()) {
            continue;
        }
        seen.push(candidate);
        if let Some(password) = map.get(candidate) {
            return Some(password);
        }
    }
    default
}

/// Loads a password map from a `.json` object file or a CSV with `path` and
/// `password` columns (header matched case-insensitively, extra columns
/// ignored).
pub fn load_password_map(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Err(WorkbookError::Config(format!(
            "password map file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if extension == "json" {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
            WorkbookError::Config(format!("failed to parse password map JSON: {err}"))
        })?;
        let object = value.as_object().ok_or_else(|| {
            WorkbookError::Config(
                "password map JSON must be an object mapping paths to passwords".into(),
            )
        })?;
        let mut map = BTreeMap::new();
        for (key, raw) in object {
            let password = match raw {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            map.insert(key.clone(), password);
        }
        return Ok(map);
    }

    if extension == "csv" {
        return load_csv_map(path);
    }

    Err(WorkbookError::Config(format!(
        "unsupported password map format '{}': use .json or .csv",
        path.display()
    )))
}

fn load_csv_map(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| {
        WorkbookError::Config(format!("failed to read password map CSV: {err}"))
    })?;

    let headers = reader
        .headers()
        .map_err(|err| WorkbookError::Config(format!("failed to parse password CSV: {err}")))?
        .clone();
    let lowered: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let path_idx = lowered.iter().position(|h| h == "path");
    let password_idx = lowered.iter().position(|h| h == "password");
    let (Some(path_idx), Some(password_idx)) = (path_idx, password_idx) else {
        return Err(WorkbookError::Config(
            "password CSV must include 'path' and 'password' columns".into(),
        ));
    };

    let mut map = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|err| {
            WorkbookError::Config(format!("failed to parse password CSV: {err}"))
        })?;
        let key = record.get(path_idx).unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }
        let value = record.get(password_idx).unwrap_or("");
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}
