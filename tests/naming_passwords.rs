use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tempfile::tempdir;
use workbook_tools::naming::{MAX_SHEET_NAME, dedupe, sanitize};
use workbook_tools::passwords::{load_password_map, resolve_password};

#[test]
fn sanitize_replaces_illegal_characters_and_caps_length() {
    assert_eq!(sanitize("Q1: North/South"), "Q1_ North_South");
    let long = "x".repeat(50);
    assert_eq!(sanitize(&long).chars().count(), MAX_SHEET_NAME);
    assert_eq!(sanitize("  spaced   out  "), "spaced out");
}

#[test]
fn sanitize_falls_back_for_degenerate_input() {
    assert_eq!(sanitize(""), "Empty");
    assert_eq!(sanitize("   "), "Empty");
    assert_eq!(sanitize("___"), "Sheet");
}

#[test]
fn dedupe_appends_counters_within_the_length_limit() {
    let mut seen = HashSet::new();
    let base = "y".repeat(MAX_SHEET_NAME);
    let first = dedupe(&base, &mut seen, Some(MAX_SHEET_NAME));
    let second = dedupe(&base, &mut seen, Some(MAX_SHEET_NAME));
    let third = dedupe(&base, &mut seen, Some(MAX_SHEET_NAME));

    assert_eq!(first, base);
    assert_ne!(second, first);
    assert_ne!(third, second);
    assert!(second.ends_with("_2"));
    assert!(third.ends_with("_3"));
    assert!(second.chars().count() <= MAX_SHEET_NAME);
    assert!(third.chars().count() <= MAX_SHEET_NAME);
}

#[test]
fn dedupe_without_limit_keeps_the_full_base() {
    let mut seen = HashSet::new();
    let base = "z".repeat(40);
    assert_eq!(dedupe(&base, &mut seen, None), base);
    assert_eq!(dedupe(&base, &mut seen, None), format!("{base}_2"));
}

#[test]
fn resolve_password_prefers_map_entries_over_default() {
    let mut map = BTreeMap::new();
    map.insert("reports/q1.xlsx".to_string(), "mapped".to_string());
    let found = resolve_password(Path::new("reports/q1.xlsx"), Some("fallback"), Some(&map));
    assert_eq!(found, Some("mapped"));
}

#[test]
fn resolve_password_matches_bare_file_names() {
    let mut map = BTreeMap::new();
    map.insert("q1.xlsx".to_string(), "by-name".to_string());
    let found = resolve_password(
        Path::new("/data/reports/q1.xlsx"),
        Some("fallback"),
        Some(&map),
    );
    assert_eq!(found, Some("by-name"));
}

#[test]
fn resolve_password_falls_back_to_default() {
    let map = BTreeMap::from([("other.xlsx".to_string(), "nope".to_string())]);
    let found = resolve_password(Path::new("q1.xlsx"), Some("fallback"), Some(&map));
    assert_eq!(found, Some("fallback"));
    let none = resolve_password(Path::new("q1.xlsx"), None, Some(&map));
    assert_eq!(none, None);
}

#[test]
fn load_password_map_reads_json_objects() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("passwords.json");
    std::fs::write(&path, r#"{"a.xlsx": "alpha", "b.xlsx": "beta"}"#).expect("map written");

    let map = load_password_map(&path).expect("map loaded");
    assert_eq!(map.get("a.xlsx").map(String::as_str), Some("alpha"));
    assert_eq!(map.len(), 2);
}

#[test]
fn load_password_map_reads_csv_with_case_insensitive_headers() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("passwords.csv");
    std::fs::write(&path, "Path,Extra,PASSWORD\na.xlsx,ignored,alpha\n,x,skipped\n")
        .expect("map written");

    let map = load_password_map(&path).expect("map loaded");
    assert_eq!(map.get("a.xlsx").map(String::as_str), Some("alpha"));
    assert_eq!(map.len(), 1);
}

#[test]
fn load_password_map_rejects_unknown_formats() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("passwords.txt");
    std::fs::write(&path, "whatever").expect("file written");
    assert!(load_password_map(&path).is_err());
}
