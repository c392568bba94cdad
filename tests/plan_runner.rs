use std::path::Path;

use tempfile::tempdir;
use workbook_tools::WorkbookError;
use workbook_tools::config::Config;
use workbook_tools::io::excel::{ExcelReader, ExcelWriter};
use workbook_tools::io::ports::{WorkbookReader, WorkbookWriter};
use workbook_tools::model::{CellValue, Frame};
use workbook_tools::plan::SheetSpec;
use workbook_tools::progress::ProgressBus;
use workbook_tools::runner::{execute_plan, load_plan_file};

fn sample_frame() -> Frame {
    let mut frame = Frame::new(vec!["Region".into(), "Amount".into()]);
    frame.push_row(vec![CellValue::Text("North".into()), CellValue::Number(1.0)]);
    frame.push_row(vec![CellValue::Text("South".into()), CellValue::Number(2.0)]);
    frame
}

fn write_workbook(path: &Path) {
    ExcelWriter::new(None)
        .write_single_sheet(&sample_frame(), path, "Data")
        .expect("workbook written");
}

#[test]
fn json_plan_resolves_paths_against_the_plan_directory() {
    let dir = tempdir().expect("temporary directory");
    write_workbook(&dir.path().join("input.xlsx"));
    let plan_path = dir.path().join("plan.json");
    std::fs::write(
        &plan_path,
        r#"[
            {
                "type": "combine",
                "name": "merge",
                "inputs": ["input.xlsx"],
                "output_path": "combined.xlsx",
                "add_source_column": true
            }
        ]"#,
    )
    .expect("plan written");

    let operations = load_plan_file(&plan_path).expect("plan loaded");
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].plan.kind(), "combine");
    assert_eq!(operations[0].name.as_deref(), Some("merge"));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let outcomes =
        execute_plan(&operations, &reader, &writer, &config, &progress).expect("plan executed");

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].kind, "combine");
    assert_eq!(outcomes[0].result["rows"], serde_json::json!(2));

    let out = dir.path().join("combined.xlsx");
    let frame = reader
        .read_sheet(&out, &SheetSpec::Name("Data".into()), None)
        .expect("combined output readable");
    assert_eq!(frame.columns[0], "source_file");
    assert_eq!(frame.len(), 2);
}

#[test]
fn yaml_plan_supports_operations_blocks_and_dry_runs() {
    let dir = tempdir().expect("temporary directory");
    write_workbook(&dir.path().join("input.xlsx"));
    let plan_path = dir.path().join("plan.yaml");
    std::fs::write(
        &plan_path,
        concat!(
            "operations:\n",
            "  - type: split\n",
            "    name: by-region\n",
            "    options:\n",
            "      input: input.xlsx\n",
            "      by: Region\n",
            "      to: files\n",
            "      output_dir: parts\n",
            "      dry_run: true\n",
        ),
    )
    .expect("plan written");

    let operations = load_plan_file(&plan_path).expect("plan loaded");
    assert_eq!(operations[0].plan.kind(), "split");

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let outcomes =
        execute_plan(&operations, &reader, &writer, &config, &progress).expect("plan executed");

    assert_eq!(outcomes[0].result["count"], serde_json::json!(2));
    assert_eq!(outcomes[0].result["dry_run"], serde_json::json!(true));
    assert!(!dir.path().join("parts").join("North.xlsx").exists());
}

#[test]
fn plan_runs_delete_and_preview_operations() {
    let dir = tempdir().expect("temporary directory");
    write_workbook(&dir.path().join("input.xlsx"));
    let plan_path = dir.path().join("plan.json");
    std::fs::write(
        &plan_path,
        r#"{
            "operations": [
                {
                    "type": "delete",
                    "path": "input.xlsx",
                    "targets": ["Amount"]
                },
                {
                    "type": "preview",
                    "path": "input.xlsx",
                    "limit": 1
                }
            ]
        }"#,
    )
    .expect("plan written");

    let operations = load_plan_file(&plan_path).expect("plan loaded");
    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let outcomes =
        execute_plan(&operations, &reader, &writer, &config, &progress).expect("plan executed");

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result["removed_total"], serde_json::json!(1));
    assert!(dir.path().join("input.cleaned.xlsx").exists());
    assert_eq!(
        outcomes[1].result["sheets"][0]["rows"],
        serde_json::json!(2)
    );
}

#[test]
fn unknown_operation_types_are_rejected() {
    let dir = tempdir().expect("temporary directory");
    let plan_path = dir.path().join("plan.json");
    std::fs::write(&plan_path, r#"[{"type": "transmogrify"}]"#).expect("plan written");

    let err = load_plan_file(&plan_path).expect_err("plan should fail");
    assert!(matches!(err, WorkbookError::Config(_)));
}

#[test]
fn missing_plan_files_are_a_configuration_error() {
    let err = load_plan_file(Path::new("/nonexistent/plan.json")).expect_err("plan should fail");
    assert!(matches!(err, WorkbookError::Config(_)));
}

#[test]
fn combine_without_inputs_is_rejected() {
    let dir = tempdir().expect("temporary directory");
    let plan_path = dir.path().join("plan.json");
    std::fs::write(&plan_path, r#"[{"type": "combine"}]"#).expect("plan written");

    let err = load_plan_file(&plan_path).expect_err("plan should fail");
    assert!(matches!(err, WorkbookError::Config(_)));
}

#[test]
fn inline_password_maps_are_parsed() {
    let dir = tempdir().expect("temporary directory");
    write_workbook(&dir.path().join("input.xlsx"));
    let plan_path = dir.path().join("plan.json");
    std::fs::write(
        &plan_path,
        r#"[
            {
                "type": "preview",
                "path": "input.xlsx",
                "password_map": {"input.xlsx": "secret"}
            }
        ]"#,
    )
    .expect("plan written");

    let operations = load_plan_file(&plan_path).expect("plan loaded");
    assert_eq!(operations[0].plan.kind(), "preview");
}
