use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::tempdir;
use workbook_tools::WorkbookError;
use workbook_tools::config::Config;
use workbook_tools::engine::{EngineContext, combine, delete_columns, preview, split};
use workbook_tools::io::cloud::LocalCloudObjectWriter;
use workbook_tools::io::database::SqliteTableWriter;
use workbook_tools::io::excel::{ExcelReader, ExcelWriter};
use workbook_tools::io::ports::{WorkbookReader, WorkbookWriter};
use workbook_tools::model::{CellValue, Frame};
use workbook_tools::plan::{
    CloudDestination, ColumnRef, CombineMode, CombinePlan, DatabaseDestination, DbWriteMode,
    DeleteSpec, DeleteTargets, Destination, NameMatchStrategy, OnMissing, OutputFormat,
    PreviewPlan, SheetSelect, SheetSelector, SheetSpec, SplitPlan, SplitTarget,
};
use workbook_tools::progress::{ProgressBus, ProgressListener};

fn region_frame(rows: &[(&str, f64)]) -> Frame {
    let mut frame = Frame::new(vec!["Region".into(), "Amount".into()]);
    for (region, amount) in rows {
        frame.push_row(vec![
            CellValue::Text((*region).to_string()),
            CellValue::Number(*amount),
        ]);
    }
    frame
}

fn write_workbook(path: &Path, sheet: &str, frame: &Frame) {
    ExcelWriter::new(None)
        .write_single_sheet(frame, path, sheet)
        .expect("workbook written");
}

fn combine_plan(inputs: Vec<PathBuf>, output_path: PathBuf) -> CombinePlan {
    CombinePlan {
        inputs,
        glob: None,
        recursive: false,
        mode: CombineMode::OneSheet,
        include_sheets: SheetSelect::All,
        output_path,
        output_sheet_name: "Data".into(),
        add_source_column: false,
        password: None,
        password_map: None,
        output_format: OutputFormat::Xlsx,
        csv_add_bom: false,
        dry_run: false,
        destination: None,
    }
}

fn split_plan(input_file: PathBuf, output_dir: PathBuf) -> SplitPlan {
    SplitPlan {
        input_file,
        sheet: SheetSelector::Active,
        by_column: ColumnRef::Name("Region".into()),
        to: SplitTarget::Files,
        include_nan: false,
        output_dir,
        output_filename: None,
        output_sheet_name: "Data".into(),
        password: None,
        password_map: None,
        output_format: OutputFormat::Xlsx,
        csv_add_bom: false,
        dry_run: false,
        destination: None,
    }
}

fn delete_spec(path: PathBuf, targets: DeleteTargets) -> DeleteSpec {
    DeleteSpec {
        path,
        targets,
        strategy: NameMatchStrategy::Exact,
        all_sheets: false,
        sheet_selector: None,
        inplace: false,
        on_missing: OnMissing::Ignore,
        dry_run: false,
        glob: None,
        recursive: false,
        password: None,
        password_map: None,
    }
}

#[test]
fn combine_one_sheet_concatenates_rows_across_files() {
    let dir = tempdir().expect("temporary directory");
    let first = dir.path().join("north.xlsx");
    let second = dir.path().join("south.xlsx");
    write_workbook(&first, "Data", &region_frame(&[("North", 1.0), ("North", 2.0)]));
    write_workbook(&second, "Data", &region_frame(&[("South", 3.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out = dir.path().join("combined.xlsx");
    let mut plan = combine_plan(vec![first.clone(), second.clone()], out.clone());
    plan.add_source_column = true;
    let report = combine(&plan, &ctx).expect("combine succeeded");

    assert_eq!(report.rows, Some(3));
    assert_eq!(report.files, 2);
    assert!(!report.dry_run);

    let frame = reader
        .read_sheet(&out, &SheetSpec::Name("Data".into()), None)
        .expect("combined output readable");
    assert_eq!(frame.columns[0], "source_file");
    assert_eq!(frame.len(), 3);
}

#[test]
fn combine_multi_sheets_renames_colliding_sheet_names() {
    let dir = tempdir().expect("temporary directory");
    let first = dir.path().join("a.xlsx");
    let second = dir.path().join("b.xlsx");
    write_workbook(&first, "Data", &region_frame(&[("North", 1.0)]));
    write_workbook(&second, "Data", &region_frame(&[("South", 2.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out = dir.path().join("book.xlsx");
    let mut plan = combine_plan(vec![first, second], out.clone());
    plan.mode = CombineMode::MultiSheets;
    let report = combine(&plan, &ctx).expect("combine succeeded");

    assert_eq!(
        report.sheets,
        Some(vec!["Data".to_string(), "Data_2".to_string()])
    );
    let names = reader.sheet_names(&out, None).expect("output readable");
    assert_eq!(names, vec!["Data".to_string(), "Data_2".to_string()]);
}

#[test]
fn combine_dry_run_counts_without_writing() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("in.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0), ("South", 2.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out = dir.path().join("combined.xlsx");
    let mut plan = combine_plan(vec![input], out.clone());
    plan.dry_run = true;
    let report = combine(&plan, &ctx).expect("dry run succeeded");

    assert_eq!(report.rows, Some(2));
    assert!(report.dry_run);
    assert!(!out.exists());
}

#[test]
fn combine_routes_rows_to_database_destination() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("in.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0), ("South", 2.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let table_writer = SqliteTableWriter::new();
    let ctx =
        EngineContext::new(&reader, &writer, &config, &progress).with_table_writer(&table_writer);

    let db_path = dir.path().join("sales.sqlite");
    let mut plan = combine_plan(vec![input], dir.path().join("combined.xlsx"));
    plan.destination = Some(Destination::Database(DatabaseDestination {
        uri: db_path.display().to_string(),
        table: "sales".into(),
        mode: DbWriteMode::Replace,
        options: Default::default(),
    }));
    combine(&plan, &ctx).expect("combine succeeded");

    let connection = rusqlite::Connection::open(&db_path).expect("database opened");
    let count: i64 = connection
        .query_row("SELECT COUNT(*) FROM \"sales\"", [], |row| row.get(0))
        .expect("row count");
    assert_eq!(count, 2);
}

#[test]
fn split_to_sheets_sanitises_and_dedupes_partition_names() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("keys.xlsx");
    write_workbook(
        &input,
        "Data",
        &region_frame(&[("A/B", 1.0), ("A:B", 2.0), ("A/B", 3.0)]),
    );

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let mut plan = split_plan(input.clone(), dir.path().to_path_buf());
    plan.to = SplitTarget::Sheets;
    let report = split(&plan, &ctx).expect("split succeeded");

    assert_eq!(
        report.sheets,
        Some(vec!["A_B".to_string(), "A_B_2".to_string()])
    );
    let out = dir.path().join("keys_split.xlsx");
    assert_eq!(report.out, Some(out.display().to_string()));
    let names = reader.sheet_names(&out, None).expect("output readable");
    assert_eq!(names, vec!["A_B".to_string(), "A_B_2".to_string()]);

    let first = reader
        .read_sheet(&out, &SheetSpec::Name("A_B".into()), None)
        .expect("partition readable");
    assert_eq!(first.len(), 2);
}

#[test]
fn split_to_files_writes_one_file_per_key() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("sales.xlsx");
    let mut frame = region_frame(&[("North", 1.0), ("South", 2.0), ("North", 3.0)]);
    frame.push_row(vec![CellValue::Empty, CellValue::Number(4.0)]);
    write_workbook(&input, "Data", &frame);

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out_dir = dir.path().join("parts");
    let plan = split_plan(input.clone(), out_dir.clone());
    let report = split(&plan, &ctx).expect("split succeeded");

    assert_eq!(report.count, Some(2));
    assert!(out_dir.join("North.xlsx").exists());
    assert!(out_dir.join("South.xlsx").exists());
    assert!(!out_dir.join("NaN.xlsx").exists());

    let north = reader
        .read_sheet(&out_dir.join("North.xlsx"), &SheetSpec::Index(0), None)
        .expect("partition readable");
    assert_eq!(north.len(), 2);
}

#[test]
fn split_include_nan_groups_blank_keys() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("sales.xlsx");
    let mut frame = region_frame(&[("North", 1.0)]);
    frame.push_row(vec![CellValue::Empty, CellValue::Number(2.0)]);
    write_workbook(&input, "Data", &frame);

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out_dir = dir.path().join("parts");
    let mut plan = split_plan(input, out_dir.clone());
    plan.include_nan = true;
    let report = split(&plan, &ctx).expect("split succeeded");

    assert_eq!(report.count, Some(2));
    assert!(out_dir.join("NaN.xlsx").exists());
}

#[test]
fn split_uploads_partitions_to_cloud_destination() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("sales.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0), ("South", 2.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let bucket = dir.path().join("bucket");
    let cloud_writer = LocalCloudObjectWriter::new(bucket.clone(), None, "Data");
    let ctx =
        EngineContext::new(&reader, &writer, &config, &progress).with_cloud_writer(&cloud_writer);

    let mut plan = split_plan(input, dir.path().join("parts"));
    plan.destination = Some(Destination::Cloud(CloudDestination {
        root: bucket.clone(),
        key: "exports/{name}.csv".into(),
        format: Some(OutputFormat::Csv),
        options: Default::default(),
    }));
    let report = split(&plan, &ctx).expect("split succeeded");

    assert_eq!(
        report.uploaded,
        Some(vec![
            "exports/North.csv".to_string(),
            "exports/South.csv".to_string()
        ])
    );
    assert!(bucket.join("exports/North.csv").exists());
    assert!(bucket.join("exports/South.csv").exists());
}

#[test]
fn split_unknown_column_is_a_configuration_error() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("sales.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let mut plan = split_plan(input, dir.path().join("parts"));
    plan.by_column = ColumnRef::Name("Nope".into());
    let err = split(&plan, &ctx).expect_err("split should fail");
    assert!(matches!(err, WorkbookError::Config(_)));
}

#[test]
fn delete_ignore_policy_reports_missing_and_writes_cleaned_copy() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("report.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let spec = delete_spec(
        input.clone(),
        DeleteTargets::Names(vec!["Amount".into(), "Zed".into()]),
    );
    let report = delete_columns(&spec, &ctx).expect("delete succeeded");

    assert_eq!(report.removed_total, 1);
    assert_eq!(report.missing_total, 1);
    let cleaned = dir.path().join("report.cleaned.xlsx");
    assert!(cleaned.exists());
    let frame = reader
        .read_sheet(&cleaned, &SheetSpec::Index(0), None)
        .expect("cleaned output readable");
    assert_eq!(frame.columns, vec!["Region".to_string()]);
}

#[test]
fn delete_error_policy_blocks_every_write() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("report.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let mut spec = delete_spec(input.clone(), DeleteTargets::Names(vec!["Zed".into()]));
    spec.on_missing = OnMissing::Error;
    let err = delete_columns(&spec, &ctx).expect_err("delete should fail");
    assert!(matches!(err, WorkbookError::MissingColumns(_)));
    assert!(!dir.path().join("report.cleaned.xlsx").exists());
}

#[test]
fn delete_dry_run_reports_matches_without_writing() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("report.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let mut spec = delete_spec(input.clone(), DeleteTargets::Names(vec!["Amount".into()]));
    spec.dry_run = true;
    let report = delete_columns(&spec, &ctx).expect("dry run succeeded");

    assert!(report.dry_run);
    assert_eq!(report.removed_total, 1);
    assert_eq!(report.items[0].out, None);
    assert!(!dir.path().join("report.cleaned.xlsx").exists());

    let untouched = reader
        .read_sheet(&input, &SheetSpec::Index(0), None)
        .expect("input readable");
    assert_eq!(
        untouched.columns,
        vec!["Region".to_string(), "Amount".to_string()]
    );
}

#[test]
fn delete_index_targets_are_one_based() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("report.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let spec = delete_spec(input.clone(), DeleteTargets::Indexes(vec![1]));
    let report = delete_columns(&spec, &ctx).expect("delete succeeded");

    assert_eq!(report.items[0].sheets[0].removed, vec!["Region".to_string()]);
    let cleaned = dir.path().join("report.cleaned.xlsx");
    let frame = reader
        .read_sheet(&cleaned, &SheetSpec::Index(0), None)
        .expect("cleaned output readable");
    assert_eq!(frame.columns, vec!["Amount".to_string()]);
}

#[test]
fn delete_carries_untouched_sheets_forward() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("multi.xlsx");
    ExcelWriter::new(None)
        .write_multi_sheets(
            &[
                ("First".to_string(), region_frame(&[("North", 1.0)])),
                ("Second".to_string(), region_frame(&[("South", 2.0)])),
            ],
            &input,
        )
        .expect("workbook written");

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let mut spec = delete_spec(input.clone(), DeleteTargets::Names(vec!["Amount".into()]));
    spec.sheet_selector = Some(SheetSpec::Name("First".into()));
    delete_columns(&spec, &ctx).expect("delete succeeded");

    let cleaned = dir.path().join("multi.cleaned.xlsx");
    let names = reader.sheet_names(&cleaned, None).expect("output readable");
    assert_eq!(names, vec!["First".to_string(), "Second".to_string()]);
    let second = reader
        .read_sheet(&cleaned, &SheetSpec::Name("Second".into()), None)
        .expect("untouched sheet readable");
    assert_eq!(
        second.columns,
        vec!["Region".to_string(), "Amount".to_string()]
    );
}

#[test]
fn preview_reports_counts_and_sample_rows() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("book.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0), ("South", 2.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let plan = PreviewPlan {
        path: input,
        password: None,
        password_map: None,
        limit: Some(1),
    };
    let report = preview(&plan, &ctx).expect("preview succeeded");

    assert_eq!(report.sheets.len(), 1);
    let sheet = &report.sheets[0];
    assert_eq!(sheet.rows, 2);
    assert_eq!(sheet.columns, 2);
    assert_eq!(
        sheet.headers,
        vec!["Region".to_string(), "Amount".to_string()]
    );
    let sample = sheet.sample.as_ref().expect("sample rows present");
    assert_eq!(sample.len(), 1);
    assert_eq!(sample[0]["Region"], serde_json::json!("North"));
}

struct Recorder(Rc<RefCell<Vec<String>>>);

impl ProgressListener for Recorder {
    fn on_event(&self, event: &str, _payload: &serde_json::Value) -> workbook_tools::Result<()> {
        self.0.borrow_mut().push(event.to_string());
        Ok(())
    }
}

#[test]
fn progress_listeners_receive_lifecycle_events_in_order() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("in.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut progress = ProgressBus::new();
    progress.subscribe(Box::new(Recorder(events.clone())));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let plan = combine_plan(vec![input], dir.path().join("combined.xlsx"));
    combine(&plan, &ctx).expect("combine succeeded");

    let seen = events.borrow();
    assert_eq!(seen.first().map(String::as_str), Some("combine_start"));
    assert_eq!(seen.last().map(String::as_str), Some("combine_complete"));
    assert!(seen.iter().any(|e| e == "combine_file"));
    assert!(seen.iter().any(|e| e == "combine_sheet"));
}

struct Refuser;

impl ProgressListener for Refuser {
    fn on_event(&self, _event: &str, _payload: &serde_json::Value) -> workbook_tools::Result<()> {
        Err(WorkbookError::Config("listener gave up".into()))
    }
}

#[test]
fn failing_progress_listener_aborts_the_operation() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("in.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let mut progress = ProgressBus::new();
    progress.subscribe(Box::new(Refuser));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out = dir.path().join("combined.xlsx");
    let plan = combine_plan(vec![input], out.clone());
    let err = combine(&plan, &ctx).expect_err("combine should abort");
    assert!(matches!(err, WorkbookError::Config(_)));
    assert!(!out.exists());
}

#[test]
fn split_csv_outputs_carry_a_bom_when_asked() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("sales.xlsx");
    write_workbook(&input, "Data", &region_frame(&[("North", 1.0)]));

    let reader = ExcelReader::new("*.xlsx");
    let writer = ExcelWriter::new(None);
    let config = Config::default();
    let progress = ProgressBus::new();
    let ctx = EngineContext::new(&reader, &writer, &config, &progress);

    let out_dir = dir.path().join("parts");
    let mut plan = split_plan(input, out_dir.clone());
    plan.output_format = OutputFormat::Csv;
    plan.csv_add_bom = true;
    split(&plan, &ctx).expect("split succeeded");

    let bytes = std::fs::read(out_dir.join("North.csv")).expect("partition readable");
    assert_eq!(&bytes[..3], b"\xef\xbb\xbf");
}
