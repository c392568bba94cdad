use std::io::Write;

use tempfile::tempdir;
use workbook_tools::io::atomic::AtomicFile;
use workbook_tools::io::csv_sink::CsvRowSink;
use workbook_tools::io::parquet_sink::ParquetRowSink;
use workbook_tools::io::ports::{RowSink, TableWriter};
use workbook_tools::io::database::SqliteTableWriter;
use workbook_tools::model::{CellValue, Frame};
use workbook_tools::plan::DbWriteMode;

fn sample_frame() -> Frame {
    let mut frame = Frame::new(vec!["name".into(), "value".into()]);
    frame.push_row(vec![CellValue::Text("a".into()), CellValue::Number(1.0)]);
    frame.push_row(vec![CellValue::Text("b".into()), CellValue::Number(2.0)]);
    frame
}

#[test]
fn atomic_commit_renames_into_place() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("out.txt");

    let mut file = AtomicFile::create(&dest, None).expect("atomic file created");
    file.write_all(b"payload").expect("bytes written");
    assert!(!dest.exists());
    file.commit().expect("commit succeeded");

    assert_eq!(std::fs::read_to_string(&dest).expect("readable"), "payload");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("directory listing")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name() != "out.txt")
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn atomic_drop_without_commit_leaves_nothing() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("out.txt");

    {
        let mut file = AtomicFile::create(&dest, None).expect("atomic file created");
        file.write_all(b"partial").expect("bytes written");
    }

    assert!(!dest.exists());
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .expect("directory listing")
        .filter_map(|entry| entry.ok())
        .collect();
    assert!(entries.is_empty());
}

#[test]
fn csv_sink_writes_header_exactly_once() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("out.csv");

    let mut sink = Box::new(CsvRowSink::create(&dest, None, false).expect("sink created"));
    sink.append(&sample_frame()).expect("first batch");
    sink.append(&sample_frame()).expect("second batch");
    sink.finalize().expect("finalised");

    let text = std::fs::read_to_string(&dest).expect("readable");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "name,value");
    assert_eq!(lines[1], "a,1");
}

#[test]
fn csv_sink_empty_stream_commits_header_only_file() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("empty.csv");

    let mut sink = Box::new(CsvRowSink::create(&dest, None, false).expect("sink created"));
    sink.append(&Frame::new(vec!["name".into(), "value".into()]))
        .expect("empty batch");
    sink.finalize().expect("finalised");

    let text = std::fs::read_to_string(&dest).expect("readable");
    assert_eq!(text.trim_end(), "name,value");
}

#[test]
fn csv_sink_prefixes_a_utf8_bom_when_requested() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("bom.csv");

    let mut sink = Box::new(CsvRowSink::create(&dest, None, true).expect("sink created"));
    sink.append(&sample_frame()).expect("batch appended");
    sink.finalize().expect("finalised");

    let bytes = std::fs::read(&dest).expect("readable");
    assert_eq!(&bytes[..3], b"\xef\xbb\xbf");
    let text = String::from_utf8(bytes).expect("valid utf-8");
    assert_eq!(text.trim_start_matches('\u{feff}').lines().next(), Some("name,value"));

    let plain = dir.path().join("plain.csv");
    let mut sink = Box::new(CsvRowSink::create(&plain, None, false).expect("sink created"));
    sink.append(&sample_frame()).expect("batch appended");
    sink.finalize().expect("finalised");
    let bytes = std::fs::read(&plain).expect("readable");
    assert_ne!(&bytes[..3], b"\xef\xbb\xbf");
}

#[test]
fn csv_sink_abandoned_stream_writes_no_file() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("dropped.csv");

    {
        let mut sink = Box::new(CsvRowSink::create(&dest, None, false).expect("sink created"));
        sink.append(&sample_frame()).expect("batch appended");
    }

    assert!(!dest.exists());
}

#[test]
fn parquet_sink_round_trips_row_counts() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("out.parquet");

    let mut sink = Box::new(ParquetRowSink::create(&dest, None).expect("sink created"));
    sink.append(&sample_frame()).expect("batch appended");
    sink.finalize().expect("finalised");

    let file = std::fs::File::open(&dest).expect("parquet file opened");
    let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
        .expect("reader built")
        .build()
        .expect("reader ready");
    let rows: usize = reader.map(|batch| batch.expect("batch read").num_rows()).sum();
    assert_eq!(rows, 2);
}

#[test]
fn parquet_sink_empty_stream_still_commits_valid_file() {
    let dir = tempdir().expect("temporary directory");
    let dest = dir.path().join("empty.parquet");

    let sink = Box::new(ParquetRowSink::create(&dest, None).expect("sink created"));
    sink.finalize().expect("finalised");

    let file = std::fs::File::open(&dest).expect("parquet file opened");
    let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
        .expect("reader built")
        .build()
        .expect("reader ready");
    let rows: usize = reader.map(|batch| batch.expect("batch read").num_rows()).sum();
    assert_eq!(rows, 0);
}

#[test]
fn sqlite_writer_replace_then_append() {
    let dir = tempdir().expect("temporary directory");
    let db_path = dir.path().join("data.sqlite");
    let uri = db_path.display().to_string();
    let writer = SqliteTableWriter::new();
    let options = Default::default();

    writer
        .write_frame(&sample_frame(), "rows", DbWriteMode::Replace, &options, &uri)
        .expect("replace write");
    writer
        .write_frame(&sample_frame(), "rows", DbWriteMode::Append, &options, &uri)
        .expect("append write");
    writer
        .write_frame(&sample_frame(), "rows", DbWriteMode::Replace, &options, &uri)
        .expect("second replace");

    let connection = rusqlite::Connection::open(&db_path).expect("database opened");
    let count: i64 = connection
        .query_row("SELECT COUNT(*) FROM \"rows\"", [], |row| row.get(0))
        .expect("row count");
    assert_eq!(count, 2);
}
