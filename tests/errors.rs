use anyhow::Result;
use flatrecord::accumulator::error_file_for;
use flatrecord::{
    ConnectionSpec, ConversionPolicy, ErrorMode, ErrorRecord, FieldSpec, FieldType,
    FlatFileError, FlatFileWriter, RecordFault, Row, Schema, Value, read_all, write_rows,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn orders() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        FieldSpec::new("Id", FieldType::Int),
        FieldSpec::string("Item"),
        FieldSpec::new("Qty", FieldType::Int).with_default("1"),
    ]))
}

const ORDERS: &str = "\
1,apple,3
2,pear,lots
3,plum
4,fig,2
5,kiwi,two
6,lime,5,extra
7,date,1
";

fn write_orders(dir: &Path) -> Result<std::path::PathBuf> {
    let path = dir.join("orders.csv");
    fs::write(&path, ORDERS)?;
    Ok(path)
}

fn read_artifact(path: &Path) -> Result<Vec<ErrorRecord>> {
    let mut rdr = csv::Reader::from_path(path)?;
    Ok(rdr.deserialize().collect::<Result<Vec<ErrorRecord>, _>>()?)
}

#[test]
fn save_mode_tolerates_exactly_the_limit_then_aborts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_orders(dir.path())?;
    let conn = ConnectionSpec::new(&path).with_error_mode(ErrorMode::Save, 2);

    let err = read_all(&conn, orders()).err().expect("third fault must abort");
    let Some(FlatFileError::AccumulationLimitExceeded {
        limit,
        ordinal,
        errors_file,
    }) = err.downcast_ref::<FlatFileError>()
    else {
        panic!("unexpected error: {err:#}");
    };
    assert_eq!((*limit, *ordinal), (2, 5));

    let artifact = errors_file.clone().expect("errors persisted before aborting");
    assert_eq!(artifact, dir.path().join("orders.errors.txt"));
    let saved = read_artifact(&artifact)?;
    assert_eq!(saved.iter().map(|e| e.ordinal).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(saved[0].field.as_deref(), Some("Qty"));
    assert_eq!(saved[0].value.as_deref(), Some("lots"));
    assert_eq!(saved[1].field, None);
    assert!(saved[1].message.contains("expected 3 fields, found 2"));
    Ok(())
}

#[test]
fn save_mode_under_the_limit_finishes_and_reports() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_orders(dir.path())?;
    let conn = ConnectionSpec::new(&path).with_error_mode(ErrorMode::Save, 10);

    let outcome = read_all(&conn, orders())?;
    let ids: Vec<i64> = outcome.rows.iter().filter_map(|r| r["Id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 4, 7]);
    assert_eq!(outcome.summary.errors, 4);
    assert_eq!(outcome.summary.errors_files, vec![error_file_for(&path)]);

    let saved = read_artifact(&error_file_for(&path))?;
    assert_eq!(saved.iter().map(|e| e.ordinal).collect::<Vec<_>>(), vec![2, 3, 5, 6]);
    assert_eq!(saved, outcome.errors.iter().map(|e| ErrorRecord { cause: None, ..e.clone() }).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn abort_mode_stops_at_the_first_fault_without_an_artifact() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_orders(dir.path())?;
    let conn = ConnectionSpec::new(&path);

    let err = read_all(&conn, orders()).err().expect("abort is the default");
    match err.downcast_ref::<FlatFileError>() {
        Some(FlatFileError::Record { ordinal: 2, fault }) => {
            assert_eq!(fault.field(), Some("Qty"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!error_file_for(&path).exists());
    Ok(())
}

#[test]
fn ignore_mode_drops_bad_rows_by_default() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_orders(dir.path())?;
    let conn = ConnectionSpec::new(&path).with_error_mode(ErrorMode::Ignore, 0);

    let outcome = read_all(&conn, orders())?;
    assert_eq!(outcome.rows.len(), 3);
    assert_eq!(outcome.summary.ignored, 4);
    assert!(outcome.errors.is_empty());
    assert!(!error_file_for(&path).exists());
    Ok(())
}

#[test]
fn ignore_mode_can_substitute_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_orders(dir.path())?;
    let conn = ConnectionSpec::new(&path)
        .with_error_mode(ErrorMode::Ignore, 0)
        .with_conversion_policy(ConversionPolicy::SubstituteDefault);

    let outcome = read_all(&conn, orders())?;
    // Structural faults still drop the record; conversion faults keep it.
    let qty: Vec<(i64, i64)> = outcome
        .rows
        .iter()
        .map(|r| (r["Id"].as_i64().unwrap(), r["Qty"].as_i64().unwrap()))
        .collect();
    assert_eq!(qty, vec![(1, 3), (2, 1), (4, 2), (5, 1), (7, 1)]);
    Ok(())
}

#[test]
fn write_faults_follow_the_error_mode() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("nested/out.csv");
    let schema = orders();
    let row = |id: Value, item: &str, qty: Value| Row::new(Arc::clone(&schema), vec![id, item.into(), qty]);
    let rows = vec![
        row(Value::Int(1), "apple", Value::Int(3)),
        row(Value::from("one"), "pear", Value::Int(1)),
        row(Value::Int(3), "a,b", Value::Int(1)),
        row(Value::Int(4), "fig", Value::from("2")),
    ];

    let conn = ConnectionSpec::new(&out).with_error_mode(ErrorMode::Save, 10);
    let summary = write_rows(&conn, Arc::clone(&schema), &rows)?;
    assert_eq!(summary.inserts, 2);
    assert_eq!(summary.errors, 2);
    assert_eq!(fs::read_to_string(&out)?, "1,apple,3\n4,fig,2\n");

    let saved = read_artifact(summary.errors_file.as_deref().expect("artifact"))?;
    assert_eq!(saved.iter().map(|e| e.ordinal).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(saved[1].field.as_deref(), Some("Item"));
    assert_eq!(saved[1].value.as_deref(), Some("a,b"));
    Ok(())
}

#[test]
fn write_abort_surfaces_the_fault() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conn = ConnectionSpec::new(dir.path().join("out.csv"));
    let schema = orders();
    let mut writer = FlatFileWriter::create(&conn, Arc::clone(&schema))?;
    let bad = Row::new(schema, vec![Value::Int(1), "x\ny".into(), Value::Int(1)]);

    let err = writer.write_row(&bad).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FlatFileError>().and_then(FlatFileError::fault),
        Some(RecordFault::Unwritable { .. })
    ));
    assert_eq!(writer.inserts(), 0);
    Ok(())
}

#[test]
fn write_limit_persists_what_was_saved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("out.csv");
    let schema = orders();
    let bad = || Row::new(Arc::clone(&schema), vec![Value::from("x"), "i".into(), Value::Int(1)]);

    let conn = ConnectionSpec::new(&out).with_error_mode(ErrorMode::Save, 1);
    let err = write_rows(&conn, Arc::clone(&schema), [bad(), bad()]).unwrap_err();
    match err.downcast_ref::<FlatFileError>() {
        Some(FlatFileError::AccumulationLimitExceeded {
            ordinal: 2,
            errors_file: Some(path),
            ..
        }) => assert_eq!(read_artifact(path)?.len(), 1),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

fn tagged() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        FieldSpec::new("Id", FieldType::Int),
        FieldSpec::string("Code"),
        FieldSpec::string("Tag"),
    ]))
}

#[test]
fn stray_quote_fails_only_its_own_record() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tagged.csv");
    fs::write(&path, "1,\"abc,x\n2,ok,y\n3,\"two\nlines\",z\n4,ok,w\n")?;
    let conn = ConnectionSpec::new(&path)
        .with_text_qualifier('"')
        .with_line_pattern(r"^\d+,")
        .with_error_mode(ErrorMode::Save, 10);

    let outcome = read_all(&conn, tagged())?;
    let ids: Vec<i64> = outcome.rows.iter().filter_map(|r| r["Id"].as_i64()).collect();
    assert_eq!(ids, vec![2, 3, 4]);
    assert_eq!(outcome.rows[1]["Code"], Value::from("two\nlines"));
    assert_eq!(outcome.summary.errors, 1);
    assert_eq!(outcome.errors[0].ordinal, 1);
    assert!(outcome.errors[0].message.contains("unterminated quoted field"));
    Ok(())
}

#[test]
fn stray_quotes_count_against_the_limit_one_record_each() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tagged.csv");
    fs::write(&path, "1,\"a,x\n2,ok,y\n3,\"b,z\n4,\"c,w\n5,ok,v\n")?;
    let conn = ConnectionSpec::new(&path)
        .with_text_qualifier('"')
        .with_line_pattern(r"^\d+,")
        .with_error_mode(ErrorMode::Save, 2);

    let err = read_all(&conn, tagged()).err().expect("third stray quote must abort");
    match err.downcast_ref::<FlatFileError>() {
        Some(FlatFileError::AccumulationLimitExceeded { ordinal: 4, .. }) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    let saved = read_artifact(&error_file_for(&path))?;
    assert_eq!(saved.iter().map(|e| e.ordinal).collect::<Vec<_>>(), vec![1, 3]);
    Ok(())
}

#[test]
fn open_quote_without_pattern_scans_each_line_once() -> Result<()> {
    let mut text = String::from("1,\"never closed,x\n");
    for i in 0..50_000 {
        text.push_str(&format!("continuation {i}\n"));
    }
    let conn = ConnectionSpec::default()
        .with_text_qualifier('"')
        .with_error_mode(ErrorMode::Ignore, 0);

    let started = std::time::Instant::now();
    let mut rows = flatrecord::read_rows(
        flatrecord::io::lines::PhysicalLines::utf8(text.as_bytes()),
        &conn,
        tagged(),
    )?;
    assert!(rows.next().is_none());
    assert_eq!(rows.summary().ignored, 1);
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
    Ok(())
}
