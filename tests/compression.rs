//! Compression detection and folder expansion.

use anyhow::Result;
use flatrecord::io::compression::{Compression, auto_detect_reader, auto_detect_writer};
use flatrecord::io::glob::{expand_glob, expand_source};
use flatrecord::{ConnectionSpec, FieldSpec, Row, Schema, read_all, write_rows};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_detect_from_extension() {
    assert_eq!(Compression::from_path("a.csv.gz"), Compression::Gzip);
    assert_eq!(Compression::from_path("A.LOG.ZST"), Compression::Zstd);
    assert_eq!(Compression::from_path("a.bz2"), Compression::Bzip2);
    assert_eq!(Compression::from_path("a.txt.xz"), Compression::Xz);
    assert_eq!(Compression::from_path("a.csv"), Compression::None);
}

#[test]
fn test_detect_from_magic() {
    assert_eq!(Compression::from_magic(&[0x1f, 0x8b, 0x08]), Compression::Gzip);
    assert_eq!(Compression::from_magic(b"BZh91AY"), Compression::Bzip2);
    assert_eq!(Compression::from_magic(b"Id,Name"), Compression::None);
    assert_eq!(Compression::from_magic(&[]), Compression::None);
}

#[test]
fn test_plain_passthrough() -> Result<()> {
    let mut reader = auto_detect_reader(Cursor::new(b"x,y\n".to_vec()), "data.csv")?;
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    assert_eq!(text, "x,y\n");
    Ok(())
}

fn round_trip(ext: &str) -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join(format!("data.csv{ext}"));
    let body = "first line\nsecond line\n".repeat(200);

    let mut w = auto_detect_writer(fs::File::create(&path)?, &path)?;
    w.write_all(body.as_bytes())?;
    w.finish()?;
    assert_ne!(fs::read(&path)?, body.as_bytes(), "{ext} output should be compressed");

    let mut r = auto_detect_reader(fs::File::open(&path)?, &path)?;
    let mut back = String::new();
    r.read_to_string(&mut back)?;
    assert_eq!(back, body);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_gzip_round_trip() -> Result<()> {
    round_trip(".gz")
}

#[cfg(feature = "compression-zstd")]
#[test]
fn test_zstd_round_trip() -> Result<()> {
    round_trip(".zst")
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn test_bzip2_round_trip() -> Result<()> {
    round_trip(".bz2")
}

#[cfg(feature = "compression-xz")]
#[test]
fn test_xz_round_trip() -> Result<()> {
    round_trip(".xz")
}

#[cfg(feature = "compression-zstd")]
#[test]
fn test_error_file_for_compressed_source() -> Result<()> {
    use flatrecord::ErrorMode;

    let dir = TempDir::new()?;
    let path = dir.path().join("events.log.zst");
    let schema = Arc::new(Schema::new(vec![FieldSpec::new("n", flatrecord::FieldType::Int)]));
    let text = Arc::new(Schema::new(vec![FieldSpec::string("n")]));
    let rows: Vec<Row> = ["1", "x", "3"]
        .into_iter()
        .map(|v| Row::new(Arc::clone(&text), vec![v.into()]))
        .collect();
    let conn = ConnectionSpec::new(&path).with_delimiter("");
    write_rows(&conn, text, &rows)?;

    let conn = conn.with_error_mode(ErrorMode::Save, 5);
    let outcome = read_all(&conn, schema)?;
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(
        outcome.summary.errors_files,
        vec![dir.path().join("events.errors.txt")]
    );
    Ok(())
}

#[test]
fn test_expand_glob_sorted() -> Result<()> {
    let dir = TempDir::new()?;
    for name in ["c.log", "a.log", "b.txt"] {
        fs::write(dir.path().join(name), "x\n")?;
    }
    fs::create_dir(dir.path().join("d.log"))?;

    let files = expand_glob(&format!("{}/*.log", dir.path().display()))?;
    let names: Vec<_> = files
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
        .collect();
    assert_eq!(names, vec!["a.log", "c.log"]);
    Ok(())
}

#[test]
fn test_expand_source_skips_error_artifacts() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("2024-06-02.log"), "x\n")?;
    fs::write(dir.path().join("2024-06-01.log"), "x\n")?;
    fs::write(dir.path().join("2024-06-01.errors.txt"), "ordinal\n")?;

    let files = expand_source(dir.path())?;
    assert_eq!(
        files,
        vec![
            dir.path().join("2024-06-01.log"),
            dir.path().join("2024-06-02.log")
        ]
    );
    Ok(())
}

#[test]
fn test_expand_source_requires_a_match() {
    let dir = TempDir::new().unwrap();
    let err = expand_source(dir.path().join("*.none")).unwrap_err();
    assert!(err.to_string().contains("no files found"));
}
