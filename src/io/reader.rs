//! Read path: physical lines to typed rows.
//!
//! The pipeline is a chain of lazy iterators, each pulling one item at a
//! time from the one before it:
//!
//! ```text
//! PhysicalLines -> LineReassembler -> Windowed -> DelimitedCodec::split
//!               -> TypeConverter::parse -> Row
//! ```
//!
//! Records outside the window never reach the codec. Once the window's last
//! record has been read, or the run fails, the source file is closed even if
//! the caller keeps the [`Rows`] iterator around.

use crate::accumulator::{ErrorAccumulator, ErrorMode, ErrorRecord};
use crate::boundary::BoundaryClassifier;
use crate::codec::DelimitedCodec;
use crate::config::ConnectionSpec;
use crate::convert::{ConversionPolicy, TypeConverter};
use crate::error::FlatFileError;
use crate::io::compression::auto_detect_reader;
use crate::io::lines::{PhysicalLines, resolve_encoding};
use crate::reassemble::{LineReassembler, LogicalRecord};
use crate::schema::{Row, Schema};
use crate::value::Value;
use crate::window::Windowed;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lines of an opened file, decompressed and decoded.
pub type FileLines = PhysicalLines<Box<dyn BufRead + Send>>;

/// End-of-run accounting for a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Rows handed to the caller.
    pub rows: u64,
    /// Faults saved under `save` mode.
    pub errors: usize,
    /// Faults dropped under `ignore` mode.
    pub ignored: u64,
    /// Error artifacts written, one per source file that had saved faults.
    pub errors_files: Vec<PathBuf>,
}

impl ReadSummary {
    /// Fold another file's summary into this one.
    pub fn merge(&mut self, other: ReadSummary) {
        self.rows += other.rows;
        self.errors += other.errors;
        self.ignored += other.ignored;
        self.errors_files.extend(other.errors_files);
    }
}

/// Everything [`read_all`] produced.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub rows: Vec<Row>,
    pub errors: Vec<ErrorRecord>,
    pub summary: ReadSummary,
}

/// Lazy iterator of typed rows.
///
/// Yields `Err` at most once; after that, and after the source is exhausted,
/// it yields `None`.
pub struct Rows<I> {
    records: Option<Windowed<LineReassembler<I>>>,
    codec: DelimitedCodec,
    accumulator: ErrorAccumulator,
    policy: ConversionPolicy,
    target: Option<PathBuf>,
    produced: u64,
    errors_file: Option<PathBuf>,
}

impl<I> Rows<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn schema(&self) -> &Arc<Schema> {
        self.codec.schema()
    }

    /// Saved faults so far.
    pub fn errors(&self) -> &[ErrorRecord] {
        self.accumulator.errors()
    }

    /// `true` once the underlying source has been released.
    pub fn is_closed(&self) -> bool {
        self.records.as_ref().is_none_or(|r| r.is_closed())
    }

    pub fn summary(&self) -> ReadSummary {
        ReadSummary {
            rows: self.produced,
            errors: self.accumulator.errors().len(),
            ignored: self.accumulator.ignored(),
            errors_files: self.errors_file.iter().cloned().collect(),
        }
    }

    fn close(&mut self) {
        self.records = None;
    }

    fn persist_errors(&mut self) -> Result<()> {
        if let Some(target) = &self.target {
            self.errors_file = self.accumulator.persist(target)?;
        }
        Ok(())
    }

    /// Split and convert one record. `Ok(None)` means the record was dropped
    /// and the fault routed to the accumulator.
    fn decode(&mut self, record: LogicalRecord) -> Result<Option<Row>, FlatFileError> {
        let raw = match self.codec.split(&record.text) {
            Ok(raw) => raw,
            Err(fault) => {
                self.accumulator.handle(record.ordinal, fault)?;
                return Ok(None);
            }
        };

        let schema = Arc::clone(self.codec.schema());
        let substitute = self.accumulator.mode() == ErrorMode::Ignore
            && self.policy == ConversionPolicy::SubstituteDefault;
        let mut values = vec![Value::Null; schema.len()];
        let io_fields = schema.fields().iter().enumerate().filter(|(_, f)| !f.system);
        for ((idx, field), text) in io_fields.zip(raw) {
            match TypeConverter::parse(field, &text) {
                Ok(value) => values[idx] = value,
                Err(fault) => {
                    self.accumulator.handle(record.ordinal, fault)?;
                    if !substitute {
                        return Ok(None);
                    }
                    values[idx] = TypeConverter::substitute(field);
                }
            }
        }
        Ok(Some(Row::new(schema, values)))
    }
}

impl<I> Iterator for Rows<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.records.as_mut()?.next();
            let record = match next {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    self.close();
                    let err = anyhow::Error::new(FlatFileError::Io(e));
                    return Some(Err(match &self.target {
                        Some(t) => err.context(format!("read {}", t.display())),
                        None => err,
                    }));
                }
                None => {
                    self.close();
                    if let Err(e) = self.persist_errors() {
                        return Some(Err(e));
                    }
                    tracing::info!(
                        rows = self.produced,
                        errors = self.accumulator.errors().len(),
                        ignored = self.accumulator.ignored(),
                        "read finished"
                    );
                    return None;
                }
            };

            match self.decode(record) {
                Ok(Some(row)) => {
                    self.produced += 1;
                    return Some(Ok(row));
                }
                Ok(None) => continue,
                Err(FlatFileError::AccumulationLimitExceeded { limit, ordinal, .. }) => {
                    self.close();
                    if let Err(e) = self.persist_errors() {
                        return Some(Err(e));
                    }
                    tracing::warn!(limit, ordinal, "error limit exceeded, aborting read");
                    return Some(Err(FlatFileError::AccumulationLimitExceeded {
                        limit,
                        ordinal,
                        errors_file: self.errors_file.clone(),
                    }
                    .into()));
                }
                Err(e) => {
                    self.close();
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// Build the read pipeline over any source of physical lines.
///
/// Configuration is validated and the boundary pattern compiled before the
/// first line is pulled. Saved errors are persisted next to `conn.file` when
/// it is set.
pub fn read_rows<I>(
    lines: I,
    conn: &ConnectionSpec,
    schema: impl Into<Arc<Schema>>,
) -> Result<Rows<I>, FlatFileError>
where
    I: Iterator<Item = io::Result<String>>,
{
    let schema = schema.into();
    conn.validate(&schema)?;
    let classifier = BoundaryClassifier::new(conn.line_pattern.as_deref())?;
    let window = conn.window()?;
    let codec = DelimitedCodec::new(Arc::clone(&schema), conn);

    let reassembler = LineReassembler::new(lines, classifier)
        .with_join_token(conn.join_token.clone())
        .with_quote_guard(codec.quote_guard())
        .skip_empty_lines(conn.ignore_empty_lines);

    tracing::debug!(
        lo = window.lo,
        hi = ?window.hi,
        raw = codec.is_raw(),
        mode = ?conn.error_mode,
        "read pipeline ready"
    );

    Ok(Rows {
        records: Some(window.apply(reassembler)),
        codec,
        accumulator: ErrorAccumulator::new(conn.error_mode, conn.error_limit),
        policy: conn.conversion_policy,
        target: (!conn.file.as_os_str().is_empty()).then(|| conn.file.clone()),
        produced: 0,
        errors_file: None,
    })
}

/// Open `path` as decoded physical lines, decompressing if needed. The `\r`
/// of a `\r\n` ending is left on each line for the reassembler.
pub fn open_lines(path: &Path, encoding: &str) -> Result<FileLines> {
    let encoding = resolve_encoding(encoding)?;
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    Ok(PhysicalLines::new(reader, encoding).keeping_carriage_returns())
}

/// Open the connection's file and build the read pipeline over it.
///
/// Configuration errors are raised before the file is touched.
pub fn open_rows(conn: &ConnectionSpec, schema: impl Into<Arc<Schema>>) -> Result<Rows<FileLines>> {
    let schema = schema.into();
    conn.validate(&schema)?;
    BoundaryClassifier::new(conn.line_pattern.as_deref())?;
    let lines = open_lines(&conn.file, &conn.encoding)?;
    tracing::info!(path = %conn.file.display(), "opened for read");
    Ok(read_rows(lines, conn, schema)?)
}

/// Read every row in the connection's window into memory.
pub fn read_all(conn: &ConnectionSpec, schema: impl Into<Arc<Schema>>) -> Result<ReadOutcome> {
    let mut rows = open_rows(conn, schema)?;
    let mut out = Vec::new();
    for row in rows.by_ref() {
        out.push(row?);
    }
    Ok(ReadOutcome {
        summary: rows.summary(),
        errors: rows.accumulator.errors().to_vec(),
        rows: out,
    })
}
