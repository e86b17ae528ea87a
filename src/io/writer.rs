//! Write path: typed rows to physical lines.
//!
//! Each row is formatted field by field, joined by the codec, encoded, and
//! written as one line terminated by `\n`. A row that cannot be written is a
//! fault for the [`ErrorAccumulator`]; under `save` and `ignore` the row is
//! left out and the run continues. The number of rows actually written is
//! reported as `inserts`.

use crate::accumulator::{ErrorAccumulator, ErrorRecord};
use crate::codec::DelimitedCodec;
use crate::config::{ConnectionSpec, HeaderSpec};
use crate::convert::TypeConverter;
use crate::error::{FlatFileError, RecordFault};
use crate::io::compression::{CompressedWriter, auto_detect_writer};
use crate::io::lines::{encode_line, resolve_encoding};
use crate::schema::{Row, Schema};
use anyhow::{Context, Result};
use encoding_rs::Encoding;
use std::borrow::Borrow;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// End-of-run accounting for a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserts: u64,
    /// Faults saved under `save` mode.
    pub errors: usize,
    /// Rows dropped under `ignore` mode.
    pub ignored: u64,
    pub errors_file: Option<PathBuf>,
}

/// The writer [`FlatFileWriter::create`] opens.
pub type FileSink = CompressedWriter<BufWriter<File>>;

pub struct FlatFileWriter<W: Write> {
    out: W,
    codec: DelimitedCodec,
    encoding: &'static Encoding,
    accumulator: ErrorAccumulator,
    footer: Option<String>,
    target: Option<PathBuf>,
    rows_seen: u64,
    inserts: u64,
}

impl<W: Write> FlatFileWriter<W> {
    /// Wrap `out` and write the header, if one is configured.
    pub fn new(out: W, conn: &ConnectionSpec, schema: impl Into<Arc<Schema>>) -> Result<Self> {
        let schema = schema.into();
        conn.validate(&schema)?;
        let encoding = resolve_encoding(&conn.encoding)?;
        let codec = DelimitedCodec::new(schema, conn);

        let mut writer = Self {
            out,
            encoding,
            accumulator: ErrorAccumulator::new(conn.error_mode, conn.error_limit),
            footer: conn.footer.clone().filter(|f| !f.is_empty()),
            target: (!conn.file.as_os_str().is_empty()).then(|| conn.file.clone()),
            rows_seen: 0,
            inserts: 0,
            codec,
        };
        let header = match &conn.header {
            HeaderSpec::None => None,
            HeaderSpec::Derive => Some(writer.codec.derived_header()),
            HeaderSpec::Literal(text) => Some(text.clone()),
        };
        if let Some(header) = header {
            writer.write_text(&header).context("write header")?;
        }
        Ok(writer)
    }

    /// Rows written so far.
    pub fn inserts(&self) -> u64 {
        self.inserts
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        self.accumulator.errors()
    }

    fn write_text(&mut self, line: &str) -> Result<()> {
        let bytes = encode_line(line, self.encoding).ok_or_else(|| {
            FlatFileError::config(format!(
                "`{line}` cannot be represented in {}",
                self.encoding.name()
            ))
        })?;
        self.out.write_all(&bytes)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Format and encode one row, or describe why it cannot be written.
    fn encode(&self, row: &Row) -> Result<Vec<u8>, RecordFault> {
        let line = self.codec.encode_row(row)?;
        if let Some(bytes) = encode_line(&line, self.encoding) {
            return Ok(bytes);
        }
        // Find the field that has no mapping in the target encoding.
        let schema = self.codec.schema();
        let culprit = schema
            .fields()
            .iter()
            .zip(row.values())
            .filter(|(f, _)| !f.system)
            .find_map(|(f, v)| {
                let text = TypeConverter::format(f, v).ok()?;
                encode_line(&text, self.encoding).is_none().then(|| (f.name.clone(), text))
            });
        let (field, value) = culprit.unwrap_or_default();
        Err(RecordFault::Unwritable {
            field,
            value: Some(value),
            reason: format!("not representable in {}", self.encoding.name()),
        })
    }

    /// Write one row. `Ok(false)` means the row was dropped and its fault
    /// recorded.
    pub fn write_row(&mut self, row: &Row) -> Result<bool> {
        self.rows_seen += 1;
        let ordinal = self.rows_seen;
        match self.encode(row) {
            Ok(bytes) => {
                self.out
                    .write_all(&bytes)
                    .and_then(|_| self.out.write_all(b"\n"))
                    .with_context(|| format!("write row {ordinal}"))?;
                self.inserts += 1;
                Ok(true)
            }
            Err(fault) => match self.accumulator.handle(ordinal, fault) {
                Ok(()) => Ok(false),
                Err(FlatFileError::AccumulationLimitExceeded { limit, ordinal, .. }) => {
                    let errors_file = match &self.target {
                        Some(t) => self.accumulator.persist(t)?,
                        None => None,
                    };
                    tracing::warn!(limit, ordinal, "error limit exceeded, aborting write");
                    Err(FlatFileError::AccumulationLimitExceeded {
                        limit,
                        ordinal,
                        errors_file,
                    }
                    .into())
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Write every row, stopping at the first fatal error.
    pub fn write_all<R: Borrow<Row>>(&mut self, rows: impl IntoIterator<Item = R>) -> Result<u64> {
        let before = self.inserts;
        for row in rows {
            self.write_row(row.borrow())?;
        }
        Ok(self.inserts - before)
    }

    /// Write the footer, flush, persist saved errors, and return the inner
    /// writer with the run's summary.
    pub fn finish(mut self) -> Result<(W, WriteSummary)> {
        if let Some(footer) = self.footer.take() {
            self.write_text(&footer).context("write footer")?;
        }
        self.out.flush().context("flush output")?;
        let errors_file = match &self.target {
            Some(t) => self.accumulator.persist(t)?,
            None => None,
        };
        let summary = WriteSummary {
            inserts: self.inserts,
            errors: self.accumulator.errors().len(),
            ignored: self.accumulator.ignored(),
            errors_file,
        };
        tracing::info!(
            inserts = summary.inserts,
            errors = summary.errors,
            ignored = summary.ignored,
            "write finished"
        );
        Ok((self.out, summary))
    }
}

impl FlatFileWriter<FileSink> {
    /// Create (or truncate) the connection's file, making parent directories
    /// as needed and compressing by extension.
    pub fn create(conn: &ConnectionSpec, schema: impl Into<Arc<Schema>>) -> Result<Self> {
        let schema = schema.into();
        conn.validate(&schema)?;
        let path = &conn.file;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let sink = auto_detect_writer(BufWriter::new(f), path)
            .with_context(|| format!("setup compression for {}", path.display()))?;
        tracing::info!(path = %path.display(), "opened for write");
        Self::new(sink, conn, schema)
    }

    /// [`finish`](Self::finish) and close the file, writing any compression
    /// trailer.
    pub fn close(self) -> Result<WriteSummary> {
        let target = self.target.clone().unwrap_or_default();
        let (sink, summary) = self.finish()?;
        let mut file = sink
            .finish()
            .with_context(|| format!("finish compression for {}", target.display()))?;
        file.flush()
            .with_context(|| format!("flush {}", target.display()))?;
        Ok(summary)
    }
}

/// Write `rows` to the connection's file in one call.
pub fn write_rows<R: Borrow<Row>>(
    conn: &ConnectionSpec,
    schema: impl Into<Arc<Schema>>,
    rows: impl IntoIterator<Item = R>,
) -> Result<WriteSummary> {
    let mut writer = FlatFileWriter::create(conn, schema)?;
    writer.write_all(rows)?;
    writer.close()
}
