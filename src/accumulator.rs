//! Per-run error routing and the error artifact.
//!
//! Every recoverable [`RecordFault`] met by a read or write run goes through
//! one [`ErrorAccumulator`], which applies the connection's [`ErrorMode`]:
//!
//! - **ignore**: count the fault and carry on.
//! - **save**: keep an [`ErrorRecord`] and carry on, until `limit` records are
//!   held; the next fault fails the run with `AccumulationLimitExceeded`.
//! - **abort**: fail the run on the first fault.
//!
//! Saved records are written next to the target file by [`persist`] as
//! `<stem>.errors.txt`, a CSV with the columns `ordinal,field,value,message`,
//! in the order the faults occurred.
//!
//! [`persist`]: ErrorAccumulator::persist

use crate::error::{FlatFileError, RecordFault};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to the target's file stem to name the error artifact.
pub const ERROR_FILE_SUFFIX: &str = ".errors.txt";

/// How recoverable faults are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    #[serde(alias = "ignoreandcontinue")]
    Ignore,
    #[serde(alias = "saveandcontinue")]
    Save,
    #[default]
    #[serde(alias = "throwexception")]
    Abort,
}

impl ErrorMode {
    pub fn continues(&self) -> bool {
        !matches!(self, Self::Abort)
    }
}

/// One saved fault. `ordinal` is the logical record on read and the 1-based
/// row number on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub ordinal: u64,
    pub field: Option<String>,
    pub value: Option<String>,
    pub message: String,
    #[serde(skip)]
    pub cause: Option<String>,
}

impl ErrorRecord {
    pub fn new(ordinal: u64, message: impl Into<String>) -> Self {
        Self {
            ordinal,
            field: None,
            value: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn from_fault(ordinal: u64, fault: &RecordFault) -> Self {
        let cause = match fault {
            RecordFault::Conversion { reason, .. } | RecordFault::Unwritable { reason, .. } => {
                Some(reason.clone())
            }
            _ => None,
        };
        Self {
            ordinal,
            field: fault.field().map(str::to_string),
            value: fault.value().map(str::to_string),
            message: fault.to_string(),
            cause,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.ordinal, self.message)
    }
}

/// Path of the error artifact for `target`: same directory, file stem plus
/// [`ERROR_FILE_SUFFIX`]. Compression extensions are not part of the stem.
pub fn error_file_for(target: &Path) -> PathBuf {
    let mut stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    if crate::io::compression::Compression::from_path(target).is_compressed()
        && let Some(inner) = Path::new(&stem).file_stem()
    {
        stem = inner.to_string_lossy().into_owned();
    }
    target.with_file_name(format!("{stem}{ERROR_FILE_SUFFIX}"))
}

/// Routes faults for a single run. Not shared between runs.
#[derive(Debug, Clone)]
pub struct ErrorAccumulator {
    mode: ErrorMode,
    limit: usize,
    errors: Vec<ErrorRecord>,
    ignored: u64,
}

impl ErrorAccumulator {
    pub fn new(mode: ErrorMode, limit: usize) -> Self {
        Self {
            mode,
            limit,
            errors: Vec::new(),
            ignored: 0,
        }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Saved records, in the order they occurred.
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ErrorRecord> {
        self.errors
    }

    /// Faults dropped under `ignore` mode.
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Route one fault. `Ok` means the run continues without the record.
    pub fn handle(&mut self, ordinal: u64, fault: RecordFault) -> Result<(), FlatFileError> {
        match self.mode {
            ErrorMode::Ignore => {
                tracing::debug!(ordinal, %fault, "ignoring record");
                self.ignored += 1;
                Ok(())
            }
            ErrorMode::Abort => Err(FlatFileError::Record { ordinal, fault }),
            ErrorMode::Save => {
                if self.errors.len() >= self.limit {
                    return Err(FlatFileError::AccumulationLimitExceeded {
                        limit: self.limit,
                        ordinal,
                        errors_file: None,
                    });
                }
                tracing::debug!(ordinal, %fault, saved = self.errors.len() + 1, "saving record error");
                self.errors.push(ErrorRecord::from_fault(ordinal, &fault));
                Ok(())
            }
        }
    }

    /// Write saved records next to `target`. Nothing is written, and `None`
    /// returned, unless the mode is `save` and at least one error was saved.
    pub fn persist(&self, target: &Path) -> Result<Option<PathBuf>> {
        if self.mode != ErrorMode::Save || self.errors.is_empty() {
            return Ok(None);
        }
        let path = error_file_for(target);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir {}", parent.display()))?;
        }
        let mut wtr = csv::Writer::from_path(&path)
            .with_context(|| format!("create error file {}", path.display()))?;
        for record in &self.errors {
            wtr.serialize(record)
                .with_context(|| format!("write error record to {}", path.display()))?;
        }
        wtr.flush()?;
        tracing::warn!(
            path = %path.display(),
            errors = self.errors.len(),
            "persisted record errors"
        );
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(n: usize) -> RecordFault {
        RecordFault::FieldCountMismatch {
            expected: 3,
            found: n,
        }
    }

    #[test]
    fn save_mode_tolerates_exactly_limit_faults() {
        let mut acc = ErrorAccumulator::new(ErrorMode::Save, 2);
        acc.handle(1, fault(1)).unwrap();
        acc.handle(2, fault(2)).unwrap();
        let err = acc.handle(3, fault(4)).unwrap_err();
        assert!(matches!(
            err,
            FlatFileError::AccumulationLimitExceeded { limit: 2, ordinal: 3, .. }
        ));
        assert_eq!(acc.errors().len(), 2);
    }

    #[test]
    fn artifact_name_drops_compression_extension() {
        assert_eq!(
            error_file_for(Path::new("/data/out.csv.gz")),
            PathBuf::from("/data/out.errors.txt")
        );
        assert_eq!(
            error_file_for(Path::new("/data/app.log")),
            PathBuf::from("/data/app.errors.txt")
        );
    }
}
