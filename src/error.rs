//! Error kinds for the flat-file engine.
//!
//! Two layers:
//! - [`RecordFault`] describes a problem with *one* record or field. Faults are
//!   recoverable: the [`ErrorAccumulator`](crate::accumulator::ErrorAccumulator)
//!   decides, per [`ErrorMode`](crate::accumulator::ErrorMode), whether the run
//!   skips the record, saves it to the error artifact, or stops.
//! - [`FlatFileError`] is what a run actually fails with: configuration errors
//!   raised at setup, a fault escalated under `abort` mode, the accumulation
//!   limit, or I/O.
//!
//! IO-facing entry points return `anyhow::Result`; a `FlatFileError` inside it
//! can be recovered with `err.downcast_ref::<FlatFileError>()`.

use crate::schema::FieldType;
use std::path::PathBuf;
use thiserror::Error;

/// A recoverable problem with a single record (read) or row (write).
///
/// Every variant keeps enough identity (field name, raw value) that an error
/// report is actionable without re-reading the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordFault {
    /// The record split into a different number of segments than declared fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCountMismatch { expected: usize, found: usize },

    /// A quoted field was opened but never closed before the end of the record.
    #[error("unterminated quoted field starting at column {column}")]
    QuoteUnterminated { column: usize },

    /// A raw string could not be converted to the field's declared type.
    #[error("cannot convert `{value}` to {field_type} for field `{field}`: {reason}")]
    Conversion {
        field: String,
        field_type: FieldType,
        value: String,
        reason: String,
    },

    /// A value could not be rendered into the output line.
    #[error("cannot write field `{field}`: {reason}")]
    Unwritable {
        field: String,
        value: Option<String>,
        reason: String,
    },
}

impl RecordFault {
    /// Name of the offending field, when the fault is field-scoped.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Conversion { field, .. } | Self::Unwritable { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Raw value of the offending field, when known.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Conversion { value, .. } => Some(value),
            Self::Unwritable { value, .. } => value.as_deref(),
            _ => None,
        }
    }
}

/// Errors that stop a read or write run.
#[derive(Debug, Error)]
pub enum FlatFileError {
    /// Invalid connection or schema settings. Raised at setup, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The boundary pattern failed to compile.
    #[error("invalid boundary pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A recoverable fault escalated because the error mode is `abort`.
    #[error("record {ordinal}: {fault}")]
    Record {
        ordinal: u64,
        #[source]
        fault: RecordFault,
    },

    /// More recoverable faults occurred than the configured error limit allows.
    #[error("error limit of {limit} exceeded at record {ordinal}")]
    AccumulationLimitExceeded {
        limit: usize,
        ordinal: u64,
        errors_file: Option<PathBuf>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FlatFileError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// The escalated record fault, if this error carries one.
    pub fn fault(&self) -> Option<&RecordFault> {
        match self {
            Self::Record { fault, .. } => Some(fault),
            _ => None,
        }
    }
}
