//! Record boundary detection.
//!
//! A [`BoundaryClassifier`] decides whether a physical line begins a new
//! logical record. It is built once per run from the connection's
//! `line-pattern`; a pattern that does not compile is a configuration error
//! raised before any line is read.

use crate::error::FlatFileError;
use regex::Regex;

/// Default separator inserted between a record and each continuation line.
pub const DEFAULT_JOIN_TOKEN: &str = " ";

#[derive(Debug, Clone, Default)]
pub enum BoundaryClassifier {
    /// Every line is its own record.
    #[default]
    Always,
    /// A line begins a record iff the pattern matches somewhere in it.
    Pattern(Regex),
}

impl BoundaryClassifier {
    /// Build from an optional pattern. `None` and the empty string both mean
    /// one line per record.
    pub fn new(pattern: Option<&str>) -> Result<Self, FlatFileError> {
        match pattern {
            None | Some("") => Ok(Self::Always),
            Some(p) => Regex::new(p)
                .map(Self::Pattern)
                .map_err(|source| FlatFileError::InvalidPattern {
                    pattern: p.to_string(),
                    source,
                }),
        }
    }

    pub fn is_record_start(&self, line: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Pattern(re) => re.is_match(line),
        }
    }

    /// `true` when every line starts a record and no reassembly is needed.
    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }
}
