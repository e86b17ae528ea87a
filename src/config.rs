//! Connection and entity configuration.
//!
//! The settings here are produced elsewhere (a configuration file, a schema
//! inspector, a caller) and consumed read-only by a run. Everything derives
//! Serde with kebab-case keys so a JSON entity description maps onto it
//! directly:
//!
//! ```
//! use flatrecord::config::EntityConfig;
//!
//! let cfg = EntityConfig::from_json_str(r#"{
//!     "connection": {
//!         "file": "logs/app.log",
//!         "delimiter": "",
//!         "line-pattern": "^\\d{4}-\\d{2}-\\d{2} ",
//!         "error-mode": "save",
//!         "error-limit": 50
//!     },
//!     "fields": [ { "name": "Line" } ]
//! }"#)?;
//! assert!(cfg.connection.is_raw(&cfg.schema()));
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::accumulator::ErrorMode;
use crate::boundary::DEFAULT_JOIN_TOKEN;
use crate::convert::ConversionPolicy;
use crate::error::FlatFileError;
use crate::io::lines::resolve_encoding;
use crate::schema::{FieldSpec, Schema};
use crate::window::Window;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Delimiter used when none is configured for a multi-field entity.
pub const DEFAULT_DELIMITER: &str = ",";

/// Sentinel header value meaning "derive the header from field labels".
pub const DERIVE_HEADER: &str = "[default]";

/// Header line emitted at the start of a written file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum HeaderSpec {
    #[default]
    None,
    /// Delimiter-joined field labels.
    Derive,
    /// Emitted verbatim.
    Literal(String),
}

impl From<Option<String>> for HeaderSpec {
    fn from(value: Option<String>) -> Self {
        match value.as_deref() {
            None | Some("") => Self::None,
            Some(DERIVE_HEADER) | Some("derive") => Self::Derive,
            Some(text) => Self::Literal(text.to_string()),
        }
    }
}

impl From<HeaderSpec> for Option<String> {
    fn from(value: HeaderSpec) -> Self {
        match value {
            HeaderSpec::None => None,
            HeaderSpec::Derive => Some(DERIVE_HEADER.to_string()),
            HeaderSpec::Literal(text) => Some(text),
        }
    }
}

/// Everything a run needs to know about the file it reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConnectionSpec {
    /// Provider name resolved through the
    /// [`ProviderRegistry`](crate::provider::ProviderRegistry).
    pub provider: String,
    /// Target file (or folder / glob for the `folder` provider).
    pub file: PathBuf,
    /// Field delimiter. Empty with a single field means raw whole-line mode.
    pub delimiter: String,
    /// Text qualifier; empty means fields are never quoted.
    pub text_qualifier: String,
    /// Regular expression matching lines that start a new logical record.
    pub line_pattern: Option<String>,
    /// Inserted between a record and each continuation line appended to it.
    pub join_token: String,
    pub encoding: String,
    /// First logical record to consider, 1-based.
    pub start: u64,
    pub page: Option<u64>,
    pub size: Option<u64>,
    pub header: HeaderSpec,
    pub footer: Option<String>,
    pub error_mode: ErrorMode,
    pub error_limit: usize,
    /// Drop blank physical lines before reassembly.
    pub ignore_empty_lines: bool,
    pub conversion_policy: ConversionPolicy,
}

impl Default for ConnectionSpec {
    fn default() -> Self {
        Self {
            provider: "file".to_string(),
            file: PathBuf::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            text_qualifier: String::new(),
            line_pattern: None,
            join_token: DEFAULT_JOIN_TOKEN.to_string(),
            encoding: "utf-8".to_string(),
            start: 1,
            page: None,
            size: None,
            header: HeaderSpec::None,
            footer: None,
            error_mode: ErrorMode::default(),
            error_limit: 10_000,
            ignore_empty_lines: false,
            conversion_policy: ConversionPolicy::default(),
        }
    }
}

impl ConnectionSpec {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    #[must_use]
    pub fn with_text_qualifier(mut self, qualifier: char) -> Self {
        self.text_qualifier = qualifier.to_string();
        self
    }

    #[must_use]
    pub fn with_line_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.line_pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_join_token(mut self, token: impl Into<String>) -> Self {
        self.join_token = token.into();
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: u64, size: u64) -> Self {
        self.page = Some(page);
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn with_header(mut self, header: HeaderSpec) -> Self {
        self.header = header;
        self
    }

    #[must_use]
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    #[must_use]
    pub fn with_error_mode(mut self, mode: ErrorMode, limit: usize) -> Self {
        self.error_mode = mode;
        self.error_limit = limit;
        self
    }

    #[must_use]
    pub fn with_conversion_policy(mut self, policy: ConversionPolicy) -> Self {
        self.conversion_policy = policy;
        self
    }

    #[must_use]
    pub fn ignoring_empty_lines(mut self) -> Self {
        self.ignore_empty_lines = true;
        self
    }

    /// The qualifier character, if one is configured.
    pub fn qualifier(&self) -> Option<char> {
        self.text_qualifier.chars().next()
    }

    /// Raw mode: empty delimiter and exactly one readable field.
    pub fn is_raw(&self, schema: &Schema) -> bool {
        self.delimiter.is_empty() && schema.io_fields().count() == 1
    }

    /// The delimiter actually used for splitting and joining.
    pub fn effective_delimiter(&self) -> &str {
        if self.delimiter.is_empty() {
            DEFAULT_DELIMITER
        } else {
            &self.delimiter
        }
    }

    /// The ordinal window implied by `start`, `page` and `size`.
    pub fn window(&self) -> Result<Window, FlatFileError> {
        Window::new(self.start, self.page, self.size)
    }

    /// Eagerly reject settings a run cannot honour.
    pub fn validate(&self, schema: &Schema) -> Result<(), FlatFileError> {
        schema.validate()?;
        self.window()?;
        if self.text_qualifier.chars().count() > 1 {
            return Err(FlatFileError::config(format!(
                "text qualifier must be a single character, got `{}`",
                self.text_qualifier
            )));
        }
        if let Some(q) = self.qualifier()
            && self.effective_delimiter().contains(q)
        {
            return Err(FlatFileError::config(format!(
                "text qualifier `{q}` cannot appear in the delimiter"
            )));
        }
        resolve_encoding(&self.encoding)?;
        Ok(())
    }
}

/// A connection plus the entity's ordered fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub connection: ConnectionSpec,
    pub fields: Vec<FieldSpec>,
}

impl EntityConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse entity configuration")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.fields.clone())
    }
}
