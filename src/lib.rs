//! # Flatrecord
//!
//! A **streaming flat-file record engine**. It turns physical text lines into
//! typed, schema-shaped rows and rows back into lines, including files whose
//! logical records span several physical lines: multi-line log entries, stack
//! traces, or delimited values with unquoted embedded line breaks.
//!
//! ## Key Features
//!
//! - **Record reassembly** - a boundary pattern decides which lines start a record
//! - **Delimited codec** - multi-character delimiters, text qualifiers, doubled-qualifier escapes
//! - **Typed rows** - locale-invariant numbers, configurable datetime formats, base64 bytes
//! - **Paged reads** - only records inside `[lo, hi)` are converted; the file closes at `hi`
//! - **Error modes** - ignore, save to a sibling error file, or abort
//! - **Transparent compression** and non-UTF-8 encodings
//!
//! ## Quick Start
//!
//! ```no_run
//! use flatrecord::config::ConnectionSpec;
//! use flatrecord::io::reader::open_rows;
//! use flatrecord::schema::{FieldSpec, Schema};
//!
//! # fn main() -> anyhow::Result<()> {
//! // One raw field per log entry; continuation lines are folded in.
//! let conn = ConnectionSpec::new("logs/app.log")
//!     .with_delimiter("")
//!     .with_line_pattern(r"^\d{4}-\d{2}-\d{2} ")
//!     .with_page(2, 50);
//! let schema = Schema::new(vec![FieldSpec::string("Entry")]);
//!
//! for row in open_rows(&conn, schema)? {
//!     println!("{}", row?["Entry"]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writing goes through [`FlatFileWriter`](io::writer::FlatFileWriter) or
//! [`write_rows`](io::writer::write_rows):
//!
//! ```no_run
//! use flatrecord::config::{ConnectionSpec, HeaderSpec};
//! use flatrecord::io::writer::write_rows;
//! use flatrecord::schema::{FieldSpec, FieldType, Row, Schema};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema = Arc::new(Schema::new(vec![
//!     FieldSpec::new("Id", FieldType::Int),
//!     FieldSpec::string("Name"),
//! ]));
//! let rows = vec![Row::new(Arc::clone(&schema), vec![1.into(), "a, b".into()])];
//! let conn = ConnectionSpec::new("out/people.csv.gz")
//!     .with_text_qualifier('"')
//!     .with_header(HeaderSpec::Derive);
//! let summary = write_rows(&conn, schema, &rows)?;
//! assert_eq!(summary.inserts, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`boundary`], [`reassemble`] - physical lines to logical records
//! - [`window`] - ordinal windows for paged reads
//! - [`codec`] - field splitting and joining
//! - [`convert`] - raw text to typed [`Value`]s and back
//! - [`accumulator`] - error modes and the error artifact
//! - [`config`], [`schema`] - connection and field settings
//! - [`io`] - decoding, compression, and the read/write paths
//! - [`provider`] - provider registry for `file` and `folder` connections
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz`
//! - `parallel-io` - [`read_folder_par`](provider::read_folder_par)

pub mod accumulator;
pub mod boundary;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod io;
pub mod provider;
pub mod reassemble;
pub mod schema;
pub mod value;
pub mod window;

pub use accumulator::{ErrorAccumulator, ErrorMode, ErrorRecord};
pub use boundary::{BoundaryClassifier, DEFAULT_JOIN_TOKEN};
pub use codec::{DelimitedCodec, QuoteGuard};
pub use config::{ConnectionSpec, EntityConfig, HeaderSpec};
pub use convert::{ConversionPolicy, TypeConverter};
pub use error::{FlatFileError, RecordFault};
pub use io::reader::{ReadOutcome, ReadSummary, Rows, open_rows, read_all, read_rows};
pub use io::writer::{FlatFileWriter, WriteSummary, write_rows};
pub use provider::{FileProvider, FolderProvider, Provider, ProviderRegistry};
pub use reassemble::{LineReassembler, LogicalRecord};
pub use schema::{FieldSpec, FieldType, Row, Schema};
pub use value::Value;
pub use window::{Window, Windowed};

#[cfg(feature = "parallel-io")]
pub use provider::read_folder_par;
