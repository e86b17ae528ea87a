//! Providers: how a connection's `provider` name maps onto reading and
//! writing.
//!
//! A [`ProviderRegistry`] is built per run and passed to whoever resolves
//! connections. Nothing is registered globally.
//!
//! ```no_run
//! use flatrecord::config::ConnectionSpec;
//! use flatrecord::provider::ProviderRegistry;
//! use flatrecord::schema::{FieldSpec, Schema};
//! use std::sync::Arc;
//!
//! let registry = ProviderRegistry::with_defaults();
//! let conn = ConnectionSpec::new("logs/2024-06").with_provider("folder").with_delimiter("");
//! let schema = Arc::new(Schema::new(vec![FieldSpec::string("Line")]));
//! let outcome = registry.get(&conn.provider)?.read(&conn, schema)?;
//! println!("{} rows", outcome.rows.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::ConnectionSpec;
use crate::error::FlatFileError;
use crate::io::glob::expand_source;
use crate::io::reader::{ReadOutcome, ReadSummary, read_all};
use crate::io::writer::{WriteSummary, write_rows};
use crate::schema::{Row, Schema};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Read every row the connection selects.
    fn read(&self, conn: &ConnectionSpec, schema: Arc<Schema>) -> Result<ReadOutcome>;

    /// Write `rows` to the connection's target.
    fn write(&self, conn: &ConnectionSpec, schema: Arc<Schema>, rows: &[Row])
    -> Result<WriteSummary>;
}

/// A single delimited file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileProvider;

impl Provider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&self, conn: &ConnectionSpec, schema: Arc<Schema>) -> Result<ReadOutcome> {
        read_all(conn, schema)
    }

    fn write(
        &self,
        conn: &ConnectionSpec,
        schema: Arc<Schema>,
        rows: &[Row],
    ) -> Result<WriteSummary> {
        write_rows(conn, schema, rows)
    }
}

/// Every file in a directory, or every file matching a glob, read in sorted
/// order as one entity. `start` applies to each file; paging does not.
/// The error limit counts saved faults across all files, while error
/// artifacts are written per file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FolderProvider;

impl FolderProvider {
    fn files(conn: &ConnectionSpec) -> Result<Vec<PathBuf>> {
        if conn.page.is_some() || conn.size.is_some() {
            return Err(FlatFileError::config("page and size are not supported for folders").into());
        }
        let files = expand_source(&conn.file)?;
        tracing::info!(source = %conn.file.display(), files = files.len(), "expanded folder");
        Ok(files)
    }
}

fn for_file(conn: &ConnectionSpec, path: &Path) -> ConnectionSpec {
    ConnectionSpec {
        file: path.to_path_buf(),
        ..conn.clone()
    }
}

/// Report a limit hit inside one file against the run's own limit.
fn with_run_limit(err: anyhow::Error, limit: usize) -> anyhow::Error {
    if let Some(FlatFileError::AccumulationLimitExceeded {
        ordinal,
        errors_file,
        ..
    }) = err.downcast_ref::<FlatFileError>()
    {
        return FlatFileError::AccumulationLimitExceeded {
            limit,
            ordinal: *ordinal,
            errors_file: errors_file.clone(),
        }
        .into();
    }
    err
}

fn concat(outcomes: impl IntoIterator<Item = ReadOutcome>) -> ReadOutcome {
    let mut out = ReadOutcome {
        rows: Vec::new(),
        errors: Vec::new(),
        summary: ReadSummary::default(),
    };
    for outcome in outcomes {
        out.rows.extend(outcome.rows);
        out.errors.extend(outcome.errors);
        out.summary.merge(outcome.summary);
    }
    out
}

impl Provider for FolderProvider {
    fn name(&self) -> &str {
        "folder"
    }

    fn read(&self, conn: &ConnectionSpec, schema: Arc<Schema>) -> Result<ReadOutcome> {
        conn.validate(&schema)?;
        let mut outcomes = Vec::new();
        let mut saved = 0;
        for path in Self::files(conn)? {
            // The error limit is shared by every file of the run.
            let mut file_conn = for_file(conn, &path);
            file_conn.error_limit = conn.error_limit.saturating_sub(saved);
            let outcome = read_all(&file_conn, Arc::clone(&schema))
                .map_err(|e| with_run_limit(e, conn.error_limit))
                .with_context(|| format!("read {}", path.display()))?;
            saved += outcome.errors.len();
            outcomes.push(outcome);
        }
        Ok(concat(outcomes))
    }

    fn write(&self, conn: &ConnectionSpec, _: Arc<Schema>, _: &[Row]) -> Result<WriteSummary> {
        Err(FlatFileError::config(format!(
            "folder provider cannot write ({})",
            conn.file.display()
        ))
        .into())
    }
}

/// Read a folder connection with one task per file on a dedicated rayon pool.
///
/// `threads` defaults to the number of CPUs. Rows come back in the same
/// order as [`FolderProvider::read`] would produce them.
#[cfg_attr(docsrs, doc(cfg(feature = "parallel-io")))]
#[cfg(feature = "parallel-io")]
pub fn read_folder_par(
    conn: &ConnectionSpec,
    schema: Arc<Schema>,
    threads: Option<usize>,
) -> Result<ReadOutcome> {
    use rayon::prelude::*;

    conn.validate(&schema)?;
    let files = FolderProvider::files(conn)?;
    let threads = threads.unwrap_or_else(num_cpus::get).clamp(1, files.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("build read pool")?;
    let outcomes = pool.install(|| {
        files
            .par_iter()
            .map(|path| read_all(&for_file(conn, path), Arc::clone(&schema)))
            .collect::<Result<Vec<_>>>()
    })?;
    enforce_run_limit(conn, &outcomes)?;
    Ok(concat(outcomes))
}

/// Files read in parallel each get the full limit; the run fails afterwards
/// at the first saved fault past the limit, in file order.
#[cfg(feature = "parallel-io")]
fn enforce_run_limit(conn: &ConnectionSpec, outcomes: &[ReadOutcome]) -> Result<()> {
    if conn.error_mode != crate::accumulator::ErrorMode::Save {
        return Ok(());
    }
    let mut saved = 0;
    for outcome in outcomes {
        if let Some(over) = outcome.errors.get(conn.error_limit - saved) {
            tracing::warn!(
                limit = conn.error_limit,
                ordinal = over.ordinal,
                "error limit exceeded across folder"
            );
            return Err(FlatFileError::AccumulationLimitExceeded {
                limit: conn.error_limit,
                ordinal: over.ordinal,
                errors_file: outcome.summary.errors_files.first().cloned(),
            }
            .into());
        }
        saved += outcome.errors.len();
    }
    Ok(())
}

/// Provider lookup by connection `provider` name.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// `file` and `folder`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FileProvider));
        registry.register(Arc::new(FolderProvider));
        registry
    }

    /// Add or replace a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        self.providers.insert(provider.name().to_string(), provider)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, FlatFileError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| FlatFileError::config(format!("unknown provider `{name}`")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the connection's provider and read through it.
    pub fn read(&self, conn: &ConnectionSpec, schema: impl Into<Arc<Schema>>) -> Result<ReadOutcome> {
        self.get(&conn.provider)?.read(conn, schema.into())
    }

    /// Resolve the connection's provider and write through it.
    pub fn write(
        &self,
        conn: &ConnectionSpec,
        schema: impl Into<Arc<Schema>>,
        rows: &[Row],
    ) -> Result<WriteSummary> {
        self.get(&conn.provider)?.write(conn, schema.into(), rows)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
