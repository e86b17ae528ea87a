//! Folder and glob expansion for multi-file entities.
//!
//! ```no_run
//! use flatrecord::io::glob::expand_source;
//!
//! // every file directly inside the folder
//! let files = expand_source("logs/2024-06")?;
//! // or an explicit pattern
//! let files = expand_source("logs/**/*.log.gz")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand a glob pattern into a sorted vector of matching files.
///
/// Directories matched by the pattern are left out. Zero matches is an empty
/// vector, not an error.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Expand a folder connection's `file` setting.
///
/// A directory means every regular file directly inside it; anything else is
/// treated as a glob pattern. Error artifacts left by earlier runs are never
/// picked up as input. At least one file must match.
pub fn expand_source(source: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let source = source.as_ref();
    let mut files = if source.is_dir() {
        let mut files = Vec::new();
        for entry in source
            .read_dir()
            .with_context(|| format!("read dir {}", source.display()))?
        {
            let path = entry
                .with_context(|| format!("read entry in {}", source.display()))?
                .path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        files
    } else {
        expand_glob(&source.to_string_lossy())?
    };

    files.retain(|p| {
        !p.file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(crate::accumulator::ERROR_FILE_SUFFIX))
    });
    if files.is_empty() {
        bail!("no files found for {}", source.display());
    }
    Ok(files)
}
