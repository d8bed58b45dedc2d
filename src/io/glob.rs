//! Chunk-file enumeration.
//!
//! A data source is a directory of pre-split chunk files sharing an extension
//! (`part.00000.gz`, `part.00001.gz`, ...). This module turns such a directory
//! into a deterministic list of chunk paths.
//!
//! # Examples
//!
//! ```no_run
//! use ironstream::io::glob::{expand_glob, list_chunk_files};
//!
//! // Every gzip chunk in a directory, sorted by path string
//! let chunks = list_chunk_files("corpus/train", Some(".gz"))?;
//!
//! // Or any glob pattern
//! let files = expand_glob("corpus/*/part.*.gz")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use anyhow::{Context, Result, bail};
use glob::{MatchOptions, Pattern, glob_with};
use std::path::{Path, PathBuf};

/// Expand a glob pattern into the matching *files*, sorted by their path string.
///
/// Directories matching the pattern are skipped. An empty match is not an error.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a matched entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let paths =
        glob_with(pattern, options).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }

    sort_by_path_string(&mut result);
    Ok(result)
}

/// List the files directly inside `dir` whose names end with `ext` (every file
/// when `ext` is `None`), sorted by path string.
///
/// The order depends only on the names, never on the order the operating system
/// lists the directory in.
///
/// # Errors
///
/// Fails if `dir` does not exist, is not a directory, or cannot be read.
pub fn list_chunk_files(dir: impl AsRef<Path>, ext: Option<&str>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        bail!("chunk directory {} does not exist", dir.display());
    }
    if !dir.is_dir() {
        bail!("chunk path {} is not a directory", dir.display());
    }
    // Surface permission problems here rather than as an empty glob.
    std::fs::read_dir(dir).with_context(|| format!("read chunk directory {}", dir.display()))?;

    let base = Pattern::escape(&dir.to_string_lossy());
    let suffix = ext.map(Pattern::escape).unwrap_or_default();
    let pattern = format!("{base}/*{suffix}");
    expand_glob(&pattern)
}

/// Sort paths by their (lossy) UTF-8 string form.
pub fn sort_by_path_string(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
}
