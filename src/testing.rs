//! Test fixtures for pipelines and the collector.
//!
//! These helpers write small chunk directories to temporary locations, build
//! in-memory record streams, and encode batch frames, so tests can exercise
//! sharding, mixing and collection without real corpora.
//!
//! ```
//! use ironstream::testing::ChunkDir;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = ChunkDir::with_parallel_chunks("src", 3, 4, ".tsv")?;
//! assert_eq!(dir.chunk_paths().len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::channel::write_batch;
use crate::io::text::write_lines;
use crate::record::Record;
use crate::stage::RecordStream;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory of chunk files, removed on drop.
pub struct ChunkDir {
    dir: TempDir,
    chunks: Vec<PathBuf>,
}

impl ChunkDir {
    /// An empty directory.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            chunks: Vec::new(),
        })
    }

    /// `chunk_count` chunks of `lines_per_chunk` two-field lines each. Line `i`
    /// of chunk `c` reads `{prefix}-{c}-{i}\t{PREFIX}-{c}-{i}`, so every record
    /// is unique and its origin can be read back from it.
    pub fn with_parallel_chunks(
        prefix: &str,
        chunk_count: usize,
        lines_per_chunk: usize,
        ext: &str,
    ) -> Result<Self> {
        let mut dir = Self::new()?;
        for c in 0..chunk_count {
            let lines = parallel_lines(&format!("{prefix}-{c}"), lines_per_chunk);
            dir.add_chunk(&format!("chunk.{c:03}{ext}"), &lines)?;
        }
        Ok(dir)
    }

    /// Write one chunk file, compressed according to its extension.
    pub fn add_chunk<S: AsRef<str>>(&mut self, file_name: &str, lines: &[S]) -> Result<PathBuf> {
        let path = self.dir.path().join(file_name);
        write_lines(&path, lines)?;
        self.chunks.push(path.clone());
        Ok(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Chunks written so far, in creation order.
    #[must_use]
    pub fn chunk_paths(&self) -> &[PathBuf] {
        &self.chunks
    }
}

/// `count` lines of the form `{prefix}-{i}\t{PREFIX}-{i}`.
#[must_use]
pub fn parallel_lines(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{prefix}-{i}\t{}-{i}", prefix.to_uppercase()))
        .collect()
}

/// A stream that cycles through `lines` forever.
#[must_use]
pub fn cycle_stream(lines: &[&str]) -> RecordStream {
    let records: Vec<Record> = lines.iter().map(|l| Record::from_line(l)).collect();
    Box::new(records.into_iter().cycle().map(Ok::<Record, anyhow::Error>))
}

/// A stream yielding `lines` once and then ending.
#[must_use]
pub fn finite_stream(lines: &[&str]) -> RecordStream {
    let records: Vec<Record> = lines.iter().map(|l| Record::from_line(l)).collect();
    crate::stage::from_records(records)
}

/// Encode `batches` as one channel's byte stream.
pub fn encode_frames(batches: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for batch in batches {
        write_batch(&mut out, batch)?;
    }
    Ok(out)
}

/// Batches of lines labelled `{label}-{b}-{i}`, `sizes[b]` lines in batch `b`.
#[must_use]
pub fn labelled_batches(label: &str, sizes: &[usize]) -> Vec<Vec<String>> {
    sizes
        .iter()
        .enumerate()
        .map(|(b, &n)| (0..n).map(|i| format!("{label}-{b}-{i}")).collect())
        .collect()
}

/// Count records by the value of `key(record)`.
pub fn tally<I, K, F>(records: I, key: F) -> BTreeMap<K, usize>
where
    I: IntoIterator<Item = Record>,
    K: Ord,
    F: Fn(&Record) -> K,
{
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(key(&record)).or_insert(0) += 1;
    }
    counts
}

/// Assert that `observed / total` is within `tolerance` of `expected`.
///
/// # Panics
/// Panics when the share is out of range.
pub fn assert_share(observed: usize, total: usize, expected: f64, tolerance: f64) {
    assert!(total > 0, "no samples");
    let share = observed as f64 / total as f64;
    assert!(
        (share - expected).abs() <= tolerance,
        "share {share:.4} ({observed}/{total}) not within {tolerance} of {expected}"
    );
}
