//! Shard partitioning across worker processes.
//!
//! Worker `i` of `N` keeps the chunks at sorted positions `j` with
//! `j % N == i`. Together the workers cover every chunk exactly once. When a
//! directory holds fewer chunks than there are workers, every worker gets every
//! chunk instead; their differently seeded readers keep them from emitting the
//! same order.
//!
//! [`open_data_source`] composes this with the launch-level split done inside
//! [`ChunkedIterator`]: the worker split decides *which files* a worker may read,
//! the launch split decides *which positions* of the worker's infinite chunk walk
//! a launch rank consumes.

use crate::io::chunked::{ChunkReadFn, ChunkedIterator, ChunkedOptions};
use crate::io::glob::list_chunk_files;
use crate::seed::{LaunchCoords, WorkerCoords};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// The chunks one worker reads from one source directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardAssignment {
    worker: WorkerCoords,
    total: usize,
    chunks: Vec<PathBuf>,
}

impl ShardAssignment {
    /// Partition an already sorted chunk list.
    #[must_use]
    pub fn partition(sorted_chunks: &[PathBuf], worker: WorkerCoords) -> Self {
        let total = sorted_chunks.len();
        let everything = total < worker.count;
        let chunks = sorted_chunks
            .iter()
            .enumerate()
            .filter(|(j, _)| everything || j % worker.count == worker.id)
            .map(|(_, p)| p.clone())
            .collect();
        Self {
            worker,
            total,
            chunks,
        }
    }

    /// List `dir` (files ending in `ext`) and partition it for `worker`.
    ///
    /// # Errors
    /// Fails if the directory is missing, unreadable, or has no matching files.
    pub fn from_dir(dir: impl AsRef<Path>, ext: Option<&str>, worker: WorkerCoords) -> Result<Self> {
        let dir = dir.as_ref();
        let all = list_chunk_files(dir, ext)?;
        if all.is_empty() {
            bail!(
                "no chunk files ending in '{}' found in {}",
                ext.unwrap_or(""),
                dir.display()
            );
        }
        let assignment = Self::partition(&all, worker);
        info!(
            "Worker {} gets {} / {} segments in path {}",
            worker.id,
            assignment.len(),
            assignment.total(),
            dir.display()
        );
        Ok(assignment)
    }

    #[must_use]
    pub fn chunks(&self) -> &[PathBuf] {
        &self.chunks
    }

    #[must_use]
    pub fn into_chunks(self) -> Vec<PathBuf> {
        self.chunks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks in the directory before partitioning.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn worker(&self) -> WorkerCoords {
        self.worker
    }
}

/// How to open one data source.
#[derive(Clone, Copy, Debug)]
pub struct SourceOptions<'a> {
    pub ext: Option<&'a str>,
    pub buffer_size: usize,
    pub seed: u64,
    pub shuffle: bool,
    pub worker: WorkerCoords,
    pub launch: LaunchCoords,
}

/// Open a directory of chunks as an infinite record stream for one worker.
///
/// The directory is listed and partitioned immediately, so a bad path fails
/// here and not on the first read.
pub fn open_data_source(
    dir: impl AsRef<Path>,
    read_fn: ChunkReadFn,
    options: SourceOptions<'_>,
) -> Result<ChunkedIterator> {
    let dir = dir.as_ref();
    if options.launch.count > 1 {
        info!(
            "Opening path {} on instance {} out of {} instances",
            dir.display(),
            options.launch.rank,
            options.launch.count
        );
    } else {
        info!("Opening path {}", dir.display());
    }
    let assignment = ShardAssignment::from_dir(dir, options.ext, options.worker)?;
    ChunkedIterator::open(
        assignment.into_chunks(),
        read_fn,
        ChunkedOptions {
            buffer_size: options.buffer_size,
            seed: options.seed,
            shuffle: options.shuffle,
            instance_rank: options.launch.rank,
            instance_count: options.launch.count,
        },
    )
    .with_context(|| format!("open data source {}", dir.display()))
}

/// The plain-text chunk reader.
#[must_use]
pub fn text_reader() -> ChunkReadFn {
    Arc::new(|path: &Path| crate::io::text::read_records(path))
}
