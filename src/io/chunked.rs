//! Infinite, seeded, shuffled iteration over a list of chunks.
//!
//! [`ChunkedIterator`] is the reading primitive every data source sits on:
//!
//! 1. The chunk list is walked as an **infinite permutation**: every epoch visits
//!    each chunk once, in an order reshuffled from the seed (list order when
//!    shuffling is off).
//! 2. Positions of that infinite sequence are dealt round-robin to launch
//!    instances: position `p` belongs to instance `p % instance_count`. This is
//!    independent of (and composes with) the per-worker shard split.
//! 3. Records of the chunks an instance keeps pass through a **buffered
//!    shuffle** of `buffer_size` slots, so records from different chunks mix.
//!
//! Everything is driven by [`StdRng`] instances seeded from the caller's seed,
//! so two iterators opened with the same arguments yield the same sequence.

use crate::record::Record;
use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decodes one chunk into its records.
pub type ChunkReadFn = Arc<dyn Fn(&Path) -> Result<Vec<Record>> + Send + Sync>;

/// Reading parameters for [`ChunkedIterator::open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkedOptions {
    /// Slots in the record shuffle buffer.
    pub buffer_size: usize,
    pub seed: u64,
    pub shuffle: bool,
    pub instance_rank: usize,
    pub instance_count: usize,
}

impl Default for ChunkedOptions {
    fn default() -> Self {
        Self {
            buffer_size: crate::config::Defaults::BUFFER_SIZE,
            seed: 0,
            shuffle: true,
            instance_rank: 0,
            instance_count: 1,
        }
    }
}

/// Endless walk over a chunk list, one instance's share of it.
struct InfinitePermutation {
    chunks: Vec<PathBuf>,
    order: Vec<usize>,
    cursor: usize,
    position: u64,
    rng: StdRng,
    shuffle: bool,
    rank: u64,
    count: u64,
}

impl InfinitePermutation {
    fn new(chunks: Vec<PathBuf>, options: &ChunkedOptions) -> Self {
        let order = (0..chunks.len()).collect();
        Self {
            // `cursor == len` forces a (re)shuffle on the first call
            cursor: chunks.len(),
            chunks,
            order,
            position: 0,
            rng: StdRng::seed_from_u64(options.seed),
            shuffle: options.shuffle,
            rank: options.instance_rank as u64,
            count: options.instance_count as u64,
        }
    }

    fn next_chunk(&mut self) -> &Path {
        loop {
            if self.cursor == self.order.len() {
                if self.shuffle {
                    self.order.shuffle(&mut self.rng);
                }
                self.cursor = 0;
            }
            let idx = self.order[self.cursor];
            self.cursor += 1;
            let position = self.position;
            self.position += 1;
            if position % self.count == self.rank {
                return &self.chunks[idx];
            }
        }
    }
}

/// Reservoir-style shuffle over a fixed number of slots.
///
/// Each incoming record lands in a random slot; whatever occupied that slot is
/// emitted. Nothing is emitted until a collision happens.
struct BufferedShuffle {
    slots: Vec<Option<Record>>,
    rng: StdRng,
}

impl BufferedShuffle {
    fn new(size: usize, seed: u64) -> Self {
        Self {
            slots: vec![None; size.max(1)],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn push(&mut self, record: Record) -> Option<Record> {
        let idx = self.rng.random_range(0..self.slots.len());
        self.slots[idx].replace(record)
    }
}

/// Lazy, infinite-by-cycling sequence of records from a chunk list.
pub struct ChunkedIterator {
    permutation: InfinitePermutation,
    read_fn: ChunkReadFn,
    pending: VecDeque<Record>,
    shuffler: Option<BufferedShuffle>,
    produced_any: bool,
    empty_reads: usize,
    empty_read_limit: usize,
    failed: bool,
}

impl ChunkedIterator {
    /// Open an iterator over `chunks`, decoded by `read_fn`.
    ///
    /// # Errors
    /// Fails when `chunks` is empty or the instance coordinates are inconsistent.
    pub fn open(chunks: Vec<PathBuf>, read_fn: ChunkReadFn, options: ChunkedOptions) -> Result<Self> {
        if chunks.is_empty() {
            bail!("cannot iterate over an empty chunk list");
        }
        if options.instance_count == 0 || options.instance_rank >= options.instance_count {
            bail!(
                "invalid instance coordinates: rank {} of {}",
                options.instance_rank,
                options.instance_count
            );
        }
        let empty_read_limit = 4 * chunks.len() * options.instance_count;
        let shuffler = options
            .shuffle
            .then(|| BufferedShuffle::new(options.buffer_size, options.seed.wrapping_add(1)));
        Ok(Self {
            permutation: InfinitePermutation::new(chunks, &options),
            read_fn,
            pending: VecDeque::new(),
            shuffler,
            produced_any: false,
            empty_reads: 0,
            empty_read_limit,
            failed: false,
        })
    }

    /// The next record in chunk order, before the shuffle buffer.
    fn next_unshuffled(&mut self) -> Result<Record> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                self.produced_any = true;
                return Ok(record);
            }
            let chunk = self.permutation.next_chunk().to_path_buf();
            let records = (self.read_fn)(&chunk)?;
            if records.is_empty() {
                self.empty_reads += 1;
                if !self.produced_any && self.empty_reads >= self.empty_read_limit {
                    bail!("no records found in any chunk assigned to this reader");
                }
                continue;
            }
            self.pending.extend(records);
        }
    }
}

impl Iterator for ChunkedIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let record = match self.next_unshuffled() {
                Ok(record) => record,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            match self.shuffler.as_mut() {
                None => return Some(Ok(record)),
                Some(shuffler) => {
                    if let Some(out) = shuffler.push(record) {
                        return Some(Ok(out));
                    }
                }
            }
        }
    }
}
