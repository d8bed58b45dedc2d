//! Weighted interleaving of several record streams.
//!
//! For every requested record the [`Mixer`] draws `u ~ U(0, 1)` from its own
//! seeded generator and pulls from the first stream whose cumulative weight
//! reaches `u`. Draws are independent, so over many records the share of each
//! stream converges to its weight; nothing is buffered and each call touches
//! exactly one upstream stream.
//!
//! Weights are used as given. Normalize them first (see
//! [`MixWeights`](crate::config::MixWeights)).
//!
//! Sources are expected to be infinite. If one ends anyway, the mixer yields a
//! single [`MixerError::Exhausted`] and then stops: a finite source inside a mix
//! would silently skew the proportions, so it is treated as fatal.

use crate::record::Record;
use crate::stage::RecordStream;
use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MixerError {
    #[error("mixed data source {source_index} was exhausted; mixed sources must be infinite")]
    Exhausted { source_index: usize },
}

pub struct Mixer {
    streams: Vec<RecordStream>,
    cumulative: Vec<f64>,
    rng: StdRng,
    done: bool,
}

impl Mixer {
    /// Mix `streams` with `weights` (same length, non-negative, summing to one).
    ///
    /// # Errors
    /// Fails if `streams` is empty or the number of weights differs.
    pub fn new(streams: Vec<RecordStream>, weights: &[f64], seed: u64) -> Result<Self> {
        if streams.is_empty() {
            bail!("a mixer needs at least one stream");
        }
        if streams.len() != weights.len() {
            bail!(
                "{} streams but {} mix weights",
                streams.len(),
                weights.len()
            );
        }
        let cumulative = weights
            .iter()
            .scan(0.0, |acc, w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
        Ok(Self {
            streams,
            cumulative,
            rng: StdRng::seed_from_u64(seed),
            done: false,
        })
    }

    /// Index of the stream a draw of `u` selects. Falls back to stream 0 when
    /// rounding leaves `u` above the last cumulative weight.
    #[must_use]
    pub fn select(&self, u: f64) -> usize {
        self.cumulative.iter().position(|&c| u <= c).unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl Iterator for Mixer {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let u: f64 = self.rng.random();
        let source_index = self.select(u);
        match self.streams[source_index].next() {
            Some(item) => Some(item),
            None => {
                self.done = true;
                Some(Err(MixerError::Exhausted { source_index }.into()))
            }
        }
    }
}

/// Box a mixer as a [`RecordStream`]. A single stream is returned unchanged.
pub fn mix(mut streams: Vec<RecordStream>, weights: &[f64], seed: u64) -> Result<RecordStream> {
    if streams.len() == 1 && weights.len() == 1 {
        return Ok(streams.remove(0));
    }
    Ok(Box::new(Mixer::new(streams, weights, seed)?))
}
