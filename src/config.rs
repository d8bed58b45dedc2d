//! Pipeline configuration and mix-weight validation.
//!
//! [`PipelineArgs`] is the raw invocation as the command line produced it: source
//! paths, optional weights, buffer sizes, variant options. It is serializable so
//! the orchestrator can hand it to worker processes verbatim.
//!
//! [`PipelineConfig`] is the validated, frozen form a worker builds its pipeline
//! from. Validation happens in the orchestrator before any worker is spawned and
//! again in each worker, so a bad invocation never reaches the data.

use crate::seed::{LaunchCoords, WorkerCoords};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Default values for pipeline arguments.
pub struct Defaults;

impl Defaults {
    pub const BUFFER_SIZE: usize = 1_000_000;
    pub const QUEUE_BUFFER_SIZE: usize = 10_000;
    pub const SEED: u64 = 0;
    pub const NUM_PROCESSES: usize = 16;
    pub const LOG_RATE: u64 = 0;
    pub const LOG_FIRST: u64 = 5;
    pub const SHUFFLE: bool = true;
    pub const EXT: &'static str = ".gz";
}

/// Configuration failures. All of these are raised before any data is read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("mix weights must be non-negative, got {weight} at position {index}")]
    NegativeWeight { index: usize, weight: f64 },
    #[error("mix weight at position {index} is not a finite number")]
    NonFiniteWeight { index: usize },
    #[error("mix weights sum to zero")]
    ZeroWeightSum,
    #[error("number of mix weights ({weights}) does not match number of data sources ({sources})")]
    WeightCountMismatch { sources: usize, weights: usize },
    #[error("a pipeline needs at least one data source")]
    NoSources,
    #[error("{name} must be at least 1")]
    InvalidBufferSize { name: &'static str },
    #[error("invalid worker coordinates: id {id} of {count}")]
    InvalidWorkerCount { id: usize, count: usize },
    #[error("no pipeline named '{0}' is registered")]
    UnknownPipeline(String),
    #[error("pipeline '{0}' is already registered")]
    DuplicatePipeline(String),
    #[error("pipeline option '{0}' is required")]
    MissingOption(String),
    #[error("invalid launch environment: {key}='{value}'")]
    InvalidLaunchEnv { key: &'static str, value: String },
}

/// Validated, normalized mixing weights (non-negative, summing to one).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixWeights(Vec<f64>);

impl MixWeights {
    /// Validate and normalize weights for `sources` data sources.
    ///
    /// `None` means uniform weights. Negative or non-finite weights, a count
    /// different from `sources`, and an all-zero vector are rejected.
    pub fn new(sources: usize, weights: Option<&[f64]>) -> Result<Self, ConfigError> {
        if sources == 0 {
            return Err(ConfigError::NoSources);
        }
        let Some(weights) = weights else {
            return Ok(Self(vec![1.0 / sources as f64; sources]));
        };
        for (index, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() {
                return Err(ConfigError::NonFiniteWeight { index });
            }
            if weight < 0.0 {
                return Err(ConfigError::NegativeWeight { index, weight });
            }
        }
        if weights.len() != sources {
            return Err(ConfigError::WeightCountMismatch {
                sources,
                weights: weights.len(),
            });
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(ConfigError::ZeroWeightSum);
        }
        Ok(Self(weights.iter().map(|w| w / total).collect()))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The raw, unvalidated invocation of one pipeline variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineArgs {
    /// Data source paths in declaration order.
    pub sources: Vec<PathBuf>,
    /// Display names for the sources (argument names), parallel to `sources`.
    pub source_names: Vec<String>,
    /// User-supplied weights, or `None` for the variant default.
    pub mix_weights: Option<Vec<f64>>,
    pub buffer_size: usize,
    pub queue_buffer_size: usize,
    pub shuffle: bool,
    /// Variant-declared options, by long name.
    pub options: BTreeMap<String, String>,
}

impl Default for PipelineArgs {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            source_names: Vec::new(),
            mix_weights: None,
            buffer_size: Defaults::BUFFER_SIZE,
            queue_buffer_size: Defaults::QUEUE_BUFFER_SIZE,
            shuffle: Defaults::SHUFFLE,
            options: BTreeMap::new(),
        }
    }
}

impl PipelineArgs {
    /// Arguments for the given source paths with every other value defaulted.
    pub fn with_sources<I, P>(sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources: Vec<PathBuf> = sources.into_iter().map(Into::into).collect();
        let source_names = (0..sources.len()).map(|i| format!("source_{i}")).collect();
        Self {
            sources,
            source_names,
            ..Self::default()
        }
    }

    /// Number of records a worker accumulates before flushing a batch.
    #[must_use]
    pub fn flush_size(&self) -> usize {
        self.queue_buffer_size.min(self.buffer_size)
    }
}

/// Immutable configuration a worker builds its pipeline from.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    sources: Vec<PathBuf>,
    source_names: Vec<String>,
    mix_weights: MixWeights,
    buffer_size: usize,
    queue_buffer_size: usize,
    shuffle: bool,
    seed: u64,
    worker: WorkerCoords,
    launch: LaunchCoords,
    options: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Validate `args` for one worker. `default_weights` is the variant's fixed
    /// default, used when the invocation supplied none (`None` means uniform).
    pub fn new(
        args: &PipelineArgs,
        default_weights: Option<&[f64]>,
        worker: WorkerCoords,
        launch: LaunchCoords,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if args.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize { name: "buffer_size" });
        }
        if args.queue_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize {
                name: "queue_buffer_size",
            });
        }
        let worker = WorkerCoords::new(worker.id, worker.count)?;
        let weights = args.mix_weights.as_deref().or(default_weights);
        let mix_weights = MixWeights::new(args.sources.len(), weights)?;

        Ok(Self {
            sources: args.sources.clone(),
            source_names: args.source_names.clone(),
            mix_weights,
            buffer_size: args.buffer_size,
            queue_buffer_size: args.queue_buffer_size,
            shuffle: args.shuffle,
            seed,
            worker,
            launch,
            options: args.options.clone(),
        })
    }

    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Name of source `i`, falling back to its index.
    #[must_use]
    pub fn source_name(&self, i: usize) -> String {
        self.source_names
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("source_{i}"))
    }

    #[must_use]
    pub fn mix_weights(&self) -> &MixWeights {
        &self.mix_weights
    }

    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[must_use]
    pub const fn queue_buffer_size(&self) -> usize {
        self.queue_buffer_size
    }

    #[must_use]
    pub fn flush_size(&self) -> usize {
        self.queue_buffer_size.min(self.buffer_size)
    }

    #[must_use]
    pub const fn shuffle(&self) -> bool {
        self.shuffle
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub const fn worker(&self) -> WorkerCoords {
        self.worker
    }

    #[must_use]
    pub const fn launch(&self) -> LaunchCoords {
        self.launch
    }

    /// A variant option by long name.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    /// A variant option that must be present.
    pub fn require_option(&self, name: &str) -> Result<&str, ConfigError> {
        self.option(name)
            .ok_or_else(|| ConfigError::MissingOption(name.to_string()))
    }

    /// Human-readable weight table, one line per source.
    #[must_use]
    pub fn describe_weights(&self) -> String {
        self.mix_weights
            .as_slice()
            .iter()
            .enumerate()
            .map(|(i, w)| {
                format!(
                    "\t{:.5}% : {} ({})",
                    w * 100.0,
                    self.sources[i].display(),
                    self.source_name(i)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
