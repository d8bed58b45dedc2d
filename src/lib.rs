//! # Ironstream
//!
//! An **infinite training-data streamer** for machine translation and similar
//! sequence tasks. Ironstream reads sharded corpora (directories of pre-split,
//! optionally compressed, tab-separated chunk files), shuffles and mixes them
//! according to configurable weights, transforms the records, and writes an
//! endless, reproducible stream of lines to stdout for a trainer to consume.
//!
//! ## Key Features
//!
//! - **Multi-process** - the chunks of every source are partitioned across worker
//!   processes, whose output is interleaved fairly by one collector
//! - **Reproducible** - every random decision is seeded from one base seed and the
//!   worker's coordinates; the same invocation replays the same stream
//! - **Weighted mixing** - draw from several sources in fixed proportions
//! - **Composable stages** - tagging, casing, filtering, tokenization
//! - **Pluggable pipelines** - variants are declared in a [`PipelineRegistry`] and
//!   the command line is generated from it
//! - **Compression** - gzip, zstd, bzip2 and xz chunks (feature-gated)
//!
//! ## Quick Start
//!
//! ```text
//! ironstream -n 8 default data/parallel | trainer --train-stream -
//! ironstream -n 8 multistream data/wmt data/paracrawl --mix-weights 3 1
//! ```
//!
//! In-process, a single worker's stream can be built directly:
//!
//! ```no_run
//! use ironstream::{LaunchCoords, PipelineArgs, PipelineRegistry, WorkerCoords};
//! use ironstream::pipeline::Pipeline;
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = PipelineRegistry::builtin()?;
//! let args = PipelineArgs::with_sources(["data/parallel"]);
//! let pipeline = Pipeline::create(
//!     &registry,
//!     "default",
//!     &args,
//!     WorkerCoords::solo(),
//!     LaunchCoords::default(),
//!     1234,
//! )?;
//! for record in pipeline.take(10) {
//!     println!("{}", record?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is an ordered list of text fields, canonically a
//! (source, target) pair. Only the first two fields are emitted.
//!
//! ### Sharding
//!
//! Each data source is a directory of chunk files. The chunk list is sorted and
//! dealt round-robin to the local workers ([`shard`]); when several launch
//! instances cooperate, each reads only its slice of every chunk
//! ([`io::chunked`]).
//!
//! ### Mixing
//!
//! The [`Mixer`] draws from its input streams with fixed probabilities using its
//! own seeded generator.
//!
//! ### Collection
//!
//! Workers send batches of lines over their stdout; the [`collector`] reads one
//! batch from each in turn and forwards the lines.

pub mod channel;
pub mod cli;
pub mod collector;
pub mod config;
pub mod io;
pub mod metrics;
pub mod mixer;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod seed;
pub mod shard;
pub mod stage;
pub mod testing;
pub mod worker;

pub use collector::{Collector, CollectorError, SamplingConfig, WorkerProcesses};
pub use config::{ConfigError, Defaults, MixWeights, PipelineArgs, PipelineConfig};
pub use mixer::{Mixer, MixerError, mix};
pub use pipeline::{Pipeline, PipelineContext};
pub use record::Record;
pub use registry::{PipelineRegistry, VariantDescriptor};
pub use seed::{LaunchCoords, SeedContext, WorkerCoords, derive_seed};
pub use shard::ShardAssignment;
pub use stage::{RecordStream, Stage, StageChain};
