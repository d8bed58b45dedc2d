//! The worker side of the process model.
//!
//! A worker is the same binary started with the hidden `worker` subcommand. It
//! reads one JSON [`WorkerSpec`] from stdin, builds its own instance of the
//! named pipeline, and pumps the resulting records to stdout as batch frames
//! until the stream ends or the orchestrator goes away.

use crate::channel::BatchWriter;
use crate::config::PipelineArgs;
use crate::pipeline::Pipeline;
use crate::record::Record;
use crate::registry::PipelineRegistry;
use crate::seed::{LaunchCoords, SeedContext, WorkerCoords};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, BufWriter, Read, Write};
use tracing::{debug, info};

/// Everything a worker process needs to know about itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub pipeline: String,
    pub args: PipelineArgs,
    pub worker: WorkerCoords,
    pub launch: LaunchCoords,
    /// Derived per-worker seed.
    pub seed: u64,
    pub flush_size: usize,
}

impl WorkerSpec {
    /// One spec per local worker, with seeds derived from `base_seed` (already
    /// resolved, so never zero) and the coordinates.
    ///
    /// # Errors
    /// Fails if `count` is zero.
    pub fn plan(
        pipeline: &str,
        args: &PipelineArgs,
        base_seed: u64,
        count: usize,
        launch: LaunchCoords,
    ) -> Result<Vec<Self>> {
        let flush_size = args.flush_size();
        (0..count.max(1))
            .map(|id| {
                let worker = WorkerCoords::new(id, count)?;
                Ok(Self {
                    pipeline: pipeline.to_string(),
                    args: args.clone(),
                    worker,
                    launch,
                    seed: SeedContext::new(base_seed, worker, launch).derive(),
                    flush_size,
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).context("read worker spec")
    }
}

/// How a worker's output loop ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub records: u64,
    pub batches: u64,
    /// The reader of our channel went away.
    pub disconnected: bool,
}

fn is_broken_pipe(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::BrokenPipe
}

/// Forward canonical lines of `records` to `sink` in batches of `flush_size`.
///
/// A broken sink ends the loop quietly. An error from the stream is returned
/// after whatever was already batched has been flushed.
///
/// # Errors
/// Fails on stream errors and on write errors other than a broken pipe.
pub fn pump<I, W>(records: I, flush_size: usize, sink: W) -> Result<WorkerOutcome>
where
    I: IntoIterator<Item = Result<Record>>,
    W: Write,
{
    let mut writer = BatchWriter::new(sink, flush_size);
    let mut failure = None;
    for item in records {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };
        if let Err(e) = writer.push(record.to_line()) {
            if is_broken_pipe(&e) {
                let stats = writer.stats();
                return Ok(WorkerOutcome {
                    records: stats.records,
                    batches: stats.batches,
                    disconnected: true,
                });
            }
            return Err(e).context("write batch");
        }
    }

    let outcome = match writer.finish() {
        Ok((_, stats)) => WorkerOutcome {
            records: stats.records,
            batches: stats.batches,
            disconnected: false,
        },
        Err(e) if is_broken_pipe(&e) => WorkerOutcome {
            disconnected: true,
            ..WorkerOutcome::default()
        },
        Err(e) => return Err(e).context("flush final batch"),
    };
    match failure {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}

/// Build the pipeline described by `spec` and pump it into `sink`.
pub fn run_worker<W: Write>(
    registry: &PipelineRegistry,
    spec: &WorkerSpec,
    sink: W,
) -> Result<WorkerOutcome> {
    let pipeline = Pipeline::create(
        registry,
        &spec.pipeline,
        &spec.args,
        spec.worker,
        spec.launch,
        spec.seed,
    )
    .with_context(|| format!("worker {} failed to start", spec.worker.id))?;
    info!(
        "Worker {}/{} streaming pipeline '{}' (flush size {})",
        spec.worker.id,
        spec.worker.count,
        pipeline.name(),
        spec.flush_size
    );
    let outcome = pump(pipeline, spec.flush_size, sink)
        .with_context(|| format!("worker {}", spec.worker.id))?;
    debug!(
        "Worker {} done: {} records in {} batches (disconnected: {})",
        spec.worker.id, outcome.records, outcome.batches, outcome.disconnected
    );
    Ok(outcome)
}

/// Entry point of the `worker` subcommand: spec on stdin, frames on stdout.
pub fn run_from_stdin(registry: &PipelineRegistry) -> Result<()> {
    let spec = WorkerSpec::from_reader(io::stdin().lock())?;
    let stdout = io::stdout().lock();
    run_worker(registry, &spec, BufWriter::new(stdout))?;
    Ok(())
}
