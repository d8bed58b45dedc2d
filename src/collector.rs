//! The orchestrator: spawn workers, interleave their batches, shut them down.
//!
//! [`Collector`] is the pure forwarding loop over any set of byte channels, which
//! keeps it testable with in-memory readers. [`WorkerProcesses`] owns the child
//! processes, and [`orchestrate`] wires the two together for the binary.

use crate::channel::FrameReader;
use crate::config::PipelineArgs;
use crate::metrics::{RunStats, RunSummary};
use crate::seed::{LaunchCoords, resolve_base_seed};
use crate::worker::WorkerSpec;
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Hidden subcommand a worker child is started with.
pub const WORKER_COMMAND: &str = "worker";

/// Which forwarded records get copied to the sample sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplingConfig {
    /// Every `log_rate`-th record; `0` disables periodic sampling.
    pub log_rate: u64,
    /// The first `log_first` records.
    pub log_first: u64,
}

impl SamplingConfig {
    /// Whether record `n` (1-based) is sampled.
    #[must_use]
    pub const fn should_sample(&self, n: u64) -> bool {
        (self.log_rate > 0 && n % self.log_rate == 0) || n <= self.log_first
    }
}

/// Failures of the forwarding loop itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectorError {
    /// Worker streams never end, so a closed channel means the worker died.
    #[error("worker {worker} closed its channel while the consumer was still reading")]
    ChannelClosed { worker: usize },
}

/// Forwards batches from worker channels to one output, in strict round-robin.
pub struct Collector {
    sampling: SamplingConfig,
    sample_sink: Option<Box<dyn Write>>,
    stats: RunStats,
}

impl Collector {
    #[must_use]
    pub fn new(sampling: SamplingConfig) -> Self {
        Self {
            sampling,
            sample_sink: None,
            stats: RunStats::default(),
        }
    }

    /// Send sampled records to `sink` instead of the log.
    #[must_use]
    pub fn with_sample_sink(mut self, sink: Box<dyn Write>) -> Self {
        self.sample_sink = Some(sink);
        self
    }

    /// Open `path` as the sample sink.
    pub fn with_sample_file(self, path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("create sample file {}", path.display()))?;
        Ok(self.with_sample_sink(Box::new(BufWriter::new(file))))
    }

    #[must_use]
    pub const fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Visit the channels in order, taking one batch from each per turn, and
    /// write every line to `out`. Returns when the consumer of `out`
    /// disconnects.
    ///
    /// # Errors
    /// Fails with [`CollectorError::ChannelClosed`] as soon as any channel ends,
    /// and on a corrupt channel or a write error other than a broken pipe.
    pub fn run<R: Read, W: Write>(
        &mut self,
        channels: Vec<FrameReader<R>>,
        out: &mut W,
    ) -> Result<&RunStats> {
        let outcome = self.rotate(channels, out);
        if let Some(sink) = self.sample_sink.as_mut() {
            sink.flush().context("flush sample file")?;
        }
        outcome?;
        Ok(&self.stats)
    }

    fn rotate<R: Read, W: Write>(
        &mut self,
        mut channels: Vec<FrameReader<R>>,
        out: &mut W,
    ) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }
        loop {
            for (worker, channel) in channels.iter_mut().enumerate() {
                let batch = channel
                    .read_batch()
                    .with_context(|| format!("read from worker {worker}"))?;
                let Some(lines) = batch else {
                    return Err(CollectorError::ChannelClosed { worker }.into());
                };
                self.stats.batches += 1;
                match self.forward(&lines, out) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        info!("Consumer disconnected after {} records", self.stats.lines);
                        self.stats.consumer_disconnected = true;
                        return Ok(());
                    }
                    Err(e) => return Err(e).context("write to output"),
                }
            }
        }
    }

    fn forward<W: Write>(&mut self, lines: &[String], out: &mut W) -> io::Result<()> {
        for line in lines {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
            let n = self.stats.observe(line);
            if self.sampling.should_sample(n) {
                self.sample(n, line);
            }
        }
        out.flush()
    }

    fn sample(&mut self, n: u64, line: &str) {
        match self.sample_sink.as_mut() {
            Some(sink) => {
                if let Err(e) = writeln!(sink, "{line}") {
                    warn!("Failed to write sample {n}: {e}");
                }
            }
            None => info!("SAMPLE {n}: {line}"),
        }
    }
}

/// How a worker process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerExit {
    pub id: usize,
    /// `None` if the worker was still running and had to be killed.
    pub status: Option<ExitStatus>,
}

/// The set of running worker processes. Dropping it kills and reaps them all.
pub struct WorkerProcesses {
    children: Vec<Child>,
    reaped: bool,
}

impl WorkerProcesses {
    /// Start one `program worker` child per spec and hand each its spec on stdin.
    ///
    /// # Errors
    /// Fails if any child cannot be started; already-started ones are killed.
    pub fn spawn(program: &Path, specs: &[WorkerSpec], quiet: bool) -> Result<Self> {
        let mut processes = Self {
            children: Vec::with_capacity(specs.len()),
            reaped: false,
        };
        for spec in specs {
            let mut command = Command::new(program);
            if quiet {
                command.arg("--quiet");
            }
            let mut child = command
                .arg(WORKER_COMMAND)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .with_context(|| format!("spawn worker {}", spec.worker.id))?;
            let payload = spec.to_json()?;
            let stdin = child.stdin.take();
            processes.children.push(child);
            let Some(mut stdin) = stdin else {
                bail!("worker {} has no stdin", spec.worker.id);
            };
            stdin
                .write_all(&payload)
                .with_context(|| format!("send spec to worker {}", spec.worker.id))?;
        }
        Ok(processes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Take the stdout channel of every worker, in worker order.
    pub fn take_channels(&mut self) -> Result<Vec<FrameReader<ChildStdout>>> {
        self.children
            .iter_mut()
            .enumerate()
            .map(|(id, child)| {
                child
                    .stdout
                    .take()
                    .map(FrameReader::new)
                    .with_context(|| format!("worker {id} stdout already taken"))
            })
            .collect()
    }

    /// Block until worker `id` has exited on its own.
    pub fn wait_for(&mut self, id: usize) -> Option<WorkerExit> {
        let child = self.children.get_mut(id)?;
        let status = child
            .wait()
            .inspect_err(|e| warn!("Failed to reap worker {id}: {e}"))
            .ok();
        Some(WorkerExit { id, status })
    }

    /// Kill every worker that is still running and reap them all.
    pub fn shutdown(&mut self) -> Vec<WorkerExit> {
        if self.reaped {
            return Vec::new();
        }
        self.reaped = true;
        self.children
            .iter_mut()
            .enumerate()
            .map(|(id, child)| {
                let status = match child.try_wait() {
                    Ok(Some(status)) => Some(status),
                    _ => {
                        let _ = child.kill();
                        None
                    }
                };
                if let Err(e) = child.wait() {
                    warn!("Failed to reap worker {id}: {e}");
                }
                WorkerExit { id, status }
            })
            .collect()
    }
}

impl Drop for WorkerProcesses {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Global options of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// `0` means "derive from the clock".
    pub seed: u64,
    pub num_processes: usize,
    pub sampling: SamplingConfig,
    pub sample_file: Option<PathBuf>,
    pub quiet: bool,
}

/// Run `pipeline` with `num_processes` worker children of `program`, forwarding
/// their records to stdout until the consumer disconnects.
///
/// # Errors
/// Fails if workers cannot be started, a channel is corrupt, or any worker
/// stops producing before the consumer goes away.
pub fn orchestrate(
    program: &Path,
    pipeline: &str,
    args: &PipelineArgs,
    launch: LaunchCoords,
    options: &RunOptions,
) -> Result<RunSummary> {
    let start = Instant::now();
    let base_seed = resolve_base_seed(options.seed);
    let specs = WorkerSpec::plan(pipeline, args, base_seed, options.num_processes, launch)?;
    info!(
        "Launching {} worker processes for pipeline '{pipeline}' (base seed {base_seed})",
        specs.len()
    );

    let mut workers = WorkerProcesses::spawn(program, &specs, options.quiet)?;
    let channels = workers.take_channels()?;
    let overhead = start.elapsed();

    let mut collector = Collector::new(options.sampling);
    if let Some(path) = &options.sample_file {
        collector = collector.with_sample_file(path)?;
    }
    let mut out = BufWriter::new(io::stdout().lock());
    let result = collector.run(channels, &mut out).cloned();
    drop(out);

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            if let Some(CollectorError::ChannelClosed { worker }) =
                e.downcast_ref::<CollectorError>()
            {
                match workers.wait_for(*worker).and_then(|exit| exit.status) {
                    Some(status) => error!("Worker {worker} exited with {status}"),
                    None => error!("Worker {worker} closed its channel and could not be reaped"),
                }
            }
            workers.shutdown();
            return Err(e);
        }
    };
    workers.shutdown();
    let summary = RunSummary::new(&stats, overhead, start.elapsed());
    summary.log();
    Ok(summary)
}
