//! Run statistics gathered by the collector and the summary reported at the end.
//!
//! [`RunStats`] is updated once per forwarded record. When the run ends,
//! [`RunSummary::new`] combines it with the timings into a JSON-serializable
//! report that is logged and can optionally be saved to a file.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Counters maintained while records are forwarded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Records written to the output.
    pub lines: u64,
    /// Tab-separated field count → occurrences.
    pub num_fields: BTreeMap<usize, u64>,
    pub batches: u64,
    /// The downstream consumer closed the output.
    pub consumer_disconnected: bool,
}

impl RunStats {
    /// Account for one forwarded line; returns its 1-based position.
    pub fn observe(&mut self, line: &str) -> u64 {
        self.lines += 1;
        let fields = line.split('\t').count();
        *self.num_fields.entry(fields).or_insert(0) += 1;
        self.lines
    }
}

/// End-of-run report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub lines_produced: u64,
    pub num_fields: BTreeMap<usize, u64>,
    /// Seconds spent spawning workers.
    pub overhead_time: f64,
    /// Seconds from start to end of the run.
    pub total_time: f64,
    /// Lines per second over the whole run.
    pub yield_rate: f64,
    /// Lines per second after workers were up.
    pub yield_rate_sans_overhead: f64,
    pub consumer_disconnected: bool,
}

impl RunSummary {
    #[must_use]
    pub fn new(stats: &RunStats, overhead: Duration, total: Duration) -> Self {
        let overhead_time = overhead.as_secs_f64();
        let total_time = total.as_secs_f64();
        let rate = |secs: f64| {
            if secs > 0.0 {
                stats.lines as f64 / secs
            } else {
                0.0
            }
        };
        Self {
            lines_produced: stats.lines,
            num_fields: stats.num_fields.clone(),
            overhead_time,
            total_time,
            yield_rate: rate(total_time),
            yield_rate_sans_overhead: rate(total_time - overhead_time),
            consumer_disconnected: stats.consumer_disconnected,
        }
    }

    /// # Errors
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Emit the summary through the log.
    pub fn log(&self) {
        match self.to_json() {
            Ok(json) => info!("Summary: {json}"),
            Err(e) => info!("Summary unavailable: {e}"),
        }
    }

    /// Save the summary as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.to_json()?.as_bytes())?;
        Ok(())
    }
}
