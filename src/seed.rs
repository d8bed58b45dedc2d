//! Per-worker seed derivation.
//!
//! Every worker process, on every launch rank, needs its own random stream, and
//! every one of those streams must be reproducible from the single seed the user
//! passed on the command line. [`SeedContext::derive`] folds the base seed and
//! the four coordinates into one `u64` with SHA-256, so the result is
//! order-sensitive (`(count=2, rank=1)` and `(count=1, rank=2)` do not collide)
//! and stable across platforms and releases.
//!
//! A base seed of `0` means "seed from the clock". That resolution must happen
//! exactly once, in the orchestrator, via [`resolve_base_seed`]; the resolved
//! value is then handed to every worker.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Environment key carrying the launch group size under `mpirun`.
pub const LAUNCH_SIZE_KEY: &str = "OMPI_COMM_WORLD_SIZE";
/// Environment key carrying this process's rank under `mpirun`.
pub const LAUNCH_RANK_KEY: &str = "OMPI_COMM_WORLD_RANK";

/// Position of a worker among the local worker processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerCoords {
    pub id: usize,
    pub count: usize,
}

impl WorkerCoords {
    /// Validated constructor: `count >= 1` and `id < count`.
    pub fn new(id: usize, count: usize) -> Result<Self, ConfigError> {
        if count == 0 || id >= count {
            return Err(ConfigError::InvalidWorkerCount { id, count });
        }
        Ok(Self { id, count })
    }

    /// The single-process layout.
    #[must_use]
    pub const fn solo() -> Self {
        Self { id: 0, count: 1 }
    }
}

impl Default for WorkerCoords {
    fn default() -> Self {
        Self::solo()
    }
}

/// Position of this launch among a distributed group of launches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchCoords {
    pub rank: usize,
    pub count: usize,
}

impl Default for LaunchCoords {
    fn default() -> Self {
        Self { rank: 0, count: 1 }
    }
}

impl LaunchCoords {
    /// Read the launch coordinates through `lookup` (normally the process
    /// environment). Absent keys give the single-launch default.
    pub fn discover<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(size) = lookup(LAUNCH_SIZE_KEY) else {
            return Ok(Self::default());
        };
        let count = parse_launch_value(LAUNCH_SIZE_KEY, &size)?;
        let rank = match lookup(LAUNCH_RANK_KEY) {
            Some(raw) => parse_launch_value(LAUNCH_RANK_KEY, &raw)?,
            None => {
                return Err(ConfigError::InvalidLaunchEnv {
                    key: LAUNCH_RANK_KEY,
                    value: String::new(),
                });
            }
        };
        if count == 0 || rank >= count {
            return Err(ConfigError::InvalidLaunchEnv {
                key: LAUNCH_RANK_KEY,
                value: rank.to_string(),
            });
        }
        Ok(Self { rank, count })
    }
}

fn parse_launch_value(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidLaunchEnv {
            key,
            value: raw.to_string(),
        })
}

/// Everything that goes into one worker's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedContext {
    /// Resolved (non-zero) base seed.
    pub base: u64,
    pub worker: WorkerCoords,
    pub launch: LaunchCoords,
}

impl SeedContext {
    #[must_use]
    pub const fn new(base: u64, worker: WorkerCoords, launch: LaunchCoords) -> Self {
        Self { base, worker, launch }
    }

    /// Combine all five inputs, in order, into one seed.
    #[must_use]
    pub fn derive(&self) -> u64 {
        let derived = derive_seed(
            self.base,
            self.worker.count,
            self.worker.id,
            self.launch.count,
            self.launch.rank,
        );
        info!(
            "Computed seed {derived} from original seed {} and instance info: ({}, {}, {}, {})",
            self.base, self.worker.count, self.worker.id, self.launch.count, self.launch.rank
        );
        derived
    }
}

/// Order-sensitive hash-combine of the seed and the four coordinates.
#[must_use]
pub fn derive_seed(
    base: u64,
    local_count: usize,
    local_rank: usize,
    group_count: usize,
    group_rank: usize,
) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"ironstream-seed-v1");
    hasher.update(base.to_le_bytes());
    for coord in [local_count, local_rank, group_count, group_rank] {
        hasher.update((coord as u64).to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_slice()[..8]);
    u64::from_le_bytes(head)
}

/// Turn the user-facing seed into a concrete one: `0` becomes the current time
/// in milliseconds.
#[must_use]
pub fn resolve_base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1);
    millis.max(1)
}
