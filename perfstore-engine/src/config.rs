//! Parameters of a workload run.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::workload::{OperationMix, Thresholds};

/// Default number of keys the dataset is filled up to.
pub const DEFAULT_DATASET_SIZE: usize = 100_000;
/// Default capacity of the preset [`WorkerPool`](crate::WorkerPool).
pub const DEFAULT_PRESET_CONCURRENCY: usize = 100;
/// Default number of workload workers.
pub const DEFAULT_WORKERS: usize = 100;
/// Default operations per second of every single worker.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Shape of the payloads written by creates and updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadConfig {
    /// Size of every payload in bytes.
    pub size: u64,
    /// Draw fresh random bytes for every payload instead of reusing a fixed buffer.
    pub random: bool,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            random: true,
        }
    }
}

/// Immutable configuration of the engine.
///
/// Constructed once at startup and passed to every phase. Backend connection parameters are not
/// part of this value, they are consumed when constructing the [`Backend`](crate::Backend).
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadConfig {
    /// The number of keys the dataset is filled up to during preset.
    pub dataset_size: usize,
    /// Prefix of the keys generated during preset.
    pub key_prefix: String,
    /// Maximum number of concurrent creates during preset.
    pub preset_concurrency: usize,
    /// Pause after every `preset_concurrency` submitted creates. Zero disables pausing.
    pub preset_pause: Duration,
    /// Number of workload workers.
    pub workers: usize,
    /// Operations per second of every single worker. Zero disables pacing.
    ///
    /// The aggregate rate of the run is `rate_limit * workers`.
    pub rate_limit: u32,
    /// Threshold below which a random draw issues a read.
    pub read_op_percent: f64,
    /// Threshold below which a random draw issues an update.
    pub update_op_percent: f64,
    /// How the two thresholds are combined.
    pub mix: OperationMix,
    /// Shape of written payloads.
    pub payload: PayloadConfig,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            dataset_size: DEFAULT_DATASET_SIZE,
            key_prefix: "perf-".into(),
            preset_concurrency: DEFAULT_PRESET_CONCURRENCY,
            preset_pause: Duration::ZERO,
            workers: DEFAULT_WORKERS,
            rate_limit: DEFAULT_RATE_LIMIT,
            read_op_percent: 0.25,
            update_op_percent: 0.75,
            mix: OperationMix::default(),
            payload: PayloadConfig::default(),
        }
    }
}

impl WorkloadConfig {
    /// Checks that all values are within their valid ranges.
    pub fn validate(&self) -> Result<()> {
        check_percent("read_op_percent", self.read_op_percent)?;
        check_percent("update_op_percent", self.update_op_percent)?;

        let total = self.read_op_percent + self.update_op_percent;
        if self.mix == OperationMix::Exclusive && total > 1.0 {
            return Err(Error::InvalidConfig(format!(
                "exclusive operation mix requires read_op_percent + update_op_percent <= 1, got {total}"
            )));
        }
        if self.preset_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "preset_concurrency must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }

        Ok(())
    }

    /// Returns the operation thresholds of workload iterations.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            read: self.read_op_percent,
            update: self.update_op_percent,
            mix: self.mix,
        }
    }
}

fn check_percent(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}
