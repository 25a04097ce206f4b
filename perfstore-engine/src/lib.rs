//! The workload engine drives synthetic load against a pluggable storage [`Backend`].
//!
//! A run has two phases:
//!
//!  1. The [preset](preset::preset) phase reconciles the dataset in the backend to a target size,
//!     creating missing keys through a bounded [`WorkerPool`].
//!  2. The [workload](workload::run) phase starts a fixed number of independent workers. Each
//!     worker is paced by its own [`RateLimiter`] and issues a mix of reads and updates against
//!     keys drawn from the now immutable [`KeySet`].
//!
//! Every attempted operation is reported to a [`MetricsRecorder`]. Failures of single operations
//! or single workers are isolated, so a run degrades instead of aborting.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod keyset;
pub mod metrics;
pub mod operation;
pub mod payload;
pub mod pool;
pub mod preset;
pub mod rate_limit;
pub mod workload;

pub use backend::{Backend, BackendError, BackendResult, BoxedBackend, Connect, Connections};
pub use config::{PayloadConfig, WorkloadConfig};
pub use error::{Error, Result};
pub use keyset::KeySet;
pub use metrics::{Metrics, MetricsRecorder};
pub use operation::Operation;
pub use pool::WorkerPool;
pub use rate_limit::RateLimiter;
pub use workload::{OperationMix, Thresholds};
