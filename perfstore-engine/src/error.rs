//! Errors of the workload engine.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can abort a phase of the workload engine.
///
/// Failures of individual operations never surface here. They are recorded as metrics and logged
/// where they happen.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the storage backend that prevents the phase from starting.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The engine was configured with values outside of their valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The workload phase was started without any keys to operate on.
    #[error("cannot run a workload against an empty key set")]
    EmptyKeySet,
}

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
