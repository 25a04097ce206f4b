//! The steady-state workload phase.
//!
//! [`run`] starts a fixed number of independent workers. Every iteration of a worker waits for
//! its private [`RateLimiter`], draws a random value `r` in `[0, 1)`, selects a key uniformly at
//! random from the [`KeySet`] and then issues a read and/or an update depending on the
//! configured [`Thresholds`].
//!
//! Workers stop cooperatively when the shutdown token is cancelled. An operation that is already
//! in flight is allowed to complete, but no new iteration starts. A worker that panics stops on
//! its own, its siblings keep running.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{Connections, SharedBackend};
use crate::config::WorkloadConfig;
use crate::error::{Error, Result};
use crate::keyset::KeySet;
use crate::metrics::{self, MetricsRecorder};
use crate::operation::Operation;
use crate::payload::PayloadSource;
use crate::rate_limit::RateLimiter;

/// How the read and update thresholds are combined into a decision.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMix {
    /// Both thresholds are evaluated independently against the same draw.
    ///
    /// With `read < update`, draws below `read` issue a read *and* an update in the same
    /// iteration. The realized read:update ratio therefore differs from the configured values.
    #[default]
    Overlapping,

    /// The thresholds are consecutive ranges of the unit interval.
    ///
    /// Draws in `[0, read)` issue a read, draws in `[read, read + update)` issue an update, all
    /// other draws issue nothing.
    Exclusive,
}

/// The operations to issue in one iteration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Plan {
    /// Issue a read.
    pub read: bool,
    /// Issue an update.
    pub update: bool,
}

/// Operation thresholds of workload iterations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    /// Threshold for reads, within `[0, 1]`.
    pub read: f64,
    /// Threshold for updates, within `[0, 1]`.
    pub update: f64,
    /// How both thresholds combine.
    pub mix: OperationMix,
}

impl Thresholds {
    /// Decides which operations a draw `r` in `[0, 1)` issues.
    pub fn plan(&self, r: f64) -> Plan {
        match self.mix {
            OperationMix::Overlapping => Plan {
                read: r < self.read,
                update: r < self.update,
            },
            OperationMix::Exclusive => Plan {
                read: r < self.read,
                update: r >= self.read && r < self.read + self.update,
            },
        }
    }
}

/// How the workers of a run stopped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkloadSummary {
    /// The number of workers started.
    pub workers: usize,
    /// Workers that stopped because of the shutdown token.
    pub cancelled: usize,
    /// Workers that could not open their backend connection.
    pub connect_failed: usize,
    /// Workers that stopped because of a panic.
    pub panicked: usize,
}

/// Runs the workload until `shutdown` is cancelled.
///
/// Returns once every worker has stopped. This happens after cancellation, or earlier if all
/// workers died on their own. The keys must be non-empty, otherwise [`Error::EmptyKeySet`] is
/// returned before any worker starts.
pub async fn run(
    config: &WorkloadConfig,
    connections: Connections,
    keys: Arc<KeySet>,
    metrics: Arc<dyn MetricsRecorder>,
    shutdown: CancellationToken,
) -> Result<WorkloadSummary> {
    if keys.is_empty() {
        return Err(Error::EmptyKeySet);
    }

    tracing::info!(
        workers = config.workers,
        rate_limit = config.rate_limit,
        keys = keys.len(),
        mix = ?config.mix,
        "starting workload"
    );

    let mut workers = JoinSet::new();
    for id in 0..config.workers {
        let worker = WorkerSetup {
            id,
            connections: connections.clone(),
            keys: Arc::clone(&keys),
            metrics: Arc::clone(&metrics),
            limiter: RateLimiter::new(config.rate_limit),
            thresholds: config.thresholds(),
            payloads: PayloadSource::new(config.payload),
        };
        let shutdown = shutdown.clone();

        workers.spawn(async move {
            let exit = AssertUnwindSafe(worker.start(shutdown)).catch_unwind().await;
            (id, exit)
        });
    }

    let mut summary = WorkloadSummary {
        workers: config.workers,
        ..Default::default()
    };

    while let Some(result) = workers.join_next().await {
        let (id, exit) = match result {
            Ok(joined) => joined,
            Err(err) => {
                // Only reachable if the runtime shuts down underneath us.
                tracing::error!(error = &err as &dyn std::error::Error, "worker task failed");
                summary.panicked += 1;
                continue;
            }
        };

        match exit {
            Ok(WorkerExit::Cancelled) => summary.cancelled += 1,
            Ok(WorkerExit::ConnectFailed) => summary.connect_failed += 1,
            Err(panic) => {
                tracing::error!(
                    worker = id,
                    panic = panic_message(&*panic),
                    "worker panicked and stopped"
                );
                summary.panicked += 1;
            }
        }

        let stopped = summary.cancelled + summary.connect_failed + summary.panicked;
        if !shutdown.is_cancelled() {
            tracing::warn!(
                running = summary.workers - stopped,
                "workload continues with fewer workers"
            );
        }
    }

    tracing::info!(?summary, "workload stopped");
    Ok(summary)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Why a worker stopped without panicking.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WorkerExit {
    Cancelled,
    ConnectFailed,
}

/// Everything a worker needs before its connection is opened.
struct WorkerSetup {
    id: usize,
    connections: Connections,
    keys: Arc<KeySet>,
    metrics: Arc<dyn MetricsRecorder>,
    limiter: RateLimiter,
    thresholds: Thresholds,
    payloads: PayloadSource,
}

impl WorkerSetup {
    async fn start(self, shutdown: CancellationToken) -> WorkerExit {
        let backend = tokio::select! {
            _ = shutdown.cancelled() => return WorkerExit::Cancelled,
            backend = self.connections.acquire() => backend,
        };

        let backend = match backend {
            Ok(backend) => backend,
            Err(err) => {
                tracing::error!(
                    worker = self.id,
                    error = &err as &dyn std::error::Error,
                    "failed to connect worker to backend"
                );
                return WorkerExit::ConnectFailed;
            }
        };

        let worker = Worker {
            backend,
            keys: self.keys,
            metrics: self.metrics,
            limiter: self.limiter,
            thresholds: self.thresholds,
            payloads: self.payloads,
            rng: SmallRng::seed_from_u64(rand::random()),
        };
        worker.run(shutdown).await
    }
}

struct Worker {
    backend: SharedBackend,
    keys: Arc<KeySet>,
    metrics: Arc<dyn MetricsRecorder>,
    limiter: RateLimiter,
    thresholds: Thresholds,
    payloads: PayloadSource,
    rng: SmallRng,
}

impl Worker {
    async fn run(mut self, shutdown: CancellationToken) -> WorkerExit {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return WorkerExit::Cancelled,
                _ = self.limiter.take() => {}
            }

            let r = self.rng.random::<f64>();
            self.iteration(r).await;
        }
    }

    /// Executes the operations planned for draw `r` against one random key.
    async fn iteration(&mut self, r: f64) -> Plan {
        let plan = self.thresholds.plan(r);
        if !plan.read && !plan.update {
            return plan;
        }

        let Some(key) = self.keys.choose(&mut self.rng) else {
            return plan;
        };
        let backend_name = self.backend.name();

        if plan.read {
            let start = Instant::now();
            let result = self.backend.read(key).await;
            metrics::record(
                &*self.metrics,
                backend_name,
                Operation::Read,
                start.elapsed(),
                &result,
            );
            if let Err(err) = result {
                tracing::warn!(key, error = &err as &dyn std::error::Error, "read failed");
            }
        }

        if plan.update {
            let payload = self.payloads.generate(&mut self.rng);
            let start = Instant::now();
            let result = self.backend.write(key, payload).await;
            metrics::record(
                &*self.metrics,
                backend_name,
                Operation::Update,
                start.elapsed(),
                &result,
            );
            if let Err(err) = result {
                tracing::warn!(key, error = &err as &dyn std::error::Error, "update failed");
            }
        }

        plan
    }
}
