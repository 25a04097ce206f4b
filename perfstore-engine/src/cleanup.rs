//! Removal of a dataset created by [`preset`](crate::preset::preset).

use std::sync::Arc;

use tokio::time::Instant;

use crate::backend::SharedBackend;
use crate::error::Result;
use crate::metrics::{self, MetricsRecorder};
use crate::operation::Operation;
use crate::pool::WorkerPool;

/// Statistics of a completed cleanup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CleanupStats {
    /// Keys deleted successfully.
    pub deleted: usize,
    /// Deletes that failed.
    pub failed: usize,
}

/// Deletes every key starting with `prefix`, running up to `concurrency` deletes at a time.
///
/// Keys without the prefix are left untouched. Failed deletes are recorded and logged but do not
/// stop the cleanup.
pub async fn cleanup(
    backend: &SharedBackend,
    prefix: &str,
    concurrency: usize,
    metrics: &Arc<dyn MetricsRecorder>,
) -> Result<CleanupStats> {
    backend.prepare().await?;

    let keys: Vec<String> = backend
        .list_keys()
        .await?
        .into_iter()
        .filter(|key| key.starts_with(prefix))
        .collect();

    tracing::info!(backend = backend.name(), keys = keys.len(), "deleting dataset");

    let mut pool = WorkerPool::new(concurrency);
    for key in keys {
        let backend = Arc::clone(backend);
        let metrics = Arc::clone(metrics);

        pool.submit(async move {
            let start = Instant::now();
            let result = backend.delete(&key).await;
            metrics::record(
                &*metrics,
                backend.name(),
                Operation::Delete,
                start.elapsed(),
                &result,
            );

            if let Err(ref err) = result {
                tracing::warn!(key, error = err as &dyn std::error::Error, "delete failed");
            }
            result.is_ok()
        })
        .await;
    }

    let joined = pool.join().await;
    let deleted = joined.completed.iter().filter(|deleted| **deleted).count();
    let stats = CleanupStats {
        deleted,
        failed: joined.completed.len() - deleted + joined.panicked,
    };

    tracing::info!(?stats, "cleanup finished");
    Ok(stats)
}
