//! The one-shot preset phase filling the dataset up to its target size.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::time::Instant;

use crate::backend::SharedBackend;
use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::keyset::{KeySet, generate_keys};
use crate::metrics::{self, MetricsRecorder};
use crate::operation::Operation;
use crate::payload::PayloadSource;
use crate::pool::WorkerPool;

/// Statistics of a completed preset phase.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PresetStats {
    /// Keys that already existed in the backend.
    pub observed: usize,
    /// Keys that were missing to reach the target size.
    pub deficit: usize,
    /// Keys created successfully.
    pub created: usize,
    /// Creates that failed. These keys are not part of the returned [`KeySet`].
    pub failed: usize,
}

/// Returns the number of keys missing to reach `target`.
pub fn deficit(target: usize, observed: usize) -> usize {
    target.saturating_sub(observed)
}

/// Fills the backend up to [`WorkloadConfig::dataset_size`] keys.
///
/// Lists the existing keys and creates the missing ones through a [`WorkerPool`] bounded by
/// [`WorkloadConfig::preset_concurrency`]. This resolves only after every create has completed.
///
/// Failed creates are recorded and logged but tolerated, their keys are left out of the returned
/// set and will be created again by a later run. Only failing to prepare or list the backend is
/// an error.
pub async fn preset(
    backend: &SharedBackend,
    config: &WorkloadConfig,
    metrics: &Arc<dyn MetricsRecorder>,
) -> Result<(KeySet, PresetStats)> {
    backend.prepare().await?;

    let mut keys: KeySet = backend.list_keys().await?.into_iter().collect();
    let mut stats = PresetStats {
        observed: keys.len(),
        deficit: deficit(config.dataset_size, keys.len()),
        ..Default::default()
    };

    tracing::info!(
        backend = backend.name(),
        observed = stats.observed,
        deficit = stats.deficit,
        "presetting dataset"
    );

    if stats.deficit == 0 {
        return Ok((keys, stats));
    }

    let payloads = PayloadSource::new(config.payload);
    let mut pool = WorkerPool::new(config.preset_concurrency);
    let batch_size = pool.capacity();

    let new_keys = generate_keys(&config.key_prefix, stats.deficit, &keys);
    for (index, key) in new_keys.into_iter().enumerate() {
        if index != 0 && index % batch_size == 0 && !config.preset_pause.is_zero() {
            tokio::time::sleep(config.preset_pause).await;
        }

        let backend = Arc::clone(backend);
        let metrics = Arc::clone(metrics);
        let payloads = payloads.clone();

        pool.submit(async move {
            let payload = payloads.generate(&mut SmallRng::seed_from_u64(rand::random()));

            let start = Instant::now();
            let result = backend.create(&key, payload).await;
            metrics::record(
                &*metrics,
                backend.name(),
                Operation::Insert,
                start.elapsed(),
                &result,
            );

            match result {
                Ok(()) => Some(key),
                Err(err) => {
                    tracing::warn!(key, error = &err as &dyn std::error::Error, "create failed");
                    None
                }
            }
        })
        .await;
    }

    let joined = pool.join().await;
    for _ in 0..joined.panicked {
        metrics.increment_failure(backend.name(), Operation::Insert);
    }

    let created: Vec<String> = joined.completed.into_iter().flatten().collect();
    stats.created = created.len();
    stats.failed = stats.deficit - stats.created;
    keys.extend(created);

    if stats.failed > 0 {
        tracing::warn!(?stats, "preset finished with failed creates");
    } else {
        tracing::info!(?stats, "preset finished");
    }

    Ok((keys, stats))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::metrics::Metrics;

    #[test]
    fn deficit_saturates() {
        assert_eq!(deficit(10, 0), 10);
        assert_eq!(deficit(10, 4), 6);
        assert_eq!(deficit(10, 10), 0);
        assert_eq!(deficit(10, 25), 0);
    }

    #[tokio::test]
    async fn fills_empty_backend() {
        let memory = InMemoryBackend::new();
        let backend: SharedBackend = Arc::new(memory.clone());
        let metrics = Arc::new(Metrics::new());
        let recorder: Arc<dyn MetricsRecorder> = metrics.clone();

        let config = WorkloadConfig {
            dataset_size: 10,
            preset_concurrency: 2,
            ..Default::default()
        };

        let (keys, stats) = preset(&backend, &config, &recorder).await.unwrap();

        assert_eq!(keys.len(), 10);
        assert_eq!(memory.len(), 10);
        assert_eq!(
            stats,
            PresetStats {
                observed: 0,
                deficit: 10,
                created: 10,
                failed: 0,
            }
        );
        assert_eq!(metrics.get("memory", Operation::Insert).unwrap().success, 10);
    }

    #[tokio::test]
    async fn keeps_full_dataset() {
        let memory = InMemoryBackend::with_keys(["a", "b", "c"], Bytes::new());
        let backend: SharedBackend = Arc::new(memory.clone());
        let metrics: Arc<dyn MetricsRecorder> = Arc::new(Metrics::new());

        let config = WorkloadConfig {
            dataset_size: 2,
            ..Default::default()
        };

        let (keys, stats) = preset(&backend, &config, &metrics).await.unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(stats.deficit, 0);
        assert_eq!(memory.len(), 3);
    }

    #[tokio::test]
    async fn tops_up_partial_dataset() {
        let memory = InMemoryBackend::with_keys(["perf-0000000000"], Bytes::new());
        let backend: SharedBackend = Arc::new(memory.clone());
        let metrics: Arc<dyn MetricsRecorder> = Arc::new(Metrics::new());

        let config = WorkloadConfig {
            dataset_size: 3,
            payload: crate::PayloadConfig {
                size: 8,
                random: false,
            },
            ..Default::default()
        };

        let (keys, stats) = preset(&backend, &config, &metrics).await.unwrap();
        assert_eq!(stats.observed, 1);
        assert_eq!(stats.created, 2);

        let mut keys: Vec<_> = keys.iter().collect();
        keys.sort_unstable();
        assert_eq!(keys, ["perf-0000000000", "perf-0000000001", "perf-0000000002"]);
        assert_eq!(
            memory.get_stored("perf-0000000002"),
            Some(Bytes::from_static(b"xxxxxxxx"))
        );
    }
}
