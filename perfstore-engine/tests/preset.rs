use std::sync::Arc;
use std::time::Duration;

use perfstore_engine::backend::SharedBackend;
use perfstore_engine::cleanup::{CleanupStats, cleanup};
use perfstore_engine::preset::{PresetStats, preset};
use perfstore_engine::{Error, Metrics, MetricsRecorder, Operation, WorkloadConfig};
use perfstore_test::backend::StubBackend;

fn setup(stub: &StubBackend) -> (SharedBackend, Arc<Metrics>, Arc<dyn MetricsRecorder>) {
    perfstore_test::tracing::init();
    let metrics = Arc::new(Metrics::new());
    let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
    (Arc::new(stub.clone()), metrics, recorder)
}

#[tokio::test(start_paused = true)]
async fn creates_exactly_the_deficit_with_bounded_concurrency() {
    let stub = StubBackend::new().with_latency(Duration::from_millis(10));
    let (backend, metrics, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 10,
        preset_concurrency: 2,
        ..Default::default()
    };

    let (keys, stats) = preset(&backend, &config, &recorder).await.unwrap();

    assert_eq!(stub.calls().create, 10);
    assert_eq!(stub.max_in_flight(), 2);
    assert_eq!(keys.len(), 10);
    assert_eq!(stats.created, 10);
    assert_eq!(metrics.get("stub", Operation::Insert).unwrap().success, 10);
}

#[tokio::test(start_paused = true)]
async fn pauses_between_batches() {
    let stub = StubBackend::new();
    let (backend, _, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 6,
        preset_concurrency: 2,
        preset_pause: Duration::from_secs(1),
        ..Default::default()
    };

    let start = tokio::time::Instant::now();
    preset(&backend, &config, &recorder).await.unwrap();

    // Three batches, pausing before the second and third.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    assert_eq!(stub.calls().create, 6);
}

#[tokio::test]
async fn only_creates_missing_keys() {
    let stub = StubBackend::new().with_keys(["perf-0000000001", "unrelated"]);
    let (backend, _, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 5,
        ..Default::default()
    };

    let (keys, stats) = preset(&backend, &config, &recorder).await.unwrap();

    assert_eq!(
        stats,
        PresetStats {
            observed: 2,
            deficit: 3,
            created: 3,
            failed: 0,
        }
    );
    assert_eq!(stub.calls().create, 3);
    assert_eq!(keys.len(), 5);
    assert_eq!(
        stub.keys(),
        [
            "perf-0000000000",
            "perf-0000000001",
            "perf-0000000002",
            "perf-0000000003",
            "unrelated",
        ]
    );
}

#[tokio::test]
async fn excludes_failed_creates() {
    let stub = StubBackend::new().fail_create_of("perf-0000000001");
    let (backend, metrics, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 3,
        ..Default::default()
    };

    let (keys, stats) = preset(&backend, &config, &recorder).await.unwrap();

    assert_eq!(stats.created, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|key| key != "perf-0000000001"));

    let insert = metrics.get("stub", Operation::Insert).unwrap();
    assert_eq!(insert.success, 2);
    assert_eq!(insert.failure, 1);
}

#[tokio::test]
async fn tolerates_only_failures() {
    let stub = StubBackend::new().fail_creates(true);
    let (backend, _, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 4,
        ..Default::default()
    };

    let (keys, stats) = preset(&backend, &config, &recorder).await.unwrap();
    assert!(keys.is_empty());
    assert_eq!(stats.failed, 4);
}

#[tokio::test]
async fn panicking_create_counts_as_failure() {
    let stub = StubBackend::new().panic_on_next_create();
    let (backend, metrics, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 3,
        preset_concurrency: 1,
        ..Default::default()
    };

    let (keys, stats) = preset(&backend, &config, &recorder).await.unwrap();

    assert_eq!(stats.created, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(keys.len(), 2);
    assert_eq!(metrics.get("stub", Operation::Insert).unwrap().failure, 1);
}

#[tokio::test]
async fn fails_when_listing_fails() {
    let stub = StubBackend::new().fail_list(true);
    let (backend, metrics, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 5,
        ..Default::default()
    };

    let result = preset(&backend, &config, &recorder).await;

    assert!(matches!(result, Err(Error::Backend(_))));
    assert_eq!(stub.calls().create, 0);
    assert!(stub.keys().is_empty());
    assert!(metrics.get("stub", Operation::Insert).is_none());
}

#[tokio::test]
async fn fails_when_prepare_fails() {
    let stub = StubBackend::new()
        .with_keys(["perf-0000000000"])
        .fail_prepare(true);
    let (backend, _, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 5,
        ..Default::default()
    };

    let result = preset(&backend, &config, &recorder).await;

    assert!(matches!(result, Err(Error::Backend(_))));
    assert_eq!(stub.calls().create, 0);
    assert_eq!(stub.keys(), ["perf-0000000000"]);
}

#[tokio::test]
async fn cleanup_removes_preset_keys() {
    let stub = StubBackend::new().with_keys(["keep"]);
    let (backend, metrics, recorder) = setup(&stub);

    let config = WorkloadConfig {
        dataset_size: 4,
        ..Default::default()
    };
    preset(&backend, &config, &recorder).await.unwrap();
    assert_eq!(stub.keys().len(), 4);

    let stats = cleanup(&backend, &config.key_prefix, 2, &recorder)
        .await
        .unwrap();

    assert_eq!(
        stats,
        CleanupStats {
            deleted: 3,
            failed: 0
        }
    );
    assert_eq!(stub.keys(), ["keep"]);
    assert_eq!(metrics.get("stub", Operation::Delete).unwrap().success, 3);
}
