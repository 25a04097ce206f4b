//! Recording of operation outcomes.
//!
//! The engine reports every attempted operation to a [`MetricsRecorder`]. [`Metrics`] is the
//! built-in recorder, which aggregates in memory and renders the Prometheus text format:
//!
//! - `operations_success_total{backend,op}` counter
//! - `operations_fail_total{backend,op}` counter
//! - `operation_latency_seconds{backend,op}` summary of successful operations

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::backend::BackendResult;
use crate::operation::Operation;

/// Quantiles exported for latency summaries.
const QUANTILES: [f64; 3] = [0.5, 0.9, 0.99];

/// A concurrency-safe sink for operation outcomes.
///
/// Implementations are invoked from all workers and the preset pool at the same time and must not
/// lose updates.
pub trait MetricsRecorder: fmt::Debug + Send + Sync {
    /// Counts a successful operation.
    fn increment_success(&self, backend: &'static str, op: Operation);

    /// Counts a failed operation.
    fn increment_failure(&self, backend: &'static str, op: Operation);

    /// Records the latency of a successful operation.
    fn observe_latency(&self, backend: &'static str, op: Operation, latency: Duration);

    /// Counts a successful operation together with its latency.
    ///
    /// Recorders that can apply both updates atomically should override this, so that readers
    /// never observe a success without its latency.
    fn record_success(&self, backend: &'static str, op: Operation, latency: Duration) {
        self.increment_success(backend, op);
        self.observe_latency(backend, op, latency);
    }
}

/// Records the outcome of one operation attempt.
///
/// Every attempt increments exactly one of the success and failure counters. Successes also
/// record exactly one latency observation.
pub fn record<T>(
    metrics: &dyn MetricsRecorder,
    backend: &'static str,
    op: Operation,
    latency: Duration,
    result: &BackendResult<T>,
) {
    match result {
        Ok(_) => metrics.record_success(backend, op, latency),
        Err(_) => metrics.increment_failure(backend, op),
    }
}

#[derive(Default)]
struct Series {
    success: u64,
    failure: u64,
    latency: DDSketch,
}

/// Latency distribution of one series, in seconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LatencySummary {
    /// Number of observations.
    pub count: usize,
    /// Sum of all observations.
    pub sum: f64,
    /// Estimated 50th percentile.
    pub p50: f64,
    /// Estimated 90th percentile.
    pub p90: f64,
    /// Estimated 99th percentile.
    pub p99: f64,
}

impl LatencySummary {
    /// Returns the mean latency, or zero without observations.
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Point-in-time view of one `(backend, op)` series.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesSnapshot {
    /// The backend label.
    pub backend: &'static str,
    /// The operation label.
    pub op: Operation,
    /// Number of successful operations.
    pub success: u64,
    /// Number of failed operations.
    pub failure: u64,
    /// Latencies of successful operations.
    pub latency: LatencySummary,
}

/// In-memory [`MetricsRecorder`] with Prometheus text rendering.
#[derive(Default)]
pub struct Metrics {
    series: Mutex<BTreeMap<(&'static str, Operation), Series>>,
}

impl Metrics {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn series(&self) -> MutexGuard<'_, BTreeMap<(&'static str, Operation), Series>> {
        // A panicking worker must not take metrics down with it.
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of all series, ordered by backend and operation.
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.series()
            .iter()
            .map(|(&(backend, op), series)| SeriesSnapshot {
                backend,
                op,
                success: series.success,
                failure: series.failure,
                latency: summarize(&series.latency),
            })
            .collect()
    }

    /// Returns the snapshot of a single series, if anything was recorded for it.
    pub fn get(&self, backend: &str, op: Operation) -> Option<SeriesSnapshot> {
        self.snapshot()
            .into_iter()
            .find(|series| series.backend == backend && series.op == op)
    }

    /// Renders all series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        // Writing into a `String` cannot fail.
        let _ = render_into(&mut out, &snapshot);
        out
    }
}

fn summarize(sketch: &DDSketch) -> LatencySummary {
    let quantile = |q| sketch.quantile(q).ok().flatten().unwrap_or_default();

    LatencySummary {
        count: sketch.count(),
        sum: sketch.sum().unwrap_or_default(),
        p50: quantile(0.5),
        p90: quantile(0.9),
        p99: quantile(0.99),
    }
}

fn render_into(out: &mut String, snapshot: &[SeriesSnapshot]) -> fmt::Result {
    writeln!(out, "# HELP operations_success_total Number of successful operations.")?;
    writeln!(out, "# TYPE operations_success_total counter")?;
    for series in snapshot {
        writeln!(out, "operations_success_total{} {}", labels(series), series.success)?;
    }

    writeln!(out, "# HELP operations_fail_total Number of failed operations.")?;
    writeln!(out, "# TYPE operations_fail_total counter")?;
    for series in snapshot {
        writeln!(out, "operations_fail_total{} {}", labels(series), series.failure)?;
    }

    writeln!(out, "# HELP operation_latency_seconds Latency of successful operations.")?;
    writeln!(out, "# TYPE operation_latency_seconds summary")?;
    for series in snapshot {
        let SeriesSnapshot {
            backend,
            op,
            latency,
            ..
        } = series;
        let values = [latency.p50, latency.p90, latency.p99];
        for (quantile, value) in QUANTILES.iter().zip(values) {
            writeln!(
                out,
                "operation_latency_seconds{{backend=\"{backend}\",op=\"{op}\",quantile=\"{quantile}\"}} {value}"
            )?;
        }
        writeln!(out, "operation_latency_seconds_sum{} {}", labels(series), latency.sum)?;
        writeln!(out, "operation_latency_seconds_count{} {}", labels(series), latency.count)?;
    }

    Ok(())
}

fn labels(series: &SeriesSnapshot) -> String {
    format!("{{backend=\"{}\",op=\"{}\"}}", series.backend, series.op)
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("series", &self.series().len())
            .finish()
    }
}

impl MetricsRecorder for Metrics {
    fn increment_success(&self, backend: &'static str, op: Operation) {
        self.series().entry((backend, op)).or_default().success += 1;
    }

    fn increment_failure(&self, backend: &'static str, op: Operation) {
        self.series().entry((backend, op)).or_default().failure += 1;
    }

    fn observe_latency(&self, backend: &'static str, op: Operation, latency: Duration) {
        self.series()
            .entry((backend, op))
            .or_default()
            .latency
            .add(latency.as_secs_f64());
    }

    fn record_success(&self, backend: &'static str, op: Operation, latency: Duration) {
        let mut series = self.series();
        let series = series.entry((backend, op)).or_default();
        series.success += 1;
        series.latency.add(latency.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn record_success_observes_latency() {
        let metrics = Metrics::new();
        let result: BackendResult<()> = Ok(());

        record(&metrics, "memory", Operation::Read, Duration::from_millis(5), &result);

        let series = metrics.get("memory", Operation::Read).unwrap();
        assert_eq!(series.success, 1);
        assert_eq!(series.failure, 0);
        assert_eq!(series.latency.count, 1);
        assert!(series.latency.sum >= 0.0);
    }

    #[test]
    fn record_failure_skips_latency() {
        let metrics = Metrics::new();
        let result: BackendResult<()> = Err(BackendError::NotFound { key: "k".into() });

        record(&metrics, "memory", Operation::Update, Duration::from_millis(5), &result);

        let series = metrics.get("memory", Operation::Update).unwrap();
        assert_eq!(series.success, 0);
        assert_eq!(series.failure, 1);
        assert_eq!(series.latency.count, 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let metrics = Arc::new(Metrics::new());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.increment_success("memory", Operation::Read);
                        metrics.increment_failure("memory", Operation::Update);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(metrics.get("memory", Operation::Read).unwrap().success, 8000);
        assert_eq!(metrics.get("memory", Operation::Update).unwrap().failure, 8000);
    }

    #[test]
    fn concurrent_successes_keep_latency_in_step() {
        let metrics = Arc::new(Metrics::new());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_success("memory", Operation::Read, Duration::from_millis(1));
                    }
                })
            })
            .collect();

        while writers.iter().any(|writer| !writer.is_finished()) {
            if let Some(series) = metrics.get("memory", Operation::Read) {
                assert_eq!(series.success, series.latency.count as u64);
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }

        let series = metrics.get("memory", Operation::Read).unwrap();
        assert_eq!(series.success, 4000);
        assert_eq!(series.latency.count, 4000);
    }

    #[test]
    fn renders_prometheus_text() {
        let metrics = Metrics::new();
        metrics.increment_success("memory", Operation::Read);
        metrics.observe_latency("memory", Operation::Read, Duration::from_millis(10));
        metrics.increment_failure("memory", Operation::Update);

        let text = metrics.render();
        assert!(text.contains("# TYPE operations_success_total counter"));
        assert!(text.contains("operations_success_total{backend=\"memory\",op=\"read\"} 1"));
        assert!(text.contains("operations_fail_total{backend=\"memory\",op=\"update\"} 1"));
        assert!(text.contains("operations_fail_total{backend=\"memory\",op=\"read\"} 0"));
        assert!(text.contains(
            "operation_latency_seconds{backend=\"memory\",op=\"read\",quantile=\"0.5\"}"
        ));
        assert!(text.contains("operation_latency_seconds_count{backend=\"memory\",op=\"read\"} 1"));
    }

    #[test]
    fn snapshot_is_ordered() {
        let metrics = Metrics::new();
        metrics.increment_success("memory", Operation::Update);
        metrics.increment_success("filesystem", Operation::Read);
        metrics.increment_success("memory", Operation::Insert);

        let labels: Vec<_> = metrics
            .snapshot()
            .into_iter()
            .map(|series| (series.backend, series.op))
            .collect();
        assert_eq!(
            labels,
            [
                ("filesystem", Operation::Read),
                ("memory", Operation::Insert),
                ("memory", Operation::Update),
            ]
        );
    }
}
