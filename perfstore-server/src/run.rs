//! The `run` and `cleanup` commands.
//!
//! `run` serves metrics, presets the dataset and then drives the workload until the process
//! receives a termination signal. Signals are handled by [`elegant_departure`], which triggers
//! the [`CancellationToken`] shared with the engine. Once all workers have drained, the summary
//! report is printed.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use perfstore_engine::backend::SharedBackend;
use perfstore_engine::preset::{PresetStats, preset};
use perfstore_engine::workload::{self, WorkloadSummary};
use perfstore_engine::{Connections, Metrics, MetricsRecorder, WorkloadConfig};
use tokio::net::TcpListener;
use tokio::signal::unix::SignalKind;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::report::{self, Report};
use crate::{state, web};

/// Runs the load generator until termination is requested.
pub async fn run(config: Config) -> Result<()> {
    let workload_config = config.workload_config();
    workload_config
        .validate()
        .context("invalid workload configuration")?;

    let listener = listen(config.metrics_addr).await?;
    let (connections, backend) = connect(&config).await?;

    let metrics = Arc::new(Metrics::new());
    let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(web::serve(listener, Arc::clone(&metrics)));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            elegant_departure::get_shutdown_guard().wait().await;
            tracing::info!("Shutting down ...");
            shutdown.cancel();
        }
    });

    let mut departure = tokio::spawn(
        elegant_departure::tokio::depart()
            .on_termination()
            .on_sigint()
            .on_signal(SignalKind::hangup())
            .on_signal(SignalKind::quit()),
    );

    let mut engine = tokio::spawn(drive(
        workload_config,
        connections,
        backend,
        recorder,
        shutdown.clone(),
    ));

    let outcome = tokio::select! {
        result = &mut engine => {
            let outcome = result.context("engine task failed")??;
            if !shutdown.is_cancelled() {
                tracing::error!("all workers stopped, serving metrics until interrupted");
                departure.await?;
            }
            outcome
        }
        result = &mut departure => {
            result?;
            engine.await.context("engine task failed")??
        }
    };

    server.await.context("metrics server failed")??;

    Report {
        preset: outcome.preset,
        workload: outcome.workload,
        elapsed: outcome.elapsed,
        payload_size: config.payload.size.as_u64(),
        series: metrics.snapshot(),
    }
    .print();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Deletes the dataset created by previous runs.
pub async fn cleanup(config: Config) -> Result<()> {
    let workload_config = config.workload_config();
    workload_config
        .validate()
        .context("invalid workload configuration")?;

    let (_, backend) = connect(&config).await?;
    let metrics: Arc<dyn MetricsRecorder> = Arc::new(Metrics::new());

    let start = Instant::now();
    let stats = perfstore_engine::cleanup::cleanup(
        &backend,
        &workload_config.key_prefix,
        workload_config.preset_concurrency,
        &metrics,
    )
    .await
    .context("failed to clean up dataset")?;

    report::print_cleanup(&stats, start.elapsed());

    if stats.failed > 0 {
        anyhow::bail!("failed to delete {} keys", stats.failed);
    }
    Ok(())
}

async fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;

    tracing::info!("serving metrics on http://{}/metrics", listener.local_addr()?);
    Ok(listener)
}

/// Opens the backend client used by the preset and cleanup phases.
async fn connect(config: &Config) -> Result<(Connections, SharedBackend)> {
    let connections = state::connections(&config.storage);
    let backend = connections
        .acquire()
        .await
        .context("failed to connect to storage backend")?;

    tracing::info!(backend = backend.name(), "connected to storage backend");
    Ok((connections, backend))
}

/// The completed phases of a run.
#[derive(Debug, Default)]
struct Outcome {
    preset: Option<PresetStats>,
    workload: Option<WorkloadSummary>,
    elapsed: std::time::Duration,
}

/// Runs the preset phase followed by the workload phase.
///
/// Stops early without an error if `shutdown` is cancelled during preset.
async fn drive(
    config: WorkloadConfig,
    connections: Connections,
    backend: SharedBackend,
    metrics: Arc<dyn MetricsRecorder>,
    shutdown: CancellationToken,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();

    let (keys, stats) = tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::warn!("interrupted during preset");
            return Ok(outcome);
        }
        result = preset(&backend, &config, &metrics) => {
            result.context("failed to preset dataset")?
        }
    };
    outcome.preset = Some(stats);
    drop(backend);

    let start = Instant::now();
    let summary = workload::run(&config, connections, Arc::new(keys), metrics, shutdown)
        .await
        .context("failed to run workload")?;

    outcome.workload = Some(summary);
    outcome.elapsed = start.elapsed();
    Ok(outcome)
}
