use std::env;
use std::io::IsTerminal;

use secrecy::ExposeSecret;
use sentry::integrations::tracing as sentry_tracing;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{Config, LogFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initializes the Sentry client if a DSN is configured.
///
/// The returned guard flushes pending events when dropped and must outlive the runtime.
pub fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let sentry_config = &config.sentry;
    let dsn = sentry_config.dsn.as_ref()?;

    Some(sentry::init(sentry::ClientOptions {
        dsn: dsn.expose_secret().as_str().parse().ok(),
        release: sentry::release_name!(),
        environment: sentry_config.environment.clone(),
        sample_rate: sentry_config.sample_rate,
        debug: sentry_config.debug,
        enable_logs: true,
        ..Default::default()
    }))
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    // Warnings and errors become events, everything at or above INFO is sent as logs instead of
    // breadcrumbs.
    let sentry_layer = config.sentry.is_enabled().then(|| {
        sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
            Level::ERROR | Level::WARN => {
                sentry_tracing::EventFilter::Event | sentry_tracing::EventFilter::Log
            }
            Level::INFO => sentry_tracing::EventFilter::Log,
            Level::DEBUG | Level::TRACE => sentry_tracing::EventFilter::Ignore,
        })
    });

    let is_terminal = std::io::stderr().is_terminal();
    let format: BoxedLayer = match (config.logging.format, is_terminal) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
        (LogFormat::Json, _) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .boxed(),
    };

    let (level, env_filter) = parse_rust_log(config);

    tracing_subscriber::registry()
        .with(format.with_filter(level))
        .with(sentry_layer)
        .with(env_filter)
        .init();
}

/// Returns the maximum level to print and the per-crate filter.
///
/// A plain level in `RUST_LOG` replaces the configured level. Any other value is used literally as
/// filter, for users who know which overrides they want.
fn parse_rust_log(config: &Config) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse() {
            Ok(level) => level,
            Err(_) => return (config.logging.level, EnvFilter::new(value)),
        },
        Err(_) => config.logging.level,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        perfstore=TRACE,\
        perfstore_server=TRACE,\
        perfstore_engine=TRACE,\
        ",
    );

    (level, env_filter)
}
