//! Configuration for the perfstore process.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `PERF__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `PERF__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `PERF__METRICS_ADDR=0.0.0.0:9100` sets the metrics server address
//! - `PERF__STORAGE__TYPE=filesystem` sets the storage type
//! - `PERF__STORAGE__PATH=/data` sets the directory name
//! - `PERF__WORKLOAD__WORKERS=50` sets the number of workload workers
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! metrics_addr: 0.0.0.0:9100
//!
//! storage:
//!   type: filesystem
//!   path: /data
//!
//! workload:
//!   workers: 50
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use perfstore_engine::config::{
    DEFAULT_DATASET_SIZE, DEFAULT_PRESET_CONCURRENCY, DEFAULT_RATE_LIMIT, DEFAULT_WORKERS,
};
use perfstore_engine::{OperationMix, PayloadConfig, WorkloadConfig};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "PERF__";

/// Newtype around `String` that may protect against accidental logging of secrets in our
/// configuration struct. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
///
/// Used in: [`Config::storage`]
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Process-local storage (type `"memory"`).
    ///
    /// The dataset is lost when the process exits. Useful to measure the overhead of the load
    /// generator itself.
    #[default]
    Memory,

    /// Local filesystem storage (type `"filesystem"`).
    ///
    /// Stores every entry as one file in a flat directory.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /data
    /// ```
    FileSystem {
        /// Directory holding the dataset. It is created on startup if it doesn't exist.
        ///
        /// # Environment Variables
        ///
        /// - `PERF__STORAGE__TYPE=filesystem`
        /// - `PERF__STORAGE__PATH=/path/to/storage`
        path: PathBuf,
    },

    /// S3-compatible object storage such as MinIO (type `"s3compatible"`).
    ///
    /// Every workload worker opens its own client.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: s3compatible
    ///   endpoint: http://localhost:9000
    ///   bucket: perf
    ///   access_key: minioadmin
    ///   secret_key: minioadmin
    /// ```
    S3Compatible(S3Storage),
}

/// Connection parameters of [`Storage::S3Compatible`].
///
/// All fields are optional and fall back to a local MinIO with default settings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Storage {
    /// Endpoint URL.
    ///
    /// Defaults to `http://localhost:9000`.
    pub endpoint: String,

    /// The bucket holding the dataset. It is created on startup if it doesn't exist.
    ///
    /// Defaults to `perf`.
    pub bucket: String,

    /// Region name used to sign requests.
    ///
    /// Defaults to `us-east-1`.
    pub region: String,

    /// Static access key.
    ///
    /// # Environment Variable
    ///
    /// `PERF__STORAGE__ACCESS_KEY`
    pub access_key: Option<SecretBox<ConfigSecret>>,

    /// Static secret key.
    ///
    /// # Environment Variable
    ///
    /// `PERF__STORAGE__SECRET_KEY`
    pub secret_key: Option<SecretBox<ConfigSecret>>,

    /// Use path-style addressing, required by most self-hosted deployments.
    ///
    /// Defaults to `true`.
    pub path_style: bool,

    /// Timeout of every single request, for example `5s`.
    ///
    /// Defaults to no timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Object key prefix within the bucket.
    ///
    /// Defaults to an empty prefix.
    pub prefix: String,
}

impl Default for S3Storage {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            bucket: "perf".into(),
            region: "us-east-1".into(),
            access_key: None,
            secret_key: None,
            path_style: true,
            request_timeout: None,
            prefix: String::new(),
        }
    }
}

/// Shape of the dataset and the preset phase filling it.
///
/// Used in: [`Config::dataset`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Dataset {
    /// Number of keys the dataset is filled up to before the workload starts.
    ///
    /// Existing keys count towards this target. If the backend already holds more keys, nothing
    /// is created.
    ///
    /// # Environment Variable
    ///
    /// `PERF__DATASET__SIZE`
    pub size: usize,

    /// Prefix of generated keys.
    ///
    /// Defaults to `perf-`. The `cleanup` command deletes all keys with this prefix.
    pub key_prefix: String,

    /// Maximum number of concurrent creates during preset.
    pub preset_concurrency: usize,

    /// Pause after every `preset_concurrency` creates, for example `100ms`.
    ///
    /// Defaults to no pause.
    #[serde(with = "humantime_serde")]
    pub preset_pause: Duration,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            size: DEFAULT_DATASET_SIZE,
            key_prefix: "perf-".into(),
            preset_concurrency: DEFAULT_PRESET_CONCURRENCY,
            preset_pause: Duration::ZERO,
        }
    }
}

/// Steady-state workload configuration.
///
/// Used in: [`Config::workload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Workload {
    /// Number of concurrent workers.
    ///
    /// # Environment Variable
    ///
    /// `PERF__WORKLOAD__WORKERS`
    pub workers: usize,

    /// Operations per second of every single worker. `0` disables pacing.
    ///
    /// The aggregate rate is `rate_limit * workers`.
    ///
    /// # Environment Variable
    ///
    /// `PERF__WORKLOAD__RATE_LIMIT`
    pub rate_limit: u32,

    /// Threshold in `[0, 1]` below which a random draw issues a read.
    ///
    /// Defaults to `0.25`.
    pub read_op_percent: f64,

    /// Threshold in `[0, 1]` below which a random draw issues an update.
    ///
    /// Defaults to `0.75`.
    pub update_op_percent: f64,

    /// How read and update thresholds combine, see [`OperationMix`].
    ///
    /// Defaults to `overlapping`.
    pub mix: OperationMix,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            rate_limit: DEFAULT_RATE_LIMIT,
            read_op_percent: 0.25,
            update_op_percent: 0.75,
            mix: OperationMix::default(),
        }
    }
}

/// Shape of written payloads.
///
/// Used in: [`Config::payload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Payload {
    /// Size of every created or updated entry, for example `4KiB`.
    ///
    /// Defaults to `1KiB`.
    pub size: ByteSize,

    /// Fill payloads with fresh random bytes instead of a constant pattern.
    ///
    /// Defaults to `true`.
    pub random: bool,
}

impl Default for Payload {
    fn default() -> Self {
        let engine = PayloadConfig::default();
        Self {
            size: ByteSize::b(engine.size),
            random: engine.random,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads of the runtime.
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `PERF__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error reporting configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN (Data Source Name).
    ///
    /// # Environment Variable
    ///
    /// `PERF__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name reported with every event, for example `staging`.
    pub environment: Option<Cow<'static, str>>,

    /// Sample rate of error events in `[0, 1]`.
    ///
    /// Defaults to `1.0`.
    pub sample_rate: f32,

    /// Enables debug output of the Sentry SDK.
    pub debug: bool,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            debug: false,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2025-07-04T12:10:32Z  INFO perfstore_engine::preset: presetting dataset observed=0
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr. The `RUST_LOG` environment variable overrides the level.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Failed operations are logged at `WARN`, stopped workers at `ERROR`.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `PERF__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Environment Variable
    ///
    /// `PERF__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the perfstore process.
///
/// Use [`Config::load`] to assemble the configuration from defaults, a YAML file and the
/// environment.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Socket address of the HTTP server exposing `/metrics` and `/health`.
    ///
    /// # Default
    ///
    /// `0.0.0.0:20004`
    ///
    /// # Environment Variable
    ///
    /// `PERF__METRICS_ADDR`
    pub metrics_addr: SocketAddr,

    /// The storage backend under test. See [`Storage`] for available types.
    ///
    /// Defaults to [`Storage::Memory`].
    pub storage: Storage,

    /// Dataset and preset configuration.
    pub dataset: Dataset,

    /// Steady-state workload configuration.
    pub workload: Workload,

    /// Payload configuration.
    pub payload: Payload,

    /// Async runtime configuration.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry error reporting configuration.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 20004)),
            storage: Storage::default(),
            dataset: Dataset::default(),
            workload: Workload::default(),
            payload: Payload::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `PERF__`)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML configuration file cannot be read or parsed, or if any source
    /// contains invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Returns the engine configuration of the preset and workload phases.
    pub fn workload_config(&self) -> WorkloadConfig {
        WorkloadConfig {
            dataset_size: self.dataset.size,
            key_prefix: self.dataset.key_prefix.clone(),
            preset_concurrency: self.dataset.preset_concurrency,
            preset_pause: self.dataset.preset_pause,
            workers: self.workload.workers,
            rate_limit: self.workload.rate_limit,
            read_op_percent: self.workload.read_op_percent,
            update_op_percent: self.workload.update_op_percent,
            mix: self.workload.mix,
            payload: PayloadConfig {
                size: self.payload.size.as_u64(),
                random: self.payload.random,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.metrics_addr, "0.0.0.0:20004".parse().unwrap());
            assert!(matches!(config.storage, Storage::Memory));
            assert!(!config.sentry.is_enabled());
            assert_eq!(config.workload_config(), WorkloadConfig::default());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PERF__METRICS_ADDR", "127.0.0.1:9100");
            jail.set_env("PERF__STORAGE__TYPE", "s3compatible");
            jail.set_env("PERF__STORAGE__ENDPOINT", "http://localhost:9001");
            jail.set_env("PERF__STORAGE__ACCESS_KEY", "minio");
            jail.set_env("PERF__STORAGE__SECRET_KEY", "hunter2");
            jail.set_env("PERF__STORAGE__REQUEST_TIMEOUT", "5s");
            jail.set_env("PERF__DATASET__SIZE", "500");
            jail.set_env("PERF__DATASET__PRESET_PAUSE", "250ms");
            jail.set_env("PERF__WORKLOAD__WORKERS", "8");
            jail.set_env("PERF__WORKLOAD__RATE_LIMIT", "0");
            jail.set_env("PERF__WORKLOAD__MIX", "exclusive");
            jail.set_env("PERF__PAYLOAD__SIZE", "4KiB");
            jail.set_env("PERF__LOGGING__LEVEL", "debug");
            jail.set_env("PERF__SENTRY__DSN", "abcde");

            let config = Config::load(None).unwrap();
            assert_eq!(config.metrics_addr, "127.0.0.1:9100".parse().unwrap());

            let Storage::S3Compatible(s3) = &dbg!(&config).storage else {
                panic!("expected s3 storage");
            };
            assert_eq!(s3.endpoint, "http://localhost:9001");
            assert_eq!(s3.bucket, "perf");
            assert_eq!(s3.access_key.as_ref().unwrap().expose_secret().as_str(), "minio");
            assert_eq!(s3.secret_key.as_ref().unwrap().expose_secret().as_str(), "hunter2");
            assert_eq!(s3.request_timeout, Some(Duration::from_secs(5)));

            let workload = config.workload_config();
            assert_eq!(workload.dataset_size, 500);
            assert_eq!(workload.preset_pause, Duration::from_millis(250));
            assert_eq!(workload.workers, 8);
            assert_eq!(workload.rate_limit, 0);
            assert_eq!(workload.mix, OperationMix::Exclusive);
            assert_eq!(workload.payload.size, 4096);

            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(
                config.sentry.dsn.unwrap().expose_secret().as_str(),
                "abcde"
            );

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            storage:
                type: filesystem
                path: /tmp/perf
            dataset:
                size: 42
                key_prefix: bench-
            workload:
                read_op_percent: 0.5
                update_op_percent: 0.1
            payload:
                size: 128
                random: false
            logging:
                format: json
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            let Storage::FileSystem { path } = &dbg!(&config).storage else {
                panic!("expected filesystem storage");
            };
            assert_eq!(path, Path::new("/tmp/perf"));

            let workload = config.workload_config();
            assert_eq!(workload.dataset_size, 42);
            assert_eq!(workload.key_prefix, "bench-");
            assert_eq!(workload.read_op_percent, 0.5);
            assert_eq!(workload.update_op_percent, 0.1);
            assert_eq!(
                workload.payload,
                PayloadConfig {
                    size: 128,
                    random: false
                }
            );
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            workload:
                workers: 10
                rate_limit: 5
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("PERF__WORKLOAD__WORKERS", "20");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.workload.workers, 20);
            assert_eq!(config.workload.rate_limit, 5);

            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_storage() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PERF__STORAGE__TYPE", "floppy");
            assert!(Config::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn secrets_are_redacted() {
        let storage = S3Storage {
            secret_key: Some(SecretBox::new(Box::new("hunter2".into()))),
            ..Default::default()
        };

        assert!(!format!("{storage:?}").contains("hunter2"));
    }
}
