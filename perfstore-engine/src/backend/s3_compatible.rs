use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};

use super::common::{Backend, BackendError, BackendResult, BoxedBackend, Connect};

/// Connection parameters for an S3-compatible object store such as MinIO.
///
/// Implements [`Connect`], so every workload worker can open its own client.
#[derive(Clone)]
pub struct S3CompatibleConfig {
    /// Endpoint URL, for example `http://localhost:9000`.
    pub endpoint: String,
    /// The bucket holding the dataset. It is created on startup if missing.
    pub bucket: String,
    /// Region name sent in signed requests.
    pub region: String,
    /// Static access key.
    pub access_key: Option<String>,
    /// Static secret key.
    pub secret_key: Option<String>,
    /// Use path-style instead of virtual-host-style addressing.
    pub path_style: bool,
    /// Timeout applied to every request.
    pub request_timeout: Option<Duration>,
    /// Object key prefix, so several datasets can share one bucket.
    pub prefix: String,
}

impl Default for S3CompatibleConfig {
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

impl fmt::Debug for S3CompatibleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .field("request_timeout", &self.request_timeout)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3CompatibleConfig {
    fn region(&self) -> Region {
        Region::Custom {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    fn credentials(&self) -> BackendResult<Credentials> {
        Credentials::new(
            self.access_key.as_deref(),
            self.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|err| BackendError::generic("loading S3 credentials", err))
    }
}

#[async_trait::async_trait]
impl Connect for S3CompatibleConfig {
    async fn connect(&self) -> BackendResult<BoxedBackend> {
        Ok(Box::new(S3CompatibleBackend::new(self.clone())?))
    }
}

/// A [`Backend`] for S3-compatible object stores.
pub struct S3CompatibleBackend {
    bucket: Box<Bucket>,
    config: S3CompatibleConfig,
}

impl S3CompatibleBackend {
    /// Creates a new client bound to the configured bucket.
    ///
    /// This does not perform any requests. Use [`prepare`](Backend::prepare) to probe the
    /// connection.
    pub fn new(config: S3CompatibleConfig) -> BackendResult<Self> {
        let mut bucket = Bucket::new(&config.bucket, config.region(), config.credentials()?)
            .map_err(|err| s3_error("creating S3 client", err))?;

        if config.path_style {
            bucket = bucket.with_path_style();
        }

        if let Some(request_timeout) = config.request_timeout {
            bucket = bucket
                .with_request_timeout(request_timeout)
                .map_err(|err| s3_error("configuring request timeout", err))?;
        }

        Ok(Self { bucket, config })
    }

    fn object_path(&self, key: &str) -> String {
        format!("{}{key}", self.config.prefix)
    }

    async fn put(&self, context: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        let response = self
            .bucket
            .put_object(self.object_path(key), &payload)
            .await
            .map_err(|err| s3_error(context, err))?;

        check_status(context, response.status_code())
    }
}

impl fmt::Debug for S3CompatibleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleBackend")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}

fn s3_error(context: &str, err: S3Error) -> BackendError {
    BackendError::generic(context, err)
}

fn check_status(context: &str, status: u16) -> BackendResult<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(BackendError::Status {
            context: context.into(),
            status,
        })
    }
}

#[async_trait::async_trait]
impl Backend for S3CompatibleBackend {
    fn name(&self) -> &'static str {
        "s3compatible"
    }

    async fn prepare(&self) -> BackendResult<()> {
        let exists = self
            .bucket
            .exists()
            .await
            .map_err(|err| s3_error("checking bucket", err))?;

        if exists {
            return Ok(());
        }

        tracing::info!(bucket = %self.config.bucket, "bucket does not exist, creating it");
        let name = &self.config.bucket;
        let region = self.config.region();
        let credentials = self.config.credentials()?;
        let config = BucketConfiguration::default();

        // Creation has to address the bucket the same way as all later requests.
        let response = if self.bucket.is_path_style() {
            Bucket::create_with_path_style(name, region, credentials, config).await
        } else {
            Bucket::create(name, region, credentials, config).await
        }
        .map_err(|err| s3_error("creating bucket", err))?;

        check_status("creating bucket", response.response_code)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let (_, status) = self
            .bucket
            .head_object(self.object_path(key))
            .await
            .map_err(|err| s3_error("checking object", err))?;

        match status {
            404 => Ok(false),
            status => check_status("checking object", status).map(|()| true),
        }
    }

    async fn list_keys(&self) -> BackendResult<Vec<String>> {
        let pages = self
            .bucket
            .list(self.config.prefix.clone(), None)
            .await
            .map_err(|err| s3_error("listing objects", err))?;

        let prefix = self.config.prefix.as_str();
        let keys = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .filter_map(|object| object.key.strip_prefix(prefix).map(str::to_owned))
            .filter(|key| !key.is_empty())
            .collect();

        Ok(keys)
    }

    #[tracing::instrument(level = "trace", skip(self, payload))]
    async fn create(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        self.put("creating object", key, payload).await
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn read(&self, key: &str) -> BackendResult<Bytes> {
        let response = self
            .bucket
            .get_object(self.object_path(key))
            .await
            .map_err(|err| s3_error("reading object", err))?;

        match response.status_code() {
            404 => Err(BackendError::NotFound { key: key.into() }),
            status => {
                check_status("reading object", status)?;
                Ok(Bytes::from(response.to_vec()))
            }
        }
    }

    #[tracing::instrument(level = "trace", skip(self, payload))]
    async fn write(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        self.put("updating object", key, payload).await
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> BackendResult<()> {
        let response = self
            .bucket
            .delete_object(self.object_path(key))
            .await
            .map_err(|err| s3_error("deleting object", err))?;

        check_status("deleting object", response.status_code())
    }
}
