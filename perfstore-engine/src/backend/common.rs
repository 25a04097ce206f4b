use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// A [`Backend`] instance that can be shared between tasks.
pub type SharedBackend = Arc<dyn Backend>;

/// The primitives of one concrete storage system.
///
/// The engine treats every error returned from these methods uniformly as a failed operation.
/// Deadlines and timeouts are the responsibility of the implementation.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend kind, used as the `backend` label of all metrics.
    fn name(&self) -> &'static str;

    /// Probes connectivity and creates the backend's namespace if it is missing.
    ///
    /// The namespace is backend-specific, for example a bucket or a directory.
    async fn prepare(&self) -> BackendResult<()>;

    /// Returns `true` if an entry with the given key exists.
    async fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Lists the keys of all entries currently stored in the namespace.
    async fn list_keys(&self) -> BackendResult<Vec<String>>;

    /// Creates a new entry.
    async fn create(&self, key: &str, payload: Bytes) -> BackendResult<()>;

    /// Reads the full contents of an entry.
    async fn read(&self, key: &str) -> BackendResult<Bytes>;

    /// Overwrites the contents of an existing entry.
    async fn write(&self, key: &str, payload: Bytes) -> BackendResult<()>;

    /// Deletes an entry.
    async fn delete(&self, key: &str) -> BackendResult<()>;
}

/// Opens new client connections to a backend.
#[async_trait::async_trait]
pub trait Connect: Debug + Send + Sync + 'static {
    /// Opens a fresh, exclusively owned client.
    async fn connect(&self) -> BackendResult<BoxedBackend>;
}

/// How workers obtain their backend client.
#[derive(Clone, Debug)]
pub enum Connections {
    /// All workers share one client, which must be safe for concurrent use.
    Shared(SharedBackend),
    /// Every worker opens its own client.
    PerWorker(Arc<dyn Connect>),
}

impl Connections {
    /// Returns a client for one worker.
    ///
    /// For [`Connections::Shared`] this is a handle to the shared client, otherwise a new
    /// connection is opened.
    pub async fn acquire(&self) -> BackendResult<SharedBackend> {
        match self {
            Connections::Shared(backend) => Ok(Arc::clone(backend)),
            Connections::PerWorker(connect) => Ok(Arc::from(connect.connect().await?)),
        }
    }
}

/// Errors returned by [`Backend`] operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested entry does not exist.
    #[error("key not found: {key}")]
    NotFound {
        /// The key that was requested.
        key: String,
    },

    /// The key cannot be represented in this backend.
    #[error("invalid key: {key:?}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// The backend responded with an unexpected status code.
    #[error("{context}: unexpected status {status}")]
    Status {
        /// The operation that was attempted.
        context: String,
        /// The status code returned by the backend.
        status: u16,
    },

    /// Any other error stemming from one of the storage backends, which might be specific to that
    /// backend or to a certain operation.
    #[error("storage backend error: {context}")]
    Generic {
        /// The operation that was attempted.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    /// Wraps an arbitrary error with a description of the failed operation.
    pub fn generic<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Generic {
            context: context.into(),
            cause: Box::new(cause),
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
