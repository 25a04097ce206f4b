//! In-memory backend for dry runs and tests.
//!
//! This provides a [`Backend`] backed by a `BTreeMap`. The backend is [`Clone`] so tests can hold
//! a handle for direct inspection while the engine owns a shared copy. All clones observe the
//! same entries, so it must be used with [`Connections::Shared`](super::Connections::Shared).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::common::{Backend, BackendError, BackendResult};

type Store = BTreeMap<String, Bytes>;

/// A [`Backend`] that keeps all entries in process memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with the given keys and payload.
    pub fn with_keys<I, K>(keys: I, payload: Bytes) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let store = keys
            .into_iter()
            .map(|key| (key.into(), payload.clone()))
            .collect();

        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Returns a clone of the stored payload, if present.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.lock().get(key).cloned()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the backend has no stored entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn prepare(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        Ok(self.lock().contains_key(key))
    }

    async fn list_keys(&self) -> BackendResult<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    async fn create(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        self.lock().insert(key.to_owned(), payload);
        Ok(())
    }

    async fn read(&self, key: &str) -> BackendResult<Bytes> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound { key: key.into() })
    }

    async fn write(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        self.lock().insert(key.to_owned(), payload);
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
