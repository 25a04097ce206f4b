//! A scriptable in-memory [`Backend`] for exercising failure and concurrency behavior.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use perfstore_engine::{Backend, BackendError, BackendResult, BoxedBackend, Connect};

/// Number of calls per operation observed by a [`StubBackend`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Calls to [`Backend::create`].
    pub create: usize,
    /// Calls to [`Backend::read`].
    pub read: usize,
    /// Calls to [`Backend::write`].
    pub write: usize,
    /// Calls to [`Backend::delete`].
    pub delete: usize,
}

#[derive(Debug, Default)]
struct Inner {
    store: Mutex<BTreeMap<String, Bytes>>,
    fail_prepare: AtomicBool,
    fail_list: AtomicBool,
    fail_create: AtomicBool,
    fail_read: AtomicBool,
    fail_write: AtomicBool,
    fail_create_keys: Mutex<Vec<String>>,
    panic_on_read: AtomicBool,
    panic_on_create: AtomicBool,
    latency: Mutex<Duration>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,

    creates: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

/// An in-memory backend whose operations can be made to fail, panic or stall.
///
/// Clones share the same state, so a test can keep a handle for inspection after passing the
/// backend to the engine.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    inner: Arc<Inner>,
}

impl StubBackend {
    /// Creates an empty stub backend where every operation succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the given keys with an empty payload.
    pub fn with_keys<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut store = self.store();
        for key in keys {
            store.insert(key.into(), Bytes::new());
        }
        drop(store);
        self
    }

    /// Delays every data operation by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
        self
    }

    /// Makes [`Backend::prepare`] fail.
    pub fn fail_prepare(self, fail: bool) -> Self {
        self.inner.fail_prepare.store(fail, Ordering::SeqCst);
        self
    }

    /// Makes [`Backend::list_keys`] fail.
    pub fn fail_list(self, fail: bool) -> Self {
        self.inner.fail_list.store(fail, Ordering::SeqCst);
        self
    }

    /// Makes every create fail.
    pub fn fail_creates(self, fail: bool) -> Self {
        self.inner.fail_create.store(fail, Ordering::SeqCst);
        self
    }

    /// Makes creates of the given key fail.
    pub fn fail_create_of(self, key: impl Into<String>) -> Self {
        self.inner
            .fail_create_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.into());
        self
    }

    /// Makes every read fail.
    pub fn fail_reads(self, fail: bool) -> Self {
        self.inner.fail_read.store(fail, Ordering::SeqCst);
        self
    }

    /// Makes every write fail.
    pub fn fail_writes(self, fail: bool) -> Self {
        self.inner.fail_write.store(fail, Ordering::SeqCst);
        self
    }

    /// Makes the next read panic. Subsequent reads behave normally.
    pub fn panic_on_next_read(self) -> Self {
        self.inner.panic_on_read.store(true, Ordering::SeqCst);
        self
    }

    /// Makes the next create panic. Subsequent creates behave normally.
    pub fn panic_on_next_create(self) -> Self {
        self.inner.panic_on_create.store(true, Ordering::SeqCst);
        self
    }

    /// Returns the number of calls per operation so far.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            create: self.inner.creates.load(Ordering::SeqCst),
            read: self.inner.reads.load(Ordering::SeqCst),
            write: self.inner.writes.load(Ordering::SeqCst),
            delete: self.inner.deletes.load(Ordering::SeqCst),
        }
    }

    /// Returns the highest number of data operations that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the stored keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.store().keys().cloned().collect()
    }

    fn store(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, counter: &AtomicUsize) -> InFlight<'_> {
        counter.fetch_add(1, Ordering::SeqCst);
        let current = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.inner.in_flight);

        let latency = *self.inner.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn injected(context: &str) -> BackendError {
    BackendError::Status {
        context: format!("injected {context} failure"),
        status: 500,
    }
}

#[async_trait::async_trait]
impl Backend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn prepare(&self) -> BackendResult<()> {
        if self.inner.fail_prepare.load(Ordering::SeqCst) {
            return Err(injected("prepare"));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        Ok(self.store().contains_key(key))
    }

    async fn list_keys(&self) -> BackendResult<Vec<String>> {
        if self.inner.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        Ok(self.keys())
    }

    async fn create(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let _guard = self.enter(&self.inner.creates).await;

        if self.inner.panic_on_create.swap(false, Ordering::SeqCst) {
            panic!("injected create panic");
        }

        let fail_key = self
            .inner
            .fail_create_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|k| k == key);
        if fail_key || self.inner.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }

        self.store().insert(key.to_owned(), payload);
        Ok(())
    }

    async fn read(&self, key: &str) -> BackendResult<Bytes> {
        let _guard = self.enter(&self.inner.reads).await;

        if self.inner.panic_on_read.swap(false, Ordering::SeqCst) {
            panic!("injected read panic");
        }
        if self.inner.fail_read.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }

        self.store()
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                key: key.to_owned(),
            })
    }

    async fn write(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let _guard = self.enter(&self.inner.writes).await;

        if self.inner.fail_write.load(Ordering::SeqCst) {
            return Err(injected("write"));
        }

        match self.store().get_mut(key) {
            Some(stored) => {
                *stored = payload;
                Ok(())
            }
            None => Err(BackendError::NotFound {
                key: key.to_owned(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        let _guard = self.enter(&self.inner.deletes).await;
        self.store().remove(key);
        Ok(())
    }
}

/// Hands out clones of a [`StubBackend`] as per-worker connections.
///
/// The first `failures` connection attempts fail.
#[derive(Debug)]
pub struct StubConnector {
    backend: StubBackend,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl StubConnector {
    /// Creates a connector for `backend` where every attempt succeeds.
    pub fn new(backend: StubBackend) -> Self {
        Self {
            backend,
            failures: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Makes the next `failures` connection attempts fail.
    pub fn with_failures(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Returns the number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connect for StubConnector {
    async fn connect(&self) -> BackendResult<BoxedBackend> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(injected("connect"));
        }

        Ok(Box::new(self.backend.clone()))
    }
}
