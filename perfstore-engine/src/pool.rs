//! Bounded pool for short-lived tasks.
//!
//! [`WorkerPool`] caps the number of concurrently running tasks using a tokio semaphore. Each
//! task holds an owned permit for its whole body, so [`WorkerPool::submit`] waits until a running
//! task has finished before more work is started. [`WorkerPool::join`] acts as a barrier that
//! resolves once every submitted task has run to completion.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Outcome of all tasks completed by a [`WorkerPool`].
#[derive(Debug)]
pub struct Joined<T> {
    /// Return values of all tasks that ran to completion, in completion order.
    pub completed: Vec<T>,
    /// The number of tasks that panicked.
    pub panicked: usize,
}

/// Executes at most `capacity` tasks concurrently.
///
/// A task that panics is logged and counted in [`Joined::panicked`]. It never poisons the pool or
/// blocks [`join`](Self::join).
#[derive(Debug)]
pub struct WorkerPool<T> {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    tasks: JoinSet<T>,
    completed: Vec<T>,
    panicked: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates a pool running at most `capacity` tasks at a time.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: JoinSet::new(),
            completed: Vec::new(),
            panicked: 0,
        }
    }

    /// Returns the maximum number of concurrently running tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Submits a task, waiting until it can start within the capacity budget.
    ///
    /// Submitted tasks are never buffered: once this returns, the task is running.
    pub async fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.reap();

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("pool semaphore is never closed");

        self.tasks.spawn(async move {
            let output = task.await;
            drop(permit);
            output
        });
    }

    /// Waits until every submitted task has completed.
    ///
    /// Returns the outcomes of all tasks completed since the last call to `join`. The pool can be
    /// reused afterwards.
    pub async fn join(&mut self) -> Joined<T> {
        while let Some(result) = self.tasks.join_next().await {
            self.collect(result);
        }

        Joined {
            completed: std::mem::take(&mut self.completed),
            panicked: std::mem::take(&mut self.panicked),
        }
    }

    /// Collects finished tasks without waiting, so the join set does not grow unbounded.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.collect(result);
        }
    }

    fn collect(&mut self, result: Result<T, JoinError>) {
        match result {
            Ok(output) => self.completed.push(output),
            Err(err) if err.is_panic() => {
                tracing::error!(error = &err as &dyn std::error::Error, "pool task panicked");
                self.panicked += 1;
            }
            Err(err) => {
                tracing::warn!(error = &err as &dyn std::error::Error, "pool task cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_capacity() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut pool = WorkerPool::new(3);
        for _ in 0..10 {
            let running = Arc::clone(&running);
            let max_running = Arc::clone(&max_running);
            let finished = Arc::clone(&finished);
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .await;
            assert!(pool.in_flight() <= 3);
        }

        let joined = pool.join().await;
        assert_eq!(finished.load(Ordering::SeqCst), 10);
        assert_eq!(joined.completed.len(), 10);
        assert_eq!(max_running.load(Ordering::SeqCst), 3);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn join_waits_for_task_bodies() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2);

        for _ in 0..5 {
            let finished = Arc::clone(&finished);
            pool.submit(async move {
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }

        pool.join().await;
        assert_eq!(finished.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn collects_task_outputs() {
        let mut pool = WorkerPool::new(4);
        for i in 0..8 {
            pool.submit(async move { i * 2 }).await;
        }

        let mut outputs = pool.join().await.completed;
        outputs.sort_unstable();
        assert_eq!(outputs, [0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[tokio::test]
    async fn panicking_task_releases_capacity() {
        let mut pool = WorkerPool::<i32>::new(1);

        pool.submit(async { panic!("boom") }).await;
        pool.submit(async { 1 }).await;
        pool.submit(async { 2 }).await;

        let joined = pool.join().await;
        assert_eq!(joined.panicked, 1);
        assert_eq!(joined.completed.len(), 2);
    }

    #[tokio::test]
    async fn zero_capacity_runs_sequentially() {
        let mut pool = WorkerPool::new(0);
        assert_eq!(pool.capacity(), 1);

        pool.submit(async { "done" }).await;
        assert_eq!(pool.join().await.completed, ["done"]);
    }

    #[tokio::test]
    async fn join_on_empty_pool_returns_immediately() {
        let mut pool = WorkerPool::<()>::new(5);
        let joined = pool.join().await;
        assert!(joined.completed.is_empty());
        assert_eq!(joined.panicked, 0);
    }
}
