//! Pacing of one stream of operations.

use std::time::Duration;

use tokio::time::Instant;

/// Spaces successive calls to [`take`](Self::take) at least `1 / rate` apart.
///
/// Every workload worker owns a private limiter, so the aggregate rate of a run is the
/// per-worker rate times the number of workers. The limiter does not accumulate credit while the
/// caller is busy: a late call returns immediately and schedules the next slot one interval
/// later.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl RateLimiter {
    /// Creates a limiter for `rate` operations per second.
    ///
    /// A rate of zero disables pacing. [`take`](Self::take) then only yields to the scheduler, so
    /// a worker against an always-ready backend cannot starve its siblings.
    pub fn new(rate: u32) -> Self {
        let interval = (rate > 0).then(|| Duration::from_secs(1) / rate);
        Self {
            interval,
            next: None,
        }
    }

    /// Creates a limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Returns the minimum spacing between two calls, or `None` if pacing is disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Waits until the next operation may be issued.
    ///
    /// The slot is reserved before waiting, so dropping the returned future during a wait does
    /// not allow the following call to skip ahead.
    pub async fn take(&mut self) {
        let Some(interval) = self.interval else {
            tokio::task::yield_now().await;
            return;
        };

        let now = Instant::now();
        let slot = match self.next {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next = Some(slot + interval);

        if slot > now {
            tokio::time::sleep_until(slot).await;
        }
    }
}
