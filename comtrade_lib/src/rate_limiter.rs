//! Client-side throttling for Comtrade API requests.
//!
//! Provides a sliding-window rate limiter that proactively paces requests
//! under the service limit (default one call every 20 seconds), a
//! [`Clock`] abstraction so waits can be observed in tests, and atomic
//! counters of request outcomes.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Source of time for throttling and backoff.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Wall-clock time via `tokio::time`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

impl<C: Clock> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(duration)
    }
}

/// Sliding-window rate limiter.
///
/// Tracks timestamps of recent requests in a `VecDeque` behind a tokio Mutex.
/// When the window is full, `acquire()` sleeps until the oldest entry expires.
pub struct RateLimiter<C: Clock = TokioClock> {
    timestamps: Mutex<VecDeque<Instant>>,
    max_requests: u64,
    window_duration: Duration,
    clock: C,
    tracker: RequestTracker,
}

impl RateLimiter<TokioClock> {
    /// Create a rate limiter with explicit budget and window.
    pub fn new(max_requests: u64, window_duration: Duration) -> Self {
        Self::with_clock(max_requests, window_duration, TokioClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(max_requests: u64, window_duration: Duration, clock: C) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
            max_requests,
            window_duration,
            clock,
            tracker: RequestTracker::new(),
        }
    }

    /// Wait until a request slot is available, then record the timestamp.
    ///
    /// If the sliding window is full, computes how long until the oldest
    /// entry expires, drops the lock, sleeps, then re-acquires and retries.
    pub async fn acquire(&self) {
        loop {
            let now = self.clock.now();
            let mut ts = self.timestamps.lock().await;

            // Entries at least one window old no longer count
            while ts
                .front()
                .is_some_and(|&t| now.saturating_duration_since(t) >= self.window_duration)
            {
                ts.pop_front();
            }

            if (ts.len() as u64) < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait = match ts.front() {
                Some(&oldest) => (oldest + self.window_duration).saturating_duration_since(now),
                None => Duration::ZERO,
            };

            drop(ts);
            tracing::info!(
                "Throttling: waiting {:.1}s for a request slot",
                wait.as_secs_f64()
            );
            self.tracker.record_throttle_wait(wait);
            self.clock.sleep(wait).await;
        }
    }

    /// Access the request tracker for recording outcomes.
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Atomic counters tracking API request outcomes.
#[derive(Default)]
pub struct RequestTracker {
    pub(crate) requests_made: AtomicU64,
    pub(crate) requests_succeeded: AtomicU64,
    pub(crate) requests_rate_limited: AtomicU64,
    pub(crate) requests_empty: AtomicU64,
    pub(crate) requests_failed: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    /// Cumulative retry backoff in milliseconds.
    pub(crate) total_backoff_ms: AtomicU64,
    /// Cumulative time spent waiting on the rate limiter, in milliseconds.
    pub(crate) total_throttle_ms: AtomicU64,
}

impl RequestTracker {
    fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// A call that succeeded but returned no rows while empty results are retried.
    pub fn record_empty(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff(&self, duration: Duration) {
        self.total_backoff_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_throttle_wait(&self, duration: Duration) {
        self.total_throttle_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_rate_limited: self.requests_rate_limited.load(Ordering::Relaxed),
            requests_empty: self.requests_empty.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            total_backoff_secs: self.total_backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            total_throttle_secs: self.total_throttle_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Immutable snapshot of tracker counters for display.
#[derive(Debug, Clone)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_rate_limited: u64,
    pub requests_empty: u64,
    pub requests_failed: u64,
    pub cache_hits: u64,
    pub total_backoff_secs: f64,
    pub total_throttle_secs: f64,
}
