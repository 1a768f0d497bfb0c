//! Rate-limited fetch with bounded retry and linear backoff.
//!
//! Each sub-request runs a small state machine:
//!
//! ```text
//! Idle -> Throttling -> InFlight -> Success
//!                          |   \-> Failed            (non-retryable)
//!                          \-> Retrying -> Throttling (transient, attempts left)
//!                                     \-> Failed      (attempts exhausted)
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use comtrade_api::types::TradeRecord;
use comtrade_api::TradeQuery;

use crate::config::ComtradeConfig;
use crate::error::ComtradeError;
use crate::rate_limiter::{Clock, RateLimiter, RequestTracker, TokioClock};

/// Anything that can execute a single final-data request.
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        query: &TradeQuery,
    ) -> impl Future<Output = Result<Vec<TradeRecord>, comtrade_api::Error>> + Send;

    /// Whether results come from the truncated preview endpoint.
    fn is_preview(&self) -> bool {
        false
    }
}

impl Transport for comtrade_api::Client {
    async fn fetch(&self, query: &TradeQuery) -> Result<Vec<TradeRecord>, comtrade_api::Error> {
        self.get_final_data(query).await
    }

    fn is_preview(&self) -> bool {
        comtrade_api::Client::is_preview(self)
    }
}

/// Attempt bound and backoff schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls per sub-request, first attempt included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(6),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ComtradeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            max_backoff: config.max_backoff,
        }
    }

    /// Sleep after the failed call numbered `attempt` (0-based):
    /// `backoff_base * (attempt + 1)`, capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(attempt.saturating_add(1))
            .min(self.max_backoff)
    }
}

/// Lifecycle of one sub-request.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchState {
    Idle,
    Throttling { attempt: u32 },
    InFlight { attempt: u32 },
    Retrying { attempt: u32, delay: Duration },
    Success { rows: usize },
    Failed,
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Idle => write!(f, "idle"),
            FetchState::Throttling { attempt } => write!(f, "throttling (attempt {})", attempt + 1),
            FetchState::InFlight { attempt } => write!(f, "in flight (attempt {})", attempt + 1),
            FetchState::Retrying { attempt, delay } => write!(
                f,
                "retrying after attempt {} in {:.1}s",
                attempt + 1,
                delay.as_secs_f64()
            ),
            FetchState::Success { rows } => write!(f, "success ({} rows)", rows),
            FetchState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one call, classified for the state machine.
enum Outcome {
    Done(Vec<TradeRecord>),
    Transient(String),
    Fatal(comtrade_api::Error),
}

/// Executes sub-requests through a [`Transport`], pacing them with a
/// [`RateLimiter`] and retrying transient failures.
pub struct Fetcher<T: Transport, C: Clock = TokioClock> {
    transport: T,
    limiter: RateLimiter<C>,
    policy: RetryPolicy,
}

impl<T: Transport> Fetcher<T, TokioClock> {
    pub fn new(transport: T, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }
}

impl<T: Transport, C: Clock> Fetcher<T, C> {
    pub fn with_limiter(transport: T, limiter: RateLimiter<C>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn tracker(&self) -> &RequestTracker {
        self.limiter.tracker()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches one sub-request. An empty result counts as transient when
    /// `retry_if_empty` is set; otherwise it is returned as is.
    pub async fn fetch(
        &self,
        query: &TradeQuery,
        retry_if_empty: bool,
    ) -> Result<Vec<TradeRecord>, ComtradeError> {
        let tracker = self.limiter.tracker();
        let period = query.periods.join(",");
        let mut state = FetchState::Idle;
        let mut attempt = 0u32;

        loop {
            transition(&period, &mut state, FetchState::Throttling { attempt });
            self.limiter.acquire().await;

            transition(&period, &mut state, FetchState::InFlight { attempt });
            let outcome = match self.transport.fetch(query).await {
                Ok(rows) if rows.is_empty() && retry_if_empty => {
                    tracker.record_empty();
                    Outcome::Transient("empty result".to_string())
                }
                Ok(rows) => {
                    tracker.record_success();
                    Outcome::Done(rows)
                }
                Err(e) if e.is_retryable() => {
                    if matches!(e, comtrade_api::Error::RateLimited { .. }) {
                        tracker.record_rate_limited();
                    } else {
                        tracker.record_failure();
                    }
                    Outcome::Transient(e.to_string())
                }
                Err(e) => {
                    tracker.record_failure();
                    Outcome::Fatal(e)
                }
            };

            let reason = match outcome {
                Outcome::Done(rows) => {
                    transition(&period, &mut state, FetchState::Success { rows: rows.len() });
                    return Ok(rows);
                }
                Outcome::Fatal(e) => {
                    transition(&period, &mut state, FetchState::Failed);
                    return Err(ComtradeError::Api(e));
                }
                Outcome::Transient(reason) => reason,
            };

            if attempt + 1 >= self.policy.max_attempts {
                transition(&period, &mut state, FetchState::Failed);
                tracing::error!(
                    "Period {}: giving up after {} attempts: {}",
                    period,
                    attempt + 1,
                    reason
                );
                return Err(ComtradeError::RetriesExhausted {
                    attempts: attempt + 1,
                    last_error: reason,
                });
            }

            let delay = self.policy.delay_for_attempt(attempt);
            tracing::warn!(
                "Period {}: {} on attempt {}/{}, retrying in {:.1}s",
                period,
                reason,
                attempt + 1,
                self.policy.max_attempts,
                delay.as_secs_f64()
            );
            transition(&period, &mut state, FetchState::Retrying { attempt, delay });
            tracker.record_backoff(delay);
            self.limiter.clock().sleep(delay).await;
            attempt += 1;
        }
    }
}

fn transition(period: &str, state: &mut FetchState, next: FetchState) {
    match &next {
        FetchState::Success { .. } => {
            tracing::info!("Period {}: {} -> {}", period, state, next)
        }
        FetchState::Retrying { .. } | FetchState::Failed => {
            tracing::warn!("Period {}: {} -> {}", period, state, next)
        }
        _ => tracing::debug!("Period {}: {} -> {}", period, state, next),
    }
    *state = next;
}
