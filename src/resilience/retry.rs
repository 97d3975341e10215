//! Retry policy.
//!
//! `max_retries` counts retries, not attempts: an operation that keeps
//! failing is invoked `max_retries + 1` times and the retry callback fires
//! `max_retries` times. When retries run out the last outcome is returned
//! unchanged, so callers see the same shape as a failure that was never
//! retried.

use super::{handle_transient_http_error, Operation, OutcomePredicate, Policy};
use crate::clock::{system_clock, Clock};
use crate::types::{outcome_status, Outcome};
use crate::Error;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maps the 1-based retry number to the wait before that retry.
pub type DelayFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Observability hook: `(retry number, outcome being retried)`.
pub type OnRetryFn = dyn Fn(u32, &Outcome) + Send + Sync;

#[derive(Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    should_retry: Arc<OutcomePredicate>,
    delay: Option<Arc<DelayFn>>,
    on_retry: Option<Arc<OnRetryFn>>,
}

impl RetryConfig {
    /// One retry of transient HTTP errors, no delay.
    pub fn new() -> Self {
        Self {
            max_retries: 1,
            should_retry: Arc::new(handle_transient_http_error),
            delay: None,
            on_retry: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Per-retry delay. A zero duration means retry immediately.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn with_constant_delay(self, delay: Duration) -> Self {
        self.with_delay(move |_| delay)
    }

    /// `base * 2^(retry - 1)`, capped at `max`.
    pub fn with_exponential_backoff(self, base: Duration, max: Duration) -> Self {
        self.with_delay(move |retry| {
            let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
            base.saturating_mul(factor).min(max)
        })
    }

    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, &Outcome) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.delay.as_ref().map(|f| f(retry)).unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("has_delay", &self.delay.is_some())
            .field("has_on_retry", &self.on_retry.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct RetryPolicy {
    cfg: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl RetryPolicy {
    pub fn new(cfg: RetryConfig) -> Self {
        Self {
            cfg,
            clock: system_clock(),
        }
    }

    /// Clock used for retry delays.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.cfg
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn execute(&self, operation: &Operation, cancel: &CancellationToken) -> Outcome {
        let mut retries = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = operation().await;
            if matches!(outcome, Err(Error::Cancelled)) || !(self.cfg.should_retry)(&outcome) {
                return outcome;
            }
            if retries >= self.cfg.max_retries {
                if self.cfg.max_retries > 0 {
                    warn!(
                        retries,
                        http_status = outcome_status(&outcome).map(|s| s.as_u16()),
                        error_class = outcome.as_ref().err().map(|e| e.class()),
                        "retries exhausted, returning last outcome"
                    );
                }
                return outcome;
            }

            retries += 1;
            if let Some(callback) = &self.cfg.on_retry {
                callback(retries, &outcome);
            }

            let delay = self.cfg.delay_for(retries);
            debug!(
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                http_status = outcome_status(&outcome).map(|s| s.as_u16()),
                error_class = outcome.as_ref().err().map(|e| e.class()),
                "retrying operation"
            );

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = self.clock.sleep(delay) => {}
                }
            }
        }
    }
}
