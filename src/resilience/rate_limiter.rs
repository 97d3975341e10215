use super::{Operation, Policy};
use crate::clock::{system_clock, Clock};
use crate::types::Outcome;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub refill_rate: f64,
    pub capacity: u32,
    pub tokens: f64,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens held by the bucket.
    pub capacity: u32,
    /// Tokens per second. Zero or negative disables limiting.
    pub refill_rate: f64,
    /// Tokens available at construction; defaults to a full bucket.
    pub initial_tokens: Option<u32>,
}

impl RateLimiterConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self {
            capacity: 10,
            refill_rate: 10.0,
            initial_tokens: None,
        }
    }

    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps < 0.0 {
            return None;
        }
        Some(Self {
            capacity: rps.max(1.0).ceil() as u32, // default burst: 1 second worth, at least 1
            refill_rate: rps,
            initial_tokens: None,
        })
    }

    /// Set the maximum tokens (burst size)
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.capacity = tokens;
        self
    }

    /// Set the refill rate (tokens per second)
    pub fn with_refill_rate(mut self, rate: f64) -> Self {
        self.refill_rate = rate;
        self
    }

    /// `tokens` every `interval`, spread continuously over the interval.
    pub fn with_refill(self, tokens: u32, interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        let rate = if secs > 0.0 { tokens as f64 / secs } else { 0.0 };
        self.with_refill_rate(rate)
    }

    /// Start with fewer tokens than capacity.
    pub fn with_initial_tokens(mut self, tokens: u32) -> Self {
        self.initial_tokens = Some(tokens);
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
}

/// Non-blocking token bucket.
///
/// A call that finds the bucket empty is rejected with
/// [`Error::RateLimited`] immediately; nothing waits for a token.
#[derive(Debug)]
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let clock = system_clock();
        let capacity = cfg.capacity as f64;
        let tokens = cfg
            .initial_tokens
            .map_or(capacity, |t| (t as f64).min(capacity));
        let state = Mutex::new(State {
            tokens,
            last: clock.now(),
        });
        Self { cfg, state, clock }
    }

    /// Refill from an injected clock instead of tokio time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        if let Ok(st) = self.state.get_mut() {
            st.last = now;
        }
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            Error::runtime_with_context(
                "RateLimiter poisoned",
                ErrorContext::new().with_source("rate_limiter"),
            )
        })
    }

    fn refill_locked(&self, st: &mut State, now: Instant) {
        let elapsed = now.saturating_duration_since(st.last).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * self.cfg.refill_rate).min(self.cfg.capacity as f64);
            st.last = now;
        }
    }

    fn wait_ms(&self, tokens: f64) -> u64 {
        let missing = 1.0 - tokens;
        (missing / self.cfg.refill_rate * 1000.0).ceil() as u64
    }

    /// Take one token, or fail with [`Error::RateLimited`] carrying the
    /// estimated wait until the next one.
    pub fn try_acquire(&self) -> Result<()> {
        if self.cfg.refill_rate <= 0.0 {
            return Ok(());
        }

        let mut st = self.lock()?;
        let now = self.clock.now();
        self.refill_locked(&mut st, now);

        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            Ok(())
        } else {
            Err(Error::RateLimited {
                retry_after_ms: self.wait_ms(st.tokens),
            })
        }
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let now = self.clock.now();
        let mut tokens = self.cfg.capacity as f64;
        let mut wait_ms = None;
        if let Ok(mut st) = self.state.lock() {
            if self.cfg.refill_rate > 0.0 {
                self.refill_locked(&mut st, now);
                if st.tokens < 1.0 {
                    wait_ms = Some(self.wait_ms(st.tokens));
                }
            }
            tokens = st.tokens;
        }

        RateLimiterSnapshot {
            refill_rate: self.cfg.refill_rate,
            capacity: self.cfg.capacity,
            tokens,
            estimated_wait_ms: wait_ms,
        }
    }
}

#[async_trait]
impl Policy for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    async fn execute(&self, operation: &Operation, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Err(e) = self.try_acquire() {
            warn!(error_class = e.class(), "rate limiter rejected call");
            return Err(e);
        }
        operation().await
    }
}
