//! Serializable client options.
//!
//! Options load from YAML, then environment variables override individual
//! fields:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RESILIENT_HTTP_BASE_URL` | `base_url` |
//! | `RESILIENT_HTTP_TIMEOUT_MS` | `timeout_ms` |
//! | `RESILIENT_HTTP_RETRY_COUNT` | `retry.count` |
//! | `RESILIENT_HTTP_RETRY_DELAY_MS` | `retry.delay_ms` |
//! | `RESILIENT_HTTP_BREAKER_THRESHOLD` | `circuit_breaker.threshold` |
//! | `RESILIENT_HTTP_BREAKER_BREAK_MS` | `circuit_breaker.break_duration_ms` |
//! | `RESILIENT_HTTP_RPS` | `rate_limiter` (requests per second, `0` disables) |

use crate::resilience::{
    handle_transient_or_rate_limited, CircuitBreakerConfig, RateLimiterConfig, RetryConfig,
};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const SOURCE: &str = "client_options";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Constant,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    pub count: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
    /// Cap for exponential backoff.
    pub max_delay_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            count: 1,
            delay_ms: 0,
            backoff: Backoff::Constant,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryOptions {
    /// Retry config for the standard stack: transient HTTP errors and
    /// rate-limiter rejections are retried.
    pub fn to_config(&self) -> RetryConfig {
        let cfg = RetryConfig::new()
            .with_max_retries(self.count)
            .retry_if(handle_transient_or_rate_limited);
        let base = Duration::from_millis(self.delay_ms);
        match self.backoff {
            Backoff::Constant => cfg.with_constant_delay(base),
            Backoff::Exponential => {
                cfg.with_exponential_backoff(base, Duration::from_millis(self.max_delay_ms))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerOptions {
    pub threshold: u32,
    pub break_duration_ms: u64,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            threshold: 1,
            break_duration_ms: 30_000,
        }
    }
}

impl CircuitBreakerOptions {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.threshold)
            .with_break_duration(Duration::from_millis(self.break_duration_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterOptions {
    pub capacity: u32,
    /// Tokens added per `refill_interval_ms`.
    pub refill_tokens: u32,
    pub refill_interval_ms: u64,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_tokens: 10,
            refill_interval_ms: 1_000,
        }
    }
}

impl RateLimiterOptions {
    /// Bucket of `ceil(rps)` tokens (at least one) refilled at `rps`.
    /// Returns `None` for zero, negative or non-finite rates.
    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return None;
        }
        let capacity = rps.ceil().max(1.0) as u32;
        Some(Self {
            capacity,
            refill_tokens: capacity,
            refill_interval_ms: ((capacity as f64 / rps) * 1000.0).round().max(1.0) as u64,
        })
    }

    pub fn to_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new()
            .with_max_tokens(self.capacity)
            .with_refill(
                self.refill_tokens,
                Duration::from_millis(self.refill_interval_ms),
            )
    }
}

/// Options for one named client.
///
/// Every field is defaulted, so an empty document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub base_url: Option<String>,
    /// Bound on a whole client call including retries; `0` disables it.
    pub timeout_ms: u64,
    pub retry: RetryOptions,
    pub circuit_breaker: Option<CircuitBreakerOptions>,
    pub rate_limiter: Option<RateLimiterOptions>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
            retry: RetryOptions::default(),
            circuit_breaker: None,
            rate_limiter: None,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source(SOURCE),
    )
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse::<T>().ok())
}

impl ClientOptions {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                "invalid client options document",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source(SOURCE),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read {}", path.display()),
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source(SOURCE),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            Error::runtime_with_context(
                "cannot encode client options",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source(SOURCE),
            )
        })
    }

    /// Apply `RESILIENT_HTTP_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparsable values are
    /// ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("RESILIENT_HTTP_BASE_URL").filter(|s| !s.trim().is_empty()) {
            self.base_url = Some(url.trim().to_string());
        }
        if let Some(ms) = parsed(&lookup, "RESILIENT_HTTP_TIMEOUT_MS") {
            self.timeout_ms = ms;
        }
        if let Some(count) = parsed(&lookup, "RESILIENT_HTTP_RETRY_COUNT") {
            self.retry.count = count;
        }
        if let Some(ms) = parsed(&lookup, "RESILIENT_HTTP_RETRY_DELAY_MS") {
            self.retry.delay_ms = ms;
        }
        if let Some(threshold) = parsed::<u32>(&lookup, "RESILIENT_HTTP_BREAKER_THRESHOLD") {
            self.circuit_breaker
                .get_or_insert_with(CircuitBreakerOptions::default)
                .threshold = threshold;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "RESILIENT_HTTP_BREAKER_BREAK_MS") {
            self.circuit_breaker
                .get_or_insert_with(CircuitBreakerOptions::default)
                .break_duration_ms = ms;
        }
        if let Some(rps) = parsed::<f64>(&lookup, "RESILIENT_HTTP_RPS") {
            self.rate_limiter = RateLimiterOptions::from_rps(rps);
        }
        self
    }

    /// Reject values no policy can run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(base) = &self.base_url {
            let url = Url::parse(base)
                .map_err(|e| invalid("base_url", "base_url is not an absolute URL", e.to_string()))?;
            if url.cannot_be_a_base() {
                return Err(invalid("base_url", "base_url cannot be a base", base.clone()));
            }
        }
        if self.retry.backoff == Backoff::Exponential && self.retry.max_delay_ms < self.retry.delay_ms
        {
            return Err(invalid(
                "retry.max_delay_ms",
                "max_delay_ms must not be below delay_ms",
                format!("{} < {}", self.retry.max_delay_ms, self.retry.delay_ms),
            ));
        }
        if let Some(cb) = &self.circuit_breaker {
            if cb.threshold == 0 {
                return Err(invalid(
                    "circuit_breaker.threshold",
                    "threshold must be at least 1",
                    "got 0",
                ));
            }
        }
        if let Some(rl) = &self.rate_limiter {
            if rl.capacity == 0 {
                return Err(invalid(
                    "rate_limiter.capacity",
                    "capacity must be at least 1",
                    "got 0",
                ));
            }
            if rl.refill_tokens == 0 {
                return Err(invalid(
                    "rate_limiter.refill_tokens",
                    "refill_tokens must be at least 1",
                    "got 0",
                ));
            }
            if rl.refill_interval_ms == 0 {
                return Err(invalid(
                    "rate_limiter.refill_interval_ms",
                    "refill_interval_ms must be at least 1",
                    "got 0",
                ));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}
