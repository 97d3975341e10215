//! 弹性模式模块：提供重试、熔断器和限流器等可组合的策略。
//!
//! # Resilience Policies Module
//!
//! Every policy wraps one "send" operation and decides whether, when and how
//! often to invoke it. Policies nest: the operation a policy receives is the
//! rest of the pipeline below it.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Policy`] | Capability interface: `execute(operation, cancel) -> Outcome` |
//! | [`retry`] | Conditional retry with per-attempt delays |
//! | [`circuit_breaker`] | Closed / Open / HalfOpen breaker with a single probe |
//! | [`rate_limiter`] | Non-blocking token bucket admission |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: calls pass through, consecutive failures are counted
//! - **Open**: threshold reached, calls are rejected without reaching the inner stage
//! - **Half-Open**: break duration elapsed, exactly one probe call is admitted
//!
//! ```rust
//! use resilient_http::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_break_duration(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//! assert!(breaker.allow().is_ok());
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust
//! use resilient_http::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! let config = RateLimiterConfig::new()
//!     .with_max_tokens(100)
//!     .with_refill_rate(10.0); // 10 tokens per second
//! let limiter = RateLimiter::new(config);
//!
//! if limiter.try_acquire().is_ok() {
//!     // Proceed with request...
//! }
//! ```
//!
//! ## Writing an operation by hand
//!
//! ```rust
//! use futures::FutureExt;
//! use resilient_http::resilience::{retry::{RetryConfig, RetryPolicy}, Policy};
//! use resilient_http::types::Response;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::new(RetryConfig::new().with_max_retries(2));
//! let operation = || async { Ok::<_, resilient_http::Error>(Response::shared_ok()) }.boxed();
//! let outcome = policy.execute(&operation, &CancellationToken::new()).await;
//! assert!(outcome.unwrap().is_success());
//! # });
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};

use crate::types::Outcome;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// One invocation of the stage below a policy. Calling it again starts a new
/// attempt.
pub type Operation = dyn Fn() -> BoxFuture<'static, Outcome> + Send + Sync;

/// Predicate over an attempt's outcome.
pub type OutcomePredicate = dyn Fn(&Outcome) -> bool + Send + Sync;

#[async_trait]
pub trait Policy: Send + Sync {
    /// Short stable name used in log fields.
    fn name(&self) -> &'static str;

    /// Run `operation` under this policy. Resolves exactly once with a
    /// success, a failure or [`crate::Error::Cancelled`].
    async fn execute(&self, operation: &Operation, cancel: &CancellationToken) -> Outcome;
}

/// Non-success status or any failure other than cancellation.
pub fn handle_unsuccessful(outcome: &Outcome) -> bool {
    match outcome {
        Ok(resp) => !resp.is_success(),
        Err(e) => !e.is_cancelled(),
    }
}

/// Only responses with a non-success status; failures are not handled.
pub fn handle_unsuccessful_status(outcome: &Outcome) -> bool {
    matches!(outcome, Ok(resp) if !resp.is_success())
}

/// `5xx`, `408 Request Timeout`, or a transient transport failure.
pub fn handle_transient_http_error(outcome: &Outcome) -> bool {
    match outcome {
        Ok(resp) => {
            let status = resp.status();
            status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT
        }
        Err(e) => e.is_transient(),
    }
}

/// [`handle_transient_http_error`] plus rate-limiter rejections.
pub fn handle_transient_or_rate_limited(outcome: &Outcome) -> bool {
    handle_transient_http_error(outcome)
        || matches!(outcome, Err(crate::Error::RateLimited { .. }))
}
