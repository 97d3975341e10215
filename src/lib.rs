//! # resilient-http
//!
//! 面向客户端 HTTP 调用的弹性流水线：重试、熔断、限流，以及用于确定性测试的可编程伪传输层。
//!
//! Client-side HTTP resilience pipeline - composable retry, circuit breaking and
//! token-bucket rate limiting around a pluggable transport.
//!
//! ## Overview
//!
//! A [`ResilientClient`] is a named configuration: an ordered chain of policies
//! wrapped around one [`Transport`](transport::Transport). Every call resolves
//! to exactly one [`Outcome`](types::Outcome): a response, a failure, or a
//! cancellation.
//!
//! ## Core Philosophy
//!
//! - **Composable**: every policy wraps "the rest of the pipeline" and nothing else
//! - **Order-Explicit**: outer policies see the aggregate effect of inner ones
//! - **Deterministic in Tests**: fake transports and an injectable [`clock`]
//! - **Non-Blocking**: delays are timed suspensions and every call is cancellable
//!
//! ## Quick Start
//!
//! ```rust
//! use resilient_http::fake::FailThenSucceedTransport;
//! use resilient_http::resilience::RetryConfig;
//! use resilient_http::ClientBuilder;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let fake = Arc::new(FailThenSucceedTransport::new(1));
//! let client = ClientBuilder::new("users")
//!     .base_url("https://localhost/api")
//!     .retry(RetryConfig::new().with_max_retries(1))
//!     .shared_transport(fake.clone())
//!     .build()?;
//!
//! let response = client.get("users/1").await?;
//! assert!(response.is_success());
//! assert_eq!(fake.calls(), 2);
//! # Ok::<(), resilient_http::Error>(())
//! # }).unwrap();
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Resilient client, builder, serializable options |
//! | [`pipeline`] | Ordered outer-to-inner policy composition |
//! | [`resilience`] | Retry, circuit breaker and rate limiter policies |
//! | [`transport`] | Transport capability and the reqwest-backed implementation |
//! | [`fake`] | Programmable fake transports |
//! | [`types`] | Request, response and outcome types |
//! | [`clock`] | Injectable time source |

pub mod client;
pub mod clock;
pub mod fake;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ClientBuilder, ClientOptions, ResilientClient, SignalsSnapshot};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use resilience::Policy;
pub use tokio_util::sync::CancellationToken;
pub use transport::{Transport, TransportError};
pub use types::{Outcome, Request, Response};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
