//! 策略流水线模块：将多个弹性策略按由外到内的顺序组合在传输层之上。
//!
//! # Policy Pipeline
//!
//! A [`Pipeline`] is an ordered list of [`Policy`] values wrapped around one
//! [`Transport`]:
//!
//! ```text
//! policy_1( policy_2( ... policy_n( transport.send ) ) )
//!    outer                  inner
//! ```
//!
//! Order is part of the behavior. An outer policy sees the aggregate effect of
//! everything inside it: a rate limiter placed outside a retry policy spends one
//! token per call, while the same limiter placed inside spends one token per
//! attempt.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PipelineBuilder`] | Collects policies outer-first and binds the transport |
//! | [`Pipeline`] | Cheaply cloneable, shareable executor |
//!
//! ## Example
//!
//! ```rust
//! use resilient_http::fake::StatusCodeTransport;
//! use resilient_http::pipeline::PipelineBuilder;
//! use resilient_http::resilience::{RateLimiter, RateLimiterConfig, RetryConfig, RetryPolicy};
//! use resilient_http::types::Request;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let pipeline = PipelineBuilder::new()
//!     .policy(RetryPolicy::new(RetryConfig::new()))
//!     .policy(RateLimiter::new(RateLimiterConfig::new()))
//!     .transport(StatusCodeTransport::ok())
//!     .build()?;
//!
//! let request = Request::get("https://localhost/ping".parse()?);
//! let response = pipeline.execute(request, CancellationToken::new()).await?;
//! assert!(response.is_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```


use crate::resilience::Policy;
use crate::transport::Transport;
use crate::types::{Outcome, Request};
use crate::{Error, ErrorContext, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Builder that collects policies outer-first.
#[derive(Default)]
pub struct PipelineBuilder {
    policies: Vec<Arc<dyn Policy>>,
    transport: Option<Arc<dyn Transport>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy inside the ones already added.
    pub fn policy<P: Policy + 'static>(self, policy: P) -> Self {
        self.shared_policy(Arc::new(policy))
    }

    /// Append a policy the caller keeps a handle to (e.g. to read its state).
    pub fn shared_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let transport = self.transport.ok_or_else(|| {
            Error::configuration_with_context(
                "a transport is required",
                ErrorContext::new()
                    .with_field_path("transport")
                    .with_source("pipeline_builder"),
            )
        })?;
        let pipeline = Pipeline {
            policies: self.policies.into(),
            transport,
        };
        debug!(policies = ?pipeline.policy_names(), "pipeline built");
        Ok(pipeline)
    }
}

/// Ordered policy chain bound to a transport.
///
/// Clones share the same policy instances, so breaker and limiter state is
/// common to every caller of a clone.
#[derive(Clone)]
pub struct Pipeline {
    policies: Arc<[Arc<dyn Policy>]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Policy names, outermost first.
    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run `request` through every policy and the transport.
    ///
    /// Resolves exactly once. Triggering `cancel` aborts a pending retry delay
    /// or the in-flight transport call with [`Error::Cancelled`].
    pub async fn execute(&self, request: Request, cancel: CancellationToken) -> Outcome {
        dispatch(
            self.policies.clone(),
            self.transport.clone(),
            Arc::new(request),
            cancel,
            0,
        )
        .await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("policies", &self.policy_names())
            .finish_non_exhaustive()
    }
}

fn dispatch(
    policies: Arc<[Arc<dyn Policy>]>,
    transport: Arc<dyn Transport>,
    request: Arc<Request>,
    cancel: CancellationToken,
    depth: usize,
) -> BoxFuture<'static, Outcome> {
    match policies.get(depth).cloned() {
        None => async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                outcome = transport.send(&request, &cancel) => outcome,
            }
        }
        .boxed(),
        Some(policy) => async move {
            let inner_cancel = cancel.clone();
            let operation = move || {
                dispatch(
                    policies.clone(),
                    transport.clone(),
                    request.clone(),
                    inner_cancel.clone(),
                    depth + 1,
                )
            };
            policy.execute(&operation, &cancel).await
        }
        .boxed(),
    }
}
