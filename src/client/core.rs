use crate::client::signals::SignalsSnapshot;
use crate::pipeline::Pipeline;
use crate::resilience::{CircuitBreaker, RateLimiter};
use crate::types::{Outcome, Request};
use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Named client that sends every request through its policy pipeline.
///
/// Cheap to clone; clones share policies and transport, so concurrent callers
/// see one breaker state and one token bucket.
#[derive(Clone)]
pub struct ResilientClient {
    pub(crate) name: String,
    pub(crate) base_url: Option<Url>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) pipeline: Pipeline,
    pub(crate) breaker: Option<Arc<CircuitBreaker>>,
    pub(crate) rate_limiter: Option<Arc<RateLimiter>>,
}

impl ResilientClient {
    pub fn builder(name: impl Into<String>) -> crate::client::ClientBuilder {
        crate::client::ClientBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Snapshot current runtime signals (facts only) for application-layer orchestration.
    pub fn signals(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            rate_limiter: self.rate_limiter.as_ref().map(|rl| rl.snapshot()),
            circuit_breaker: self.breaker.as_ref().map(|cb| cb.snapshot()),
        }
    }

    /// Build a request for `path`. Absolute URLs pass through; anything else
    /// resolves against the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<Request> {
        Ok(Request::new(method, self.resolve(path)?))
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        match Url::parse(path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => Ok(base.join(path.trim_start_matches('/'))?),
                None => Err(Error::configuration_with_context(
                    format!("relative path {:?} needs a base_url", path),
                    ErrorContext::new()
                        .with_field_path("base_url")
                        .with_source(self.name.clone()),
                )),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, path: &str) -> Outcome {
        self.get_with_cancel(path, CancellationToken::new()).await
    }

    pub async fn get_with_cancel(&self, path: &str, cancel: CancellationToken) -> Outcome {
        let request = self.request(Method::GET, path)?;
        self.send_with_cancel(request, cancel).await
    }

    pub async fn send(&self, request: Request) -> Outcome {
        self.send_with_cancel(request, CancellationToken::new()).await
    }

    /// Send through the pipeline, bounded by the client timeout.
    ///
    /// Exactly one outcome is returned: the pipeline's final outcome,
    /// [`Error::Timeout`], or [`Error::Cancelled`] once `cancel` fires.
    pub async fn send_with_cancel(&self, request: Request, cancel: CancellationToken) -> Outcome {
        let request_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        debug!(
            client = self.name.as_str(),
            request_id = request_id.as_str(),
            method = request.method().as_str(),
            url = request.url().as_str(),
            "sending request"
        );

        let call = self.pipeline.execute(request, cancel);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => call.await,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(resp) => info!(
                client = self.name.as_str(),
                request_id = request_id.as_str(),
                http_status = resp.status().as_u16(),
                duration_ms,
                "request completed"
            ),
            Err(e) if e.is_rejection() => warn!(
                client = self.name.as_str(),
                request_id = request_id.as_str(),
                error_class = e.class(),
                duration_ms,
                "request rejected by policy"
            ),
            Err(e) => info!(
                client = self.name.as_str(),
                request_id = request_id.as_str(),
                error_class = e.class(),
                duration_ms,
                "request failed"
            ),
        }
        outcome
    }
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_ref().map(|u| u.as_str()))
            .field("timeout", &self.timeout)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
