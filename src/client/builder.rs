use crate::client::core::ResilientClient;
use crate::client::options::ClientOptions;
use crate::clock::{system_clock, Clock};
use crate::pipeline::PipelineBuilder;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, Policy, RateLimiter, RateLimiterConfig, RetryConfig,
    RetryPolicy,
};
use crate::transport::{HttpTransport, Transport};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

enum Stage {
    Retry(RetryConfig),
    RateLimiter(RateLimiterConfig),
    CircuitBreaker(CircuitBreakerConfig),
    Custom(Arc<dyn Policy>),
}

/// Builder for a named client.
///
/// Policies wrap each other in the order their methods are called: the first
/// one added is the outermost. Keep this surface area small and predictable.
pub struct ClientBuilder {
    name: String,
    base_url: Option<String>,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    stages: Vec<Stage>,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            timeout: Some(Duration::from_secs(30)),
            transport: None,
            stages: Vec::new(),
            clock: system_clock(),
        }
    }

    /// Standard stack from options: retry, then rate limiter, then circuit
    /// breaker, then the transport. Options are validated first.
    pub fn from_options(name: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        options.validate()?;

        let mut builder = Self::new(name).retry(options.retry.to_config());
        builder.base_url = options.base_url.clone();
        builder.timeout = options.timeout();
        if let Some(rl) = &options.rate_limiter {
            builder = builder.rate_limiter(rl.to_config());
        }
        if let Some(cb) = &options.circuit_breaker {
            builder = builder.circuit_breaker(cb.to_config());
        }
        Ok(builder)
    }

    /// Base address relative request paths resolve against.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Bound on a whole call, retries and delays included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Bind a transport the caller keeps a handle to (e.g. a fake whose call
    /// counter a test inspects).
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn retry(mut self, cfg: RetryConfig) -> Self {
        self.stages.push(Stage::Retry(cfg));
        self
    }

    pub fn rate_limiter(mut self, cfg: RateLimiterConfig) -> Self {
        self.stages.push(Stage::RateLimiter(cfg));
        self
    }

    pub fn circuit_breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.stages.push(Stage::CircuitBreaker(cfg));
        self
    }

    /// Any other policy, at the current position in the chain.
    pub fn policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.stages.push(Stage::Custom(policy));
        self
    }

    /// Clock for retry delays, breaker timers and limiter refill.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the client. Without an explicit transport a real
    /// [`HttpTransport`] configured from the environment is used.
    pub fn build(self) -> Result<ResilientClient> {
        let base_url = self.base_url.as_deref().map(parse_base_url).transpose()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::from_env()?),
        };

        let mut breaker = None;
        let mut rate_limiter = None;
        let mut pipeline = PipelineBuilder::new();
        for stage in self.stages {
            let policy: Arc<dyn Policy> = match stage {
                Stage::Retry(cfg) => Arc::new(RetryPolicy::new(cfg).with_clock(self.clock.clone())),
                Stage::RateLimiter(cfg) => {
                    let rl = Arc::new(RateLimiter::new(cfg).with_clock(self.clock.clone()));
                    rate_limiter.get_or_insert_with(|| rl.clone());
                    rl
                }
                Stage::CircuitBreaker(cfg) => {
                    let cb = Arc::new(CircuitBreaker::new(cfg).with_clock(self.clock.clone()));
                    breaker.get_or_insert_with(|| cb.clone());
                    cb
                }
                Stage::Custom(policy) => policy,
            };
            pipeline = pipeline.shared_policy(policy);
        }
        let pipeline = pipeline.shared_transport(transport).build()?;

        Ok(ResilientClient {
            name: self.name,
            base_url,
            timeout: self.timeout,
            pipeline,
            breaker,
            rate_limiter,
        })
    }
}

/// Parse and make sure the path ends with `/` so joins append instead of
/// replacing the last segment.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::configuration_with_context(
            "base_url cannot be a base",
            ErrorContext::new()
                .with_field_path("base_url")
                .with_details(raw)
                .with_source("client_builder"),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
