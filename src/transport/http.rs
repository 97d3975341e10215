use crate::transport::{Transport, TransportError};
use crate::types::{Outcome, Request, Response};
use crate::Error;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::Proxy;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: None,
        }
    }
}

impl HttpTransportConfig {
    /// Defaults overridden by `RESILIENT_HTTP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden from an arbitrary key lookup. Unparsable values
    /// keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        Self {
            timeout: number("RESILIENT_HTTP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            pool_max_idle_per_host: number("RESILIENT_HTTP_POOL_MAX_IDLE_PER_HOST")
                .map(|n| n as usize)
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: number("RESILIENT_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool_idle_timeout),
            proxy_url: lookup("RESILIENT_HTTP_PROXY_URL").filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Real network transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
    blocking: OnceCell<reqwest::blocking::Client>,
}

fn http_error(e: reqwest::Error) -> Error {
    Error::Transport(TransportError::Http(e))
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout));

        if let Some(proxy) = config.proxy_url.as_deref().and_then(|u| Proxy::all(u).ok()) {
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            config,
            blocking: OnceCell::new(),
        })
    }

    pub fn from_env() -> crate::Result<Self> {
        Self::new(HttpTransportConfig::from_env())
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn blocking_client(&self) -> crate::Result<&reqwest::blocking::Client> {
        self.blocking.get_or_try_init(|| {
            let mut builder = reqwest::blocking::Client::builder()
                .timeout(self.config.timeout)
                .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
                .pool_idle_timeout(Some(self.config.pool_idle_timeout));
            if let Some(proxy) = self
                .config
                .proxy_url
                .as_deref()
                .and_then(|u| Proxy::all(u).ok())
            {
                builder = builder.proxy(proxy);
            }
            builder
                .build()
                .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))
        })
    }

    async fn send_inner(&self, request: &Request) -> Outcome {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if !request.body_bytes().is_empty() {
            builder = builder.body(request.body_bytes().clone());
        }

        let resp = builder.send().await.map_err(http_error)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(http_error)?;

        debug!(
            http_status = status.as_u16(),
            url = request.url().as_str(),
            body_len = body.len(),
            "http transport received response"
        );

        Ok(Arc::new(
            Response::new(status).with_headers(headers).with_body(body),
        ))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Outcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = self.send_inner(request) => outcome,
        }
    }

    fn send_blocking(&self, request: &Request, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let client = self.blocking_client()?;
        let mut builder = client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if !request.body_bytes().is_empty() {
            builder = builder.body(request.body_bytes().to_vec());
        }

        let resp = builder.send().map_err(http_error)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().map_err(http_error)?;

        Ok(Arc::new(
            Response::new(status).with_headers(headers).with_body(body),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("RESILIENT_HTTP_TIMEOUT_MS", "1500"),
            ("RESILIENT_HTTP_POOL_MAX_IDLE_PER_HOST", "4"),
            ("RESILIENT_HTTP_POOL_IDLE_TIMEOUT_SECS", "soon"),
            ("RESILIENT_HTTP_PROXY_URL", "http://proxy.local:3128"),
        ]
        .into_iter()
        .collect();
        let config = HttpTransportConfig::from_lookup(|key: &str| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.pool_max_idle_per_host, 4);
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(90));
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy.local:3128"));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        // Only this test touches this variable.
        env::set_var("RESILIENT_HTTP_POOL_MAX_IDLE_PER_HOST", "7");
        let config = HttpTransportConfig::from_env();
        env::remove_var("RESILIENT_HTTP_POOL_MAX_IDLE_PER_HOST");

        assert_eq!(config.pool_max_idle_per_host, 7);
        assert!(HttpTransport::new(config).is_ok());
    }
}
