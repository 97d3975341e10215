use crate::transport::Transport;
use crate::types::{Outcome, Request, Response};
use crate::Error;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a [`FailThenSucceedTransport`] fails before it recovers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    /// Respond with this status code.
    Status(StatusCode),
    /// Return a transport error with this message.
    Error(String),
}

/// Fails the first `fail_count` calls, then answers `200 OK` forever.
///
/// With `fail_count = N`, calls `1..=N` fail and call `N + 1` and every later
/// call succeed.
#[derive(Debug)]
pub struct FailThenSucceedTransport {
    fail_count: usize,
    mode: FailureMode,
    calls: AtomicUsize,
}

impl FailThenSucceedTransport {
    /// Fails with `500 Internal Server Error`.
    pub fn new(fail_count: usize) -> Self {
        Self {
            fail_count,
            mode: FailureMode::Status(StatusCode::INTERNAL_SERVER_ERROR),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_failure_status(mut self, status: StatusCode) -> Self {
        self.mode = FailureMode::Status(status);
        self
    }

    /// Fail with a transport error instead of a status code.
    pub fn with_transport_error(mut self, message: impl Into<String>) -> Self {
        self.mode = FailureMode::Error(message.into());
        self
    }

    pub fn fail_count(&self) -> usize {
        self.fail_count
    }

    pub fn mode(&self) -> &FailureMode {
        &self.mode
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Outcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_count {
            return Ok(Arc::new(Response::new(StatusCode::OK)));
        }
        match &self.mode {
            FailureMode::Status(status) => Ok(Arc::new(Response::new(*status))),
            FailureMode::Error(message) => Err(Error::request_failed(message.clone())),
        }
    }
}

#[async_trait]
impl Transport for FailThenSucceedTransport {
    async fn send(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }

    fn send_blocking(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::get(crate::fake::LOCALHOST.parse().unwrap())
    }

    #[test]
    fn test_fails_exactly_n_times() {
        let cancel = CancellationToken::new();
        for n in 0..5 {
            let fake = FailThenSucceedTransport::new(n);
            for call in 1..=n + 3 {
                let status = fake.send_blocking(&request(), &cancel).unwrap().status();
                if call <= n {
                    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "n={n} call={call}");
                } else {
                    assert_eq!(status, StatusCode::OK, "n={n} call={call}");
                }
            }
            assert_eq!(fake.calls(), n + 3);
        }
    }

    #[tokio::test]
    async fn test_custom_failure_status() {
        let fake =
            FailThenSucceedTransport::new(1).with_failure_status(StatusCode::SERVICE_UNAVAILABLE);
        let cancel = CancellationToken::new();
        let first = fake.send(&request(), &cancel).await.unwrap();
        assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);
        let second = fake.send(&request(), &cancel).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_transport_error_mode() {
        let fake = FailThenSucceedTransport::new(2).with_transport_error("connection reset");
        let cancel = CancellationToken::new();
        for _ in 0..2 {
            let err = fake.send(&request(), &cancel).await.unwrap_err();
            assert!(err.is_transient());
            assert!(err.to_string().contains("connection reset"));
        }
        assert!(fake.send(&request(), &cancel).await.unwrap().is_success());
    }
}
