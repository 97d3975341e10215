use crate::transport::Transport;
use crate::types::{Outcome, Request, Response};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Responds with a fixed status code and an empty body.
///
/// `200 OK` is served from [`Response::shared_ok`]; every other status gets a
/// fresh response per call.
#[derive(Debug)]
pub struct StatusCodeTransport {
    status: StatusCode,
    calls: AtomicUsize,
}

impl StatusCodeTransport {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.status == StatusCode::OK {
            Ok(Response::shared_ok())
        } else {
            Ok(Arc::new(Response::new(self.status)))
        }
    }
}

impl Default for StatusCodeTransport {
    fn default() -> Self {
        Self::ok()
    }
}

#[async_trait]
impl Transport for StatusCodeTransport {
    async fn send(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }

    fn send_blocking(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }
}
