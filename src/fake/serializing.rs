use crate::transport::Transport;
use crate::types::{Outcome, Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
enum Mode {
    Respond(Arc<Response>),
    Fail,
}

/// Serves a JSON-encoded value, or fails every call in throwing mode.
///
/// The response is built once and the same instance is returned on every call.
#[derive(Debug)]
pub struct SerializingTransport {
    mode: Mode,
    calls: std::sync::atomic::AtomicUsize,
}

impl SerializingTransport {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::with_status(value, StatusCode::OK)
    }

    pub fn with_status<T: Serialize + ?Sized>(value: &T, status: StatusCode) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        let response = Response::new(status)
            .with_header("content-type", "application/json")
            .with_body(body);
        Ok(Self {
            mode: Mode::Respond(Arc::new(response)),
            calls: Default::default(),
        })
    }

    /// Fails every call with a "request failed" transport error.
    pub fn throwing() -> Self {
        Self {
            mode: Mode::Fail,
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn respond(&self) -> Outcome {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.mode {
            Mode::Respond(response) => Ok(Arc::clone(response)),
            Mode::Fail => Err(Error::request_failed("request failed")),
        }
    }
}

#[async_trait]
impl Transport for SerializingTransport {
    async fn send(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }

    fn send_blocking(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }
}
