use crate::transport::Transport;
use crate::types::{Outcome, Request, Response};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Plays an ordered script of status codes, then `200 OK` forever.
///
/// Every response carries the same body.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Vec<StatusCode>,
    body: Bytes,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<StatusCode>) -> Self {
        Self {
            script,
            body: Bytes::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// `408 Request Timeout`, then `503 Service Unavailable`, then success.
    pub fn transient() -> Self {
        Self::new(vec![
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::SERVICE_UNAVAILABLE,
        ])
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value)?;
        Ok(self.with_body(encoded))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Outcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self.script.get(call).copied().unwrap_or(StatusCode::OK);
        Ok(Arc::new(Response::new(status).with_body(self.body.clone())))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }

    fn send_blocking(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }
}
