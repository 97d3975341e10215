use crate::transport::Transport;
use crate::types::{Outcome, Request};
use crate::Error;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

type ErrorFactory = dyn Fn() -> Error + Send + Sync;

/// Fails every call, on both the async and the blocking path.
pub struct ThrowingTransport {
    make_error: Box<ErrorFactory>,
    calls: AtomicUsize,
}

impl ThrowingTransport {
    /// Fails with a generic "request failed" transport error.
    pub fn new() -> Self {
        Self::with_error(|| Error::request_failed("request failed"))
    }

    pub fn with_error<F>(make_error: F) -> Self
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        Self {
            make_error: Box::new(make_error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.make_error)())
    }
}

impl Default for ThrowingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThrowingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrowingTransport")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ThrowingTransport {
    async fn send(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }

    fn send_blocking(&self, _request: &Request, _cancel: &CancellationToken) -> Outcome {
        self.respond()
    }
}
