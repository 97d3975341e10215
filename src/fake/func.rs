use crate::transport::Transport;
use crate::types::{Outcome, Request, Response};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

type SyncHandler = dyn Fn(&Request, &CancellationToken) -> Outcome + Send + Sync;
type AsyncHandler = dyn Fn(Request, CancellationToken) -> BoxFuture<'static, Outcome> + Send + Sync;

enum Handler {
    Sync(Box<SyncHandler>),
    Async(Box<AsyncHandler>),
}

/// Delegates every call to a caller-supplied function.
///
/// The default handler answers `200 OK`.
pub struct FuncTransport {
    handler: Handler,
    calls: AtomicUsize,
}

impl FuncTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Request, &CancellationToken) -> Outcome + Send + Sync + 'static,
    {
        Self {
            handler: Handler::Sync(Box::new(handler)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Asynchronous handler, e.g. one that sleeps to simulate a slow server.
    ///
    /// The blocking path drives the returned future on the calling thread, so
    /// it must not depend on a tokio timer there.
    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            handler: Handler::Async(Box::new(
                move |req: Request, cancel: CancellationToken| -> BoxFuture<'static, Outcome> {
                    Box::pin(handler(req, cancel))
                },
            )),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FuncTransport {
    fn default() -> Self {
        Self::new(|_, _| Ok(Response::shared_ok()))
    }
}

impl fmt::Debug for FuncTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.handler {
            Handler::Sync(_) => "sync",
            Handler::Async(_) => "async",
        };
        f.debug_struct("FuncTransport")
            .field("handler", &kind)
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl Transport for FuncTransport {
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.handler {
            Handler::Sync(f) => f(request, cancel),
            Handler::Async(f) => f(request.clone(), cancel.clone()).await,
        }
    }

    fn send_blocking(&self, request: &Request, cancel: &CancellationToken) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.handler {
            Handler::Sync(f) => f(request, cancel),
            Handler::Async(f) => futures::executor::block_on(f(request.clone(), cancel.clone())),
        }
    }
}
