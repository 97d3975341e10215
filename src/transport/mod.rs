//! 传输层模块：定义发送能力接口以及基于 reqwest 的真实 HTTP 实现。
//!
//! # Transport Module
//!
//! [`Transport`] is the capability every resilience pipeline wraps. A real
//! network client ([`HttpTransport`]) and every fake in [`crate::fake`]
//! implement it, so policies never know which one sits below them.
//!
//! Both a non-blocking and a blocking form are part of the contract. Failures
//! are returned as [`Outcome`] values, never panics.

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig};

use crate::types::{Outcome, Request};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Implementations may observe `cancel`; the pipeline
    /// also races the call against it.
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Outcome;

    /// Blocking form of [`Transport::send`]. Must not be called from inside
    /// an async runtime worker.
    fn send_blocking(&self, request: &Request, cancel: &CancellationToken) -> Outcome;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Outcome {
        (**self).send(request, cancel).await
    }

    fn send_blocking(&self, request: &Request, cancel: &CancellationToken) -> Outcome {
        (**self).send_blocking(request, cancel)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Transport error: {0}")]
    Other(String),
}
