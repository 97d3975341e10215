//! 类型系统模块：定义请求、响应以及每次发送尝试的结果类型。
//!
//! # Types Module
//!
//! This module defines the values that flow through the resilience pipeline.
//! Policies treat [`Request`] as opaque and evaluate success or failure on the
//! [`Outcome`] returned by the stage below them.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Request`] | Method, target URL, headers and body of one HTTP call |
//! | [`Response`] | Status code, headers and body; immutable once built |
//! | [`Outcome`] | Success (`Arc<Response>`) or failure ([`crate::Error`]) of one attempt |
//!
//! ## Example
//!
//! ```rust
//! use resilient_http::types::{Request, Response};
//! use reqwest::StatusCode;
//!
//! let request = Request::get("https://localhost/health".parse().unwrap())
//!     .header("x-trace", "abc");
//! assert_eq!(request.method().as_str(), "GET");
//!
//! let response = Response::new(StatusCode::SERVICE_UNAVAILABLE);
//! assert!(!response.is_success());
//! ```

pub mod request;
pub mod response;

pub use request::Request;
pub use response::Response;

use std::sync::Arc;

/// Result of one send attempt, passed from each stage to the one above it.
pub type Outcome = std::result::Result<Arc<Response>, crate::Error>;

/// Status code of a successful outcome, if any.
pub fn outcome_status(outcome: &Outcome) -> Option<reqwest::StatusCode> {
    outcome.as_ref().ok().map(|r| r.status())
}
