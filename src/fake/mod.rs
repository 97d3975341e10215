//! 伪传输模块：可编程的假传输层，用于确定性地模拟服务端响应与故障。
//!
//! # Fake Transports
//!
//! Programmable [`Transport`](crate::transport::Transport) implementations that
//! stand in for a network call. Each one is selected at construction time and
//! keeps its own call counter, so two tests never share state unless they
//! share the instance.
//!
//! | Fake | Behavior |
//! |------|----------|
//! | [`StatusCodeTransport`] | always the configured status (`200 OK` is a shared cached response) |
//! | [`FailThenSucceedTransport`] | first `N` calls fail (status or transport error), then `200 OK` |
//! | [`ScriptedTransport`] | ordered status script, then `200 OK`, each carrying a body |
//! | [`ThrowingTransport`] | every call fails with a transport error |
//! | [`FuncTransport`] | delegates to a caller-supplied function (sync or async) |
//! | [`SerializingTransport`] | JSON-encodes a value into the body, or fails every call |
//!
//! ## Example
//!
//! ```rust
//! use resilient_http::fake::FailThenSucceedTransport;
//! use resilient_http::transport::Transport;
//! use resilient_http::types::Request;
//! use tokio_util::sync::CancellationToken;
//!
//! let fake = FailThenSucceedTransport::new(1);
//! let req = Request::get(resilient_http::fake::LOCALHOST.parse().unwrap());
//! let cancel = CancellationToken::new();
//!
//! assert_eq!(fake.send_blocking(&req, &cancel).unwrap().status(), 500);
//! assert_eq!(fake.send_blocking(&req, &cancel).unwrap().status(), 200);
//! assert_eq!(fake.calls(), 2);
//! ```

pub mod fail_then_succeed;
pub mod func;
pub mod scripted;
pub mod serializing;
pub mod status;
pub mod throwing;

pub use fail_then_succeed::{FailThenSucceedTransport, FailureMode};
pub use func::FuncTransport;
pub use scripted::ScriptedTransport;
pub use serializing::SerializingTransport;
pub use status::StatusCodeTransport;
pub use throwing::ThrowingTransport;

/// Base address fake-backed clients are usually bound to.
pub const LOCALHOST: &str = "https://localhost";
