//! Resilient client entry point.
//!
//! Keep the public surface small and predictable: a client is a named
//! configuration of one pipeline bound to one transport. Implementation details
//! are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod options;
pub mod signals;

pub use builder::ClientBuilder;
pub use core::ResilientClient;
pub use options::{
    Backoff, CircuitBreakerOptions, ClientOptions, RateLimiterOptions, RetryOptions,
};
pub use signals::SignalsSnapshot;
