use crate::resilience::circuit_breaker::CircuitBreakerSnapshot;
use crate::resilience::rate_limiter::RateLimiterSnapshot;

/// A lightweight snapshot of runtime "signals" for the policies a client owns.
///
/// This is intentionally *facts only* (no policy). Applications can build
/// routing or shedding decisions on top of these signals.
#[derive(Debug, Clone, Default)]
pub struct SignalsSnapshot {
    pub rate_limiter: Option<RateLimiterSnapshot>,
    pub circuit_breaker: Option<CircuitBreakerSnapshot>,
}
