//! Circuit breaker state machine observed through a pipeline.

use reqwest::StatusCode;
use resilient_http::clock::ManualClock;
use resilient_http::fake::{FuncTransport, ScriptedTransport, StatusCodeTransport, LOCALHOST};
use resilient_http::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig,
};
use resilient_http::{CancellationToken, Error, Pipeline, PipelineBuilder, Request, Response};
use std::sync::Arc;
use std::time::Duration;

fn request() -> Request {
    Request::get(LOCALHOST.parse().unwrap())
}

fn breaker(threshold: u32, break_ms: u64, clock: &ManualClock) -> Arc<CircuitBreaker> {
    Arc::new(
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_break_duration(Duration::from_millis(break_ms)),
        )
        .with_clock(Arc::new(clock.clone())),
    )
}

fn pipeline(cb: &Arc<CircuitBreaker>, transport: Arc<dyn resilient_http::Transport>) -> Pipeline {
    PipelineBuilder::new()
        .shared_policy(cb.clone())
        .shared_transport(transport)
        .build()
        .unwrap()
}

#[tokio::test]
async fn opens_after_threshold_and_rejects_without_calling_inner() {
    for threshold in 1..4u32 {
        let clock = ManualClock::new();
        let cb = breaker(threshold, 1_000, &clock);
        let fake = Arc::new(StatusCodeTransport::new(StatusCode::INTERNAL_SERVER_ERROR));
        let p = pipeline(&cb, fake.clone());

        for _ in 0..threshold {
            let resp = p.execute(request(), CancellationToken::new()).await.unwrap();
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(cb.state(), CircuitState::Open);

        for _ in 0..5 {
            let outcome = p.execute(request(), CancellationToken::new()).await;
            assert!(matches!(outcome, Err(Error::CircuitOpen { .. })));
        }
        assert_eq!(fake.calls(), threshold as usize);
    }
}

#[tokio::test]
async fn success_in_between_resets_the_count() {
    let clock = ManualClock::new();
    let cb = breaker(2, 1_000, &clock);
    let fake = Arc::new(ScriptedTransport::new(vec![
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::OK,
        StatusCode::INTERNAL_SERVER_ERROR,
    ]));
    let p = pipeline(&cb, fake);
    for _ in 0..3 {
        let _ = p.execute(request(), CancellationToken::new()).await;
    }
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.snapshot().consecutive_failures, 1);
}

#[tokio::test]
async fn non_transient_statuses_do_not_count() {
    let clock = ManualClock::new();
    let cb = breaker(1, 1_000, &clock);
    let p = pipeline(&cb, Arc::new(StatusCodeTransport::new(StatusCode::NOT_FOUND)));
    for _ in 0..3 {
        let resp = p.execute(request(), CancellationToken::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test]
async fn successful_probe_closes() {
    let clock = ManualClock::new();
    let cb = breaker(1, 100, &clock);
    let fake = Arc::new(ScriptedTransport::new(vec![StatusCode::SERVICE_UNAVAILABLE]));
    let p = pipeline(&cb, fake.clone());

    let _ = p.execute(request(), CancellationToken::new()).await;
    assert_eq!(cb.state(), CircuitState::Open);

    clock.advance(Duration::from_millis(100));
    assert!(p
        .execute(request(), CancellationToken::new())
        .await
        .unwrap()
        .is_success());
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn failed_probe_reopens_with_fresh_timer() {
    let clock = ManualClock::new();
    let cb = breaker(1, 100, &clock);
    let fake = Arc::new(StatusCodeTransport::new(StatusCode::BAD_GATEWAY));
    let p = pipeline(&cb, fake.clone());

    let _ = p.execute(request(), CancellationToken::new()).await;
    clock.advance(Duration::from_millis(150));
    let _ = p.execute(request(), CancellationToken::new()).await;
    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(cb.snapshot().open_remaining_ms, Some(100));

    clock.advance(Duration::from_millis(99));
    assert!(matches!(
        p.execute(request(), CancellationToken::new()).await,
        Err(Error::CircuitOpen { remaining_ms: 1 })
    ));
    assert_eq!(fake.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn only_one_concurrent_probe_is_admitted() {
    let clock = ManualClock::new();
    let cb = breaker(1, 10, &clock);
    cb.on_failure(resilient_http::resilience::circuit_breaker::Admission::Normal);
    clock.advance(Duration::from_millis(10));

    let fake = Arc::new(FuncTransport::from_async(|_, _| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(Response::shared_ok())
    }));
    let p = pipeline(&cb, fake.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let p = p.clone();
            tokio::spawn(async move { p.execute(request(), CancellationToken::new()).await })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::CircuitOpen { .. }) => rejected += 1,
            Err(e) => panic!("unexpected outcome: {e}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(rejected, 7);
    assert_eq!(fake.calls(), 1);
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_probe_frees_the_slot() {
    let clock = ManualClock::new();
    let cb = breaker(1, 10, &clock);
    cb.on_failure(resilient_http::resilience::circuit_breaker::Admission::Normal);
    clock.advance(Duration::from_millis(10));

    let p = pipeline(
        &cb,
        Arc::new(FuncTransport::from_async(|_, _| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Response::shared_ok())
        })),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });
    assert!(matches!(
        p.execute(request(), cancel).await,
        Err(Error::Cancelled)
    ));
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert!(cb.allow().is_ok());
}

#[tokio::test]
async fn inner_rejection_neither_closes_nor_counts() {
    let clock = ManualClock::new();
    let cb = breaker(1, 100, &clock);
    let limiter = RateLimiter::new(
        RateLimiterConfig::new()
            .with_max_tokens(1)
            .with_refill_rate(0.0001),
    )
    .with_clock(Arc::new(clock.clone()));
    let fake = Arc::new(StatusCodeTransport::new(StatusCode::SERVICE_UNAVAILABLE));
    let p = PipelineBuilder::new()
        .shared_policy(cb.clone())
        .policy(limiter)
        .shared_transport(fake.clone())
        .build()
        .unwrap();

    let resp = p.execute(request(), CancellationToken::new()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(cb.state(), CircuitState::Open);

    // The half-open call is stopped by the limiter before the transport.
    clock.advance(Duration::from_millis(100));
    assert!(matches!(
        p.execute(request(), CancellationToken::new()).await,
        Err(Error::RateLimited { .. })
    ));
    assert_eq!(fake.calls(), 1);
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert_eq!(cb.snapshot().consecutive_failures, 1);

    // The half-open slot was released, so the next caller is admitted.
    assert!(matches!(
        cb.allow(),
        Ok(resilient_http::resilience::circuit_breaker::Admission::Probe)
    ));
}

#[tokio::test]
async fn inner_rejection_keeps_closed_failure_count() {
    let clock = ManualClock::new();
    let cb = breaker(3, 100, &clock);
    let limiter = RateLimiter::new(
        RateLimiterConfig::new()
            .with_max_tokens(2)
            .with_refill_rate(0.0001),
    )
    .with_clock(Arc::new(clock.clone()));
    let fake = Arc::new(StatusCodeTransport::new(StatusCode::BAD_GATEWAY));
    let p = PipelineBuilder::new()
        .shared_policy(cb.clone())
        .policy(limiter)
        .shared_transport(fake.clone())
        .build()
        .unwrap();

    for _ in 0..2 {
        let _ = p.execute(request(), CancellationToken::new()).await;
    }
    assert_eq!(cb.snapshot().consecutive_failures, 2);

    assert!(matches!(
        p.execute(request(), CancellationToken::new()).await,
        Err(Error::RateLimited { .. })
    ));
    assert_eq!(cb.snapshot().consecutive_failures, 2);
    assert_eq!(cb.state(), CircuitState::Closed);
}
