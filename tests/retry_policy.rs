//! Retry policy contract, driven through a pipeline over fake transports.

use reqwest::StatusCode;
use resilient_http::clock::{Clock, ManualClock};
use resilient_http::fake::{
    FailThenSucceedTransport, ScriptedTransport, ThrowingTransport, LOCALHOST,
};
use resilient_http::resilience::{handle_unsuccessful, Policy, RetryConfig, RetryPolicy};
use resilient_http::{CancellationToken, Error, PipelineBuilder, Request};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn request() -> Request {
    Request::get(LOCALHOST.parse().unwrap())
}

#[tokio::test]
async fn recovers_when_failures_fit_in_retry_budget() {
    for max in 0..4u32 {
        for fails in 0..=max as usize {
            let fake = Arc::new(FailThenSucceedTransport::new(fails));
            let pipeline = PipelineBuilder::new()
                .policy(RetryPolicy::new(RetryConfig::new().with_max_retries(max)))
                .shared_transport(fake.clone())
                .build()
                .unwrap();
            let resp = pipeline
                .execute(request(), CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "max={max} fails={fails}");
            assert_eq!(fake.calls(), fails + 1);
        }
    }
}

#[tokio::test]
async fn returns_last_failure_when_budget_is_one_short() {
    for max in 0..4u32 {
        let fake = Arc::new(FailThenSucceedTransport::new(max as usize + 1));
        let retried = Arc::new(AtomicU32::new(0));
        let seen = retried.clone();
        let pipeline = PipelineBuilder::new()
            .policy(RetryPolicy::new(
                RetryConfig::new()
                    .with_max_retries(max)
                    .retry_if(handle_unsuccessful)
                    .on_retry(move |_, _| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
            ))
            .shared_transport(fake.clone())
            .build()
            .unwrap();

        let resp = pipeline
            .execute(request(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fake.calls(), max as usize + 1);
        assert_eq!(retried.load(Ordering::SeqCst), max);
    }
}

#[tokio::test]
async fn exhausted_failure_has_same_shape_as_unretried() {
    let never = PipelineBuilder::new()
        .transport(ThrowingTransport::new())
        .build()
        .unwrap();
    let retried = PipelineBuilder::new()
        .policy(RetryPolicy::new(RetryConfig::new().with_max_retries(3)))
        .transport(ThrowingTransport::new())
        .build()
        .unwrap();

    let a = never.execute(request(), CancellationToken::new()).await;
    let b = retried.execute(request(), CancellationToken::new()).await;
    assert_eq!(a.unwrap_err().to_string(), b.unwrap_err().to_string());
}

#[tokio::test]
async fn non_matching_outcome_is_returned_without_retry() {
    let fake = Arc::new(ScriptedTransport::new(vec![StatusCode::NOT_FOUND]));
    let pipeline = PipelineBuilder::new()
        .policy(RetryPolicy::new(RetryConfig::new().with_max_retries(5)))
        .shared_transport(fake.clone())
        .build()
        .unwrap();
    let resp = pipeline
        .execute(request(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn delay_receives_retry_numbers_and_uses_clock() {
    let clock = ManualClock::new();
    let start = clock.now();
    let asked = Arc::new(Mutex::new(Vec::new()));
    let sink = asked.clone();
    let policy = RetryPolicy::new(
        RetryConfig::new()
            .with_max_retries(3)
            .with_delay(move |retry| {
                sink.lock().unwrap().push(retry);
                Duration::from_millis(100 * retry as u64)
            }),
    )
    .with_clock(Arc::new(clock.clone()));

    let fake = Arc::new(ScriptedTransport::transient());
    let pipeline = PipelineBuilder::new()
        .policy(policy)
        .shared_transport(fake.clone())
        .build()
        .unwrap();
    assert!(pipeline
        .execute(request(), CancellationToken::new())
        .await
        .unwrap()
        .is_success());

    assert_eq!(*asked.lock().unwrap(), vec![1, 2]);
    assert_eq!(clock.now() - start, Duration::from_millis(300));
    assert_eq!(fake.calls(), 3);
}

#[tokio::test]
async fn zero_delay_does_not_suspend() {
    let policy = RetryPolicy::new(
        RetryConfig::new()
            .with_max_retries(2)
            .with_delay(|_| Duration::ZERO),
    );
    assert_eq!(policy.name(), "retry");
    let fake = Arc::new(FailThenSucceedTransport::new(2));
    let pipeline = PipelineBuilder::new()
        .policy(policy)
        .shared_transport(fake.clone())
        .build()
        .unwrap();
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        pipeline.execute(request(), CancellationToken::new()),
    )
    .await
    .expect("zero delays must not wait");
    assert!(outcome.unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn cancelling_retry_delay_stops_further_attempts() {
    let fake = Arc::new(FailThenSucceedTransport::new(10));
    let pipeline = PipelineBuilder::new()
        .policy(RetryPolicy::new(
            RetryConfig::new()
                .with_max_retries(5)
                .with_constant_delay(Duration::from_secs(30)),
        ))
        .shared_transport(fake.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let outcome = pipeline.execute(request(), cancel).await;
    assert!(matches!(outcome, Err(Error::Cancelled)));
    assert_eq!(fake.calls(), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(fake.calls(), 1);
}
