//! Behavior of the programmable fake transports through both send paths.

use reqwest::StatusCode;
use resilient_http::fake::{
    FailThenSucceedTransport, FuncTransport, ScriptedTransport, SerializingTransport,
    StatusCodeTransport, ThrowingTransport, LOCALHOST,
};
use resilient_http::transport::Transport;
use resilient_http::{CancellationToken, Error, Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn request() -> Request {
    Request::get(format!("{}/resource", LOCALHOST).parse().unwrap())
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct User {
    id: u32,
    name: String,
}

#[tokio::test]
async fn fail_then_succeed_for_every_fail_count() {
    let cancel = CancellationToken::new();
    for n in 0..6usize {
        let fake = FailThenSucceedTransport::new(n);
        for call in 1..=n + 3 {
            let status = fake.send(&request(), &cancel).await.unwrap().status();
            if call <= n {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "n={n} call={call}");
            } else {
                assert_eq!(status, StatusCode::OK, "n={n} call={call}");
            }
        }
        assert_eq!(fake.calls(), n + 3);
    }
}

#[test]
fn fail_then_succeed_custom_status_blocking() {
    let fake = FailThenSucceedTransport::new(2).with_failure_status(StatusCode::BAD_GATEWAY);
    let cancel = CancellationToken::new();
    let statuses: Vec<_> = (0..4)
        .map(|_| fake.send_blocking(&request(), &cancel).unwrap().status())
        .collect();
    assert_eq!(
        statuses,
        vec![
            StatusCode::BAD_GATEWAY,
            StatusCode::BAD_GATEWAY,
            StatusCode::OK,
            StatusCode::OK
        ]
    );
}

#[tokio::test]
async fn fail_then_succeed_transport_error_mode() {
    let fake = FailThenSucceedTransport::new(1).with_transport_error("connection reset");
    let cancel = CancellationToken::new();
    let err = fake.send(&request(), &cancel).await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("connection reset"));
    assert!(fake.send(&request(), &cancel).await.unwrap().is_success());
}

#[tokio::test]
async fn fixed_status_ok_is_shared() {
    let fake = StatusCodeTransport::default();
    let cancel = CancellationToken::new();
    let a = fake.send(&request(), &cancel).await.unwrap();
    let b = fake.send_blocking(&request(), &cancel).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &Response::shared_ok()));
}

#[tokio::test]
async fn scripted_transient_preset() {
    let fake = ScriptedTransport::transient().with_body("payload");
    let cancel = CancellationToken::new();
    let mut statuses = Vec::new();
    for _ in 0..3 {
        let resp = fake.send(&request(), &cancel).await.unwrap();
        assert_eq!(resp.text(), "payload");
        statuses.push(resp.status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::OK
        ]
    );
}

#[tokio::test]
async fn throwing_fails_on_both_paths() {
    let fake = ThrowingTransport::default();
    let cancel = CancellationToken::new();
    assert!(matches!(
        fake.send(&request(), &cancel).await,
        Err(Error::Transport(_))
    ));
    assert!(matches!(
        fake.send_blocking(&request(), &cancel),
        Err(Error::Transport(_))
    ));
    assert_eq!(fake.calls(), 2);

    let custom = ThrowingTransport::with_error(|| Error::Timeout { timeout_ms: 5 });
    assert!(matches!(
        custom.send(&request(), &cancel).await,
        Err(Error::Timeout { timeout_ms: 5 })
    ));
}

#[tokio::test]
async fn func_transport_sees_request_and_cancellation() {
    let fake = FuncTransport::new(|req, cancel| {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let status = if req.url().path() == "/resource" {
            StatusCode::ACCEPTED
        } else {
            StatusCode::NOT_FOUND
        };
        Ok(Arc::new(Response::new(status)))
    });

    let cancel = CancellationToken::new();
    assert_eq!(
        fake.send(&request(), &cancel).await.unwrap().status(),
        StatusCode::ACCEPTED
    );
    cancel.cancel();
    assert!(matches!(
        fake.send_blocking(&request(), &cancel),
        Err(Error::Cancelled)
    ));
    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn func_transport_default_is_ok() {
    let fake = FuncTransport::default();
    let resp = fake
        .send(&request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn serializing_round_trips_value() {
    let user = User {
        id: 7,
        name: "ada".into(),
    };
    let fake = SerializingTransport::with_status(&user, StatusCode::CREATED).unwrap();
    let resp = fake
        .send(&request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(resp.json::<User>().unwrap(), user);
}

#[test]
fn serializing_throwing_mode_blocking() {
    let fake = SerializingTransport::throwing();
    assert!(matches!(
        fake.send_blocking(&request(), &CancellationToken::new()),
        Err(Error::Transport(_))
    ));
}
