// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway routes driven through `tower::ServiceExt::oneshot`.

use std::net::SocketAddr;
use std::time::Duration;

use apflow_core::{Envelope, IngestTrigger, MessageQueue};
use apflow_gateway::{GatewayState, NOTIFICATIONS_PATH, build_router};
use apflow_test_utils::TestHarness;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

const SECRET: &str = "subscription-secret";

async fn harness(max_per_minute: u32) -> TestHarness {
    TestHarness::builder()
        .with_config(move |c| {
            c.gateway.client_state = Some(SECRET.to_string());
            c.rate_limit.enabled = true;
            c.rate_limit.max_requests_per_minute = max_per_minute;
        })
        .build()
        .await
        .unwrap()
}

fn router(harness: &TestHarness) -> Router {
    build_router(GatewayState::new(harness.ctx.clone(), &harness.config))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn notification(client_state: &str) -> Request<Body> {
    let body = serde_json::json!({
        "value": [{
            "clientState": client_state,
            "resource": "users/invoices/messages/AAMk1",
            "changeType": "created"
        }]
    });
    Request::post(NOTIFICATIONS_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn notification_via(peer: &str, forwarded_for: &str) -> Request<Body> {
    let mut request = notification(SECRET);
    request
        .headers_mut()
        .insert("x-forwarded-for", forwarded_for.parse().unwrap());
    let peer: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

async fn pending_trigger(harness: &TestHarness) -> Option<IngestTrigger> {
    harness
        .storage
        .dequeue(IngestTrigger::QUEUE, Duration::from_secs(30))
        .await
        .unwrap()
        .map(|entry| IngestTrigger::from_json(&entry.payload).unwrap())
}

#[tokio::test]
async fn handshake_echoes_decoded_token_as_plain_text() {
    let harness = harness(60).await;
    let response = router(&harness)
        .oneshot(
            Request::get(format!("{NOTIFICATIONS_PATH}?validationToken=Validation%3A%20abc"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"Validation: abc");
}

#[tokio::test]
async fn handshake_without_token_is_rejected() {
    let harness = harness(60).await;
    let response = router(&harness)
        .oneshot(Request::get(NOTIFICATIONS_PATH).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_handshake_variant_is_echoed() {
    let harness = harness(60).await;
    let response = router(&harness)
        .oneshot(
            Request::post(format!("{NOTIFICATIONS_PATH}?validationToken=tok"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(pending_trigger(&harness).await.is_none());
}

#[tokio::test]
async fn matching_client_state_queues_an_ingest_trigger() {
    let harness = harness(60).await;
    let response = router(&harness).oneshot(notification(SECRET)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["triggered"], true);

    let trigger = pending_trigger(&harness).await.unwrap();
    assert_eq!(trigger.source, "webhook");
    assert_eq!(
        trigger.resource.as_deref(),
        Some("users/invoices/messages/AAMk1")
    );
}

#[tokio::test]
async fn mismatched_client_state_is_dropped() {
    let harness = harness(60).await;
    let response = router(&harness)
        .oneshot(notification("guessed-secret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["rejected"], 1);
    assert_eq!(body["triggered"], false);
    assert!(pending_trigger(&harness).await.is_none());
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let harness = harness(60).await;
    let response = router(&harness)
        .oneshot(
            Request::post(NOTIFICATIONS_PATH)
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callers_over_the_limit_get_429() {
    let harness = harness(2).await;
    let app = router(&harness);

    for _ in 0..2 {
        let response = app.clone().oneshot(notification(SECRET)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = app.clone().oneshot(notification(SECRET)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let body = body_json(response).await;
    assert_eq!(body["error"], "rate_limit_exceeded");
    assert_eq!(body["limit"], "2 requests per minute");
    assert_eq!(body["retry_after_secs"], retry_after);

    // Probes are never limited.
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_the_limit() {
    let harness = harness(2).await;
    let app = router(&harness);

    let mut statuses = Vec::new();
    for i in 0..4 {
        let request = notification_via("192.0.2.10:40000", &format!("203.0.113.{i}"));
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::ACCEPTED,
            StatusCode::ACCEPTED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );

    // A different peer has its own budget.
    let response = app
        .oneshot(notification_via("192.0.2.11:40000", "203.0.113.0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn trusted_proxy_limits_each_forwarded_client() {
    let harness = TestHarness::builder()
        .with_config(|c| {
            c.gateway.client_state = Some(SECRET.to_string());
            c.gateway.trust_forwarded_for = true;
            c.rate_limit.enabled = true;
            c.rate_limit.max_requests_per_minute = 1;
        })
        .build()
        .await
        .unwrap();
    let app = router(&harness);
    let proxy = "10.0.0.2:8443";

    let first = app.clone().oneshot(notification_via(proxy, "203.0.113.1")).await.unwrap();
    let other = app.clone().oneshot(notification_via(proxy, "203.0.113.2")).await.unwrap();
    let again = app.oneshot(notification_via(proxy, "203.0.113.1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(other.status(), StatusCode::ACCEPTED);
    assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn ready_reports_store_and_breakers() {
    let harness = harness(60).await;
    let response = router(&harness)
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["store"]["status"], "healthy");
    let breakers = body["breakers"].as_array().unwrap();
    assert_eq!(breakers.len(), 3);
    assert!(breakers.iter().all(|b| b["state"] == "closed"));
}

#[tokio::test]
async fn ready_fails_when_the_store_is_down() {
    let harness = TestHarness::builder()
        .with_failing_store()
        .build()
        .await
        .unwrap();
    harness.failing_store.as_ref().unwrap().set_fail_all(true);

    let response = router(&harness)
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "not_ready");
}
