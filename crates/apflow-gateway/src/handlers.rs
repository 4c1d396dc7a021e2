// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.
//!
//! The notification endpoint follows the mail provider's subscription
//! contract: a `validationToken` query is echoed back as plain text, and
//! change notifications are acknowledged with 202 once an ingest trigger
//! is queued. Notifications never carry mail content; ingest fetches it.

use apflow_core::{HealthStatus, IngestTrigger};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::server::GatewayState;

/// Route of the mail change-notification webhook.
pub const NOTIFICATIONS_PATH: &str = "/api/mail/notifications";

#[derive(Debug, Deserialize)]
pub struct ValidationQuery {
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

/// Body of a change-notification POST.
#[derive(Debug, Deserialize)]
pub struct ChangeNotificationBatch {
    #[serde(default)]
    pub value: Vec<ChangeNotification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    #[serde(default)]
    pub client_state: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub change_type: Option<String>,
}

/// Response body for an accepted notification batch.
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub triggered: bool,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn echo_token(token: String) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "text/plain")], token).into_response()
}

/// GET /api/mail/notifications
///
/// Subscription validation handshake.
pub async fn validate_subscription(Query(query): Query<ValidationQuery>) -> Response {
    match query.validation_token {
        Some(token) => echo_token(token),
        None => error_response(StatusCode::BAD_REQUEST, "missing validationToken"),
    }
}

/// POST /api/mail/notifications
pub async fn receive_notifications(
    State(state): State<GatewayState>,
    Query(query): Query<ValidationQuery>,
    body: Bytes,
) -> Response {
    // Some providers validate with a POST.
    if let Some(token) = query.validation_token {
        return echo_token(token);
    }

    let batch: ChangeNotificationBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "malformed change notification body");
            return error_response(StatusCode::BAD_REQUEST, "malformed notification body");
        }
    };

    let expected = state.client_state.as_deref();
    let (accepted, rejected): (Vec<_>, Vec<_>) = batch
        .value
        .into_iter()
        .partition(|event| client_state_matches(expected, event.client_state.as_deref()));

    for event in &rejected {
        warn!(
            resource = event.resource.as_deref().unwrap_or("-"),
            change_type = event.change_type.as_deref().unwrap_or("-"),
            "dropping change notification with mismatched clientState"
        );
    }
    metrics::counter!("apflow_webhook_events_total", "result" => "accepted")
        .increment(accepted.len() as u64);
    metrics::counter!("apflow_webhook_events_total", "result" => "rejected")
        .increment(rejected.len() as u64);

    let mut response = NotificationResponse {
        accepted: accepted.len(),
        rejected: rejected.len(),
        triggered: false,
    };
    if accepted.is_empty() {
        return (StatusCode::ACCEPTED, Json(response)).into_response();
    }

    let resource = accepted.iter().find_map(|e| e.resource.clone());
    let trigger = IngestTrigger::new("webhook", resource);
    if let Err(e) = state.ctx.emit(&trigger).await {
        warn!(error = %e, "could not queue ingest trigger");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "queue unavailable");
    }
    info!(accepted = accepted.len(), "ingest triggered by change notification");

    response.triggered = true;
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

/// Constant-time comparison of the configured and presented `clientState`.
/// Nothing matches when no secret is configured.
pub fn client_state_matches(expected: Option<&str>, presented: Option<&str>) -> bool {
    match (expected, presented) {
        (Some(expected), Some(presented)) => {
            expected.as_bytes().ct_eq(presented.as_bytes()).into()
        }
        _ => false,
    }
}

/// GET /health
///
/// Liveness probe.
pub async fn get_health(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "apflow",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /ready
///
/// Readiness probe: the entity store must be reachable. Breaker states are
/// reported but an open breaker does not make the service unready.
pub async fn get_ready(State(state): State<GatewayState>) -> Response {
    let (store_status, detail) = match state.ctx.store.health_check().await {
        Ok(HealthStatus::Healthy) => ("healthy", None),
        Ok(HealthStatus::Degraded(reason)) => ("degraded", Some(reason)),
        Ok(HealthStatus::Unhealthy(reason)) => ("unhealthy", Some(reason)),
        Err(e) => ("unhealthy", Some(e.to_string())),
    };
    let ready = store_status != "unhealthy";

    let breakers: Vec<serde_json::Value> = state
        .ctx
        .breakers
        .snapshots()
        .into_iter()
        .map(|s| {
            json!({
                "name": s.name,
                "state": s.state.to_string(),
                "consecutive_failures": s.consecutive_failures,
            })
        })
        .collect();

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "store": { "status": store_status, "detail": detail },
        "breakers": breakers,
    });
    (status, Json(body)).into_response()
}
