// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-caller rate limiting for the webhook route.
//!
//! Callers are keyed by peer address. `X-Forwarded-For` is client-controlled,
//! so it is only consulted when `gateway.trust_forwarded_for` says a reverse
//! proxy sets it.

use std::net::SocketAddr;

use apflow_pipeline::RateDecision;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::server::GatewayState;

/// Body of a 429 response.
#[derive(Debug, Serialize)]
pub struct RateLimitedResponse {
    pub error: &'static str,
    pub limit: String,
    pub retry_after_secs: u64,
}

/// Reject callers over their per-minute budget with 429 and `Retry-After`.
pub async fn rate_limit_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    let identity = client_identity(&request, state.trust_forwarded_for);
    match limiter.check(&identity, chrono::Utc::now()).await {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after_secs } => {
            tracing::warn!(identity = %identity, retry_after_secs, "webhook caller rate limited");
            too_many_requests(limiter.max_requests(), retry_after_secs)
        }
    }
}

/// Peer address, or the first `X-Forwarded-For` hop when the proxy is trusted.
pub fn client_identity(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for
        && let Some(ip) = forwarded_for(request)
    {
        return ip.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn forwarded_for(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn too_many_requests(limit: u32, retry_after_secs: u64) -> Response {
    let body = RateLimitedResponse {
        error: "rate_limit_exceeded",
        limit: format!("{limit} requests per minute"),
        retry_after_secs,
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn from_peer(forwarded: &str) -> Request {
        let mut request = Request::builder()
            .header("x-forwarded-for", forwarded)
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[test]
    fn identity_ignores_forwarded_for_by_default() {
        let request = from_peer("203.0.113.9");
        assert_eq!(client_identity(&request, false), "192.0.2.10");
    }

    #[test]
    fn trusted_proxy_uses_first_forwarded_hop() {
        let request = from_peer(" 203.0.113.9 , 10.0.0.1");
        assert_eq!(client_identity(&request, true), "203.0.113.9");
        assert_eq!(client_identity(&from_peer(" "), true), "192.0.2.10");
    }

    #[test]
    fn identity_without_peer_is_empty() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identity(&request, false), "");
    }

    #[test]
    fn rejection_carries_retry_after() {
        let response = too_many_requests(60, 17);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "17");
    }
}
