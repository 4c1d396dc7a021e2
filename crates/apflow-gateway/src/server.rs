// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use apflow_config::model::{ApflowConfig, GatewayConfig};
use apflow_core::ApflowError;
use apflow_pipeline::{PipelineContext, RateLimiter};
use axum::{Router, middleware as axum_middleware, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, NOTIFICATIONS_PATH};
use crate::rate_limit::rate_limit_middleware;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Pipeline context: the queue for ingest triggers, the store and
    /// breakers for readiness.
    pub ctx: Arc<PipelineContext>,
    /// Secret every change notification must carry. `None` rejects all.
    pub client_state: Option<Arc<str>>,
    /// Per-caller limiter for the webhook route. `None` disables limiting.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Identify callers by `X-Forwarded-For` rather than the peer address.
    pub trust_forwarded_for: bool,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(ctx: Arc<PipelineContext>, config: &ApflowConfig) -> Self {
        let client_state = config
            .gateway
            .client_state
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(Arc::from);
        let rate_limiter = config.rate_limit.enabled.then(|| {
            Arc::new(RateLimiter::new(
                ctx.store.clone(),
                config.rate_limit.max_requests_per_minute,
            ))
        });
        Self {
            ctx,
            client_state,
            rate_limiter,
            trust_forwarded_for: config.gateway.trust_forwarded_for,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field(
                "client_state",
                &self.client_state.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "rate_limit",
                &self.rate_limiter.as_ref().map(|l| l.max_requests()),
            )
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish_non_exhaustive()
    }
}

/// Gateway bind address.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// All gateway routes.
///
/// - GET/POST /api/mail/notifications (rate limited)
/// - GET /health
/// - GET /ready
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/ready", get(handlers::get_ready))
        .with_state(state.clone());

    let webhook_routes = Router::new()
        .route(
            NOTIFICATIONS_PATH,
            get(handlers::validate_subscription).post(handlers::receive_notifications),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the gateway until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), ApflowError> {
    if state.client_state.is_none() {
        tracing::warn!(
            "gateway.client_state is not set -- every change notification will be dropped"
        );
    }
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApflowError::Dependency {
            dependency: "gateway".to_string(),
            message: format!("failed to bind gateway to {addr}: {e}"),
            transient: false,
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .map_err(|e| ApflowError::Dependency {
        dependency: "gateway".to_string(),
        message: format!("gateway server error: {e}"),
        transient: false,
        source: Some(Box::new(e)),
    })?;

    tracing::info!("Gateway server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_from_gateway_config() {
        let config = ServerConfig::from(&GatewayConfig::default());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
    }
}
