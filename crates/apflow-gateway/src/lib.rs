// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP webhook surface for apflow.
//!
//! Receives mail change notifications (subscription handshake included),
//! turns accepted notifications into ingest triggers, limits callers per
//! minute, and serves liveness and readiness probes.

pub mod handlers;
pub mod rate_limit;
pub mod server;

pub use handlers::NOTIFICATIONS_PATH;
pub use server::{GatewayState, ServerConfig, build_router, start_server};
