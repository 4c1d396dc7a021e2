// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat notifiers.
//!
//! [`WebhookNotifier`] posts to an incoming-webhook URL. Without one,
//! [`LogNotifier`] writes notifications to the log instead.

pub mod webhook;

use std::sync::Arc;

use apflow_config::model::ChatConfig;
use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::notifier::Notifier;
use apflow_core::types::{AdapterType, HealthStatus};
use apflow_core::{ApflowError, NotificationMessage};
use async_trait::async_trait;
use tracing::info;

pub use webhook::WebhookNotifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PluginAdapter for LogNotifier {
    fn name(&self) -> &str {
        "log-notifier"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), ApflowError> {
        info!(
            kind = %message.kind,
            details = ?message.details,
            "{}",
            message.message
        );
        Ok(())
    }
}

/// The configured notifier: webhook when a URL is set, otherwise the log.
pub fn from_config(config: &ChatConfig) -> Result<Arc<dyn Notifier>, ApflowError> {
    match &config.webhook_url {
        Some(url) if !url.trim().is_empty() => {
            Ok(Arc::new(WebhookNotifier::from_config(url, config)?))
        }
        _ => Ok(Arc::new(LogNotifier)),
    }
}
