// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat notifier that captures every notification.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::notifier::Notifier;
use apflow_core::types::{AdapterType, HealthStatus};
use apflow_core::{ApflowError, NotificationKind, NotificationMessage};

pub struct MockNotifier {
    delivered: Mutex<Vec<NotificationMessage>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn delivered(&self) -> Vec<NotificationMessage> {
        self.delivered.lock().await.clone()
    }

    /// Delivered notifications of one kind.
    pub async fn delivered_of(&self, kind: NotificationKind) -> Vec<NotificationMessage> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockNotifier {
    fn name(&self) -> &str {
        "mock-notifier"
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
impl Notifier for MockNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), ApflowError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApflowError::transient("chat", "mock webhook unavailable"));
        }
        self.delivered.lock().await.push(message.clone());
        Ok(())
    }
}
