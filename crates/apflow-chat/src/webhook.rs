// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incoming-webhook notifier.

use std::collections::BTreeMap;
use std::time::Duration;

use apflow_config::model::ChatConfig;
use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::notifier::Notifier;
use apflow_core::types::{AdapterType, HealthStatus};
use apflow_core::{ApflowError, NotificationKind, NotificationMessage};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

const DEPENDENCY: &str = "chat";

/// Body posted to the webhook.
#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    text: String,
    #[serde(rename = "type")]
    kind: NotificationKind,
    details: &'a BTreeMap<String, String>,
}

impl<'a> ChatPayload<'a> {
    fn from_message(message: &'a NotificationMessage) -> Self {
        Self {
            text: format!("{} {}", marker(message.kind), message.message),
            kind: message.kind,
            details: &message.details,
        }
    }
}

fn marker(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Success => "[processed]",
        NotificationKind::Unknown => "[needs review]",
        NotificationKind::Error => "[error]",
        NotificationKind::Duplicate => "[duplicate]",
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl std::fmt::Debug for WebhookNotifier {
    // Webhook URLs embed their credential.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &"[REDACTED]")
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ApflowError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApflowError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(url: &str, config: &ChatConfig) -> Result<Self, ApflowError> {
        Self::new(url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl PluginAdapter for WebhookNotifier {
    fn name(&self) -> &str {
        "chat-webhook"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        // Posting would deliver a message; there is no cheaper health check.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), ApflowError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ChatPayload::from_message(message))
            .send()
            .await
            .map_err(|e| ApflowError::Dependency {
                dependency: DEPENDENCY.to_string(),
                message: format!("webhook request failed: {e}"),
                transient: true,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(kind = %message.kind, "notification delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let text = format!("webhook returned {status}: {body}");
        if status.as_u16() == 429 || status.is_server_error() {
            Err(ApflowError::transient(DEPENDENCY, text))
        } else {
            Err(ApflowError::permanent(DEPENDENCY, text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> WebhookNotifier {
        WebhookNotifier::new(format!("{}/hooks/ap", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_text_type_and_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/ap"))
            .and(body_json(serde_json::json!({
                "text": "[processed] Invoice from Adobe Inc forwarded to AP",
                "type": "success",
                "details": {"gl_code": "6100", "vendor": "Adobe Inc"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let message = NotificationMessage::new(
            NotificationKind::Success,
            "Invoice from Adobe Inc forwarded to AP",
        )
        .with_detail("vendor", "Adobe Inc")
        .with_detail("gl_code", "6100");
        notifier(&server).notify(&message).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_posts_are_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_such_hook"))
            .mount(&server)
            .await;

        let message = NotificationMessage::new(NotificationKind::Error, "boom");
        let err = notifier(&server).notify(&message).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("no_such_hook"), "got: {err}");
    }

    #[tokio::test]
    async fn throttled_posts_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let message = NotificationMessage::new(NotificationKind::Duplicate, "dup");
        assert!(notifier(&server).notify(&message).await.unwrap_err().is_transient());
    }

    #[test]
    fn debug_hides_url() {
        let url = "https://chat.example.com/hooks/T0/B0/secret";
        let n = WebhookNotifier::new(url, Duration::from_secs(1)).unwrap();
        assert!(!format!("{n:?}").contains("secret"));
    }
}
