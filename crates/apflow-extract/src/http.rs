// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for an invoice extraction service.
//!
//! The service receives the raw PDF (`Content-Type: application/pdf`) and
//! answers with the fields it could read:
//!
//! ```json
//! {"vendor_name": "Adobe Inc", "confidence": 0.93, "amount": 1250.0,
//!  "currency": "USD", "due_date": "2026-11-30", "payment_terms": "Net 30"}
//! ```
//!
//! Every field is optional. A vendor name below [`MIN_CONFIDENCE`] is treated
//! as absent so that resolution falls back to the sender address.

use std::time::Duration;

use apflow_config::model::ExtractionConfig;
use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::extractor::DocumentExtractor;
use apflow_core::types::{AdapterType, HealthStatus, InvoiceFields};
use apflow_core::ApflowError;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

/// Vendor names reported with lower confidence are ignored.
pub const MIN_CONFIDENCE: f64 = 0.5;

const DEPENDENCY: &str = "extraction";

#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    vendor_name: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    payment_terms: Option<String>,
}

impl ExtractionResponse {
    fn vendor_name(&self) -> Option<String> {
        if self.confidence.is_some_and(|c| c < MIN_CONFIDENCE) {
            return None;
        }
        self.vendor_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }

    fn into_fields(self) -> InvoiceFields {
        let defaults = InvoiceFields::default();
        InvoiceFields {
            amount: self.amount,
            currency: non_empty(self.currency).unwrap_or(defaults.currency),
            due_date: non_empty(self.due_date),
            payment_terms: non_empty(self.payment_terms).unwrap_or(defaults.payment_terms),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpExtractor {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApflowError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApflowError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(endpoint: &str, config: &ExtractionConfig) -> Result<Self, ApflowError> {
        Self::new(
            endpoint,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn extract(&self, pdf: &[u8]) -> Result<ExtractionResponse, ApflowError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/pdf")
            .body(pdf.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| request_error(e, "request failed"))?;
        let status = response.status();
        debug!(status = %status, bytes = pdf.len(), "extraction response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("extraction service returned {status}: {body}");
            return Err(if is_transient_status(status) {
                ApflowError::transient(DEPENDENCY, message)
            } else {
                ApflowError::permanent(DEPENDENCY, message)
            });
        }

        response
            .json::<ExtractionResponse>()
            .await
            .map_err(|e| ApflowError::Dependency {
                dependency: DEPENDENCY.to_string(),
                message: format!("unreadable extraction response: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn request_error(e: reqwest::Error, context: &str) -> ApflowError {
    ApflowError::Dependency {
        dependency: DEPENDENCY.to_string(),
        message: format!("{context}: {e}"),
        transient: true,
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl PluginAdapter for HttpExtractor {
    fn name(&self) -> &str {
        "http-extractor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extractor
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        // Any HTTP answer means the service is reachable.
        match self.client.head(&self.endpoint).send().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(format!(
                "extraction service unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    async fn extract_vendor_name(&self, pdf: &[u8]) -> Result<Option<String>, ApflowError> {
        Ok(self.extract(pdf).await?.vendor_name())
    }

    async fn extract_invoice_fields(&self, pdf: &[u8]) -> Result<InvoiceFields, ApflowError> {
        Ok(self.extract(pdf).await?.into_fields())
    }
}
