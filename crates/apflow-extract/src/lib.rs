// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document field extractors.
//!
//! [`HttpExtractor`] delegates to an extraction service over HTTP.
//! [`NoopExtractor`] is used when no service is configured: vendors are then
//! resolved by sender address alone and invoices carry default fields.

pub mod http;

use apflow_config::model::ExtractionConfig;
use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::extractor::DocumentExtractor;
use apflow_core::types::{AdapterType, HealthStatus, InvoiceFields};
use apflow_core::ApflowError;
use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpExtractor;

/// Extractor that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExtractor;

#[async_trait]
impl PluginAdapter for NoopExtractor {
    fn name(&self) -> &str {
        "noop-extractor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extractor
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl DocumentExtractor for NoopExtractor {
    async fn extract_vendor_name(&self, _pdf: &[u8]) -> Result<Option<String>, ApflowError> {
        Ok(None)
    }

    async fn extract_invoice_fields(&self, _pdf: &[u8]) -> Result<InvoiceFields, ApflowError> {
        Ok(InvoiceFields::default())
    }
}

/// The configured extractor: HTTP when an endpoint is set, otherwise no-op.
pub fn from_config(config: &ExtractionConfig) -> Result<Arc<dyn DocumentExtractor>, ApflowError> {
    match &config.endpoint {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            Ok(Arc::new(HttpExtractor::from_config(endpoint, config)?))
        }
        _ => Ok(Arc::new(NoopExtractor)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_degrades_to_defaults() {
        let extractor = NoopExtractor;
        assert_eq!(extractor.extract_vendor_name(b"%PDF").await.unwrap(), None);
        let fields = extractor.extract_invoice_fields(b"%PDF").await.unwrap();
        assert_eq!(fields, InvoiceFields::default());
    }

    #[test]
    fn endpoint_selects_http() {
        let noop = from_config(&ExtractionConfig::default()).unwrap();
        assert_eq!(noop.name(), "noop-extractor");

        let config = ExtractionConfig {
            endpoint: Some("http://127.0.0.1:9/extract".to_string()),
            ..ExtractionConfig::default()
        };
        assert_eq!(from_config(&config).unwrap().name(), "http-extractor");
    }
}
