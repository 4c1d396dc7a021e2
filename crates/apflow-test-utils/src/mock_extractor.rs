// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock document extractor with scripted answers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::extractor::DocumentExtractor;
use apflow_core::types::{AdapterType, HealthStatus, InvoiceFields};
use apflow_core::ApflowError;

/// Returns a vendor name per PDF (by exact bytes), falling back to a
/// default, and the same invoice fields for every document.
pub struct MockExtractor {
    default_vendor: Mutex<Option<String>>,
    vendors: Mutex<HashMap<Vec<u8>, String>>,
    fields: Mutex<InvoiceFields>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockExtractor {
    /// An extractor that finds no vendor name and default fields.
    pub fn new() -> Self {
        Self {
            default_vendor: Mutex::new(None),
            vendors: Mutex::new(HashMap::new()),
            fields: Mutex::new(InvoiceFields::default()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_default_vendor(&self, name: Option<&str>) {
        *self.default_vendor.lock().await = name.map(str::to_string);
    }

    /// Answer `name` for exactly this PDF.
    pub async fn set_vendor_for(&self, pdf: &[u8], name: &str) {
        self.vendors.lock().await.insert(pdf.to_vec(), name.to_string());
    }

    pub async fn set_fields(&self, fields: InvoiceFields) {
        *self.fields.lock().await = fields;
    }

    /// Make every call fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self) -> Result<(), ApflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApflowError::transient("extraction", "mock extractor unavailable"));
        }
        Ok(())
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockExtractor {
    fn name(&self) -> &str {
        "mock-extractor"
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
impl DocumentExtractor for MockExtractor {
    async fn extract_vendor_name(&self, pdf: &[u8]) -> Result<Option<String>, ApflowError> {
        self.begin_call()?;
        if let Some(name) = self.vendors.lock().await.get(pdf) {
            return Ok(Some(name.clone()));
        }
        Ok(self.default_vendor.lock().await.clone())
    }

    async fn extract_invoice_fields(&self, _pdf: &[u8]) -> Result<InvoiceFields, ApflowError> {
        self.begin_call()?;
        Ok(self.fields.lock().await.clone())
    }
}
