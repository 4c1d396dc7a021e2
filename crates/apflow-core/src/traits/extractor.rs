// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document field extractor trait.

use async_trait::async_trait;

use crate::error::ApflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::InvoiceFields;

/// Adapter that reads vendor identity and invoice fields out of a PDF.
///
/// Low-confidence extraction degrades to `None` or [`InvoiceFields::default`]
/// instead of an error. Errors are reserved for an unreachable service.
#[async_trait]
pub trait DocumentExtractor: PluginAdapter {
    async fn extract_vendor_name(&self, pdf: &[u8]) -> Result<Option<String>, ApflowError>;

    async fn extract_invoice_fields(&self, pdf: &[u8]) -> Result<InvoiceFields, ApflowError>;
}
