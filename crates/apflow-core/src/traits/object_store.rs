// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object store trait for invoice PDF blobs.

use async_trait::async_trait;

use crate::error::ApflowError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for blob storage of inbound attachments.
#[async_trait]
pub trait ObjectStore: PluginAdapter {
    /// Stores `content` and returns a URL that [`ObjectStore::get`] accepts.
    async fn put(
        &self,
        name: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<String, ApflowError>;

    /// Reads a blob previously stored with [`ObjectStore::put`].
    async fn get(&self, url: &str) -> Result<Vec<u8>, ApflowError>;
}
