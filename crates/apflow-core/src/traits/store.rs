// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity store trait: transactions, the vendor ledger, and rate-limit counters.
//!
//! The atomic primitives exposed here (insert-if-absent, conditional update,
//! conditional upsert) are the only cross-instance coordination in apflow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PostClaim, Transaction, Vendor};

/// Adapter for the persistent entity store.
#[async_trait]
pub trait EntityStore: PluginAdapter {
    // --- Transactions ---

    /// Inserts `tx` unless a transaction with the same id or
    /// `original_message_id` already exists. Returns true iff this call inserted.
    async fn insert_transaction_if_absent(&self, tx: &Transaction) -> Result<bool, ApflowError>;

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, ApflowError>;

    async fn find_transaction_by_message_id(
        &self,
        original_message_id: &str,
    ) -> Result<Option<Transaction>, ApflowError>;

    /// Oldest transaction carrying `invoice_hash`, if any.
    async fn find_transaction_by_hash(
        &self,
        invoice_hash: &str,
    ) -> Result<Option<Transaction>, ApflowError>;

    /// Atomically moves `id` from `enriched` to `processed`, unless another
    /// transaction with the same invoice hash is already `processed`.
    async fn claim_for_post(&self, id: &str) -> Result<PostClaim, ApflowError>;

    /// Reverts a [`PostClaim::Claimed`] transaction back to `enriched`.
    async fn release_post_claim(&self, id: &str) -> Result<(), ApflowError>;

    /// Marks the hold notice for `id` as queued. Returns true iff this call
    /// made the change, so only one delivery emits the notice.
    async fn claim_notice(&self, id: &str) -> Result<bool, ApflowError>;

    /// Undoes [`EntityStore::claim_notice`] after the notice failed to queue.
    async fn release_notice_claim(&self, id: &str) -> Result<(), ApflowError>;

    /// Moves a transaction to `error` with a message.
    async fn mark_transaction_error(&self, id: &str, message: &str) -> Result<(), ApflowError>;

    /// Increments `emails_sent_count` and stamps `last_email_sent_at`.
    async fn record_email_sent(&self, id: &str) -> Result<(), ApflowError>;

    async fn list_transactions(&self, limit: i64) -> Result<Vec<Transaction>, ApflowError>;

    // --- Vendors ---

    async fn list_active_vendors(&self) -> Result<Vec<Vendor>, ApflowError>;

    async fn list_vendors(&self) -> Result<Vec<Vendor>, ApflowError>;

    async fn upsert_vendor(&self, vendor: &Vendor) -> Result<(), ApflowError>;

    // --- Rate limits ---

    /// Increments the counter at `row_key` (creating it on first use) unless it
    /// already reached `max_requests`. Returns the new count, or `None` when
    /// the caller is over the limit. Must be a single atomic statement.
    async fn try_increment_rate_limit(
        &self,
        row_key: &str,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, ApflowError>;
}
