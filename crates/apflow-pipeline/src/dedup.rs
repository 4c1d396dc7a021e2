// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-level and content-level duplicate detection, and the atomic claim.
//!
//! The two lookups fail open: a store outage must not stop invoices from
//! flowing, and the claim below still prevents duplicate side effects.
//! [`try_claim`] is the only gate for exactly-once work, so its errors
//! propagate and the stage is redelivered.

use apflow_core::types::normalize_vendor_key;
use apflow_core::{ApflowError, EntityStore, Transaction};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

/// True if any transaction already exists for `original_message_id`.
pub async fn is_already_processed(store: &dyn EntityStore, original_message_id: &str) -> bool {
    match store.find_transaction_by_message_id(original_message_id).await {
        Ok(found) => found.is_some(),
        Err(e) => {
            warn!(
                original_message_id,
                error = %e,
                "message dedup lookup failed, treating as new"
            );
            false
        }
    }
}

/// Content hash identifying one invoice from one vendor on one day.
pub fn invoice_hash(
    vendor_name: &str,
    sender_email: &str,
    received_at: &DateTime<Utc>,
) -> String {
    let vendor = normalize_vendor_key(vendor_name);
    let sender = sender_email.trim().to_lowercase();
    let date = received_at.format("%Y-%m-%d");
    let digest = Sha256::digest(format!("{vendor}|{sender}|{date}").as_bytes());
    hex::encode(digest)
}

/// Oldest transaction sharing `invoice_hash`, if any.
pub async fn check_duplicate_invoice(
    store: &dyn EntityStore,
    invoice_hash: &str,
) -> Option<Transaction> {
    match store.find_transaction_by_hash(invoice_hash).await {
        Ok(found) => found,
        Err(e) => {
            warn!(invoice_hash, error = %e, "content dedup lookup failed, treating as new");
            None
        }
    }
}

/// Record `transaction` unless one already exists for its message id.
///
/// Returns true iff this call created the record and therefore owns any
/// side effect tied to it.
pub async fn try_claim(
    store: &dyn EntityStore,
    transaction: &Transaction,
) -> Result<bool, ApflowError> {
    store.insert_transaction_if_absent(transaction).await
}
