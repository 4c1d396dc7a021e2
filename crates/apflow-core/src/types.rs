// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types shared across collaborator traits and pipeline stages.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Format used for every timestamp persisted by apflow.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time in the persisted timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Formats a UTC time in the persisted timestamp format.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    MailService,
    ObjectStore,
    Extractor,
    Notifier,
    Storage,
}

/// Lifecycle status of a [`Transaction`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Unknown,
    Enriched,
    Processed,
    Error,
}

/// One inbound invoice attachment; the unit of idempotency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Time-sortable unique id (UUIDv7).
    pub id: String,
    /// Year-month partition of creation, `YYYYMM`.
    pub partition_key: String,
    pub vendor_name: String,
    pub sender_email: String,
    pub recipient_email: String,
    pub expense_dept: String,
    pub gl_code: String,
    pub status: TransactionStatus,
    /// Stable message id from the mail service. Unique across all transactions.
    pub original_message_id: String,
    pub invoice_hash: String,
    pub emails_sent_count: u32,
    pub last_email_sent_at: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Transaction {
    /// Create a fresh transaction for `original_message_id` with a new
    /// UUIDv7 id, the current partition, and empty ledger fields.
    pub fn new(original_message_id: impl Into<String>, status: TransactionStatus) -> Self {
        let now = Utc::now();
        let stamp = format_timestamp(&now);
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            partition_key: partition_key_for(&now),
            vendor_name: String::new(),
            sender_email: String::new(),
            recipient_email: String::new(),
            expense_dept: String::new(),
            gl_code: String::new(),
            status,
            original_message_id: original_message_id.into(),
            invoice_hash: String::new(),
            emails_sent_count: 0,
            last_email_sent_at: None,
            error_message: None,
            created_at: stamp.clone(),
            updated_at: stamp,
        }
    }
}

/// Year-month partition key (`YYYYMM`) for a point in time.
pub fn partition_key_for(at: &DateTime<Utc>) -> String {
    format!("{:04}{:02}", at.year(), at.month())
}

/// Outcome of the atomic `enriched -> processed` transition taken before the AP send.
#[derive(Debug, Clone, PartialEq)]
pub enum PostClaim {
    /// This caller moved the transaction to `processed` and owns the send.
    Claimed,
    /// The transaction already left `enriched` (processed by another delivery, or errored).
    AlreadyProcessed,
    /// Another transaction with the same invoice hash was already processed.
    DuplicateOf(Box<Transaction>),
}

/// Vendor ledger entry. Reference data, read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    /// Normalized name, see [`normalize_vendor_key`].
    pub row_key: String,
    pub expense_dept: String,
    pub gl_code: String,
    pub allocation_schedule: String,
    pub billing_party: String,
    pub product_category: String,
    pub active: bool,
}

impl Vendor {
    /// Resellers need manual product-line allocation and are never auto-enriched.
    pub fn is_reseller(&self) -> bool {
        self.product_category.trim().eq_ignore_ascii_case("reseller")
    }
}

/// Normalize a vendor name into its ledger row key: lowercase, with runs of
/// whitespace and hyphens collapsed to a single underscore.
pub fn normalize_vendor_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_whitespace() || c == '-' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !key.is_empty() {
            key.push('_');
        }
        pending_sep = false;
        key.extend(c.to_lowercase());
    }
    key
}

/// Summary of an unread message as listed by the mail service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Mail-service id used for attachment fetches and flag updates.
    pub id: String,
    /// RFC 5322 `Message-ID` header, when present.
    pub internet_message_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
}

impl MailMessage {
    /// Stable id used for dedup: the `Message-ID` header, falling back to the service id.
    pub fn stable_id(&self) -> &str {
        self.internet_message_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

/// A file attached to an inbound or outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn is_pdf(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("pdf")
            || self.name.to_ascii_lowercase().ends_with(".pdf")
    }
}

/// A message handed to the mail service for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Invoice fields read from a PDF. Extraction degrades to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub amount: Option<f64>,
    pub currency: String,
    pub due_date: Option<String>,
    pub payment_terms: String,
}

impl Default for InvoiceFields {
    fn default() -> Self {
        Self {
            amount: None,
            currency: "USD".to_string(),
            due_date: None,
            payment_terms: "Net 30".to_string(),
        }
    }
}

/// A durable queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    /// One of `pending`, `processing`, `completed`, `poison`.
    pub status: String,
    /// Number of times the entry has been handed to a consumer.
    pub dequeue_count: i64,
    pub max_deliveries: i64,
    pub visible_at: String,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
