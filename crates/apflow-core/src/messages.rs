// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned envelopes passed between pipeline stages through the message queue.
//!
//! Old and new pipeline builds may run side by side during a rolling deploy,
//! so every envelope carries a `schema_version` that defaults to the oldest
//! known schema when absent, and unknown JSON fields are ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ApflowError;

/// Oldest known envelope schema.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

/// Queue names used between stages.
pub mod queues {
    pub const RAW_MAIL: &str = "raw-mail";
    pub const ENRICHED_INVOICES: &str = "enriched-invoices";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const INGEST_TRIGGERS: &str = "ingest-triggers";
}

/// A JSON envelope bound to the queue it travels on.
pub trait Envelope: Serialize + DeserializeOwned {
    /// Queue this envelope is enqueued on.
    const QUEUE: &'static str;

    fn to_json(&self) -> Result<String, ApflowError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a queue payload. A malformed payload is a validation failure.
    fn from_json(payload: &str) -> Result<Self, ApflowError> {
        serde_json::from_str(payload)
            .map_err(|e| ApflowError::Validation(format!("malformed {} payload: {e}", Self::QUEUE)))
    }
}

/// One PDF attachment picked up by the Ingest stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMail {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub blob_url: String,
    pub received_at: DateTime<Utc>,
    pub original_message_id: String,
    #[serde(default)]
    pub vendor_name: Option<String>,
}

impl Envelope for RawMail {
    const QUEUE: &'static str = queues::RAW_MAIL;
}

/// Routing status carried by an [`EnrichedInvoice`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Enriched,
    Unknown,
}

/// An invoice with ledger codes attached, or flagged for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedInvoice {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Transaction id.
    pub id: String,
    pub vendor_name: String,
    #[serde(default)]
    pub expense_dept: String,
    #[serde(default)]
    pub gl_code: String,
    #[serde(default)]
    pub allocation_schedule: String,
    #[serde(default)]
    pub billing_party: String,
    pub blob_url: String,
    pub original_message_id: String,
    pub status: InvoiceStatus,
    pub invoice_hash: String,
    #[serde(default)]
    pub invoice_amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default = "default_payment_terms")]
    pub payment_terms: String,
    #[serde(default)]
    pub sender_email: String,
    /// Why an `unknown` invoice needs manual review (`unknown_vendor`, `reseller`).
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_payment_terms() -> String {
    "Net 30".to_string()
}

impl Envelope for EnrichedInvoice {
    const QUEUE: &'static str = queues::ENRICHED_INVOICES;
}

/// Kind of chat notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Unknown,
    Error,
    Duplicate,
}

/// A message for the chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl NotificationMessage {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            schema_version: default_schema_version(),
            kind,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl Envelope for NotificationMessage {
    const QUEUE: &'static str = queues::NOTIFICATIONS;
}

/// Request to run an ingest pass, produced by the webhook or the poll timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestTrigger {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub source: String,
    #[serde(default)]
    pub resource: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl IngestTrigger {
    pub fn new(source: impl Into<String>, resource: Option<String>) -> Self {
        Self {
            schema_version: default_schema_version(),
            source: source.into(),
            resource,
            requested_at: Utc::now(),
        }
    }
}

impl Envelope for IngestTrigger {
    const QUEUE: &'static str = queues::INGEST_TRIGGERS;
}
