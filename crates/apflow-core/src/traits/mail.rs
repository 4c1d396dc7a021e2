// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mail service trait for reading the ingest mailbox and sending email.

use async_trait::async_trait;

use crate::error::ApflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Attachment, MailMessage, OutboundEmail};

/// Adapter for the mail service that owns the ingest mailbox.
///
/// Transport failures surface as transient [`ApflowError::Dependency`] errors
/// so the resilience layer can retry and count them.
#[async_trait]
pub trait MailService: PluginAdapter {
    /// Lists unread messages in `mailbox`.
    async fn list_unread(&self, mailbox: &str) -> Result<Vec<MailMessage>, ApflowError>;

    /// Fetches all attachments of a message.
    async fn get_attachments(
        &self,
        mailbox: &str,
        message_id: &str,
    ) -> Result<Vec<Attachment>, ApflowError>;

    /// Marks a message as read.
    async fn mark_read(&self, mailbox: &str, message_id: &str) -> Result<(), ApflowError>;

    /// Sends an email.
    async fn send(&self, email: &OutboundEmail) -> Result<(), ApflowError>;
}
