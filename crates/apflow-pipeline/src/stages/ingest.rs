// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest stage: unread mail to `raw-mail` messages.
//!
//! Runs on the poll timer and on webhook triggers. Each PDF attachment is
//! stored and becomes one [`RawMail`]. A message is marked read only after
//! all of its attachments were enqueued, so a failure leaves it unread for
//! the next run. Re-enqueued attachments are caught by message-id dedup.

use apflow_core::messages::DEFAULT_SCHEMA_VERSION;
use apflow_core::types::{Attachment, MailMessage};
use apflow_core::{ApflowError, RawMail};
use apflow_resilience::Guard;
use tracing::{debug, info, warn};

use crate::context::PipelineContext;

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub listed: usize,
    pub skipped: usize,
    pub enqueued: usize,
    pub failed: usize,
}

enum MessageResult {
    Skipped,
    Enqueued(usize),
}

/// Poll the ingest mailbox once.
pub async fn run_ingest(ctx: &PipelineContext) -> Result<IngestReport, ApflowError> {
    ctx.settings.require()?;
    let mailbox = ctx.settings.ingest_mailbox.as_str();
    let mail = ctx.mail_guard();

    let messages = mail
        .call("mail.list_unread", |_| ctx.mail.list_unread(mailbox))
        .await?;

    let mut report = IngestReport {
        listed: messages.len(),
        ..IngestReport::default()
    };

    for message in &messages {
        match ingest_message(ctx, &mail, message).await {
            Ok(MessageResult::Skipped) => report.skipped += 1,
            Ok(MessageResult::Enqueued(n)) => report.enqueued += n,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    sender = %message.sender,
                    error = %e,
                    "failed to ingest message, leaving it unread"
                );
                report.failed += 1;
            }
        }
    }

    if report.listed > 0 {
        info!(
            listed = report.listed,
            enqueued = report.enqueued,
            skipped = report.skipped,
            failed = report.failed,
            "ingest run complete"
        );
    }
    Ok(report)
}

async fn ingest_message(
    ctx: &PipelineContext,
    mail: &Guard,
    message: &MailMessage,
) -> Result<MessageResult, ApflowError> {
    let mailbox = ctx.settings.ingest_mailbox.as_str();

    if let Some(reason) = ctx.loop_guard.should_skip(&message.sender, &message.subject) {
        info!(
            message_id = %message.id,
            sender = %message.sender,
            subject = %message.subject,
            %reason,
            "skipping message to prevent a mail loop"
        );
        mark_read(ctx, mail, &message.id).await?;
        return Ok(MessageResult::Skipped);
    }

    let attachments = mail
        .call("mail.get_attachments", |_| {
            ctx.mail.get_attachments(mailbox, &message.id)
        })
        .await?;
    let pdfs: Vec<&Attachment> = attachments.iter().filter(|a| a.is_pdf()).collect();

    if pdfs.is_empty() {
        info!(message_id = %message.id, sender = %message.sender, "no PDF attachment, skipping");
        mark_read(ctx, mail, &message.id).await?;
        return Ok(MessageResult::Skipped);
    }

    let storage = ctx.storage_guard();
    let extraction = ctx.extraction_guard();
    let stable_id = message.stable_id();

    for (index, pdf) in pdfs.iter().enumerate() {
        let blob_url = storage
            .call("objects.put", |_| {
                ctx.objects.put(&pdf.name, &pdf.content_type, &pdf.content)
            })
            .await?;

        let vendor_name = extract_vendor_name(ctx, &extraction, &pdf.content).await;

        let original_message_id = if index == 0 {
            stable_id.to_string()
        } else {
            format!("{stable_id}:{index}")
        };

        let raw = RawMail {
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            id: uuid::Uuid::now_v7().to_string(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            blob_url,
            received_at: message.received_at,
            original_message_id,
            vendor_name,
        };
        ctx.emit(&raw).await?;
        debug!(
            original_message_id = %raw.original_message_id,
            vendor = raw.vendor_name.as_deref().unwrap_or("-"),
            "raw mail enqueued"
        );
    }

    mark_read(ctx, mail, &message.id).await?;
    Ok(MessageResult::Enqueued(pdfs.len()))
}

async fn mark_read(
    ctx: &PipelineContext,
    mail: &Guard,
    message_id: &str,
) -> Result<(), ApflowError> {
    let mailbox = ctx.settings.ingest_mailbox.as_str();
    mail.call("mail.mark_read", |_| ctx.mail.mark_read(mailbox, message_id))
        .await
}

/// Vendor name from the PDF, or `None` when extraction is unavailable.
async fn extract_vendor_name(
    ctx: &PipelineContext,
    extraction: &Guard,
    pdf: &[u8],
) -> Option<String> {
    let result = extraction
        .call_or_fallback(
            "extract.vendor_name",
            |_| ctx.extractor.extract_vendor_name(pdf),
            || None,
        )
        .await;
    match result {
        Ok(name) => name.filter(|n| !n.trim().is_empty()),
        Err(e) => {
            warn!(error = %e, "vendor name extraction failed, resolving by sender");
            None
        }
    }
}
