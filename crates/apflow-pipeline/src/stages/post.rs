// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post stage: `enriched-invoices` to the AP mailbox and `notifications`.
//!
//! Unknown-status invoices only produce a notification, queued once per
//! transaction behind the store's notice claim. Enriched invoices
//! are forwarded to AP once: the send is gated by the atomic
//! `enriched -> processed` claim, which also refuses a second invoice with
//! the same content hash. A failed send releases the claim so that
//! redelivery can try again.

use apflow_core::types::{Attachment, OutboundEmail};
use apflow_core::{
    ApflowError, EnrichedInvoice, InvoiceStatus, NotificationKind, NotificationMessage, PostClaim,
};
use tracing::{info, warn};

use crate::context::PipelineContext;
use crate::outcome::StageOutcome;
use crate::stages::enrich::{REASON_RESELLER, REASON_UNKNOWN_VENDOR};

pub async fn post(
    ctx: &PipelineContext,
    invoice: &EnrichedInvoice,
) -> Result<StageOutcome, ApflowError> {
    ctx.settings.require()?;

    if invoice.status == InvoiceStatus::Unknown {
        return hold_for_review(ctx, invoice).await;
    }

    match ctx.store.claim_for_post(&invoice.id).await? {
        PostClaim::AlreadyProcessed => {
            info!(transaction_id = %invoice.id, "invoice already posted, skipping");
            Ok(StageOutcome::Skipped("already_processed"))
        }
        PostClaim::DuplicateOf(original) => {
            let reason = format!("duplicate invoice of {}", original.id);
            ctx.store
                .mark_transaction_error(&invoice.id, &reason)
                .await?;
            info!(
                transaction_id = %invoice.id,
                duplicate_of = %original.id,
                "duplicate invoice, not forwarded"
            );
            let notice = NotificationMessage::new(
                NotificationKind::Duplicate,
                format!("Duplicate invoice from {} was not forwarded", invoice.vendor_name),
            )
            .with_detail("transaction_id", &invoice.id)
            .with_detail("original_transaction_id", &original.id)
            .with_detail("vendor", &invoice.vendor_name);
            ctx.emit(&notice).await?;
            Ok(StageOutcome::Duplicate)
        }
        PostClaim::Claimed => {
            if let Err(e) = forward_to_ap(ctx, invoice).await {
                if let Err(release_err) = ctx.store.release_post_claim(&invoice.id).await {
                    warn!(
                        transaction_id = %invoice.id,
                        error = %release_err,
                        "failed to release post claim"
                    );
                }
                return Err(e);
            }

            if let Err(e) = ctx.store.record_email_sent(&invoice.id).await {
                warn!(transaction_id = %invoice.id, error = %e, "failed to record email send");
            }
            if let Err(e) = ctx.emit(&success_notice(invoice)).await {
                warn!(
                    transaction_id = %invoice.id,
                    error = %e,
                    "failed to queue success notification"
                );
            }
            info!(
                transaction_id = %invoice.id,
                vendor = %invoice.vendor_name,
                gl_code = %invoice.gl_code,
                "invoice forwarded to AP"
            );
            Ok(StageOutcome::Processed)
        }
    }
}

async fn hold_for_review(
    ctx: &PipelineContext,
    invoice: &EnrichedInvoice,
) -> Result<StageOutcome, ApflowError> {
    if !ctx.store.claim_notice(&invoice.id).await? {
        info!(transaction_id = %invoice.id, "review notice already queued, skipping");
        return Ok(StageOutcome::Skipped("already_notified"));
    }
    if let Err(e) = ctx.emit(&unknown_notice(invoice)).await {
        if let Err(release_err) = ctx.store.release_notice_claim(&invoice.id).await {
            warn!(
                transaction_id = %invoice.id,
                error = %release_err,
                "failed to release notice claim"
            );
        }
        return Err(e);
    }
    Ok(StageOutcome::Unknown)
}

/// Subject of a forwarded invoice. Inbound mail with this shape is skipped.
pub fn ap_subject(vendor_name: &str, gl_code: &str) -> String {
    format!("Invoice: {vendor_name} - GL {gl_code}")
}

async fn forward_to_ap(
    ctx: &PipelineContext,
    invoice: &EnrichedInvoice,
) -> Result<(), ApflowError> {
    let pdf = ctx
        .storage_guard()
        .call("objects.get", |_| ctx.objects.get(&invoice.blob_url))
        .await?;

    let email = OutboundEmail {
        from: ctx.settings.ingest_mailbox.clone(),
        to: ctx.settings.ap_mailbox.clone(),
        subject: ap_subject(&invoice.vendor_name, &invoice.gl_code),
        body: ap_body(invoice),
        attachments: vec![Attachment {
            name: attachment_name(&invoice.blob_url),
            content_type: "application/pdf".to_string(),
            content: pdf,
        }],
    };
    ctx.mailer().send(&email).await
}

fn ap_body(invoice: &EnrichedInvoice) -> String {
    let amount = invoice
        .invoice_amount
        .map(|a| format!("{a:.2} {}", invoice.currency))
        .unwrap_or_else(|| "not extracted".to_string());
    let mut body = String::new();
    for (label, value) in [
        ("Vendor", invoice.vendor_name.as_str()),
        ("Sender", invoice.sender_email.as_str()),
        ("Expense department", invoice.expense_dept.as_str()),
        ("GL code", invoice.gl_code.as_str()),
        ("Allocation schedule", invoice.allocation_schedule.as_str()),
        ("Billing party", invoice.billing_party.as_str()),
        ("Amount", amount.as_str()),
        ("Due date", invoice.due_date.as_deref().unwrap_or("not extracted")),
        ("Payment terms", invoice.payment_terms.as_str()),
        ("Transaction", invoice.id.as_str()),
    ] {
        body.push_str(label);
        body.push_str(": ");
        body.push_str(value);
        body.push('\n');
    }
    body
}

/// Original file name from a blob URL, dropping a content-hash prefix.
fn attachment_name(blob_url: &str) -> String {
    let last = blob_url.rsplit('/').next().unwrap_or_default();
    let name = match last.split_once('-') {
        Some((prefix, rest))
            if prefix.len() == 64 && prefix.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            rest
        }
        _ => last,
    };
    if name.is_empty() {
        "invoice.pdf".to_string()
    } else {
        name.to_string()
    }
}

fn success_notice(invoice: &EnrichedInvoice) -> NotificationMessage {
    let mut notice = NotificationMessage::new(
        NotificationKind::Success,
        format!("Invoice from {} forwarded to AP", invoice.vendor_name),
    )
    .with_detail("transaction_id", &invoice.id)
    .with_detail("vendor", &invoice.vendor_name)
    .with_detail("gl_code", &invoice.gl_code)
    .with_detail("expense_dept", &invoice.expense_dept)
    .with_detail("payment_terms", &invoice.payment_terms);
    if let Some(amount) = invoice.invoice_amount {
        notice = notice.with_detail("amount", format!("{amount:.2} {}", invoice.currency));
    }
    if let Some(due) = &invoice.due_date {
        notice = notice.with_detail("due_date", due);
    }
    notice
}

fn unknown_notice(invoice: &EnrichedInvoice) -> NotificationMessage {
    let reason = invoice.reason.as_deref().unwrap_or(REASON_UNKNOWN_VENDOR);
    let message = if reason == REASON_RESELLER {
        format!(
            "Reseller invoice from {} needs manual allocation",
            invoice.vendor_name
        )
    } else {
        format!("Invoice from unregistered sender {}", invoice.sender_email)
    };
    NotificationMessage::new(NotificationKind::Unknown, message)
        .with_detail("transaction_id", &invoice.id)
        .with_detail("sender", &invoice.sender_email)
        .with_detail("vendor", &invoice.vendor_name)
        .with_detail("reason", reason)
        .with_detail("blob_url", &invoice.blob_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_recognized_by_loop_guard() {
        let subject = ap_subject("Adobe Inc", "6100");
        assert_eq!(subject, "Invoice: Adobe Inc - GL 6100");
        assert!(crate::loop_guard::is_outbound_subject(&subject));
        assert!(crate::loop_guard::is_outbound_subject(&format!("RE: {subject}")));
    }

    #[test]
    fn attachment_names() {
        let hash = "a".repeat(64);
        assert_eq!(
            attachment_name(&format!("file:///blobs/aa/{hash}-inv-42.pdf")),
            "inv-42.pdf"
        );
        assert_eq!(attachment_name("file:///blobs/x/scan-1.pdf"), "scan-1.pdf");
        assert_eq!(attachment_name("file:///blobs/"), "invoice.pdf");
    }
}
