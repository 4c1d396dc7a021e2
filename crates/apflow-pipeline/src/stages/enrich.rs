// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Enrich stage: `raw-mail` to `enriched-invoices`.
//!
//! Steps for one [`RawMail`]:
//!
//! 1. drop it if a transaction already exists for its message id
//! 2. resolve the vendor and compute the invoice hash
//! 3. for resolved vendors, drop it if another transaction carries the
//!    same hash; the message is recorded as an `error` transaction and the
//!    delivery that records it emits one duplicate notification
//! 4. claim the message by inserting its transaction; a lost claim means a
//!    concurrent delivery owns the work
//! 5. emit the enriched invoice; unknown vendors then get one registration
//!    email, sent only by the claim winner

use apflow_core::messages::DEFAULT_SCHEMA_VERSION;
use apflow_core::types::{InvoiceFields, OutboundEmail};
use apflow_core::{
    ApflowError, EnrichedInvoice, InvoiceStatus, NotificationKind, NotificationMessage, RawMail,
    Transaction, TransactionStatus, Vendor,
};
use tracing::{info, warn};

use crate::context::PipelineContext;
use crate::dedup;
use crate::outcome::StageOutcome;
use crate::vendor::Resolution;

/// Reason attached to invoices from vendors missing from the ledger.
pub const REASON_UNKNOWN_VENDOR: &str = "unknown_vendor";
/// Reason attached to invoices from resellers.
pub const REASON_RESELLER: &str = "reseller";

pub async fn enrich(ctx: &PipelineContext, raw: &RawMail) -> Result<StageOutcome, ApflowError> {
    ctx.settings.require()?;
    let store = ctx.store.as_ref();

    if dedup::is_already_processed(store, &raw.original_message_id).await {
        info!(
            original_message_id = %raw.original_message_id,
            "message already processed, skipping"
        );
        return Ok(StageOutcome::Duplicate);
    }

    let vendors = ctx.store.list_active_vendors().await?;
    let resolution = ctx
        .resolver
        .resolve(&vendors, raw.vendor_name.as_deref(), &raw.sender);

    let hash_vendor = match resolution.vendor() {
        Some(vendor) => vendor.name.clone(),
        None => raw.vendor_name.clone().unwrap_or_default(),
    };
    let invoice_hash = dedup::invoice_hash(&hash_vendor, &raw.sender, &raw.received_at);

    if let Some(vendor) = resolution.vendor()
        && let Some(existing) = dedup::check_duplicate_invoice(store, &invoice_hash).await
        && existing.original_message_id != raw.original_message_id
    {
        let record = duplicate_record(raw, vendor, &invoice_hash, &existing);
        if !dedup::try_claim(store, &record).await? {
            info!(
                original_message_id = %raw.original_message_id,
                "duplicate already recorded, skipping"
            );
            return Ok(StageOutcome::Duplicate);
        }
        info!(
            original_message_id = %raw.original_message_id,
            duplicate_of = %existing.id,
            vendor = %vendor.name,
            "duplicate invoice, skipping"
        );
        let notice = NotificationMessage::new(
            NotificationKind::Duplicate,
            format!("Duplicate invoice from {} was not forwarded", vendor.name),
        )
        .with_detail("transaction_id", &record.id)
        .with_detail("vendor", &vendor.name)
        .with_detail("sender", &raw.sender)
        .with_detail("original_transaction_id", &existing.id)
        .with_detail("original_message_id", &raw.original_message_id);
        ctx.emit(&notice).await?;
        return Ok(StageOutcome::Duplicate);
    }

    let transaction = build_transaction(ctx, raw, &resolution, &invoice_hash);
    if !dedup::try_claim(store, &transaction).await? {
        info!(
            original_message_id = %raw.original_message_id,
            "message claimed by a concurrent delivery, skipping"
        );
        return Ok(StageOutcome::Duplicate);
    }

    match &resolution {
        Resolution::Matched(m) => {
            let fields = extract_fields(ctx, &raw.blob_url).await;
            let invoice = enriched_invoice(
                raw,
                &transaction,
                Some(&m.vendor),
                InvoiceStatus::Enriched,
                fields,
                None,
            );
            ctx.emit(&invoice).await?;
            info!(
                transaction_id = %transaction.id,
                vendor = %m.vendor.name,
                method = %m.method,
                score = m.score,
                "invoice enriched"
            );
            Ok(StageOutcome::Processed)
        }
        Resolution::Reseller(m) => {
            let invoice = enriched_invoice(
                raw,
                &transaction,
                Some(&m.vendor),
                InvoiceStatus::Unknown,
                InvoiceFields::default(),
                Some(REASON_RESELLER),
            );
            ctx.emit(&invoice).await?;
            info!(
                transaction_id = %transaction.id,
                vendor = %m.vendor.name,
                "reseller invoice needs manual allocation"
            );
            Ok(StageOutcome::Unknown)
        }
        Resolution::Unknown { candidate } => {
            let mut invoice = enriched_invoice(
                raw,
                &transaction,
                None,
                InvoiceStatus::Unknown,
                InvoiceFields::default(),
                Some(REASON_UNKNOWN_VENDOR),
            );
            invoice.vendor_name = candidate.clone().unwrap_or_default();
            ctx.emit(&invoice).await?;
            send_registration_request(ctx, raw, &transaction).await?;
            info!(
                transaction_id = %transaction.id,
                sender = %raw.sender,
                candidate = candidate.as_deref().unwrap_or("-"),
                "unknown vendor"
            );
            Ok(StageOutcome::Unknown)
        }
    }
}

fn build_transaction(
    ctx: &PipelineContext,
    raw: &RawMail,
    resolution: &Resolution,
    invoice_hash: &str,
) -> Transaction {
    let status = match resolution {
        Resolution::Matched(_) => TransactionStatus::Enriched,
        Resolution::Reseller(_) | Resolution::Unknown { .. } => TransactionStatus::Unknown,
    };
    let mut tx = Transaction::new(&raw.original_message_id, status);
    if !raw.id.is_empty() {
        tx.id = raw.id.clone();
    }
    tx.sender_email = raw.sender.trim().to_string();
    tx.invoice_hash = invoice_hash.to_string();
    match resolution {
        Resolution::Matched(m) | Resolution::Reseller(m) => {
            tx.vendor_name = m.vendor.name.clone();
            tx.expense_dept = m.vendor.expense_dept.clone();
            tx.gl_code = m.vendor.gl_code.clone();
            if matches!(resolution, Resolution::Matched(_)) {
                tx.recipient_email = ctx.settings.ap_mailbox.clone();
            }
        }
        Resolution::Unknown { candidate } => {
            tx.vendor_name = candidate.clone().unwrap_or_default();
            tx.recipient_email = raw.sender.trim().to_string();
        }
    }
    tx
}

/// Audit record for a message carrying an already-seen invoice.
fn duplicate_record(
    raw: &RawMail,
    vendor: &Vendor,
    invoice_hash: &str,
    original: &Transaction,
) -> Transaction {
    let mut tx = Transaction::new(&raw.original_message_id, TransactionStatus::Error);
    if !raw.id.is_empty() {
        tx.id = raw.id.clone();
    }
    tx.vendor_name = vendor.name.clone();
    tx.sender_email = raw.sender.trim().to_string();
    tx.invoice_hash = invoice_hash.to_string();
    tx.error_message = Some(format!("duplicate of {}", original.id));
    tx
}

fn enriched_invoice(
    raw: &RawMail,
    transaction: &Transaction,
    vendor: Option<&Vendor>,
    status: InvoiceStatus,
    fields: InvoiceFields,
    reason: Option<&str>,
) -> EnrichedInvoice {
    let (vendor_name, expense_dept, gl_code, allocation_schedule, billing_party) = match vendor {
        Some(v) => (
            v.name.clone(),
            v.expense_dept.clone(),
            v.gl_code.clone(),
            v.allocation_schedule.clone(),
            v.billing_party.clone(),
        ),
        None => Default::default(),
    };
    EnrichedInvoice {
        schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        id: transaction.id.clone(),
        vendor_name,
        expense_dept,
        gl_code,
        allocation_schedule,
        billing_party,
        blob_url: raw.blob_url.clone(),
        original_message_id: raw.original_message_id.clone(),
        status,
        invoice_hash: transaction.invoice_hash.clone(),
        invoice_amount: fields.amount,
        currency: fields.currency,
        due_date: fields.due_date,
        payment_terms: fields.payment_terms,
        sender_email: raw.sender.clone(),
        reason: reason.map(str::to_string),
    }
}

/// Invoice fields from the stored PDF. Any failure yields the defaults.
async fn extract_fields(ctx: &PipelineContext, blob_url: &str) -> InvoiceFields {
    let pdf = match ctx
        .storage_guard()
        .call("objects.get", |_| ctx.objects.get(blob_url))
        .await
    {
        Ok(pdf) => pdf,
        Err(e) => {
            warn!(blob_url, error = %e, "could not load invoice PDF, using default fields");
            return InvoiceFields::default();
        }
    };

    match ctx
        .extraction_guard()
        .call_or_fallback(
            "extract.invoice_fields",
            |_| ctx.extractor.extract_invoice_fields(&pdf),
            InvoiceFields::default,
        )
        .await
    {
        Ok(fields) => fields,
        Err(e) => {
            warn!(blob_url, error = %e, "field extraction failed, using default fields");
            InvoiceFields::default()
        }
    }
}

/// Ask an unknown sender to register. Only the claim winner gets here.
///
/// A failed send is reported to the chat channel rather than retried by
/// redelivery, which would find the message already claimed.
async fn send_registration_request(
    ctx: &PipelineContext,
    raw: &RawMail,
    transaction: &Transaction,
) -> Result<(), ApflowError> {
    let email = OutboundEmail {
        from: ctx.settings.ingest_mailbox.clone(),
        to: raw.sender.trim().to_string(),
        subject: ctx.settings.registration_subject.clone(),
        body: registration_body(raw),
        attachments: Vec::new(),
    };

    match ctx.mailer().send(&email).await {
        Ok(()) => {
            if let Err(e) = ctx.store.record_email_sent(&transaction.id).await {
                warn!(transaction_id = %transaction.id, error = %e, "failed to record email send");
            }
            Ok(())
        }
        Err(e) => {
            warn!(
                transaction_id = %transaction.id,
                to = %email.to,
                error = %e,
                "registration email not sent"
            );
            let notice = NotificationMessage::new(
                NotificationKind::Error,
                format!("Registration email to {} could not be sent", email.to),
            )
            .with_detail("transaction_id", &transaction.id)
            .with_detail("error", e.to_string());
            ctx.emit(&notice).await.map(|_| ())
        }
    }
}

fn registration_body(raw: &RawMail) -> String {
    format!(
        "Hello,\n\n\
         We received an invoice from {sender} (subject: \"{subject}\"), but the sender \
         is not registered as a vendor with our accounts payable team.\n\n\
         Please contact accounts payable to complete vendor registration. Invoices \
         from unregistered vendors cannot be processed.\n\n\
         Reference: {message_id}\n",
        sender = raw.sender.trim(),
        subject = raw.subject,
        message_id = raw.original_message_id,
    )
}
