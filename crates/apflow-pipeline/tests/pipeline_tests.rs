// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end stage scenarios over SQLite storage and mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use apflow_config::model::ApflowConfig;
use apflow_core::messages::DEFAULT_SCHEMA_VERSION;
use apflow_core::{
    EnrichedInvoice, EntityStore, Envelope, InvoiceStatus, MessageQueue, NotificationKind,
    NotificationMessage, RawMail, Transaction, TransactionStatus,
};
use apflow_pipeline::StageOutcome;
use apflow_pipeline::stages;
use apflow_resilience::CircuitState;
use apflow_pipeline::worker::{EnrichHandler, PostHandler};
use apflow_test_utils::harness::{AP_MAILBOX, INGEST_MAILBOX};
use apflow_test_utils::{TestHarness, vendor};

async fn adobe_harness() -> TestHarness {
    adobe_harness_with(|_| {}).await
}

async fn adobe_harness_with(
    configure: impl FnOnce(&mut ApflowConfig) + Send + 'static,
) -> TestHarness {
    let harness = TestHarness::builder()
        .with_vendors(vec![vendor("Adobe Inc", "6100")])
        .with_config(configure)
        .build()
        .await
        .unwrap();
    harness.extractor.set_default_vendor(Some("Adobe Inc")).await;
    harness
}

fn immediate_redelivery(config: &mut ApflowConfig) {
    config.queue.redelivery_delay_secs = 0;
}

#[tokio::test]
async fn first_delivery_is_forwarded_to_ap_once() {
    let harness = adobe_harness().await;
    let message = harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;

    let report = harness.run_pipeline().await.unwrap();
    assert_eq!(report.listed, 1);
    assert_eq!(report.enqueued, 1);

    let to_ap = harness.mail.sent_to(AP_MAILBOX).await;
    assert_eq!(to_ap.len(), 1);
    assert_eq!(to_ap[0].from, INGEST_MAILBOX);
    assert_eq!(to_ap[0].subject, "Invoice: Adobe Inc - GL 6100");
    assert_eq!(to_ap[0].attachments.len(), 1);
    assert_eq!(to_ap[0].attachments[0].name, "inv-42.pdf");
    assert!(harness.mail.is_read("m1").await);

    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Processed);
    assert_eq!(tx.vendor_name, "Adobe Inc");
    assert_eq!(tx.recipient_email, AP_MAILBOX);
    assert_eq!(tx.emails_sent_count, 1);
    assert!(!tx.invoice_hash.is_empty());

    let successes = harness.notifier.delivered_of(NotificationKind::Success).await;
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].details.get("gl_code").map(String::as_str), Some("6100"));
}

#[tokio::test]
async fn redelivered_message_is_not_forwarded_again() {
    let harness = adobe_harness().await;
    harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_pipeline().await.unwrap();

    harness.mail.mark_unread("m1").await;
    let report = harness.run_ingest().await.unwrap();
    assert_eq!(report.enqueued, 1);

    let outcomes = harness.drain_enrich().await.unwrap();
    assert_eq!(outcomes, vec![StageOutcome::Duplicate]);
    assert!(harness.drain_post().await.unwrap().is_empty());
    assert_eq!(harness.mail.sent_to(AP_MAILBOX).await.len(), 1);
}

#[tokio::test]
async fn unknown_vendor_gets_exactly_one_registration_email() {
    let harness = TestHarness::builder().build().await.unwrap();
    let message = harness
        .deliver("m1", "vendor@nobody.test", "Invoice attached", &["bill.pdf"])
        .await;

    harness.run_ingest().await.unwrap();
    assert_eq!(harness.drain_enrich().await.unwrap(), vec![StageOutcome::Unknown]);
    assert_eq!(harness.drain_post().await.unwrap(), vec![StageOutcome::Unknown]);
    harness.drain_notify().await.unwrap();

    let registration = harness.mail.sent_to("vendor@nobody.test").await;
    assert_eq!(registration.len(), 1);
    assert_eq!(registration[0].subject, "Vendor Registration Required");
    assert!(harness.mail.sent_to(AP_MAILBOX).await.is_empty());

    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Unknown);
    assert_eq!(tx.recipient_email, "vendor@nobody.test");
    assert_eq!(tx.vendor_name, "nobody");
    assert_eq!(tx.emails_sent_count, 1);

    let unknown = harness.notifier.delivered_of(NotificationKind::Unknown).await;
    assert_eq!(unknown.len(), 1);
    assert_eq!(
        unknown[0].details.get("reason").map(String::as_str),
        Some("unknown_vendor")
    );

    // A redelivery must not mail the sender again.
    harness.mail.mark_unread("m1").await;
    harness.run_pipeline().await.unwrap();
    assert_eq!(harness.mail.sent_to("vendor@nobody.test").await.len(), 1);
}

#[tokio::test]
async fn registration_reply_is_skipped_at_ingest() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .deliver(
            "m2",
            "vendor@nobody.test",
            "RE: Vendor Registration Required",
            &["form.pdf"],
        )
        .await;

    let report = harness.run_ingest().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.enqueued, 0);
    assert!(harness.mail.is_read("m2").await);
    assert!(harness.drain_enrich().await.unwrap().is_empty());
    assert_eq!(harness.mail.send_attempts(), 0);
}

#[tokio::test]
async fn own_mail_is_never_reprocessed() {
    let harness = adobe_harness().await;
    harness
        .deliver("self", INGEST_MAILBOX, "Anything", &["a.pdf"])
        .await;
    harness
        .deliver(
            "fwd",
            "someone@adobe.com",
            "FW: Invoice: Adobe Inc - GL 6100",
            &["b.pdf"],
        )
        .await;
    harness
        .deliver("nopdf", "billing@adobe.com", "Invoice", &[])
        .await;

    let report = harness.run_pipeline().await.unwrap();
    assert_eq!(report.listed, 3);
    assert_eq!(report.skipped, 3);
    assert_eq!(harness.mail.send_attempts(), 0);
    for id in ["self", "fwd", "nopdf"] {
        assert!(harness.mail.is_read(id).await, "{id} should be marked read");
    }
}

#[tokio::test]
async fn same_invoice_sent_twice_is_forwarded_once() {
    let harness = adobe_harness().await;
    let first = harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    let second = harness
        .deliver("m2", "Billing@Adobe.com", "Fwd: Invoice 42", &["inv-42-copy.pdf"])
        .await;

    harness.run_ingest().await.unwrap();
    let outcomes = harness.drain_enrich().await.unwrap();
    assert_eq!(outcomes, vec![StageOutcome::Processed, StageOutcome::Duplicate]);
    harness.drain_post().await.unwrap();
    harness.drain_notify().await.unwrap();

    assert_eq!(harness.mail.sent_to(AP_MAILBOX).await.len(), 1);
    let first = harness.transaction_for(&first).await.unwrap().unwrap();
    let recorded = harness.transaction_for(&second).await.unwrap().unwrap();
    assert_eq!(recorded.status, TransactionStatus::Error);
    assert_eq!(
        recorded.error_message.as_deref(),
        Some(format!("duplicate of {}", first.id).as_str())
    );
    let duplicates = harness.notifier.delivered_of(NotificationKind::Duplicate).await;
    assert_eq!(duplicates.len(), 1);
}

#[tokio::test]
async fn multiple_pdfs_become_separate_transactions() {
    let harness = adobe_harness().await;
    let message = harness
        .deliver("m1", "billing@adobe.com", "Invoices", &["a.pdf", "b.pdf"])
        .await;

    let report = harness.run_ingest().await.unwrap();
    assert_eq!(report.enqueued, 2);

    // Same vendor, sender and day: the second attachment hashes like the first.
    let outcomes = harness.drain_enrich().await.unwrap();
    assert_eq!(outcomes, vec![StageOutcome::Processed, StageOutcome::Duplicate]);

    let first = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(first.original_message_id, "<m1@mail.test>");
}

#[tokio::test]
async fn concurrent_deliveries_claim_once() {
    let harness = TestHarness::builder().build().await.unwrap();
    let raw = |id: &str| RawMail {
        schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        id: id.to_string(),
        sender: "vendor@nobody.test".to_string(),
        subject: "Invoice".to_string(),
        blob_url: "file:///nowhere/a.pdf".to_string(),
        received_at: harness.received_at,
        original_message_id: "<race@mail.test>".to_string(),
        vendor_name: None,
    };
    let (a, b) = (raw("tx-a"), raw("tx-b"));

    let (first, second) = tokio::join!(
        stages::enrich(&harness.ctx, &a),
        stages::enrich(&harness.ctx, &b)
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| o.to_string());
    assert_eq!(outcomes, vec![StageOutcome::Duplicate, StageOutcome::Unknown]);
    assert_eq!(harness.mail.sent_to("vendor@nobody.test").await.len(), 1);
}

fn enriched(tx: &Transaction) -> EnrichedInvoice {
    EnrichedInvoice {
        schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        id: tx.id.clone(),
        vendor_name: tx.vendor_name.clone(),
        expense_dept: tx.expense_dept.clone(),
        gl_code: tx.gl_code.clone(),
        allocation_schedule: String::new(),
        billing_party: String::new(),
        blob_url: "file:///nowhere/a.pdf".to_string(),
        original_message_id: tx.original_message_id.clone(),
        status: InvoiceStatus::Enriched,
        invoice_hash: tx.invoice_hash.clone(),
        invoice_amount: None,
        currency: "USD".to_string(),
        due_date: None,
        payment_terms: "Net 30".to_string(),
        sender_email: tx.sender_email.clone(),
        reason: None,
    }
}

#[tokio::test]
async fn post_refuses_a_second_invoice_with_a_posted_hash() {
    let harness = TestHarness::builder().build().await.unwrap();
    let store = harness.storage.clone();

    let mut original = Transaction::new("<orig@mail.test>", TransactionStatus::Processed);
    original.invoice_hash = "hash-1".to_string();
    original.vendor_name = "Adobe Inc".to_string();
    assert!(store.insert_transaction_if_absent(&original).await.unwrap());

    let mut copy = Transaction::new("<copy@mail.test>", TransactionStatus::Enriched);
    copy.invoice_hash = "hash-1".to_string();
    copy.vendor_name = "Adobe Inc".to_string();
    assert!(store.insert_transaction_if_absent(&copy).await.unwrap());

    let outcome = stages::post(&harness.ctx, &enriched(&copy)).await.unwrap();
    assert_eq!(outcome, StageOutcome::Duplicate);
    assert_eq!(harness.mail.send_attempts(), 0);

    let stored = store.get_transaction(&copy.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Error);
    assert!(stored.error_message.unwrap().contains(&original.id));

    harness.drain_notify().await.unwrap();
    assert_eq!(
        harness.notifier.delivered_of(NotificationKind::Duplicate).await.len(),
        1
    );
}

#[tokio::test]
async fn post_is_skipped_for_an_already_processed_transaction() {
    let harness = TestHarness::builder().build().await.unwrap();
    let mut tx = Transaction::new("<done@mail.test>", TransactionStatus::Processed);
    tx.invoice_hash = "hash-2".to_string();
    harness.storage.insert_transaction_if_absent(&tx).await.unwrap();

    let outcome = stages::post(&harness.ctx, &enriched(&tx)).await.unwrap();
    assert_eq!(outcome, StageOutcome::Skipped("already_processed"));
    assert_eq!(harness.mail.send_attempts(), 0);
}

#[tokio::test]
async fn failed_send_releases_the_claim_for_redelivery() {
    let harness = adobe_harness_with(immediate_redelivery).await;
    let message = harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_ingest().await.unwrap();
    harness.drain_enrich().await.unwrap();

    harness.mail.set_fail_sends(true);
    let post = harness.worker(Arc::new(PostHandler));
    let outcome = post.process_next().await.unwrap().unwrap();
    assert!(matches!(outcome, StageOutcome::Failed(_)));

    // Retries run inside the breaker, so one guarded call is one failure.
    assert_eq!(harness.mail.send_attempts(), 3);
    assert_eq!(harness.ctx.breakers.mail.consecutive_failures(), 1);

    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Enriched);

    harness.mail.set_fail_sends(false);
    let outcome = post.process_next().await.unwrap().unwrap();
    assert_eq!(outcome, StageOutcome::Processed);
    assert_eq!(harness.mail.sent_to(AP_MAILBOX).await.len(), 1);
    assert_eq!(harness.ctx.breakers.mail.consecutive_failures(), 0);

    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Processed);
}

#[tokio::test]
async fn reseller_invoice_is_held_for_manual_allocation() {
    let mut cdw = vendor("CDW", "6200");
    cdw.product_category = "Reseller".to_string();
    let harness = TestHarness::builder()
        .with_vendors(vec![cdw])
        .build()
        .await
        .unwrap();
    harness.extractor.set_default_vendor(Some("CDW")).await;
    let message = harness
        .deliver("m1", "ar@cdw.com", "Invoice", &["cdw.pdf"])
        .await;

    harness.run_pipeline().await.unwrap();

    assert_eq!(harness.mail.send_attempts(), 0);
    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Unknown);
    let unknown = harness.notifier.delivered_of(NotificationKind::Unknown).await;
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].details.get("reason").map(String::as_str), Some("reseller"));
}

#[tokio::test]
async fn extraction_outage_falls_back_to_sender_domain() {
    let harness = adobe_harness().await;
    harness.extractor.set_failing(true);
    harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;

    harness.run_pipeline().await.unwrap();

    let to_ap = harness.mail.sent_to(AP_MAILBOX).await;
    assert_eq!(to_ap.len(), 1);
    assert_eq!(to_ap[0].subject, "Invoice: Adobe Inc - GL 6100");
}

#[tokio::test]
async fn dedup_lookups_fail_open_but_the_claim_still_holds() {
    let harness = TestHarness::builder()
        .with_vendors(vec![vendor("Adobe Inc", "6100")])
        .with_failing_store()
        .build()
        .await
        .unwrap();
    harness.extractor.set_default_vendor(Some("Adobe Inc")).await;
    let failing = harness.failing_store.clone().unwrap();
    failing.set_fail_lookups(true);

    harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_pipeline().await.unwrap();
    assert_eq!(harness.mail.sent_to(AP_MAILBOX).await.len(), 1);

    harness.mail.mark_unread("m1").await;
    harness.run_ingest().await.unwrap();
    assert_eq!(harness.drain_enrich().await.unwrap(), vec![StageOutcome::Duplicate]);
    assert_eq!(harness.mail.sent_to(AP_MAILBOX).await.len(), 1);
}

#[tokio::test]
async fn storage_outage_leaves_the_message_for_redelivery() {
    let harness = TestHarness::builder()
        .with_vendors(vec![vendor("Adobe Inc", "6100")])
        .with_config(immediate_redelivery)
        .with_failing_store()
        .build()
        .await
        .unwrap();
    harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_ingest().await.unwrap();

    let failing = harness.failing_store.clone().unwrap();
    failing.set_fail_all(true);
    let enrich = harness.worker(Arc::new(EnrichHandler));
    let outcome = enrich.process_next().await.unwrap().unwrap();
    assert!(matches!(outcome, StageOutcome::Failed(_)));

    failing.set_fail_all(false);
    let outcome = enrich.process_next().await.unwrap().unwrap();
    assert_eq!(outcome, StageOutcome::Processed);
}

#[tokio::test]
async fn failed_notifications_are_dropped_not_redelivered() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.notifier.set_failing(true);
    harness
        .deliver("m1", "vendor@nobody.test", "Invoice", &["bill.pdf"])
        .await;

    harness.run_pipeline().await.unwrap();
    assert!(harness.notifier.delivered().await.is_empty());
    assert!(harness.drain_notify().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_payload_is_poisoned_after_one_attempt() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .storage
        .enqueue(RawMail::QUEUE, "{not json")
        .await
        .unwrap();

    let outcomes = harness.drain_enrich().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], StageOutcome::Failed(_)));

    let poison = harness.storage.list_poison(Some(RawMail::QUEUE)).await.unwrap();
    assert_eq!(poison.len(), 1);
    assert_eq!(poison[0].dequeue_count, 1);
    assert!(poison[0].last_error.as_deref().unwrap().contains("malformed"));

    harness.storage.requeue_poison(poison[0].id).await.unwrap();
    assert!(harness.storage.list_poison(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn recipient_outside_allow_list_is_poisoned_without_sending() {
    let harness = adobe_harness_with(|c| {
        c.mailbox.allowed_recipients = vec!["controller@example.com".to_string()];
    })
    .await;
    let message = harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_ingest().await.unwrap();
    harness.drain_enrich().await.unwrap();

    let outcomes = harness.drain_post().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(harness.mail.send_attempts(), 0);
    assert_eq!(harness.ctx.breakers.mail.consecutive_failures(), 0);

    let poison = harness
        .storage
        .list_poison(Some(EnrichedInvoice::QUEUE))
        .await
        .unwrap();
    assert_eq!(poison.len(), 1);
    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Enriched);
}

#[tokio::test]
async fn mail_outage_backs_off_instead_of_poisoning() {
    let harness = adobe_harness().await;
    let message = harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_ingest().await.unwrap();
    harness.drain_enrich().await.unwrap();

    harness.mail.set_fail_sends(true);
    let outcomes = harness.drain_post().await.unwrap();
    assert_eq!(outcomes.len(), 1, "a failed entry must not be redelivered at once");
    assert!(matches!(outcomes[0], StageOutcome::Failed(_)));
    assert_eq!(harness.mail.send_attempts(), 3);
    assert!(harness.storage.list_poison(None).await.unwrap().is_empty());

    // Still hidden after the outage clears: redelivery waits for the backoff.
    harness.mail.set_fail_sends(false);
    assert!(harness.drain_post().await.unwrap().is_empty());
    let tx = harness.transaction_for(&message).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Enriched);
}

#[tokio::test]
async fn open_circuit_defers_without_spending_deliveries() {
    let harness = TestHarness::builder()
        .with_vendors(vec![
            vendor("Adobe Inc", "6100"),
            vendor("Microsoft Corporation", "6300"),
        ])
        .with_config(|c| c.resilience.mail.fail_max = 1)
        .build()
        .await
        .unwrap();
    harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["adobe.pdf"])
        .await;
    harness
        .deliver("m2", "billing@microsoft.com", "Invoice 7", &["msft.pdf"])
        .await;
    harness.run_ingest().await.unwrap();
    assert_eq!(
        harness.drain_enrich().await.unwrap(),
        vec![StageOutcome::Processed, StageOutcome::Processed]
    );

    harness.mail.set_fail_sends(true);
    let outcomes = harness.drain_post().await.unwrap();
    assert_eq!(outcomes.len(), 2);
    match &outcomes[1] {
        StageOutcome::Failed(reason) => assert!(reason.contains("circuit open"), "{reason}"),
        other => panic!("expected a failure, got {other:?}"),
    }

    // The second invoice never reached the mail service.
    assert_eq!(harness.mail.send_attempts(), 3);
    assert_eq!(harness.ctx.breakers.mail.state(), CircuitState::Open);
    let wait = harness.ctx.breakers.mail.retry_after().unwrap();
    assert!(wait > Duration::from_secs(50), "{wait:?}");
    assert!(harness.storage.list_poison(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn redelivered_duplicate_is_announced_once() {
    let harness = adobe_harness().await;
    harness
        .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv-42.pdf"])
        .await;
    harness.run_pipeline().await.unwrap();

    let copy = RawMail {
        schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        id: "tx-copy".to_string(),
        sender: "billing@adobe.com".to_string(),
        subject: "Fwd: Invoice 42".to_string(),
        blob_url: "file:///nowhere/copy.pdf".to_string(),
        received_at: harness.received_at,
        original_message_id: "<m2@mail.test>".to_string(),
        vendor_name: Some("Adobe Inc".to_string()),
    };
    let first = stages::enrich(&harness.ctx, &copy).await.unwrap();
    let second = stages::enrich(&harness.ctx, &copy).await.unwrap();
    assert_eq!(first, StageOutcome::Duplicate);
    assert_eq!(second, StageOutcome::Duplicate);

    harness.drain_notify().await.unwrap();
    let duplicates = harness.notifier.delivered_of(NotificationKind::Duplicate).await;
    assert_eq!(duplicates.len(), 1);
    assert_eq!(
        duplicates[0].details.get("transaction_id").map(String::as_str),
        Some("tx-copy")
    );
}

#[tokio::test]
async fn redelivered_hold_notice_is_queued_once() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .deliver("m1", "vendor@nobody.test", "Invoice", &["bill.pdf"])
        .await;
    harness.run_ingest().await.unwrap();
    harness.drain_enrich().await.unwrap();

    let entry = harness
        .storage
        .dequeue(EnrichedInvoice::QUEUE, Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    let invoice = EnrichedInvoice::from_json(&entry.payload).unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Unknown);

    let first = stages::post(&harness.ctx, &invoice).await.unwrap();
    let second = stages::post(&harness.ctx, &invoice).await.unwrap();
    assert_eq!(first, StageOutcome::Unknown);
    assert_eq!(second, StageOutcome::Skipped("already_notified"));

    harness.drain_notify().await.unwrap();
    assert_eq!(
        harness.notifier.delivered_of(NotificationKind::Unknown).await.len(),
        1
    );
}

#[tokio::test]
async fn unknown_invoice_is_queued_before_the_registration_email() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.mail.set_fail_sends(true);
    harness
        .deliver("m1", "vendor@nobody.test", "Invoice", &["bill.pdf"])
        .await;
    harness.run_ingest().await.unwrap();
    assert_eq!(harness.drain_enrich().await.unwrap(), vec![StageOutcome::Unknown]);

    // Queue ids are shared across queues, so they give the emit order.
    let hide = Duration::from_secs(30);
    let invoice = harness
        .storage
        .dequeue(EnrichedInvoice::QUEUE, hide)
        .await
        .unwrap()
        .unwrap();
    let send_failure = harness
        .storage
        .dequeue(NotificationMessage::QUEUE, hide)
        .await
        .unwrap()
        .unwrap();
    assert!(invoice.id < send_failure.id);
    let notice = NotificationMessage::from_json(&send_failure.payload).unwrap();
    assert_eq!(notice.kind, NotificationKind::Error);
}

#[tokio::test]
async fn missing_mailbox_configuration_fails_fast() {
    let harness = TestHarness::builder()
        .with_config(|c| c.mailbox.ap_mailbox = String::new())
        .build()
        .await
        .unwrap();
    harness
        .deliver("m1", "billing@adobe.com", "Invoice", &["a.pdf"])
        .await;

    assert!(harness.run_ingest().await.is_err());
    assert!(!harness.mail.is_read("m1").await);
}
