// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for pipeline integration testing.
//!
//! `TestHarness` assembles a complete pipeline with mock mail, extraction
//! and chat collaborators over a temp SQLite database and a temp blob
//! directory. Stages are driven explicitly, one queue at a time, so tests
//! control ordering and redelivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use apflow_config::model::ApflowConfig;
use apflow_core::types::{MailMessage, normalize_vendor_key};
use apflow_core::{ApflowError, EntityStore, Transaction, Vendor};
use apflow_pipeline::stages::{self, IngestReport};
use apflow_pipeline::worker::{EnrichHandler, NotifyHandler, PostHandler};
use apflow_pipeline::{Collaborators, PipelineContext, StageHandler, StageOutcome, StageWorker};
use apflow_storage::{FsObjectStore, SqliteStorage};

use crate::failing_store::FailingEntityStore;
use crate::mock_extractor::MockExtractor;
use crate::mock_mail::{MockMailService, pdf_attachment};
use crate::mock_notifier::MockNotifier;

/// Ingest mailbox used by every harness.
pub const INGEST_MAILBOX: &str = "invoices@example.com";
/// AP mailbox used by every harness.
pub const AP_MAILBOX: &str = "ap@example.com";

type ConfigureFn = Box<dyn FnOnce(&mut ApflowConfig) + Send>;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    vendors: Vec<Vendor>,
    configure: Option<ConfigureFn>,
    failing_store: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            vendors: Vec::new(),
            configure: None,
            failing_store: false,
        }
    }

    /// Seed the vendor ledger.
    pub fn with_vendors(mut self, vendors: Vec<Vendor>) -> Self {
        self.vendors = vendors;
        self
    }

    /// Adjust the configuration before anything is built.
    pub fn with_config(
        mut self,
        configure: impl FnOnce(&mut ApflowConfig) + Send + 'static,
    ) -> Self {
        self.configure = Some(Box::new(configure));
        self
    }

    /// Route entity-store calls through a [`FailingEntityStore`].
    pub fn with_failing_store(mut self) -> Self {
        self.failing_store = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ApflowError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ApflowError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let blob_dir = temp_dir.path().join("blobs");

        let mut config = ApflowConfig::default();
        config.mailbox.ingest_mailbox = INGEST_MAILBOX.to_string();
        config.mailbox.ap_mailbox = AP_MAILBOX.to_string();
        config.storage.database_path = db_path.to_string_lossy().to_string();
        config.storage.blob_dir = blob_dir.to_string_lossy().to_string();
        config.resilience.retry.initial_delay_ms = 1;
        if let Some(configure) = self.configure {
            configure(&mut config);
        }

        let storage = Arc::new(SqliteStorage::new(
            config.storage.clone(),
            config.queue.max_deliveries,
        ));
        storage.initialize().await?;
        for vendor in &self.vendors {
            storage.upsert_vendor(vendor).await?;
        }

        let failing_store = self
            .failing_store
            .then(|| Arc::new(FailingEntityStore::new(storage.clone())));
        let store: Arc<dyn EntityStore> = match &failing_store {
            Some(failing) => failing.clone(),
            None => storage.clone(),
        };

        let mail = Arc::new(MockMailService::new());
        let extractor = Arc::new(MockExtractor::new());
        let notifier = Arc::new(MockNotifier::new());
        let objects = Arc::new(FsObjectStore::new(&blob_dir));

        let ctx = Arc::new(PipelineContext::new(
            &config,
            Collaborators {
                store,
                queue: storage.clone(),
                mail: mail.clone(),
                objects: objects.clone(),
                extractor: extractor.clone(),
                notifier: notifier.clone(),
            },
        ));

        Ok(TestHarness {
            ctx,
            storage,
            failing_store,
            mail,
            extractor,
            notifier,
            objects,
            config,
            received_at: Utc::now(),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline with mock collaborators and temp storage.
pub struct TestHarness {
    /// The shared pipeline context every stage runs against.
    pub ctx: Arc<PipelineContext>,
    /// SQLite storage (entity store and queue), cleaned up on drop.
    pub storage: Arc<SqliteStorage>,
    /// Present when built with [`TestHarnessBuilder::with_failing_store`].
    pub failing_store: Option<Arc<FailingEntityStore>>,
    pub mail: Arc<MockMailService>,
    pub extractor: Arc<MockExtractor>,
    pub notifier: Arc<MockNotifier>,
    pub objects: Arc<FsObjectStore>,
    pub config: ApflowConfig,
    /// Receive time given to every delivered message.
    pub received_at: DateTime<Utc>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Deliver an unread message with one PDF per name.
    ///
    /// The `Message-ID` header is derived from `id`, so delivering the same
    /// `id` twice models a mail server redelivering the message.
    pub async fn deliver(
        &self,
        id: &str,
        sender: &str,
        subject: &str,
        pdf_names: &[&str],
    ) -> MailMessage {
        let message = MailMessage {
            id: id.to_string(),
            internet_message_id: Some(format!("<{id}@mail.test>")),
            sender: sender.to_string(),
            subject: subject.to_string(),
            received_at: self.received_at,
        };
        let attachments = pdf_names.iter().map(|name| pdf_attachment(name)).collect();
        self.mail.deliver(message.clone(), attachments).await;
        message
    }

    pub fn worker(&self, handler: Arc<dyn StageHandler>) -> StageWorker {
        StageWorker::new(self.ctx.clone(), handler, Duration::from_millis(10))
    }

    pub async fn run_ingest(&self) -> Result<IngestReport, ApflowError> {
        stages::run_ingest(&self.ctx).await
    }

    pub async fn drain_enrich(&self) -> Result<Vec<StageOutcome>, ApflowError> {
        self.worker(Arc::new(EnrichHandler)).drain().await
    }

    pub async fn drain_post(&self) -> Result<Vec<StageOutcome>, ApflowError> {
        self.worker(Arc::new(PostHandler)).drain().await
    }

    pub async fn drain_notify(&self) -> Result<Vec<StageOutcome>, ApflowError> {
        self.worker(Arc::new(NotifyHandler)).drain().await
    }

    /// Ingest once, then drain enrich, post and notify in order.
    pub async fn run_pipeline(&self) -> Result<IngestReport, ApflowError> {
        let report = self.run_ingest().await?;
        self.drain_enrich().await?;
        self.drain_post().await?;
        self.drain_notify().await?;
        Ok(report)
    }

    /// The transaction created for a delivered message's first PDF.
    pub async fn transaction_for(
        &self,
        message: &MailMessage,
    ) -> Result<Option<Transaction>, ApflowError> {
        self.storage
            .find_transaction_by_message_id(message.stable_id())
            .await
    }
}

/// An active, non-reseller vendor.
pub fn vendor(name: &str, gl_code: &str) -> Vendor {
    Vendor {
        name: name.to_string(),
        row_key: normalize_vendor_key(name),
        expense_dept: "IT".to_string(),
        gl_code: gl_code.to_string(),
        allocation_schedule: "monthly".to_string(),
        billing_party: "HQ".to_string(),
        product_category: "software".to_string(),
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_seeds_vendors_and_delivers_mail() {
        let harness = TestHarness::builder()
            .with_vendors(vec![vendor("Adobe Inc", "6100")])
            .build()
            .await
            .unwrap();

        let vendors = harness.storage.list_active_vendors().await.unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].row_key, "adobe_inc");

        let message = harness
            .deliver("m1", "billing@adobe.com", "Invoice 42", &["inv.pdf"])
            .await;
        assert_eq!(message.stable_id(), "<m1@mail.test>");
        assert!(harness.transaction_for(&message).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn config_hook_is_applied() {
        let harness = TestHarness::builder()
            .with_config(|c| c.matching.fuzzy_threshold = 90.0)
            .build()
            .await
            .unwrap();
        assert_eq!(harness.ctx.resolver.threshold(), 90.0);
        assert!(harness.failing_store.is_none());
    }
}
