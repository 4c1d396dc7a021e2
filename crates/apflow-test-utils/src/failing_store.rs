// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity store wrapper that injects storage failures.
//!
//! Delegates to a real store and fails selected groups of operations, so
//! tests can check which lookups fail open and which errors propagate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::store::EntityStore;
use apflow_core::types::{AdapterType, HealthStatus, PostClaim, Transaction, Vendor};
use apflow_core::ApflowError;

pub struct FailingEntityStore {
    inner: Arc<dyn EntityStore>,
    fail_lookups: AtomicBool,
    fail_rate_limits: AtomicBool,
    fail_all: AtomicBool,
}

impl FailingEntityStore {
    /// Wrap `inner` with every failure switched off.
    pub fn new(inner: Arc<dyn EntityStore>) -> Self {
        Self {
            inner,
            fail_lookups: AtomicBool::new(false),
            fail_rate_limits: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
        }
    }

    /// Fail the dedup lookups: by message id and by invoice hash.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_rate_limits(&self, fail: bool) {
        self.fail_rate_limits.store(fail, Ordering::SeqCst);
    }

    /// Fail every operation, including health checks.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn check(&self, group: &AtomicBool) -> Result<(), ApflowError> {
        if self.fail_all.load(Ordering::SeqCst) || group.load(Ordering::SeqCst) {
            return Err(ApflowError::Storage {
                source: "injected storage failure".into(),
            });
        }
        Ok(())
    }

    fn check_all(&self) -> Result<(), ApflowError> {
        self.check(&self.fail_all)
    }
}

#[async_trait]
impl PluginAdapter for FailingEntityStore {
    fn name(&self) -> &str {
        "failing-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("injected storage failure".to_string()));
        }
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl EntityStore for FailingEntityStore {
    async fn insert_transaction_if_absent(&self, tx: &Transaction) -> Result<bool, ApflowError> {
        self.check_all()?;
        self.inner.insert_transaction_if_absent(tx).await
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, ApflowError> {
        self.check_all()?;
        self.inner.get_transaction(id).await
    }

    async fn find_transaction_by_message_id(
        &self,
        original_message_id: &str,
    ) -> Result<Option<Transaction>, ApflowError> {
        self.check(&self.fail_lookups)?;
        self.inner
            .find_transaction_by_message_id(original_message_id)
            .await
    }

    async fn find_transaction_by_hash(
        &self,
        invoice_hash: &str,
    ) -> Result<Option<Transaction>, ApflowError> {
        self.check(&self.fail_lookups)?;
        self.inner.find_transaction_by_hash(invoice_hash).await
    }

    async fn claim_for_post(&self, id: &str) -> Result<PostClaim, ApflowError> {
        self.check_all()?;
        self.inner.claim_for_post(id).await
    }

    async fn release_post_claim(&self, id: &str) -> Result<(), ApflowError> {
        self.check_all()?;
        self.inner.release_post_claim(id).await
    }

    async fn claim_notice(&self, id: &str) -> Result<bool, ApflowError> {
        self.check_all()?;
        self.inner.claim_notice(id).await
    }

    async fn release_notice_claim(&self, id: &str) -> Result<(), ApflowError> {
        self.check_all()?;
        self.inner.release_notice_claim(id).await
    }

    async fn mark_transaction_error(&self, id: &str, message: &str) -> Result<(), ApflowError> {
        self.check_all()?;
        self.inner.mark_transaction_error(id, message).await
    }

    async fn record_email_sent(&self, id: &str) -> Result<(), ApflowError> {
        self.check_all()?;
        self.inner.record_email_sent(id).await
    }

    async fn list_transactions(&self, limit: i64) -> Result<Vec<Transaction>, ApflowError> {
        self.check_all()?;
        self.inner.list_transactions(limit).await
    }

    async fn list_active_vendors(&self) -> Result<Vec<Vendor>, ApflowError> {
        self.check_all()?;
        self.inner.list_active_vendors().await
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, ApflowError> {
        self.check_all()?;
        self.inner.list_vendors().await
    }

    async fn upsert_vendor(&self, vendor: &Vendor) -> Result<(), ApflowError> {
        self.check_all()?;
        self.inner.upsert_vendor(vendor).await
    }

    async fn try_increment_rate_limit(
        &self,
        row_key: &str,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, ApflowError> {
        self.check(&self.fail_rate_limits)?;
        self.inner
            .try_increment_rate_limit(row_key, max_requests, now)
            .await
    }
}
