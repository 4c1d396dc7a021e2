// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the entity store and message queue traits.

use std::time::Duration;

use apflow_config::model::StorageConfig;
use apflow_core::types::QueueEntry;
use apflow_core::{
    AdapterType, ApflowError, EntityStore, HealthStatus, MessageQueue, PluginAdapter, PostClaim,
    Transaction, Vendor,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::database::Database;
use crate::queries;

/// SQLite-backed entity store and queue.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened by [`SqliteStorage::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    max_deliveries: u32,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage. Enqueued entries get `max_deliveries`.
    ///
    /// The database connection is not opened until [`initialize`](Self::initialize) is called.
    pub fn new(config: StorageConfig, max_deliveries: u32) -> Self {
        Self {
            config,
            max_deliveries,
            db: OnceCell::new(),
        }
    }

    /// Open the database and run migrations.
    pub async fn initialize(&self) -> Result<(), ApflowError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ApflowError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn db(&self) -> Result<&Database, ApflowError> {
        self.db.get().ok_or_else(|| ApflowError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteStorage {
    async fn insert_transaction_if_absent(&self, tx: &Transaction) -> Result<bool, ApflowError> {
        queries::transactions::insert_if_absent(self.db()?, tx).await
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, ApflowError> {
        queries::transactions::get(self.db()?, id).await
    }

    async fn find_transaction_by_message_id(
        &self,
        original_message_id: &str,
    ) -> Result<Option<Transaction>, ApflowError> {
        queries::transactions::find_by_message_id(self.db()?, original_message_id).await
    }

    async fn find_transaction_by_hash(
        &self,
        invoice_hash: &str,
    ) -> Result<Option<Transaction>, ApflowError> {
        queries::transactions::find_by_hash(self.db()?, invoice_hash).await
    }

    async fn claim_for_post(&self, id: &str) -> Result<PostClaim, ApflowError> {
        queries::transactions::claim_for_post(self.db()?, id).await
    }

    async fn release_post_claim(&self, id: &str) -> Result<(), ApflowError> {
        queries::transactions::release_post_claim(self.db()?, id).await
    }

    async fn claim_notice(&self, id: &str) -> Result<bool, ApflowError> {
        queries::transactions::claim_notice(self.db()?, id).await
    }

    async fn release_notice_claim(&self, id: &str) -> Result<(), ApflowError> {
        queries::transactions::release_notice_claim(self.db()?, id).await
    }

    async fn mark_transaction_error(&self, id: &str, message: &str) -> Result<(), ApflowError> {
        queries::transactions::mark_error(self.db()?, id, message).await
    }

    async fn record_email_sent(&self, id: &str) -> Result<(), ApflowError> {
        queries::transactions::record_email_sent(self.db()?, id).await
    }

    async fn list_transactions(&self, limit: i64) -> Result<Vec<Transaction>, ApflowError> {
        queries::transactions::list(self.db()?, limit).await
    }

    async fn list_active_vendors(&self) -> Result<Vec<Vendor>, ApflowError> {
        queries::vendors::list_active(self.db()?).await
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, ApflowError> {
        queries::vendors::list_all(self.db()?).await
    }

    async fn upsert_vendor(&self, vendor: &Vendor) -> Result<(), ApflowError> {
        queries::vendors::upsert(self.db()?, vendor).await
    }

    async fn try_increment_rate_limit(
        &self,
        row_key: &str,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, ApflowError> {
        queries::rate_limits::try_increment(self.db()?, row_key, max_requests, now).await
    }
}

#[async_trait]
impl MessageQueue for SqliteStorage {
    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, ApflowError> {
        queries::queue::enqueue(self.db()?, queue_name, payload, self.max_deliveries).await
    }

    async fn dequeue(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueEntry>, ApflowError> {
        queries::queue::dequeue(self.db()?, queue_name, visibility_timeout).await
    }

    async fn ack(&self, id: i64) -> Result<(), ApflowError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn release(&self, id: i64, error: &str, delay: Duration) -> Result<(), ApflowError> {
        queries::queue::release(self.db()?, id, error, delay).await
    }

    async fn defer(&self, id: i64, error: &str, delay: Duration) -> Result<(), ApflowError> {
        queries::queue::defer(self.db()?, id, error, delay).await
    }

    async fn poison(&self, id: i64, error: &str) -> Result<(), ApflowError> {
        queries::queue::poison(self.db()?, id, error).await
    }

    async fn list_poison(&self, queue_name: Option<&str>) -> Result<Vec<QueueEntry>, ApflowError> {
        queries::queue::list_poison(self.db()?, queue_name).await
    }

    async fn requeue_poison(&self, id: i64) -> Result<(), ApflowError> {
        queries::queue::requeue_poison(self.db()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apflow_core::TransactionStatus;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
            blob_dir: String::new(),
        }
    }

    #[tokio::test]
    async fn identity_and_health() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()), 5);

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
        assert!(storage.health_check().await.is_err(), "not initialized yet");

        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        assert!(storage.initialize().await.is_err(), "second initialize must fail");
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn store_and_queue_through_traits() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("traits.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()), 3);
        storage.initialize().await.unwrap();

        let store: &dyn EntityStore = &storage;
        let tx = Transaction::new("M1", TransactionStatus::Unknown);
        assert!(store.insert_transaction_if_absent(&tx).await.unwrap());
        assert!(store.find_transaction_by_message_id("M1").await.unwrap().is_some());

        let queue: &dyn MessageQueue = &storage;
        let id = queue.enqueue("notifications", "{}").await.unwrap();
        let entry = queue
            .dequeue("notifications", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.max_deliveries, 3);
        queue.ack(id).await.unwrap();
    }
}
