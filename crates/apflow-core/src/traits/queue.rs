// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-least-once message queue trait with visibility timeout and poison queue.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApflowError;
use crate::types::QueueEntry;

/// Durable queue between pipeline stages.
///
/// A dequeued entry is hidden for the visibility timeout. If it is neither
/// acked nor released in that window it becomes visible again. Entries that
/// have been delivered `max_deliveries` times move to the poison queue.
#[async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, ApflowError>;

    async fn dequeue(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueEntry>, ApflowError>;

    /// Marks an entry completed.
    async fn ack(&self, id: i64) -> Result<(), ApflowError>;

    /// Hides a failed entry for `delay`, recording why it failed.
    async fn release(&self, id: i64, error: &str, delay: Duration) -> Result<(), ApflowError>;

    /// Like `release`, without counting the attempt toward `max_deliveries`.
    async fn defer(&self, id: i64, error: &str, delay: Duration) -> Result<(), ApflowError>;

    /// Moves an entry to the poison queue without further deliveries.
    async fn poison(&self, id: i64, error: &str) -> Result<(), ApflowError>;

    async fn list_poison(&self, queue_name: Option<&str>) -> Result<Vec<QueueEntry>, ApflowError>;

    /// Moves a poison entry back to pending with a fresh delivery count.
    async fn requeue_poison(&self, id: i64) -> Result<(), ApflowError>;
}
