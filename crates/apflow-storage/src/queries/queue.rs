// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations with visibility timeout and poison handling.

use std::time::Duration;

use apflow_core::types::{format_timestamp, QueueEntry};
use apflow_core::ApflowError;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, queue_name, payload, status, dequeue_count, max_deliveries,
    visible_at, last_error, created_at, updated_at";

fn row_to_entry(row: &Row<'_>) -> Result<QueueEntry, rusqlite::Error> {
    Ok(QueueEntry {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        dequeue_count: row.get(4)?,
        max_deliveries: row.get(5)?,
        visible_at: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn queue_error(message: String) -> ApflowError {
    ApflowError::Queue { message }
}

/// Enqueue a new item. Returns the auto-generated queue entry ID.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_deliveries: u32,
) -> Result<i64, ApflowError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            let now = format_timestamp(&Utc::now());
            conn.execute(
                "INSERT INTO queue
                     (queue_name, payload, max_deliveries, visible_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
                params![queue_name, payload, max_deliveries, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next visible entry from the named queue.
///
/// An entry is visible when it is pending, or when it is processing and its
/// visibility timeout has lapsed (the previous consumer never acked it).
/// Visible entries that already used all their deliveries are moved to
/// `poison` first. The returned entry is hidden for `visibility_timeout`.
pub async fn dequeue(
    db: &Database,
    queue_name: &str,
    visibility_timeout: Duration,
) -> Result<Option<QueueEntry>, ApflowError> {
    let queue_name = queue_name.to_string();
    let visibility = chrono::Duration::from_std(visibility_timeout)
        .map_err(|e| queue_error(format!("invalid visibility timeout: {e}")))?;

    db.connection()
        .call(move |conn| {
            let now = Utc::now();
            let now_str = format_timestamp(&now);
            let hidden_until = format_timestamp(&(now + visibility));

            let tx = conn.transaction()?;

            let poisoned = tx.execute(
                "UPDATE queue SET status = 'poison', updated_at = ?2
                 WHERE queue_name = ?1 AND status IN ('pending', 'processing')
                   AND visible_at <= ?2 AND dequeue_count >= max_deliveries",
                params![queue_name, now_str],
            )?;
            if poisoned > 0 {
                tracing::warn!(
                    queue = %queue_name,
                    count = poisoned,
                    "moved entries to poison queue"
                );
            }

            let sql = format!(
                "SELECT {COLUMNS} FROM queue
                 WHERE queue_name = ?1 AND status IN ('pending', 'processing')
                   AND visible_at <= ?2
                 ORDER BY id ASC
                 LIMIT 1"
            );
            let entry = tx
                .query_row(&sql, params![queue_name, now_str], row_to_entry)
                .optional()?;

            let Some(entry) = entry else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE queue SET status = 'processing', dequeue_count = dequeue_count + 1,
                     visible_at = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![entry.id, hidden_until, now_str],
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                status: "processing".to_string(),
                dequeue_count: entry.dequeue_count + 1,
                visible_at: hidden_until,
                updated_at: now_str,
                ..entry
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), ApflowError> {
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', updated_at = ?2 WHERE id = ?1",
                params![id, format_timestamp(&Utc::now())],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(queue_error(format!("queue entry {id} not found")));
    }
    Ok(())
}

/// Hide a failed processing entry for `delay`, recording the failure.
///
/// Entries already completed or poisoned are left untouched.
pub async fn release(
    db: &Database,
    id: i64,
    error: &str,
    delay: Duration,
) -> Result<(), ApflowError> {
    reschedule(db, id, error, delay, 0).await
}

/// Like [`release`], but hands the delivery back: the attempt never reached
/// the dependency, so it does not count toward `max_deliveries`.
pub async fn defer(
    db: &Database,
    id: i64,
    error: &str,
    delay: Duration,
) -> Result<(), ApflowError> {
    reschedule(db, id, error, delay, 1).await
}

async fn reschedule(
    db: &Database,
    id: i64,
    error: &str,
    delay: Duration,
    refund: u32,
) -> Result<(), ApflowError> {
    let error = error.to_string();
    let delay = chrono::Duration::from_std(delay)
        .map_err(|e| queue_error(format!("invalid redelivery delay: {e}")))?;
    db.connection()
        .call(move |conn| {
            let now = Utc::now();
            conn.execute(
                "UPDATE queue SET status = 'pending', visible_at = ?2, last_error = ?3,
                     dequeue_count = MAX(dequeue_count - ?4, 0), updated_at = ?5
                 WHERE id = ?1 AND status = 'processing'",
                params![
                    id,
                    format_timestamp(&(now + delay)),
                    error,
                    refund,
                    format_timestamp(&now)
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move a processing entry straight to `poison`.
pub async fn poison(db: &Database, id: i64, error: &str) -> Result<(), ApflowError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'poison', last_error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'processing'",
                params![id, error, format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Poison entries, optionally restricted to one queue.
pub async fn list_poison(
    db: &Database,
    queue_name: Option<&str>,
) -> Result<Vec<QueueEntry>, ApflowError> {
    let queue_name = queue_name.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM queue
                 WHERE status = 'poison' AND (?1 IS NULL OR queue_name = ?1)
                 ORDER BY id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![queue_name], row_to_entry)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Move a poison entry back to pending with its delivery count reset.
pub async fn requeue_poison(db: &Database, id: i64) -> Result<(), ApflowError> {
    let changed = db
        .connection()
        .call(move |conn| {
            let now = format_timestamp(&Utc::now());
            conn.execute(
                "UPDATE queue SET status = 'pending', dequeue_count = 0, visible_at = ?2,
                     updated_at = ?2
                 WHERE id = ?1 AND status = 'poison'",
                params![id, now],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(queue_error(format!("no poison entry with id {id}")));
    }
    Ok(())
}
