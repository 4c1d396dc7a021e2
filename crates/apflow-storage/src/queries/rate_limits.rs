// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-minute rate-limit counters.

use apflow_core::types::format_timestamp;
use apflow_core::ApflowError;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

/// Increment-or-create the counter at `row_key` in one conditional upsert.
///
/// Returns the new count, or `None` when the counter already reached
/// `max_requests` (the conflict update's guard fails and nothing is returned).
pub async fn try_increment(
    db: &Database,
    row_key: &str,
    max_requests: u32,
    now: DateTime<Utc>,
) -> Result<Option<u32>, ApflowError> {
    let row_key = row_key.to_string();
    let stamp = format_timestamp(&now);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "INSERT INTO rate_limits (row_key, request_count, first_request_at, last_request_at)
                 VALUES (?1, 1, ?2, ?2)
                 ON CONFLICT(row_key) DO UPDATE SET
                     request_count = request_count + 1,
                     last_request_at = excluded.last_request_at
                 WHERE rate_limits.request_count < ?3
                 RETURNING request_count",
                params![row_key, stamp, max_requests],
                |row| row.get::<_, u32>(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
