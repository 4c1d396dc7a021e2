// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction queries: insert-if-absent claims, dedup lookups, and the
//! conditional `enriched -> processed` transition.

use std::str::FromStr;

use apflow_core::types::now_timestamp;
use apflow_core::{ApflowError, PostClaim, Transaction, TransactionStatus};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const COLUMNS: &str = "id, partition_key, vendor_name, sender_email, recipient_email,
    expense_dept, gl_code, status, original_message_id, invoice_hash,
    emails_sent_count, last_email_sent_at, error_message, created_at, updated_at";

fn row_to_transaction(row: &Row<'_>) -> Result<Transaction, rusqlite::Error> {
    let status: String = row.get(7)?;
    let status = TransactionStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Transaction {
        id: row.get(0)?,
        partition_key: row.get(1)?,
        vendor_name: row.get(2)?,
        sender_email: row.get(3)?,
        recipient_email: row.get(4)?,
        expense_dept: row.get(5)?,
        gl_code: row.get(6)?,
        status,
        original_message_id: row.get(8)?,
        invoice_hash: row.get(9)?,
        emails_sent_count: row.get(10)?,
        last_email_sent_at: row.get(11)?,
        error_message: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn select_one(
    conn: &rusqlite::Connection,
    filter: &str,
    value: &str,
) -> Result<Option<Transaction>, rusqlite::Error> {
    let sql = format!("SELECT {COLUMNS} FROM transactions WHERE {filter} LIMIT 1");
    conn.query_row(&sql, params![value], row_to_transaction)
        .optional()
}

/// Insert unless a row with the same id or `original_message_id` exists.
///
/// Returns true iff this call inserted the row.
pub async fn insert_if_absent(db: &Database, tx: &Transaction) -> Result<bool, ApflowError> {
    let tx = tx.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO transactions (
                    id, partition_key, vendor_name, sender_email, recipient_email,
                    expense_dept, gl_code, status, original_message_id, invoice_hash,
                    emails_sent_count, last_email_sent_at, error_message, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    tx.id,
                    tx.partition_key,
                    tx.vendor_name,
                    tx.sender_email,
                    tx.recipient_email,
                    tx.expense_dept,
                    tx.gl_code,
                    tx.status.to_string(),
                    tx.original_message_id,
                    tx.invoice_hash,
                    tx.emails_sent_count,
                    tx.last_email_sent_at,
                    tx.error_message,
                    tx.created_at,
                    tx.updated_at,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Transaction>, ApflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_one(conn, "id = ?1", &id))
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_message_id(
    db: &Database,
    original_message_id: &str,
) -> Result<Option<Transaction>, ApflowError> {
    let message_id = original_message_id.to_string();
    db.connection()
        .call(move |conn| select_one(conn, "original_message_id = ?1", &message_id))
        .await
        .map_err(map_tr_err)
}

/// Oldest transaction with this invoice hash. Empty hashes never match.
pub async fn find_by_hash(
    db: &Database,
    invoice_hash: &str,
) -> Result<Option<Transaction>, ApflowError> {
    if invoice_hash.is_empty() {
        return Ok(None);
    }
    let hash = invoice_hash.to_string();
    db.connection()
        .call(move |conn| {
            select_one(
                conn,
                "invoice_hash = ?1 ORDER BY created_at ASC, id ASC",
                &hash,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically move `id` from `enriched` to `processed`.
///
/// The guard clause refuses the transition when another transaction with the
/// same non-empty invoice hash is already processed, so two deliveries of the
/// same real-world invoice can never both win.
pub async fn claim_for_post(db: &Database, id: &str) -> Result<PostClaim, ApflowError> {
    let id = id.to_string();
    let claim = db
        .connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE transactions SET status = 'processed', updated_at = ?2
                 WHERE id = ?1 AND status = 'enriched'
                   AND NOT EXISTS (
                       SELECT 1 FROM transactions other
                       WHERE other.invoice_hash = transactions.invoice_hash
                         AND other.invoice_hash != ''
                         AND other.id != transactions.id
                         AND other.status = 'processed'
                   )",
                params![id, now_timestamp()],
            )?;
            if changed == 1 {
                return Ok(Some(PostClaim::Claimed));
            }

            let Some(current) = select_one(conn, "id = ?1", &id)? else {
                return Ok(None);
            };
            if current.status != TransactionStatus::Enriched {
                return Ok(Some(PostClaim::AlreadyProcessed));
            }
            let sql = format!(
                "SELECT {COLUMNS} FROM transactions
                 WHERE invoice_hash = ?1 AND id != ?2 AND status = 'processed'
                 ORDER BY created_at ASC, id ASC LIMIT 1"
            );
            let original = conn
                .query_row(&sql, params![current.invoice_hash, id], row_to_transaction)
                .optional()?;
            Ok(Some(match original {
                Some(original) => PostClaim::DuplicateOf(Box::new(original)),
                // The sibling changed status between the two statements.
                None => PostClaim::AlreadyProcessed,
            }))
        })
        .await
        .map_err(map_tr_err)?;

    claim.ok_or_else(|| ApflowError::Validation("transaction not found for post claim".into()))
}

/// Revert a claimed transaction to `enriched` so a redelivery can retry the send.
pub async fn release_post_claim(db: &Database, id: &str) -> Result<(), ApflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE transactions SET status = 'enriched', updated_at = ?2
                 WHERE id = ?1 AND status = 'processed'",
                params![id, now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp `notice_queued_at` unless it is already set.
pub async fn claim_notice(db: &Database, id: &str) -> Result<bool, ApflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE transactions SET notice_queued_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND notice_queued_at IS NULL",
                params![id, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn release_notice_claim(db: &Database, id: &str) -> Result<(), ApflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE transactions SET notice_queued_at = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_error(db: &Database, id: &str, message: &str) -> Result<(), ApflowError> {
    let id = id.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE transactions SET status = 'error', error_message = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id, message, now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_email_sent(db: &Database, id: &str) -> Result<(), ApflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let now = now_timestamp();
            conn.execute(
                "UPDATE transactions
                 SET emails_sent_count = emails_sent_count + 1,
                     last_email_sent_at = ?2, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent transactions first.
pub async fn list(db: &Database, limit: i64) -> Result<Vec<Transaction>, ApflowError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM transactions ORDER BY id DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], row_to_transaction)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
