// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. The conditional inserts and updates the pipeline relies on are
//! single SQL statements, so they stay atomic even across processes sharing
//! the database file.

use std::path::Path;

use apflow_core::ApflowError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Handle to the apflow SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs, and
    /// run pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, ApflowError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ApflowError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ApflowError::Storage {
                source: Box::new(e),
            })?;

        let journal = if wal_mode { "WAL" } else { "DELETE" };
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.pragma_update_and_check(None, "journal_mode", journal, |_| Ok(()))?;
            conn.execute_batch(
                "PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| run_migrations(conn))
            .await
            .map_err(|e: tokio_rusqlite::Error<refinery::Error>| ApflowError::Storage {
                source: format!("migration failed: {e}").into(),
            })?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying serialized connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL. The connection itself closes when the last clone drops.
    pub async fn close(&self) -> Result<(), ApflowError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into a storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ApflowError {
    ApflowError::Storage {
        source: e.to_string().into(),
    }
}
