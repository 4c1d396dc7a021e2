// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for apflow.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, the transaction, vendor and
//! rate-limit tables, a durable stage queue with visibility timeout and
//! poison status, and a filesystem object store for invoice PDFs.

pub mod adapter;
pub mod blob;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use blob::FsObjectStore;
pub use database::Database;
