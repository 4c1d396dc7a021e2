// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IMAP/SMTP mail service adapter for apflow.
//!
//! Reads the ingest folder over IMAP (TLS via `tokio-rustls` with the
//! webpki root store), parses messages with `mail-parser`, and sends mail
//! through an SMTP relay with `lettre`. Message ids handed to the pipeline
//! are IMAP UIDs.

pub mod imap;
pub mod parse;
pub mod service;
pub mod smtp;

pub use service::EmailMailService;
