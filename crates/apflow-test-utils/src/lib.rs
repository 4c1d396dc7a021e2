// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for apflow integration tests.
//!
//! Mock collaborators with injectable inputs and captured outputs, plus a
//! [`TestHarness`] that wires them to a temp SQLite store and a temp blob
//! directory.

pub mod failing_store;
pub mod harness;
pub mod mock_extractor;
pub mod mock_mail;
pub mod mock_notifier;

pub use failing_store::FailingEntityStore;
pub use harness::{TestHarness, TestHarnessBuilder, vendor};
pub use mock_extractor::MockExtractor;
pub use mock_mail::{MockMailService, pdf_attachment};
pub use mock_notifier::MockNotifier;
