// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod extractor;
pub mod mail;
pub mod notifier;
pub mod object_store;
pub mod queue;
pub mod store;

pub use adapter::PluginAdapter;
pub use extractor::DocumentExtractor;
pub use mail::MailService;
pub use notifier::Notifier;
pub use object_store::ObjectStore;
pub use queue::MessageQueue;
pub use store::EntityStore;
