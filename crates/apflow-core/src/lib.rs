// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for apflow, the accounts-payable invoice routing pipeline.
//!
//! This crate provides the error type, domain types, versioned stage
//! envelopes, and the collaborator traits every adapter implements.

pub mod error;
pub mod messages;
pub mod traits;
pub mod types;

pub use error::ApflowError;
pub use messages::{
    EnrichedInvoice, Envelope, IngestTrigger, InvoiceStatus, NotificationKind,
    NotificationMessage, RawMail,
};
pub use types::{AdapterType, HealthStatus, PostClaim, Transaction, TransactionStatus, Vendor};

pub use traits::{
    DocumentExtractor, EntityStore, MailService, MessageQueue, Notifier, ObjectStore,
    PluginAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_mail_service<T: MailService>() {}
        fn _assert_object_store<T: ObjectStore>() {}
        fn _assert_extractor<T: DocumentExtractor>() {}
        fn _assert_notifier<T: Notifier>() {}
        fn _assert_entity_store<T: EntityStore>() {}
        fn _assert_message_queue<T: MessageQueue>() {}
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;
        let parsed = AdapterType::from_str(&AdapterType::MailService.to_string()).unwrap();
        assert_eq!(parsed, AdapterType::MailService);
    }
}
