// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email loop prevention.
//!
//! Inbound: messages the pipeline itself produced (or replies to them) are
//! skipped before any work is done. Outbound: every recipient is checked so
//! that the pipeline never mails its own ingest mailbox.

use std::sync::LazyLock;

use apflow_core::ApflowError;
use regex::Regex;
use strum::Display;

/// Subject of a forwarded invoice, optionally behind reply/forward prefixes.
static OUTBOUND_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*((re|fwd?)\s*:\s*)*invoice:\s*.+\s-\s*gl\s+\S+").unwrap()
});

/// Leading reply/forward prefixes.
static REPLY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*((re|fwd?)\s*:\s*)+").unwrap());

/// Why an inbound message was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// Sent by the system mailbox itself.
    SelfSent,
    /// Subject matches the pipeline's outbound `Invoice: <vendor> - GL <code>` pattern.
    OutboundSubject,
    /// Reply to or forward of the vendor registration request.
    RegistrationReply,
}

/// Inbound skip rules and outbound recipient policy.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    ingest_mailbox: String,
    registration_subject: String,
    allowed_recipients: Vec<String>,
}

impl LoopGuard {
    pub fn new(
        ingest_mailbox: &str,
        registration_subject: &str,
        allowed_recipients: &[String],
    ) -> Self {
        Self {
            ingest_mailbox: normalize_address(ingest_mailbox),
            registration_subject: registration_subject.trim().to_lowercase(),
            allowed_recipients: allowed_recipients
                .iter()
                .map(|r| normalize_address(r))
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    /// Decide whether an inbound message must be ignored.
    pub fn should_skip(&self, sender: &str, subject: &str) -> Option<SkipReason> {
        if !self.ingest_mailbox.is_empty() && normalize_address(sender) == self.ingest_mailbox {
            return Some(SkipReason::SelfSent);
        }
        if is_outbound_subject(subject) {
            return Some(SkipReason::OutboundSubject);
        }
        if self.is_registration_reply(subject) {
            return Some(SkipReason::RegistrationReply);
        }
        None
    }

    fn is_registration_reply(&self, subject: &str) -> bool {
        if self.registration_subject.is_empty() {
            return false;
        }
        let stripped = REPLY_PREFIX.replace(subject, "");
        stripped
            .trim()
            .to_lowercase()
            .starts_with(&self.registration_subject)
    }

    /// Reject recipients that would feed mail back into the pipeline, or
    /// that fall outside the configured allow-list.
    ///
    /// Allow-list entries are full addresses or `@domain` suffixes.
    pub fn validate_recipient(&self, recipient: &str) -> Result<(), ApflowError> {
        let recipient = normalize_address(recipient);
        if recipient.is_empty() || !recipient.contains('@') {
            return Err(ApflowError::Validation(format!(
                "invalid recipient address `{recipient}`"
            )));
        }
        if recipient == self.ingest_mailbox {
            return Err(ApflowError::Validation(format!(
                "refusing to send to the ingest mailbox `{recipient}`"
            )));
        }
        if !self.allowed_recipients.is_empty() && !self.is_allowed(&recipient) {
            return Err(ApflowError::Validation(format!(
                "recipient `{recipient}` is not on the allow-list"
            )));
        }
        Ok(())
    }

    fn is_allowed(&self, recipient: &str) -> bool {
        self.allowed_recipients.iter().any(|entry| {
            if entry.starts_with('@') {
                recipient.ends_with(entry.as_str())
            } else {
                entry == recipient
            }
        })
    }
}

/// True when `subject` looks like a message this pipeline sent to AP.
pub fn is_outbound_subject(subject: &str) -> bool {
    OUTBOUND_SUBJECT.is_match(subject)
}

/// Lowercase, trimmed bare address. `Name <a@b.com>` becomes `a@b.com`.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    let bare = match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => &address[start + 1..end],
        _ => address,
    };
    bare.trim().to_lowercase()
}
