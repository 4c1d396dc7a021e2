// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock mail service for deterministic testing.
//!
//! `MockMailService` implements `MailService` over an in-memory mailbox:
//! messages injected via `deliver()` are listed until marked read, and
//! every email passed to `send()` is captured for assertions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::mail::MailService;
use apflow_core::types::{AdapterType, Attachment, HealthStatus, MailMessage, OutboundEmail};
use apflow_core::ApflowError;

struct StoredMessage {
    message: MailMessage,
    attachments: Vec<Attachment>,
    read: bool,
}

/// An in-memory mailbox with captured outbound mail.
///
/// Failure toggles make listing or sending fail with a transient error,
/// which is what a flaky mail server looks like to the pipeline.
pub struct MockMailService {
    inbox: Mutex<Vec<StoredMessage>>,
    sent: Mutex<Vec<OutboundEmail>>,
    send_attempts: AtomicUsize,
    fail_sends: AtomicBool,
    fail_listing: AtomicBool,
}

impl MockMailService {
    pub fn new() -> Self {
        Self {
            inbox: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
        }
    }

    /// Put an unread message into the mailbox.
    pub async fn deliver(&self, message: MailMessage, attachments: Vec<Attachment>) {
        self.inbox.lock().await.push(StoredMessage {
            message,
            attachments,
            read: false,
        });
    }

    /// Mark a message unread again, as a mail client would.
    pub async fn mark_unread(&self, message_id: &str) {
        for stored in self.inbox.lock().await.iter_mut() {
            if stored.message.id == message_id {
                stored.read = false;
            }
        }
    }

    pub async fn is_read(&self, message_id: &str) -> bool {
        self.inbox
            .lock()
            .await
            .iter()
            .any(|s| s.message.id == message_id && s.read)
    }

    /// Every email that was sent successfully.
    pub async fn sent_emails(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }

    /// Emails sent to `address`, compared case-insensitively.
    pub async fn sent_to(&self, address: &str) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|e| e.to.eq_ignore_ascii_case(address))
            .cloned()
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Calls to `send()`, including failed ones.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockMailService {
    fn default() -> Self {
        Self::new()
    }
}

/// A small PDF attachment whose bytes are unique to `name`.
pub fn pdf_attachment(name: &str) -> Attachment {
    Attachment {
        name: name.to_string(),
        content_type: "application/pdf".to_string(),
        content: format!("%PDF-1.4\n% {name}\n%%EOF\n").into_bytes(),
    }
}

#[async_trait]
impl PluginAdapter for MockMailService {
    fn name(&self) -> &str {
        "mock-mail"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MailService
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl MailService for MockMailService {
    async fn list_unread(&self, _mailbox: &str) -> Result<Vec<MailMessage>, ApflowError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ApflowError::transient("mail", "mock mailbox unavailable"));
        }
        Ok(self
            .inbox
            .lock()
            .await
            .iter()
            .filter(|s| !s.read)
            .map(|s| s.message.clone())
            .collect())
    }

    async fn get_attachments(
        &self,
        _mailbox: &str,
        message_id: &str,
    ) -> Result<Vec<Attachment>, ApflowError> {
        self.inbox
            .lock()
            .await
            .iter()
            .find(|s| s.message.id == message_id)
            .map(|s| s.attachments.clone())
            .ok_or_else(|| ApflowError::permanent("mail", format!("no message {message_id}")))
    }

    async fn mark_read(&self, _mailbox: &str, message_id: &str) -> Result<(), ApflowError> {
        let mut inbox = self.inbox.lock().await;
        let stored = inbox
            .iter_mut()
            .find(|s| s.message.id == message_id)
            .ok_or_else(|| ApflowError::permanent("mail", format!("no message {message_id}")))?;
        stored.read = true;
        Ok(())
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), ApflowError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApflowError::transient("mail", "mock SMTP unavailable"));
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
