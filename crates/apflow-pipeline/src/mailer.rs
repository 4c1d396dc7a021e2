// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The only path for outbound email.

use apflow_core::types::OutboundEmail;
use apflow_core::{ApflowError, MailService};
use apflow_resilience::Guard;
use tracing::info;

use crate::loop_guard::LoopGuard;

/// Sends through the mail breaker after the loop guard approves the recipient.
///
/// A rejected recipient is a validation error: it never reaches the mail
/// service and never counts against the breaker.
pub struct GuardedMailer<'a> {
    mail: &'a dyn MailService,
    guard: Guard,
    loop_guard: &'a LoopGuard,
}

impl<'a> GuardedMailer<'a> {
    pub fn new(mail: &'a dyn MailService, guard: Guard, loop_guard: &'a LoopGuard) -> Self {
        Self {
            mail,
            guard,
            loop_guard,
        }
    }

    pub async fn send(&self, email: &OutboundEmail) -> Result<(), ApflowError> {
        self.loop_guard.validate_recipient(&email.to)?;
        self.guard
            .call("mail.send", |_| self.mail.send(email))
            .await?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        metrics::counter!("apflow_emails_sent_total").increment(1);
        Ok(())
    }
}
