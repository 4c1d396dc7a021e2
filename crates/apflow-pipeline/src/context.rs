// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared collaborators and settings handed to every stage.

use std::sync::Arc;
use std::time::Duration;

use apflow_config::model::ApflowConfig;
use apflow_core::{
    ApflowError, DocumentExtractor, EntityStore, Envelope, MailService, MessageQueue, Notifier,
    ObjectStore,
};
use apflow_resilience::{BreakerRegistry, Guard, RetryPolicy};

use crate::loop_guard::LoopGuard;
use crate::mailer::GuardedMailer;
use crate::vendor::VendorResolver;

/// Pipeline settings derived from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Mailbox the pipeline reads from and sends as.
    pub ingest_mailbox: String,
    /// Accounts-payable mailbox that receives enriched invoices.
    pub ap_mailbox: String,
    pub allowed_recipients: Vec<String>,
    pub registration_subject: String,
    pub fuzzy_threshold: f64,
    pub visibility_timeout: Duration,
    /// Hide time after the first failed delivery; doubles per delivery.
    pub redelivery_delay: Duration,
    pub max_redelivery_delay: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &ApflowConfig) -> Self {
        Self {
            ingest_mailbox: config.mailbox.ingest_mailbox.trim().to_string(),
            ap_mailbox: config.mailbox.ap_mailbox.trim().to_string(),
            allowed_recipients: config.mailbox.allowed_recipients.clone(),
            registration_subject: config.mailbox.registration_subject.clone(),
            fuzzy_threshold: config.matching.fuzzy_threshold,
            visibility_timeout: Duration::from_secs(config.queue.visibility_timeout_secs),
            redelivery_delay: Duration::from_secs(config.queue.redelivery_delay_secs),
            max_redelivery_delay: Duration::from_secs(config.queue.max_redelivery_delay_secs),
        }
    }

    /// How long an entry stays hidden after failing its `delivery`-th attempt.
    pub fn redelivery_backoff(&self, delivery: i64) -> Duration {
        let doublings = delivery.saturating_sub(1).clamp(0, 16) as u32;
        self.redelivery_delay
            .saturating_mul(1 << doublings)
            .min(self.max_redelivery_delay)
    }

    /// Fail fast when the settings a stage needs are missing.
    pub fn require(&self) -> Result<(), ApflowError> {
        if self.ingest_mailbox.is_empty() {
            return Err(ApflowError::Config(
                "mailbox.ingest_mailbox is not configured".to_string(),
            ));
        }
        if self.ap_mailbox.is_empty() {
            return Err(ApflowError::Config(
                "mailbox.ap_mailbox is not configured".to_string(),
            ));
        }
        if self.ap_mailbox.eq_ignore_ascii_case(&self.ingest_mailbox) {
            return Err(ApflowError::Config(
                "mailbox.ap_mailbox must differ from mailbox.ingest_mailbox".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a stage invocation needs, constructed once and shared by `Arc`.
pub struct PipelineContext {
    pub settings: PipelineSettings,
    pub store: Arc<dyn EntityStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub mail: Arc<dyn MailService>,
    pub objects: Arc<dyn ObjectStore>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub notifier: Arc<dyn Notifier>,
    pub breakers: BreakerRegistry,
    pub retry: RetryPolicy,
    pub loop_guard: LoopGuard,
    pub resolver: VendorResolver,
}

/// Collaborators for [`PipelineContext::new`].
pub struct Collaborators {
    pub store: Arc<dyn EntityStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub mail: Arc<dyn MailService>,
    pub objects: Arc<dyn ObjectStore>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub notifier: Arc<dyn Notifier>,
}

impl PipelineContext {
    pub fn new(config: &ApflowConfig, collaborators: Collaborators) -> Self {
        let settings = PipelineSettings::from_config(config);
        let loop_guard = LoopGuard::new(
            &settings.ingest_mailbox,
            &settings.registration_subject,
            &settings.allowed_recipients,
        );
        let resolver = VendorResolver::new(settings.fuzzy_threshold);
        Self {
            settings,
            store: collaborators.store,
            queue: collaborators.queue,
            mail: collaborators.mail,
            objects: collaborators.objects,
            extractor: collaborators.extractor,
            notifier: collaborators.notifier,
            breakers: BreakerRegistry::from_config(&config.resilience),
            retry: RetryPolicy::from(&config.resilience.retry),
            loop_guard,
            resolver,
        }
    }

    pub fn mail_guard(&self) -> Guard {
        Guard::new(self.breakers.mail.clone(), self.retry)
    }

    pub fn extraction_guard(&self) -> Guard {
        Guard::new(self.breakers.extraction.clone(), self.retry)
    }

    pub fn storage_guard(&self) -> Guard {
        Guard::new(self.breakers.storage.clone(), self.retry)
    }

    /// Mailer that enforces the recipient policy on every send.
    pub fn mailer(&self) -> GuardedMailer<'_> {
        GuardedMailer::new(self.mail.as_ref(), self.mail_guard(), &self.loop_guard)
    }

    /// Serialize `message` and put it on its queue.
    pub async fn emit<M: Envelope + Sync>(&self, message: &M) -> Result<i64, ApflowError> {
        let payload = message.to_json()?;
        self.queue.enqueue(M::QUEUE, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(ingest: &str, ap: &str) -> PipelineSettings {
        let mut config = ApflowConfig::default();
        config.mailbox.ingest_mailbox = ingest.to_string();
        config.mailbox.ap_mailbox = ap.to_string();
        PipelineSettings::from_config(&config)
    }

    #[test]
    fn require_rejects_missing_mailboxes() {
        assert!(matches!(
            settings("", "ap@corp.example").require(),
            Err(ApflowError::Config(_))
        ));
        assert!(matches!(
            settings("in@corp.example", " ").require(),
            Err(ApflowError::Config(_))
        ));
        assert!(settings("in@corp.example", "IN@corp.example").require().is_err());
        assert!(settings("in@corp.example", "ap@corp.example").require().is_ok());
    }

    #[test]
    fn settings_carry_tuning() {
        let s = settings("in@corp.example", "ap@corp.example");
        assert_eq!(s.fuzzy_threshold, 75.0);
        assert_eq!(s.visibility_timeout, Duration::from_secs(300));
        assert_eq!(s.registration_subject, "Vendor Registration Required");
    }

    #[test]
    fn redelivery_backoff_doubles_up_to_cap() {
        let s = settings("in@corp.example", "ap@corp.example");
        let secs = |n| s.redelivery_backoff(n).as_secs();
        assert_eq!(secs(0), 30);
        assert_eq!(secs(1), 30);
        assert_eq!(secs(2), 60);
        assert_eq!(secs(4), 240);
        assert_eq!(secs(6), 900);
        assert_eq!(secs(i64::MAX), 900);
    }
}
