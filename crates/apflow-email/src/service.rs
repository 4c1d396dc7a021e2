// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `MailService` over IMAP and SMTP.
//!
//! Every call opens its own IMAP session. Calls are infrequent (one listing
//! per ingest run) and a fresh session never carries stale folder state.

use apflow_config::model::{ImapConfig, SmtpConfig};
use apflow_core::traits::adapter::PluginAdapter;
use apflow_core::traits::mail::MailService;
use apflow_core::types::{AdapterType, Attachment, HealthStatus, MailMessage, OutboundEmail};
use apflow_core::ApflowError;
use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::debug;

use crate::imap::{self, ImapSettings, imap_error};
use crate::parse;
use crate::smtp::SmtpSender;

const SUMMARY_QUERY: &str = "(UID INTERNALDATE BODY.PEEK[HEADER])";
const FULL_QUERY: &str = "(UID BODY.PEEK[])";

pub struct EmailMailService {
    imap: ImapSettings,
    smtp: SmtpSender,
}

impl EmailMailService {
    pub fn new(imap: &ImapConfig, smtp: &SmtpConfig) -> Result<Self, ApflowError> {
        Ok(Self {
            imap: ImapSettings::from_config(imap)?,
            smtp: SmtpSender::from_config(smtp)?,
        })
    }
}

fn parse_uid(message_id: &str) -> Result<u32, ApflowError> {
    message_id
        .parse()
        .map_err(|_| ApflowError::Validation(format!("`{message_id}` is not an IMAP UID")))
}

#[async_trait]
impl PluginAdapter for EmailMailService {
    fn name(&self) -> &str {
        "email"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MailService
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        let session = match self.imap.open().await {
            Ok(session) => session,
            Err(e) => return Ok(HealthStatus::Unhealthy(format!("IMAP: {e}"))),
        };
        imap::close(session).await;
        match self.smtp.test_connection().await {
            Ok(true) => Ok(HealthStatus::Healthy),
            Ok(false) => Ok(HealthStatus::Degraded(format!(
                "SMTP relay {} refused the connection test",
                self.smtp.host()
            ))),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl MailService for EmailMailService {
    async fn list_unread(&self, mailbox: &str) -> Result<Vec<MailMessage>, ApflowError> {
        let mut session = self.imap.open().await?;

        let mut uids: Vec<u32> = session
            .uid_search("UNSEEN")
            .await
            .map_err(|e| imap_error("search", e))?
            .into_iter()
            .collect();
        if uids.is_empty() {
            imap::close(session).await;
            return Ok(Vec::new());
        }
        uids.sort_unstable();
        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let fetches: Vec<_> = session
            .uid_fetch(&uid_set, SUMMARY_QUERY)
            .await
            .map_err(|e| imap_error("fetch", e))?
            .try_collect()
            .await
            .map_err(|e| imap_error("fetch", e))?;

        let mut messages: Vec<MailMessage> = fetches
            .iter()
            .filter_map(|fetch| {
                let uid = fetch.uid?;
                let internal = fetch.internal_date().map(|d| d.to_utc());
                Some(parse::summarize(uid, fetch.header().unwrap_or_default(), internal))
            })
            .collect();
        messages.sort_by_key(|m| m.received_at);
        imap::close(session).await;

        debug!(mailbox, folder = %self.imap.folder, count = messages.len(), "listed unread mail");
        Ok(messages)
    }

    async fn get_attachments(
        &self,
        _mailbox: &str,
        message_id: &str,
    ) -> Result<Vec<Attachment>, ApflowError> {
        let uid = parse_uid(message_id)?;
        let mut session = self.imap.open().await?;

        let fetches: Vec<_> = session
            .uid_fetch(uid.to_string(), FULL_QUERY)
            .await
            .map_err(|e| imap_error("fetch", e))?
            .try_collect()
            .await
            .map_err(|e| imap_error("fetch", e))?;

        let attachments = fetches
            .iter()
            .find(|fetch| fetch.uid == Some(uid))
            .and_then(|fetch| fetch.body())
            .map(parse::attachments)
            .ok_or_else(|| ApflowError::permanent("mail", format!("message {uid} not found")))?;
        imap::close(session).await;
        Ok(attachments)
    }

    async fn mark_read(&self, _mailbox: &str, message_id: &str) -> Result<(), ApflowError> {
        let uid = parse_uid(message_id)?;
        let mut session = self.imap.open().await?;
        let _: Vec<_> = session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .await
            .map_err(|e| imap_error("store", e))?
            .try_collect()
            .await
            .map_err(|e| imap_error("store", e))?;
        imap::close(session).await;
        Ok(())
    }

    async fn send(&self, email: &OutboundEmail) -> Result<(), ApflowError> {
        self.smtp.send(email).await
    }
}
