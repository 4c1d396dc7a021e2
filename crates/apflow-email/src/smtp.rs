// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound mail through an SMTP relay.

use apflow_config::model::SmtpConfig;
use apflow_core::ApflowError;
use apflow_core::types::OutboundEmail;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpSender {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, ApflowError> {
        let host = config
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ApflowError::Config("smtp.host is not configured".to_string()))?;

        let builder = if config.implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| ApflowError::Config(format!("invalid SMTP relay `{host}`: {e}")))?
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn send(&self, email: &OutboundEmail) -> Result<(), ApflowError> {
        let message = build_message(email)?;
        self.transport.send(message).await.map_err(|e| {
            let transient = !e.is_permanent();
            ApflowError::Dependency {
                dependency: "mail".to_string(),
                message: format!("SMTP send to {} failed: {e}", email.to),
                transient,
                source: Some(Box::new(e)),
            }
        })?;
        tracing::debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }

    /// Open a connection and check the relay answers.
    pub async fn test_connection(&self) -> Result<bool, ApflowError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| ApflowError::transient("mail", format!("SMTP relay unreachable: {e}")))
    }
}

/// Build the MIME message: a plain-text body plus one part per attachment.
pub fn build_message(email: &OutboundEmail) -> Result<Message, ApflowError> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| ApflowError::Validation(format!("invalid sender `{}`: {e}", email.from)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| ApflowError::Validation(format!("invalid recipient `{}`: {e}", email.to)))?;

    let builder = Message::builder().from(from).to(to).subject(&email.subject);
    let text = SinglePart::plain(email.body.clone());

    let message = if email.attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let mut parts = MultiPart::mixed().singlepart(text);
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                ApflowError::Validation(format!(
                    "invalid content type `{}`: {e}",
                    attachment.content_type
                ))
            })?;
            parts = parts.singlepart(
                Attachment::new(attachment.name.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }
        builder.multipart(parts)
    };
    message.map_err(|e| ApflowError::Validation(format!("could not build email: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apflow_core::types::Attachment as MailAttachment;

    fn email() -> OutboundEmail {
        OutboundEmail {
            from: "invoices@example.com".to_string(),
            to: "ap@example.com".to_string(),
            subject: "Invoice: Adobe Inc - GL 6100".to_string(),
            body: "Vendor: Adobe Inc\n".to_string(),
            attachments: vec![MailAttachment {
                name: "inv-42.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content: b"%PDF-1.4\n".to_vec(),
            }],
        }
    }

    #[test]
    fn message_carries_subject_and_attachment() {
        let formatted = String::from_utf8(build_message(&email()).unwrap().formatted()).unwrap();
        assert!(formatted.contains("Subject: Invoice: Adobe Inc - GL 6100"));
        assert!(formatted.contains("filename=\"inv-42.pdf\""));
        assert!(formatted.contains("application/pdf"));
    }

    #[test]
    fn invalid_recipient_is_a_validation_error() {
        let mut bad = email();
        bad.to = "not an address".to_string();
        assert!(matches!(build_message(&bad), Err(ApflowError::Validation(_))));
    }

    #[test]
    fn sender_requires_host() {
        assert!(SmtpSender::from_config(&SmtpConfig::default()).is_err());
    }
}
