// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RFC 5322 parsing of fetched messages.

use apflow_core::types::{Attachment, MailMessage};
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};

/// Summary of a message from its header block.
///
/// The receive time is the server's internal date when known, else the
/// `Date` header.
pub fn summarize(
    uid: u32,
    raw_headers: &[u8],
    internal_date: Option<DateTime<Utc>>,
) -> MailMessage {
    let parsed = MessageParser::default().parse_headers(raw_headers);

    let (internet_message_id, sender, subject, date) = match &parsed {
        Some(message) => (
            message.message_id().map(str::to_string),
            message
                .from()
                .and_then(|from| from.first())
                .and_then(|addr| addr.address())
                .unwrap_or_default()
                .to_string(),
            message.subject().unwrap_or_default().to_string(),
            message
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        ),
        None => (None, String::new(), String::new(), None),
    };

    MailMessage {
        id: uid.to_string(),
        internet_message_id,
        sender,
        subject,
        received_at: internal_date.or(date).unwrap_or_else(Utc::now),
    }
}

/// Every attachment of a full message.
pub fn attachments(raw: &[u8]) -> Vec<Attachment> {
    let Some(message) = MessageParser::default().parse(raw) else {
        return Vec::new();
    };

    message
        .attachments()
        .enumerate()
        .map(|(index, part)| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let name = part
                .attachment_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("attachment-{}", index + 1));
            Attachment {
                name,
                content_type: content_type.to_ascii_lowercase(),
                content: part.contents().to_vec(),
            }
        })
        .collect()
}
