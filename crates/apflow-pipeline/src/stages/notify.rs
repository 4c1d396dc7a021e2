// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notify stage: `notifications` to the chat channel.
//!
//! Notifications are best effort. A failure is logged and the message is
//! consumed, so a chat outage never backs up the pipeline.

use apflow_core::NotificationMessage;
use tracing::{debug, warn};

use crate::context::PipelineContext;
use crate::outcome::StageOutcome;

pub async fn notify(ctx: &PipelineContext, message: &NotificationMessage) -> StageOutcome {
    let result = ctx
        .retry
        .execute("notifier.notify", |_| ctx.notifier.notify(message))
        .await;
    match result {
        Ok(()) => {
            debug!(kind = %message.kind, "notification delivered");
            StageOutcome::Processed
        }
        Err(e) => {
            warn!(
                kind = %message.kind,
                text = %message.message,
                error = %e,
                "notification dropped"
            );
            StageOutcome::Failed(e.to_string())
        }
    }
}
