// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat notifier trait.

use async_trait::async_trait;

use crate::error::ApflowError;
use crate::messages::NotificationMessage;
use crate::traits::adapter::PluginAdapter;

/// Adapter that posts pipeline notifications to a chat channel.
#[async_trait]
pub trait Notifier: PluginAdapter {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), ApflowError>;
}
