// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of configured collaborators into a pipeline context.

use std::sync::Arc;

use apflow_config::model::ApflowConfig;
use apflow_core::{ApflowError, PluginAdapter};
use apflow_email::EmailMailService;
use apflow_pipeline::{Collaborators, PipelineContext};
use apflow_storage::{FsObjectStore, SqliteStorage};
use tracing::info;

/// Open and migrate the SQLite store.
pub async fn open_storage(config: &ApflowConfig) -> Result<Arc<SqliteStorage>, ApflowError> {
    let storage = SqliteStorage::new(config.storage.clone(), config.queue.max_deliveries);
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// Build the pipeline context from configuration.
///
/// The store doubles as the stage queue.
pub async fn build_context(
    config: &ApflowConfig,
) -> Result<(Arc<PipelineContext>, Arc<SqliteStorage>), ApflowError> {
    let storage = open_storage(config).await?;
    let mail = Arc::new(EmailMailService::new(&config.imap, &config.smtp)?);
    let extractor = apflow_extract::from_config(&config.extraction)?;
    let notifier = apflow_chat::from_config(&config.chat)?;
    let objects = Arc::new(FsObjectStore::new(&config.storage.blob_dir));

    info!(
        mail = "email",
        extractor = extractor.name(),
        notifier = notifier.name(),
        blob_dir = %config.storage.blob_dir,
        "collaborators initialized"
    );

    let ctx = PipelineContext::new(
        config,
        Collaborators {
            store: storage.clone(),
            queue: storage.clone(),
            mail,
            objects,
            extractor,
            notifier,
        },
    );
    ctx.settings.require()?;
    Ok((Arc::new(ctx), storage))
}
