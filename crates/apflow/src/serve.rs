// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `apflow serve` and `apflow ingest`.
//!
//! `serve` runs `workers_per_stage` stage workers for every queue, a timer
//! that requests an ingest run every `mailbox.poll_interval_secs`, and the
//! webhook gateway when enabled. SIGINT/SIGTERM cancel everything; workers
//! finish the entry in hand before exiting.

use std::sync::Arc;
use std::time::Duration;

use apflow_config::model::ApflowConfig;
use apflow_core::{ApflowError, IngestTrigger, PluginAdapter};
use apflow_gateway::{GatewayState, ServerConfig};
use apflow_pipeline::worker::{
    EnrichHandler, NotifyHandler, PostHandler, StageHandler, all_handlers,
};
use apflow_pipeline::{PipelineContext, StageWorker, stages};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app;

pub async fn run_serve(config: ApflowConfig) -> Result<(), ApflowError> {
    init_tracing(&config.service.log_level);
    info!(service = %config.service.name, "starting apflow serve");

    let (ctx, storage) = app::build_context(&config).await?;
    let cancel = install_signal_handler();
    let mut tasks = JoinSet::new();

    let poll = Duration::from_millis(config.queue.poll_interval_ms);
    let per_stage = config.queue.workers_per_stage.max(1);
    for handler in all_handlers() {
        for _ in 0..per_stage {
            let worker = StageWorker::new(ctx.clone(), handler.clone(), poll);
            tasks.spawn(worker.run(cancel.clone()));
        }
    }
    info!(workers_per_stage = per_stage, "stage workers started");

    let interval = Duration::from_secs(config.mailbox.poll_interval_secs.max(1));
    tasks.spawn(poll_timer(ctx.clone(), interval, cancel.clone()));

    if config.gateway.enabled {
        let state = GatewayState::new(ctx.clone(), &config);
        let server_config = ServerConfig::from(&config.gateway);
        let gateway_cancel = cancel.clone();
        tasks.spawn(async move {
            let result =
                apflow_gateway::start_server(&server_config, state, gateway_cancel.clone()).await;
            if let Err(e) = result {
                error!(error = %e, "gateway stopped");
                gateway_cancel.cancel();
            }
        });
    } else {
        info!("webhook gateway disabled, relying on the poll timer");
    }

    cancel.cancelled().await;
    info!("shutting down, waiting for in-flight work");
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "background task ended abnormally");
        }
    }

    let adapters: [&dyn PluginAdapter; 4] = [
        ctx.mail.as_ref(),
        ctx.extractor.as_ref(),
        ctx.notifier.as_ref(),
        storage.as_ref(),
    ];
    for adapter in adapters {
        if let Err(e) = adapter.shutdown().await {
            warn!(adapter = adapter.name(), error = %e, "adapter did not shut down cleanly");
        }
    }
    info!("apflow serve shutdown complete");
    Ok(())
}

/// Poll the mailbox once, then drain every downstream queue.
pub async fn run_once(config: ApflowConfig) -> Result<(), ApflowError> {
    init_tracing(&config.service.log_level);
    let (ctx, storage) = app::build_context(&config).await?;

    let report = stages::run_ingest(&ctx).await?;
    let poll = Duration::from_millis(config.queue.poll_interval_ms);
    let handlers: [Arc<dyn StageHandler>; 3] = [
        Arc::new(EnrichHandler),
        Arc::new(PostHandler),
        Arc::new(NotifyHandler),
    ];
    let mut processed = 0;
    for handler in handlers {
        let outcomes = StageWorker::new(ctx.clone(), handler, poll).drain().await?;
        processed += outcomes.len();
    }

    println!(
        "listed {} message(s): {} attachment(s) enqueued, {} skipped, {} failed; \
         {processed} queue entries processed",
        report.listed, report.enqueued, report.skipped, report.failed
    );
    storage.shutdown().await
}

/// Enqueue an ingest trigger every `interval` until cancelled.
async fn poll_timer(ctx: Arc<PipelineContext>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = ctx.emit(&IngestTrigger::new("timer", None)).await {
                    warn!(error = %e, "failed to queue timed ingest");
                }
            }
        }
    }
    debug!("poll timer stopped");
}

/// Returns a token cancelled on SIGINT or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("received SIGINT, initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("received SIGINT, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, initiating shutdown");
        }

        trigger.cancel();
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("apflow={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
