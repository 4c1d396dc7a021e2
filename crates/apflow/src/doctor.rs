// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `apflow doctor` command implementation.
//!
//! Runs diagnostic checks against the configured environment: mailbox
//! settings, the SQLite store and its poison queue, every collaborator's
//! health check, and the breaker tuning in effect.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use apflow_config::model::ApflowConfig;
use apflow_core::{ApflowError, HealthStatus, MessageQueue, PluginAdapter};
use apflow_email::EmailMailService;
use apflow_pipeline::PipelineSettings;
use apflow_resilience::BreakerRegistry;

use crate::app;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

pub async fn run_doctor(config: &ApflowConfig, plain: bool) -> Result<(), ApflowError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let mut results = vec![check_mailboxes(config)];
    results.extend(check_storage(config).await);
    results.push(check_mail(config).await);
    let extractor = apflow_extract::from_config(&config.extraction);
    results.push(check_adapter("Extraction", extractor).await);
    results.push(check_adapter("Chat", apflow_chat::from_config(&config.chat)).await);
    results.push(check_breakers(config));

    println!();
    println!("  apflow doctor");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", render(result, use_color));
    }
    println!();

    let issues = results
        .iter()
        .filter(|r| r.status != CheckStatus::Pass)
        .count();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        let word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {word} found.");
    }
    println!();

    if results.iter().any(|r| r.status == CheckStatus::Fail) {
        return Err(ApflowError::Config("doctor found failing checks".to_string()));
    }
    Ok(())
}

fn render(result: &CheckResult, use_color: bool) -> String {
    let ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!("    {symbol} {:<20} {message} ({ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<20} {} ({ms}ms)", result.name, result.message)
    }
}

fn check_mailboxes(config: &ApflowConfig) -> CheckResult {
    let start = Instant::now();
    let settings = PipelineSettings::from_config(config);
    match settings.require() {
        Ok(()) => CheckResult::new(
            "Mailboxes",
            CheckStatus::Pass,
            format!("{} -> {}", settings.ingest_mailbox, settings.ap_mailbox),
            start,
        ),
        Err(e) => CheckResult::new("Mailboxes", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Store health plus a poison-queue count.
async fn check_storage(config: &ApflowConfig) -> Vec<CheckResult> {
    let start = Instant::now();
    let storage = match app::open_storage(config).await {
        Ok(storage) => storage,
        Err(e) => {
            return vec![CheckResult::new(
                "Database",
                CheckStatus::Fail,
                format!("open failed: {e}"),
                start,
            )];
        }
    };

    let mut results = vec![health_result("Database", storage.health_check().await, start)];

    let start = Instant::now();
    results.push(match storage.list_poison(None).await {
        Ok(entries) if entries.is_empty() => {
            CheckResult::new("Poison queue", CheckStatus::Pass, "empty", start)
        }
        Ok(entries) => CheckResult::new(
            "Poison queue",
            CheckStatus::Warn,
            format!("{} entries; see `apflow poison list`", entries.len()),
            start,
        ),
        Err(e) => CheckResult::new("Poison queue", CheckStatus::Fail, e.to_string(), start),
    });

    let _ = storage.shutdown().await;
    results
}

async fn check_mail(config: &ApflowConfig) -> CheckResult {
    let start = Instant::now();
    match EmailMailService::new(&config.imap, &config.smtp) {
        Ok(service) => health_result("Mail", service.health_check().await, start),
        Err(e) => CheckResult::new("Mail", CheckStatus::Fail, e.to_string(), start),
    }
}

async fn check_adapter<A>(name: &str, adapter: Result<A, ApflowError>) -> CheckResult
where
    A: std::ops::Deref,
    A::Target: PluginAdapter,
{
    let start = Instant::now();
    match adapter {
        Ok(adapter) => {
            let result = health_result(name, adapter.health_check().await, start);
            CheckResult {
                message: format!("{} ({})", result.message, adapter.name()),
                ..result
            }
        }
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}

fn health_result(
    name: &str,
    health: Result<HealthStatus, ApflowError>,
    start: Instant,
) -> CheckResult {
    match health {
        Ok(HealthStatus::Healthy) => CheckResult::new(name, CheckStatus::Pass, "healthy", start),
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new(name, CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new(name, CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}

fn check_breakers(config: &ApflowConfig) -> CheckResult {
    let start = Instant::now();
    let registry = BreakerRegistry::from_config(&config.resilience);
    let summary = [&registry.mail, &registry.extraction, &registry.storage]
        .iter()
        .map(|b| {
            let c = b.config();
            format!("{} {}/{}s", b.name(), c.fail_max, c.reset_timeout.as_secs())
        })
        .collect::<Vec<_>>()
        .join(", ");
    let retry = &config.resilience.retry;
    CheckResult::new(
        "Breakers",
        CheckStatus::Pass,
        format!("{summary}; retry x{} from {}ms", retry.max_attempts, retry.initial_delay_ms),
        start,
    )
}
