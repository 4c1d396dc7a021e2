// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as mailbox addresses that must differ and tuning values with lower bounds.

use crate::diagnostic::ConfigError;
use crate::model::{ApflowConfig, BreakerSettings};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ApflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    validate_mailboxes(config, &mut errors);

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }
    if config.storage.blob_dir.trim().is_empty() {
        errors.push(ConfigError::validation("storage.blob_dir must not be empty"));
    }

    let threshold = config.matching.fuzzy_threshold;
    if !(0.0..=100.0).contains(&threshold) {
        errors.push(ConfigError::validation(format!(
            "matching.fuzzy_threshold must be between 0 and 100, got {threshold}"
        )));
    }

    for (name, breaker) in [
        ("mail", &config.resilience.mail),
        ("extraction", &config.resilience.extraction),
        ("storage", &config.resilience.storage),
    ] {
        validate_breaker(name, breaker, &mut errors);
    }

    let retry = &config.resilience.retry;
    if retry.max_attempts < 1 {
        errors.push(ConfigError::validation(
            "resilience.retry.max_attempts must be at least 1",
        ));
    }
    if retry.backoff_factor < 1.0 {
        errors.push(ConfigError::validation(format!(
            "resilience.retry.backoff_factor must be at least 1.0, got {}",
            retry.backoff_factor
        )));
    }

    if config.rate_limit.enabled && config.rate_limit.max_requests_per_minute == 0 {
        errors.push(ConfigError::validation(
            "rate_limit.max_requests_per_minute must be at least 1 when rate limiting is enabled",
        ));
    }

    if config.queue.max_deliveries < 1 {
        errors.push(ConfigError::validation("queue.max_deliveries must be at least 1"));
    }
    if config.queue.visibility_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.visibility_timeout_secs must be greater than 0",
        ));
    }
    if config.queue.workers_per_stage == 0 {
        errors.push(ConfigError::validation("queue.workers_per_stage must be at least 1"));
    }
    if config.queue.redelivery_delay_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.redelivery_delay_secs must be greater than 0",
        ));
    }
    if config.queue.max_redelivery_delay_secs < config.queue.redelivery_delay_secs {
        errors.push(ConfigError::validation(
            "queue.max_redelivery_delay_secs must be at least queue.redelivery_delay_secs",
        ));
    }

    if let Some(secret) = &config.gateway.client_state
        && secret.is_empty()
    {
        errors.push(ConfigError::validation(
            "gateway.client_state must not be empty when set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_mailboxes(config: &ApflowConfig, errors: &mut Vec<ConfigError>) {
    let ingest = config.mailbox.ingest_mailbox.trim();
    let ap = config.mailbox.ap_mailbox.trim();

    for (key, value) in [("mailbox.ingest_mailbox", ingest), ("mailbox.ap_mailbox", ap)] {
        if !value.is_empty() && !looks_like_address(value) {
            errors.push(ConfigError::validation(format!(
                "{key} `{value}` is not an email address"
            )));
        }
    }

    // Forwarding AP mail into the ingest mailbox would re-ingest every invoice.
    if !ingest.is_empty() && ingest.eq_ignore_ascii_case(ap) {
        errors.push(ConfigError::validation(
            "mailbox.ap_mailbox must differ from mailbox.ingest_mailbox",
        ));
    }

    for recipient in &config.mailbox.allowed_recipients {
        let entry = recipient.trim();
        if !ingest.is_empty() && entry.eq_ignore_ascii_case(ingest) {
            errors.push(ConfigError::validation(format!(
                "mailbox.allowed_recipients must not contain the ingest mailbox `{entry}`"
            )));
        }
        if entry.is_empty() {
            errors.push(ConfigError::validation(
                "mailbox.allowed_recipients must not contain empty entries",
            ));
        }
    }
}

fn validate_breaker(name: &str, breaker: &BreakerSettings, errors: &mut Vec<ConfigError>) {
    if breaker.fail_max < 1 {
        errors.push(ConfigError::validation(format!(
            "resilience.{name}.fail_max must be at least 1"
        )));
    }
    if breaker.reset_timeout_secs == 0 {
        errors.push(ConfigError::validation(format!(
            "resilience.{name}.reset_timeout_secs must be greater than 0"
        )));
    }
}

fn looks_like_address(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}
