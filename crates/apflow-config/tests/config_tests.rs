// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the apflow configuration system.

use apflow_config::diagnostic::ConfigError;
use apflow_config::model::ApflowConfig;
use apflow_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[service]
name = "ap-router"
log_level = "debug"

[mailbox]
ingest_mailbox = "invoices@corp.example"
ap_mailbox = "ap@corp.example"
allowed_recipients = ["ap@corp.example", "@vendors.example"]
poll_interval_secs = 60

[storage]
database_path = "/tmp/apflow-test.db"
wal_mode = false
blob_dir = "/tmp/apflow-blobs"

[matching]
fuzzy_threshold = 80.0

[resilience.mail]
fail_max = 7
reset_timeout_secs = 90

[resilience.retry]
max_attempts = 4
initial_delay_ms = 100
backoff_factor = 3.0

[rate_limit]
max_requests_per_minute = 10

[queue]
visibility_timeout_secs = 120
max_deliveries = 3

[gateway]
port = 9090
client_state = "s3cret"
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.service.name, "ap-router");
    assert_eq!(config.mailbox.allowed_recipients.len(), 2);
    assert_eq!(config.mailbox.poll_interval_secs, 60);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.matching.fuzzy_threshold, 80.0);
    assert_eq!(config.resilience.mail.fail_max, 7);
    assert_eq!(config.resilience.mail.reset_timeout_secs, 90);
    // Untouched breakers keep their per-dependency defaults.
    assert_eq!(config.resilience.extraction.fail_max, 3);
    assert_eq!(config.resilience.extraction.reset_timeout_secs, 30);
    assert_eq!(config.resilience.storage.reset_timeout_secs, 45);
    assert_eq!(config.resilience.retry.max_attempts, 4);
    assert_eq!(config.rate_limit.max_requests_per_minute, 10);
    assert_eq!(config.queue.max_deliveries, 3);
    assert_eq!(config.gateway.port, 9090);
    assert_eq!(config.gateway.client_state.as_deref(), Some("s3cret"));
}

#[test]
fn defaults_match_documented_tuning() {
    let config = ApflowConfig::default();
    assert_eq!(config.service.name, "apflow");
    assert_eq!(config.mailbox.registration_subject, "Vendor Registration Required");
    assert_eq!(config.matching.fuzzy_threshold, 75.0);
    assert_eq!(config.resilience.mail.fail_max, 5);
    assert_eq!(config.resilience.mail.reset_timeout_secs, 60);
    assert_eq!(config.resilience.extraction.fail_max, 3);
    assert_eq!(config.resilience.storage.fail_max, 5);
    assert_eq!(config.queue.max_deliveries, 5);
    assert!(config.rate_limit.enabled);
    assert!(config.gateway.client_state.is_none());
}

#[test]
fn unknown_key_in_mailbox_is_rejected_with_suggestion() {
    let toml = r#"
[mailbox]
ap_mailbx = "ap@corp.example"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    let found = errors.iter().any(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => key == "ap_mailbx" && suggestion.as_deref() == Some("ap_mailbox"),
        _ => false,
    });
    assert!(found, "expected unknown key with suggestion, got {errors:?}");
}

#[test]
fn unknown_top_level_section_is_rejected() {
    assert!(load_config_from_str("[telemetry]\nenabled = true\n").is_err());
}

#[test]
fn invalid_type_is_reported() {
    let errors = load_and_validate_str("[gateway]\nport = \"eighty\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "got {errors:?}"
    );
}

#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: ApflowConfig = Figment::new()
        .merge(Serialized::defaults(ApflowConfig::default()))
        .merge(Toml::string("[mailbox]\nap_mailbox = \"from-toml@corp.example\"\n"))
        .merge(("mailbox.ap_mailbox", "from-env@corp.example"))
        .extract()
        .expect("override should merge");

    assert_eq!(config.mailbox.ap_mailbox, "from-env@corp.example");
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let config = apflow_config::load_config_from_path(std::path::Path::new(
        "/nonexistent/apflow.toml",
    ))
    .expect("missing file should be skipped");
    assert_eq!(config.queue.visibility_timeout_secs, 300);
}

#[test]
fn validation_error_renders_through_miette() {
    let errors = load_and_validate_str(
        "[mailbox]\ningest_mailbox = \"a@corp.example\"\nap_mailbox = \"a@corp.example\"\n",
    )
    .unwrap_err();
    let diagnostic: &dyn miette::Diagnostic = &errors[0];
    let code = diagnostic.code().map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("apflow::config::validation"));
}
