// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for apflow.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level apflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values, but the two
/// mailbox addresses must be set before any stage runs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApflowConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Ingest and AP mailbox addresses and outbound safety settings.
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Entity store and blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Vendor matching settings.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Circuit breaker and retry tuning.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Webhook rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Stage queue delivery settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Webhook HTTP gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// IMAP connection for reading the ingest mailbox.
    #[serde(default)]
    pub imap: ImapConfig,

    /// SMTP connection for outbound mail.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Document extraction service.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Chat notification webhook.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and notifications.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "apflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Mailbox addresses and outbound recipient policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MailboxConfig {
    /// The system mailbox that receives vendor invoices.
    #[serde(default)]
    pub ingest_mailbox: String,

    /// The accounts-payable mailbox enriched invoices are forwarded to.
    #[serde(default)]
    pub ap_mailbox: String,

    /// When non-empty, outbound mail may only go to these addresses
    /// (or to any address on a listed `@domain`).
    #[serde(default)]
    pub allowed_recipients: Vec<String>,

    /// Subject of the one-time registration email sent to unknown vendors.
    #[serde(default = "default_registration_subject")]
    pub registration_subject: String,

    /// Seconds between timer-driven ingest passes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            ingest_mailbox: String::new(),
            ap_mailbox: String::new(),
            allowed_recipients: Vec::new(),
            registration_subject: default_registration_subject(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_registration_subject() -> String {
    "Vendor Registration Required".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Directory holding stored invoice PDFs.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            blob_dir: default_blob_dir(),
        }
    }
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|d| d.join("apflow"))
        .unwrap_or_else(|| std::path::PathBuf::from(".apflow"))
}

fn default_database_path() -> String {
    data_dir().join("apflow.db").display().to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_blob_dir() -> String {
    data_dir().join("blobs").display().to_string()
}

/// Vendor matching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Minimum fuzzy score (0-100) a vendor must reach to match.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

fn default_fuzzy_threshold() -> f64 {
    75.0
}

/// Per-dependency circuit breaker tuning plus shared retry tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Mail service breaker.
    #[serde(default = "default_mail_breaker")]
    pub mail: BreakerSettings,

    /// Document extraction breaker. Trips faster: extraction is optional.
    #[serde(default = "default_extraction_breaker")]
    pub extraction: BreakerSettings,

    /// Object store breaker.
    #[serde(default = "default_storage_breaker")]
    pub storage: BreakerSettings,

    /// Retry executor tuning applied beneath every breaker.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            mail: default_mail_breaker(),
            extraction: default_extraction_breaker(),
            storage: default_storage_breaker(),
            retry: RetrySettings::default(),
        }
    }
}

fn default_mail_breaker() -> BreakerSettings {
    BreakerSettings {
        fail_max: 5,
        reset_timeout_secs: 60,
    }
}

fn default_extraction_breaker() -> BreakerSettings {
    BreakerSettings {
        fail_max: 3,
        reset_timeout_secs: 30,
    }
}

fn default_storage_breaker() -> BreakerSettings {
    BreakerSettings {
        fail_max: 5,
        reset_timeout_secs: 45,
    }
}

/// Circuit breaker thresholds for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSettings {
    /// Counted failures that open the breaker.
    pub fail_max: u32,

    /// Seconds the breaker stays open before allowing a trial call.
    pub reset_timeout_secs: u64,
}

/// Retry executor tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

/// Webhook rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Enable the per-caller limiter on webhook routes.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests one caller may make per one-minute window.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: default_max_requests_per_minute(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_requests_per_minute() -> u32 {
    60
}

/// Stage queue delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Seconds a dequeued message stays hidden before it is redelivered.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Deliveries after which a message moves to the poison queue.
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,

    /// Idle poll interval of stage workers, in milliseconds.
    #[serde(default = "default_queue_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Concurrent workers per stage queue.
    #[serde(default = "default_workers_per_stage")]
    pub workers_per_stage: usize,

    /// Seconds a failed message stays hidden before its first redelivery.
    /// Doubles with each further delivery.
    #[serde(default = "default_redelivery_delay_secs")]
    pub redelivery_delay_secs: u64,

    /// Upper bound on the redelivery backoff, in seconds.
    #[serde(default = "default_max_redelivery_delay_secs")]
    pub max_redelivery_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_deliveries: default_max_deliveries(),
            poll_interval_ms: default_queue_poll_interval_ms(),
            workers_per_stage: default_workers_per_stage(),
            redelivery_delay_secs: default_redelivery_delay_secs(),
            max_redelivery_delay_secs: default_max_redelivery_delay_secs(),
        }
    }
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_max_deliveries() -> u32 {
    5
}

fn default_queue_poll_interval_ms() -> u64 {
    1000
}

fn default_workers_per_stage() -> usize {
    2
}

fn default_redelivery_delay_secs() -> u64 {
    30
}

fn default_max_redelivery_delay_secs() -> u64 {
    900
}

/// Webhook gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Serve the webhook endpoints.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Shared secret every change notification must carry in `clientState`.
    #[serde(default)]
    pub client_state: Option<String>,

    /// Key rate limits on the first `X-Forwarded-For` hop instead of the
    /// peer address. Enable only behind a reverse proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            client_state: None,
            trust_forwarded_for: false,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

/// IMAP connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImapConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_imap_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Folder listed for unread mail.
    #[serde(default = "default_imap_folder")]
    pub folder: String,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_imap_port(),
            username: None,
            password: None,
            folder: default_imap_folder(),
        }
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_imap_folder() -> String {
    "INBOX".to_string()
}

/// SMTP connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Use implicit TLS instead of STARTTLS.
    #[serde(default)]
    pub implicit_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            implicit_tls: false,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

/// Document extraction service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// HTTP endpoint of the extraction service. Extraction is skipped when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent to the extraction service.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_extraction_timeout_secs(),
        }
    }
}

fn default_extraction_timeout_secs() -> u64 {
    30
}

/// Chat notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Incoming-webhook URL. Notifications are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_timeout_secs() -> u64 {
    10
}
