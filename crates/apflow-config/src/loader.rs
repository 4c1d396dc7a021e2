// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./apflow.toml` over `~/.config/apflow/apflow.toml`
//! over `/etc/apflow/apflow.toml`, with environment variable overrides via `APFLOW_` prefix.

// figment::Error is external and large.
#![allow(clippy::result_large_err)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ApflowConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/apflow/apflow.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "apflow.toml";

/// Env var sections, longest first so nested sections win over their parent.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("resilience_extraction_", "resilience.extraction."),
    ("resilience_storage_", "resilience.storage."),
    ("resilience_retry_", "resilience.retry."),
    ("resilience_mail_", "resilience.mail."),
    ("rate_limit_", "rate_limit."),
    ("extraction_", "extraction."),
    ("matching_", "matching."),
    ("service_", "service."),
    ("mailbox_", "mailbox."),
    ("storage_", "storage."),
    ("gateway_", "gateway."),
    ("queue_", "queue."),
    ("imap_", "imap."),
    ("smtp_", "smtp."),
    ("chat_", "chat."),
];

/// User config file under the XDG config directory.
pub fn user_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|d| d.join("apflow/apflow.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/apflow/apflow.toml` (system-wide)
/// 3. `~/.config/apflow/apflow.toml` (user XDG config)
/// 4. `./apflow.toml` (local directory)
/// 5. `APFLOW_*` environment variables
pub fn load_config() -> Result<ApflowConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ApflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ApflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ApflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ApflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ApflowConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
///
/// Only the section prefix is rewritten, so underscore-containing keys stay
/// intact: `mailbox_ap_mailbox` maps to `mailbox.ap_mailbox`.
pub fn map_env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
fn env_provider() -> Env {
    Env::prefixed("APFLOW_").map(|key| map_env_key(key.as_str()).into())
}
