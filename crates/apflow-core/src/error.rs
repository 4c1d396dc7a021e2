// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the apflow pipeline.

use thiserror::Error;

/// The primary error type used across all apflow collaborator traits and stages.
#[derive(Debug, Error)]
pub enum ApflowError {
    /// Configuration errors (missing mailbox, invalid tuning values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Entity store errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Message queue errors (unknown entry, enqueue failure).
    #[error("queue error: {message}")]
    Queue { message: String },

    /// An external dependency call failed (mail service, extraction, object store).
    #[error("{dependency} dependency error: {message}")]
    Dependency {
        dependency: String,
        message: String,
        /// Whether retrying the same call may succeed.
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The circuit breaker for a dependency rejected the call without invoking it.
    #[error("circuit open for dependency `{dependency}`")]
    CircuitOpen { dependency: String },

    /// Input validation failure (malformed payload, unsafe recipient, bad argument).
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON (de)serialization failure of a pipeline envelope.
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApflowError {
    /// Shorthand for a transient dependency failure without a source error.
    pub fn transient(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            dependency: dependency.into(),
            message: message.into(),
            transient: true,
            source: None,
        }
    }

    /// Shorthand for a permanent dependency failure (e.g. authentication rejected).
    pub fn permanent(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            dependency: dependency.into(),
            message: message.into(),
            transient: false,
            source: None,
        }
    }

    /// Returns true if a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Dependency { transient, .. } => *transient,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this failure indicates dependency unavailability and
    /// should move a circuit breaker toward open.
    ///
    /// Validation and configuration errors are caller bugs; a rejected call
    /// never reached the dependency.
    pub fn counts_toward_breaker(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::Config(_) | Self::CircuitOpen { .. }
        )
    }
}
