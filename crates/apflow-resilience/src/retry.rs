// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use apflow_config::model::RetrySettings;
use apflow_core::ApflowError;
use tracing::{debug, warn};

/// Upper bound on a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Retry behavior for a class of dependency calls.
///
/// The delay before attempt `n + 1` is `initial_delay * backoff_factor^(n - 1)`.
/// Only errors accepted by the retry predicate are retried; everything else
/// is returned after the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    retryable: fn(&ApflowError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            retryable: ApflowError::is_transient,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::default()
            .with_max_attempts(settings.max_attempts)
            .with_initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .with_backoff_factor(settings.backoff_factor)
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(1.0);
        self
    }

    /// Replace the predicate deciding which errors are retried.
    pub fn with_retryable(mut self, retryable: fn(&ApflowError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self, error: &ApflowError) -> bool {
        (self.retryable)(error)
    }

    /// Sleep before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= MAX_DELAY.as_secs_f64() {
            return MAX_DELAY;
        }
        Duration::from_secs_f64(secs)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached. The closure receives the 1-based attempt
    /// number. The last error is returned unchanged.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, ApflowError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApflowError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts && self.is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
