// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-dependency circuit breakers.
//!
//! A breaker starts closed. After `fail_max` consecutive counted failures it
//! opens and rejects calls with [`ApflowError::CircuitOpen`] without invoking
//! the dependency. Once `reset_timeout` has elapsed the next call is let
//! through as a single half-open trial: success closes the breaker, failure
//! re-opens it and restarts the timer. Concurrent callers are rejected while
//! the trial is in flight.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use apflow_config::model::{BreakerSettings, ResilienceConfig};
use apflow_core::ApflowError;
use tokio::time::Instant;
use tracing::{info, warn};

/// Dependency name of the mail service breaker.
pub const MAIL: &str = "mail";
/// Dependency name of the document extraction breaker.
pub const EXTRACTION: &str = "extraction";
/// Dependency name of the storage (object store) breaker.
pub const STORAGE: &str = "storage";

/// Thresholds for a single breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures that open the circuit.
    pub fail_max: u32,
    /// Time the circuit stays open before a trial call is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_fail_max(mut self, fail_max: u32) -> Self {
        self.fail_max = fail_max;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            fail_max: settings.fail_max.max(1),
            reset_timeout: Duration::from_secs(settings.reset_timeout_secs),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a breaker, used by health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// How a finished call affects the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// The call failed for a reason that says nothing about the dependency.
    Neutral,
}

/// A circuit breaker guarding one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Current state. An open breaker whose reset timeout has elapsed reports
    /// half-open, since the next call will be admitted as a trial.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.reset_elapsed(&inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Time left before an open breaker admits a trial call. `None` unless
    /// the breaker is open and still waiting.
    pub fn retry_after(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let remaining = self.config.reset_timeout.saturating_sub(inner.opened_at?.elapsed());
        (!remaining.is_zero()).then_some(remaining)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Rejected calls return [`ApflowError::CircuitOpen`] and never invoke
    /// `operation`. Errors for which
    /// [`ApflowError::counts_toward_breaker`] is false leave the failure count
    /// untouched.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ApflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApflowError>>,
    {
        let permit = self.acquire()?;
        let result = operation().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.counts_toward_breaker() => Outcome::Failure,
            Err(_) => Outcome::Neutral,
        };
        permit.settle(outcome);
        result
    }

    /// Like [`call`](Self::call), but when the breaker rejects the call the
    /// `fallback` value is returned instead of an error.
    pub async fn call_with_fallback<T, F, Fut, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, ApflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApflowError>>,
        FB: FnOnce() -> T,
    {
        match self.call(operation).await {
            Err(ApflowError::CircuitOpen { .. }) => {
                info!(breaker = %self.name, "circuit open, using fallback");
                Ok(fallback())
            }
            other => other,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reset_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.reset_timeout)
    }

    fn rejected(&self) -> ApflowError {
        metrics::counter!("apflow_circuit_rejections_total", "breaker" => self.name.clone())
            .increment(1);
        ApflowError::CircuitOpen {
            dependency: self.name.clone(),
        }
    }

    fn acquire(&self) -> Result<Permit<'_>, ApflowError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open if self.reset_elapsed(&inner) => {
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
            CircuitState::Open => Err(self.rejected()),
            CircuitState::HalfOpen if inner.trial_in_flight => Err(self.rejected()),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn settle(&self, trial: bool, outcome: Outcome) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
            match outcome {
                Outcome::Success => {
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                    self.transition(&mut inner, CircuitState::Closed);
                }
                Outcome::Failure => {
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
                Outcome::Neutral => {}
            }
            return;
        }

        // A non-trial call that finishes after another call opened the
        // circuit does not change its state.
        if inner.state != CircuitState::Closed {
            return;
        }
        match outcome {
            Outcome::Success => inner.consecutive_failures = 0,
            Outcome::Failure => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.fail_max {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            Outcome::Neutral => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                %from,
                failures = inner.consecutive_failures,
                "circuit opened"
            ),
            _ => info!(breaker = %self.name, %from, to = %to, "circuit state changed"),
        }
        metrics::counter!(
            "apflow_circuit_transitions_total",
            "breaker" => self.name.clone(),
            "to" => to.to_string()
        )
        .increment(1);
    }
}

/// Admission for one call. A trial permit dropped without being settled
/// (the calling future was cancelled) frees the trial slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.settle(self.trial, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.trial, Outcome::Neutral);
        }
    }
}

/// The process-wide breakers, one per external dependency.
///
/// Shared by every stage worker so that failures observed by one worker
/// protect the others.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    pub mail: Arc<CircuitBreaker>,
    pub extraction: Arc<CircuitBreaker>,
    pub storage: Arc<CircuitBreaker>,
}

impl BreakerRegistry {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            mail: Arc::new(CircuitBreaker::new(MAIL, (&config.mail).into())),
            extraction: Arc::new(CircuitBreaker::new(EXTRACTION, (&config.extraction).into())),
            storage: Arc::new(CircuitBreaker::new(STORAGE, (&config.storage).into())),
        }
    }

    /// Look up a breaker by dependency name.
    pub fn get(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        match name {
            MAIL => Some(&self.mail),
            EXTRACTION => Some(&self.extraction),
            STORAGE => Some(&self.storage),
            _ => None,
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        [&self.mail, &self.extraction, &self.storage]
            .into_iter()
            .map(|b| b.snapshot())
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}
