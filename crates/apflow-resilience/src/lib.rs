// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for calls to external dependencies.
//!
//! - [`circuit_breaker`]: per-dependency breakers and the registry holding the
//!   mail, extraction, and storage breakers.
//! - [`retry`]: bounded exponential-backoff retry of transient failures.
//! - [`guard`]: the composition used by pipeline stages. The breaker wraps the
//!   retry loop, so a call that exhausts its retries counts as one failure.

pub mod circuit_breaker;
pub mod guard;
pub mod retry;

pub use circuit_breaker::{
    BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use guard::Guard;
pub use retry::RetryPolicy;
