// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Breaker-plus-retry composition for dependency calls.

use std::future::Future;
use std::sync::Arc;

use apflow_core::ApflowError;

use crate::circuit_breaker::CircuitBreaker;
use crate::retry::RetryPolicy;

/// Guards calls to one dependency.
///
/// The breaker is consulted once per call; the retry loop runs inside it.
/// A call that fails after exhausting its retries records a single breaker
/// failure, and an open breaker skips the retry loop entirely.
#[derive(Debug, Clone)]
pub struct Guard {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl Guard {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { breaker, retry }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn call<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, ApflowError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApflowError>>,
    {
        let retry = &self.retry;
        self.breaker
            .call(move || retry.execute(operation_name, operation))
            .await
    }

    /// As [`call`](Self::call), returning `fallback()` when the breaker is open.
    pub async fn call_or_fallback<T, F, Fut, FB>(
        &self,
        operation_name: &str,
        operation: F,
        fallback: FB,
    ) -> Result<T, ApflowError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApflowError>>,
        FB: FnOnce() -> T,
    {
        let retry = &self.retry;
        self.breaker
            .call_with_fallback(move || retry.execute(operation_name, operation), fallback)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn guard(fail_max: u32) -> Guard {
        let breaker = CircuitBreaker::new(
            "mail",
            CircuitBreakerConfig::default()
                .with_fail_max(fail_max)
                .with_reset_timeout(Duration::from_secs(60)),
        );
        Guard::new(
            Arc::new(breaker),
            RetryPolicy::default().with_initial_delay(Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_count_as_one_failure() {
        let g = guard(2);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = g
            .call("send", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApflowError::transient("mail", "503")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(g.breaker().consecutive_failures(), 1);
        assert_eq!(g.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_skips_retry_loop() {
        let g = guard(1);
        let _ = g
            .call("send", |_| async { Err::<(), _>(ApflowError::transient("mail", "503")) })
            .await;
        assert_eq!(g.breaker().state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = g
            .call("send", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(ApflowError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_retry_leaves_breaker_clean() {
        let g = guard(1);
        let value = g
            .call("extract", |attempt| async move {
                if attempt == 1 {
                    Err(ApflowError::transient("extraction", "timeout"))
                } else {
                    Ok("Adobe")
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "Adobe");
        assert_eq!(g.breaker().state(), CircuitState::Closed);
        assert_eq!(g.breaker().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_applies_when_open() {
        let g = guard(1);
        let _ = g
            .call("extract", |_| async {
                Err::<Option<String>, _>(ApflowError::permanent("extraction", "500"))
            })
            .await;
        let value = g
            .call_or_fallback("extract", |_| async { Ok(Some("x".to_string())) }, || None)
            .await
            .unwrap();
        assert!(value.is_none());
    }
}
