// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed one-minute window rate limiting backed by the entity store.
//!
//! Each (identity, minute) pair owns one counter row. The check and the
//! increment are a single conditional upsert, so concurrent requests from
//! several processes cannot overshoot the limit. Old rows are never read
//! again once their minute has passed.

use std::sync::Arc;

use apflow_core::EntityStore;
use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, warn};

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub struct RateLimiter {
    store: Arc<dyn EntityStore>,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn EntityStore>, max_requests_per_minute: u32) -> Self {
        Self {
            store,
            max_requests: max_requests_per_minute.max(1),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request from `identity` at `now`.
    ///
    /// An unreachable store lets the request through.
    pub async fn check(&self, identity: &str, now: DateTime<Utc>) -> RateDecision {
        let key = window_key(identity, &now);
        match self
            .store
            .try_increment_rate_limit(&key, self.max_requests, now)
            .await
        {
            Ok(Some(count)) => {
                debug!(key = %key, count, "request counted");
                RateDecision::Allowed { count }
            }
            Ok(None) => {
                let retry_after_secs = retry_after_secs(&now);
                warn!(
                    identity,
                    limit = self.max_requests,
                    retry_after_secs,
                    "rate limit exceeded"
                );
                metrics::counter!("apflow_rate_limited_total").increment(1);
                RateDecision::Limited { retry_after_secs }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "rate limit store unavailable, allowing request");
                RateDecision::Allowed { count: 0 }
            }
        }
    }
}

/// Lowercase the identity and replace anything but ASCII letters and digits with `_`.
pub fn normalize_identity(identity: &str) -> String {
    let normalized: String = identity
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if normalized.is_empty() {
        "anonymous".to_string()
    } else {
        normalized
    }
}

/// Row key for `identity` in the minute containing `now`: `{identity}_{YYYYMMDD_HHMM}`.
pub fn window_key(identity: &str, now: &DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        normalize_identity(identity),
        now.format("%Y%m%d_%H%M")
    )
}

/// Seconds until the next minute starts, at least 1.
pub fn retry_after_secs(now: &DateTime<Utc>) -> u64 {
    u64::from(60 - now.second().min(59)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_keys() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 42).unwrap();
        assert_eq!(window_key("10.0.0.1", &at), "10_0_0_1_20260301_0905");
        assert_eq!(window_key("Graph-Webhook", &at), "graph_webhook_20260301_0905");
        assert_eq!(window_key("", &at), "anonymous_20260301_0905");
    }

    #[test]
    fn retry_after_counts_to_next_minute() {
        let at = |s| Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, s).unwrap();
        assert_eq!(retry_after_secs(&at(0)), 60);
        assert_eq!(retry_after_secs(&at(42)), 18);
        assert_eq!(retry_after_secs(&at(59)), 1);
    }
}
