// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate limiter against the SQLite counter table.

use apflow_pipeline::{RateDecision, RateLimiter};
use apflow_test_utils::TestHarness;
use chrono::{DateTime, Duration, Utc};

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

#[tokio::test]
async fn allows_up_to_the_limit_within_one_minute() {
    let harness = TestHarness::builder().build().await.unwrap();
    let limiter = RateLimiter::new(harness.storage.clone(), 3);
    let now = at("2026-03-02T10:15:15Z");

    for expected in 1..=3 {
        assert_eq!(
            limiter.check("10.0.0.1", now).await,
            RateDecision::Allowed { count: expected }
        );
    }
    assert_eq!(
        limiter.check("10.0.0.1", now).await,
        RateDecision::Limited { retry_after_secs: 45 }
    );

    // Other callers have their own window.
    assert!(limiter.check("10.0.0.2", now).await.is_allowed());
}

#[tokio::test]
async fn next_minute_starts_a_fresh_window() {
    let harness = TestHarness::builder().build().await.unwrap();
    let limiter = RateLimiter::new(harness.storage.clone(), 1);
    let now = at("2026-03-02T10:15:59Z");

    assert!(limiter.check("client", now).await.is_allowed());
    assert_eq!(
        limiter.check("client", now).await,
        RateDecision::Limited { retry_after_secs: 1 }
    );
    assert_eq!(
        limiter.check("client", now + Duration::seconds(1)).await,
        RateDecision::Allowed { count: 1 }
    );
}

#[tokio::test]
async fn concurrent_checks_never_exceed_the_limit() {
    let harness = TestHarness::builder().build().await.unwrap();
    let limiter = std::sync::Arc::new(RateLimiter::new(harness.storage.clone(), 5));
    let now = at("2026-03-02T10:15:00Z");

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let limiter = limiter.clone();
        tasks.push(tokio::spawn(async move { limiter.check("burst", now).await }));
    }
    let mut allowed = 0;
    for task in tasks {
        if task.await.unwrap().is_allowed() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);
}

#[tokio::test]
async fn storage_failure_fails_open() {
    let harness = TestHarness::builder()
        .with_failing_store()
        .build()
        .await
        .unwrap();
    let failing = harness.failing_store.clone().unwrap();
    failing.set_fail_rate_limits(true);
    let limiter = RateLimiter::new(failing, 1);
    let now = Utc::now();

    for _ in 0..3 {
        assert_eq!(
            limiter.check("client", now).await,
            RateDecision::Allowed { count: 0 }
        );
    }
}
