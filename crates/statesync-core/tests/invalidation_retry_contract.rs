//! Contract Test: Invalidated-Value Retry Resolution
//!
//! This test verifies how re-fetched values are resolved against a value
//! the caller has declared stale.
//!
//! Constraints verified:
//! - A re-fetched value matching the invalidated one is provisionally
//!   rejected, and the loop keeps fetching
//! - Once the backoff iteration counter reaches the retry bound, the
//!   repeated value is accepted anyway and the loop settles
//! - A re-fetched value differing from the invalidated one is accepted
//!   immediately
//!
//! The retry bound exists to stop an endless loop when the remote simply
//! has not updated yet; accepting the repeated value at the bound keeps the
//! published state and the remote in agreement.

mod common;

use common::*;
use statesync_core::engine::{StateSynchronizer, SyncEvent};
use std::time::Duration;

/// Wait until the synchronizer publishes `expected`, or panic
async fn wait_for_value(
    synchronizer: &StateSynchronizer<String>,
    expected: &str,
) {
    for _ in 0..100 {
        if synchronizer.current().as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "synchronizer never published {:?}, current: {:?}",
        expected,
        synchronizer.current()
    );
}

#[tokio::test]
async fn repeated_value_is_accepted_after_retry_budget() {
    let source = ScriptedValueSource::with_fallback(FetchPlan::EchoIdentity);
    let (synchronizer, mut events) =
        StateSynchronizer::new(Box::new(source.clone()), fast_config())
            .expect("synchronizer construction succeeds");

    let (_seen, callback) = collecting_subscriber();
    synchronizer.subscribe("observer", callback);

    synchronizer.set_identity(Some("acct".to_string())).await;
    wait_for_value(&synchronizer, "acct-value").await;
    let fetches_before = source.fetch_count();

    // Declare the published value stale; every re-fetch returns it again
    synchronizer.invalidate("acct-value".to_string()).await;

    // The loop must settle despite the remote never changing
    let mut rejected = Vec::new();
    let mut published_again = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while tokio::time::Instant::now() < deadline {
        let Ok(Some(event)) =
            tokio::time::timeout_at(deadline, events.recv()).await
        else {
            break;
        };

        match event {
            SyncEvent::ValueRejected { attempt } => rejected.push(attempt),
            SyncEvent::ValuePublished if !rejected.is_empty() => {
                published_again = true;
                break;
            }
            _ => {}
        }
    }

    // Attempts 0..=6 are rejected; the fetch at iteration 7 is accepted.
    assert_eq!(rejected, vec![0, 1, 2, 3, 4, 5, 6]);
    assert!(published_again, "loop never settled on the repeated value");
    assert_eq!(synchronizer.current().as_deref(), Some("acct-value"));

    // Eight fetches for the invalidation cycle, then the loop stops.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let fetches_after = source.fetch_count();
    assert_eq!(fetches_after - fetches_before, 8);

    synchronizer.shutdown().await;
}

#[tokio::test]
async fn differing_value_is_accepted_immediately() {
    let source = ScriptedValueSource::scripted(
        vec![
            // Initial fetch for the identity
            FetchPlan::Value("stale".to_string()),
            // Two re-fetches still return the invalidated value
            FetchPlan::Value("stale".to_string()),
            FetchPlan::Value("stale".to_string()),
            // The remote finally catches up
            FetchPlan::Value("fresh".to_string()),
        ],
        FetchPlan::Retryable,
    );
    let (synchronizer, mut events) =
        StateSynchronizer::new(Box::new(source.clone()), fast_config())
            .expect("synchronizer construction succeeds");

    let (seen, callback) = collecting_subscriber();
    synchronizer.subscribe("observer", callback);

    synchronizer.set_identity(Some("acct".to_string())).await;
    wait_for_value(&synchronizer, "stale").await;

    synchronizer.invalidate("stale".to_string()).await;
    wait_for_value(&synchronizer, "fresh").await;

    // Exactly two provisional rejections happened before acceptance.
    let mut rejected = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::ValueRejected { .. }) {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 2);

    // Subscribers saw the initial absence, the stale value, the fresh one —
    // and nothing in between.
    let notifications = seen.lock().unwrap().clone();
    assert_eq!(
        notifications,
        vec![
            None,
            Some("stale".to_string()),
            Some("fresh".to_string()),
        ]
    );

    // The loop settled; the retryable fallback is never reached.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.fetch_count(), 4);

    synchronizer.shutdown().await;
}
