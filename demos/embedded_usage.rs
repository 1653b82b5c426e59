//! Minimal embedding example for statesync-core
//!
//! This example demonstrates using statesync-core as a library in a custom
//! application: an in-process value source, a manual identity feed, and a
//! derived notifier that re-publishes a mapped view of the synchronized
//! value (the settings-propagation pattern).

use statesync_core::error::FetchError;
use statesync_core::traits::{ManualIdentityFeed, ValueSource};
use statesync_core::config::BackoffConfig;
use statesync_core::{ChangeNotifier, StateSynchronizer, SyncConfig};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Custom value source for embedded usage
///
/// Serves values from an in-process table, standing in for whatever remote
/// API a real deployment fetches from.
struct TableValueSource {
    table: Arc<Mutex<Vec<(String, String)>>>,
}

impl TableValueSource {
    fn new(entries: Vec<(&str, &str)>) -> Self {
        Self {
            table: Arc::new(Mutex::new(
                entries
                    .into_iter()
                    .map(|(identity, value)| (identity.to_string(), value.to_string()))
                    .collect(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl ValueSource for TableValueSource {
    type Value = String;

    async fn fetch(&self, identity: &str) -> Result<String, FetchError> {
        let table = self.table.lock().unwrap();

        table
            .iter()
            .find(|(id, _)| id == identity)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| FetchError::terminal(format!("unknown identity: {identity}")))
    }

    fn source_name(&self) -> &'static str {
        "table"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let source = TableValueSource::new(vec![
        ("alice", "premium-until-2027"),
        ("bob", "trial-until-2026"),
    ]);

    // Demo-sized backoff so the invalidation cycle below settles quickly
    let config = SyncConfig {
        backoff: BackoffConfig {
            base_ms: 10,
            cap_ms: 20,
        },
        ..SyncConfig::default()
    };

    let (synchronizer, _events) = StateSynchronizer::new(Box::new(source), config)?;

    // A plain consumer: print every change
    synchronizer.subscribe("printer", |value: &Option<String>| {
        println!("synchronized value: {value:?}");
    });

    // The settings-propagation pattern: derive a view of the synchronized
    // value and re-publish it through a second notifier. Coalescing in the
    // derived notifier suppresses changes that do not affect the view.
    let plan_active: ChangeNotifier<bool> = ChangeNotifier::new(false);
    let derived = plan_active.clone();
    synchronizer.subscribe("plan-deriver", move |value: &Option<String>| {
        let active = value
            .as_deref()
            .is_some_and(|plan| plan.starts_with("premium"));
        derived.publish(active);
    });

    plan_active.subscribe("plan-printer", |active: &bool| {
        println!("premium plan active: {active}");
    });

    // Drive the synchronizer from an identity feed, as a daemon would
    let feed = ManualIdentityFeed::new(None);
    let runner = synchronizer.clone();
    let feed_for_run = feed.clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let run_handle = tokio::spawn(async move {
        runner
            .run_with_shutdown(Box::new(feed_for_run), Some(shutdown_rx))
            .await
    });

    // Log in as alice, then switch to bob
    feed.set(Some("alice".to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    feed.set(Some("bob".to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Declare bob's value stale; the source still agrees, so the value
    // settles unchanged after the retry budget
    synchronizer.invalidate("trial-until-2026".to_string()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown_tx.send(()).ok();
    run_handle.await??;

    Ok(())
}
