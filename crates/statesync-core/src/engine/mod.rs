//! Core state synchronizer
//!
//! The StateSynchronizer is responsible for:
//! - Reacting to identity changes from an IdentityFeed
//! - Fetching the tracked value from a ValueSource under backoff
//! - Publishing accepted values through a ChangeNotifier
//! - Resolving invalidated values against re-fetched ones
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ IdentityFeed │─── IdentityEvent ───┐
//! └──────────────┘                     │
//!                                      ▼
//!                           ┌───────────────────┐
//!                           │ StateSynchronizer │
//!                           └───────────────────┘
//!                                      │
//!         ┌────────────────────────────┼────────────────────────────┐
//!         │                            │                            │
//!         ▼                            ▼                            ▼
//! ┌──────────────┐           ┌────────────────┐           ┌────────────────┐
//! │  JobTracker  │           │  ValueSource   │           │ ChangeNotifier │
//! │ (fetch loop) │           │ (remote fetch) │           │  (publish)     │
//! └──────────────┘           └────────────────┘           └────────────────┘
//! ```
//!
//! ## Fetch Loop
//!
//! 1. Identity change (or explicit refresh/invalidate) starts the loop
//! 2. Fetch from the ValueSource; a definite value is resolved against the
//!    captured identity and any invalidated value
//! 3. Accepted values are published; terminal results settle the loop
//! 4. Retryable failures sleep an ExponentialBackoff delay and try again,
//!    as long as anyone is subscribed to the notifier

use crate::backoff::ExponentialBackoff;
use crate::config::{BackoffConfig, SyncConfig};
use crate::error::{FetchError, Result};
use crate::jobs::JobTracker;
use crate::notifier::ChangeNotifier;
use crate::traits::{IdentityFeed, ValueSource};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Name of the fetch-loop job
///
/// A fixed key, so any re-trigger supersedes the in-flight loop instead of
/// running beside it.
const SYNC_JOB: &str = "fetch";

/// Events emitted by the StateSynchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Synchronizer run loop started
    Started,

    /// The tracked identity changed
    IdentityChanged {
        identity: Option<String>,
    },

    /// A fetch loop started for an identity
    FetchStarted {
        identity: String,
    },

    /// A fetched value was accepted and handed to the notifier
    ValuePublished,

    /// A fetched value matched the invalidated one and was provisionally
    /// rejected
    ValueRejected {
        attempt: u32,
    },

    /// The source reported that no value will arrive for this identity
    SourceTerminal,

    /// A fetched value arrived for a superseded identity and was dropped
    RaceDiscarded,

    /// The last subscriber left; the fetch loop stopped retrying
    InterestLost,

    /// Synchronizer run loop stopped
    Stopped {
        reason: String,
    },
}

/// How a definite fetch result was resolved
enum Resolution {
    Accepted,
    Rejected,
    Discarded,
}

struct SyncState<T> {
    /// The identity values are fetched for; `None` stops fetching
    identity: Option<String>,

    /// A published value the caller declared stale; present only during an
    /// invalidated re-fetch cycle
    invalidated: Option<T>,
}

struct SyncInner<T> {
    source: Box<dyn ValueSource<Value = T>>,
    notifier: ChangeNotifier<Option<T>>,
    jobs: JobTracker,
    state: StdMutex<SyncState<T>>,
    backoff: BackoffConfig,
    max_invalidated_retries: u32,
    event_tx: mpsc::Sender<SyncEvent>,
}

/// Background state synchronizer
///
/// Composes the job tracker, backoff generator and change notifier into the
/// full synchronization state machine: identity changes trigger a
/// cancellable background fetch loop whose accepted results are published
/// to subscribers.
///
/// ## Lifecycle
///
/// 1. Create with [`StateSynchronizer::new()`]
/// 2. Subscribe consumers via [`StateSynchronizer::subscribe()`]
/// 3. Either drive it yourself (`set_identity`/`refresh`/`invalidate`) or
///    hand it an identity feed with [`StateSynchronizer::run()`]
/// 4. Tear down with [`StateSynchronizer::shutdown()`]
///
/// ## Threading
///
/// All operations are safe to call concurrently; cloning produces another
/// handle to the same synchronizer. Mutation of the tracked identity and
/// the invalidated value happens under a single lock per instance, and a
/// value fetched for a superseded identity is discarded, never published.
pub struct StateSynchronizer<T> {
    inner: Arc<SyncInner<T>>,
}

impl<T> Clone for StateSynchronizer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StateSynchronizer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new synchronizer over a value source
    ///
    /// # Returns
    ///
    /// A tuple of (synchronizer, event_receiver) where event_receiver
    /// yields synchronizer events for monitoring/logging.
    pub fn new(
        source: Box<dyn ValueSource<Value = T>>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let synchronizer = Self {
            inner: Arc::new(SyncInner {
                source,
                notifier: ChangeNotifier::new(None),
                jobs: JobTracker::new(),
                state: StdMutex::new(SyncState {
                    identity: None,
                    invalidated: None,
                }),
                backoff: config.backoff,
                max_invalidated_retries: config.max_invalidated_retries,
                event_tx: tx,
            }),
        };

        Ok((synchronizer, rx))
    }

    /// The notifier carrying the synchronized value
    ///
    /// `None` means no confirmed value: before the first successful fetch,
    /// after the identity was cleared, or after a terminal result.
    pub fn notifier(&self) -> ChangeNotifier<Option<T>> {
        self.inner.notifier.clone()
    }

    /// Subscribe to value changes; replays the current value immediately
    pub fn subscribe(
        &self,
        owner: impl Into<String>,
        callback: impl Fn(&Option<T>) + Send + Sync + 'static,
    ) {
        self.inner.notifier.subscribe(owner, callback);
    }

    /// Remove a subscription; idempotent if absent
    pub fn unsubscribe(&self, owner: &str) {
        self.inner.notifier.unsubscribe(owner);
    }

    /// Snapshot of the currently published value
    pub fn current(&self) -> Option<T> {
        self.inner.notifier.current()
    }

    /// The tracker running this synchronizer's background jobs
    ///
    /// Exposed so owners can run ancillary named jobs that should die with
    /// the synchronizer.
    pub fn jobs(&self) -> JobTracker {
        self.inner.jobs.clone()
    }

    /// Replace the tracked identity
    ///
    /// Clears the published value and any pending invalidation, then starts
    /// fetching for the new identity. Setting the identity it already has
    /// is a no-op; clearing it cancels the fetch loop.
    pub async fn set_identity(&self, identity: Option<String>) {
        let changed = {
            let mut state = self.inner.state.lock().unwrap();

            if state.identity == identity {
                false
            } else {
                state.identity = identity.clone();
                state.invalidated = None;
                // A value fetched for the previous identity must not stay
                // visible under the new one.
                self.inner.notifier.publish_deferred(None);
                true
            }
        };

        if !changed {
            return;
        }

        self.inner.notifier.drain_pending();
        debug!("Identity changed: {:?}", identity);
        self.inner.emit(SyncEvent::IdentityChanged {
            identity: identity.clone(),
        });

        match identity {
            Some(_) => self.refresh().await,
            None => self.inner.jobs.cancel(SYNC_JOB).await,
        }
    }

    /// Start (or restart) the fetch loop for the current identity
    ///
    /// No-op when no identity is set. Returns as soon as the loop is
    /// running; results are observed through the notifier and the event
    /// stream, never as a synchronous error.
    pub async fn refresh(&self) {
        let identity = self.inner.state.lock().unwrap().identity.clone();

        let Some(identity) = identity else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        self.inner
            .jobs
            .start(SYNC_JOB, async move {
                inner.fetch_loop(identity).await;
            })
            .await;
    }

    /// Declare the currently published value stale
    ///
    /// When `value` is still the published one, the synchronizer remembers
    /// it and restarts the fetch loop; re-fetched results matching it are
    /// provisionally rejected until either a different value arrives or the
    /// retry budget is exhausted. A no-op when `value` is no longer
    /// current.
    pub async fn invalidate(&self, value: T) {
        let should_refresh = {
            let mut state = self.inner.state.lock().unwrap();

            if self.inner.notifier.current() == Some(value.clone()) {
                state.invalidated = Some(value);
                true
            } else {
                false
            }
        };

        if should_refresh {
            debug!("Published value invalidated, re-fetching");
            self.refresh().await;
        }
    }

    /// Run the synchronizer against an identity feed
    ///
    /// Adopts the feed's current identity, then follows its change stream
    /// until SIGINT. Returns after a clean shutdown.
    pub async fn run(&self, feed: Box<dyn IdentityFeed>) -> Result<()> {
        self.run_internal(feed, None).await
    }

    /// Internal run implementation that accepts an optional shutdown signal
    async fn run_internal(
        &self,
        feed: Box<dyn IdentityFeed>,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.inner.emit(SyncEvent::Started);

        // Adopt the identity as of now; changes arrive on the stream
        self.set_identity(feed.current().await).await;

        let mut changes = feed.watch();

        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for provided shutdown signal
            loop {
                tokio::select! {
                    Some(event) = changes.next() => {
                        self.set_identity(event.identity).await;
                    }

                    _ = &mut rx => {
                        info!("Shutdown signal received");
                        self.inner.emit(SyncEvent::Stopped {
                            reason: "Shutdown signal".to_string(),
                        });
                        break;
                    }
                }
            }
        } else {
            // Production mode: wait for SIGINT
            loop {
                tokio::select! {
                    Some(event) = changes.next() => {
                        self.set_identity(event.identity).await;
                    }

                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        self.inner.emit(SyncEvent::Stopped {
                            reason: "Shutdown signal".to_string(),
                        });
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!("Synchronizer stopped");

        Ok(())
    }

    /// Tear the synchronizer down
    ///
    /// Cancels every tracked job. The synchronizer holds no subscriptions
    /// of its own, so none are left dangling; consumer subscriptions stay
    /// registered but observe no further changes.
    pub async fn shutdown(&self) {
        self.inner.jobs.cancel_all().await;
    }

    /// Test-only helper to run the synchronizer with a controlled shutdown
    /// signal
    ///
    /// # Visibility
    ///
    /// This is `pub` for testing purposes only. Production code should use
    /// `run()` instead, which manages shutdown via SIGINT.
    pub async fn run_with_shutdown(
        &self,
        feed: Box<dyn IdentityFeed>,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(feed, shutdown_rx).await
    }
}

impl<T> SyncInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// The background fetch loop
    ///
    /// Runs until a result settles it, the identity it was started for is
    /// superseded, or subscriber interest disappears. Every iteration
    /// handles its own failure; nothing escapes the loop.
    async fn fetch_loop(self: Arc<Self>, identity: String) {
        let mut backoff = ExponentialBackoff::from_config(&self.backoff);

        debug!("Fetch loop started for identity {identity}");
        self.emit(SyncEvent::FetchStarted {
            identity: identity.clone(),
        });

        loop {
            match self.source.fetch(&identity).await {
                Ok(value) => {
                    let attempt = backoff.iteration();

                    match self.resolve(&identity, value, attempt) {
                        Resolution::Accepted => {
                            self.notifier.drain_pending();
                            debug!("Fetched value accepted (attempt {attempt})");
                            self.emit(SyncEvent::ValuePublished);
                            break;
                        }
                        Resolution::Discarded => {
                            debug!("Discarding fetch result for superseded identity");
                            self.emit(SyncEvent::RaceDiscarded);
                            break;
                        }
                        Resolution::Rejected => {
                            debug!("Re-fetched value still matches invalidated one (attempt {attempt})");
                            self.emit(SyncEvent::ValueRejected { attempt });
                        }
                    }
                }

                Err(FetchError::Terminal(reason)) => {
                    debug!("Source reported terminal result: {reason}");
                    self.emit(SyncEvent::SourceTerminal);
                    break;
                }

                Err(FetchError::Retryable(reason)) => {
                    warn!(
                        "Fetch attempt {} from '{}' failed: {}",
                        backoff.iteration(),
                        self.source.source_name(),
                        reason
                    );
                }
            }

            tokio::time::sleep(backoff.next()).await;

            if !self.notifier.has_subscribers() {
                debug!("No subscribers left, fetch loop going idle");
                self.emit(SyncEvent::InterestLost);
                break;
            }
        }
    }

    /// Resolve a definite fetch result against the current identity and any
    /// invalidated value
    ///
    /// Accepted values are handed to the notifier deferred; the caller
    /// drains once the state lock is released, so subscriber callbacks
    /// never run under it.
    fn resolve(&self, fetched_for: &str, value: T, attempt: u32) -> Resolution {
        let mut state = self.state.lock().unwrap();

        if state.identity.as_deref() != Some(fetched_for) {
            return Resolution::Discarded;
        }

        if let Some(invalidated) = &state.invalidated {
            if *invalidated == value && attempt < self.max_invalidated_retries {
                return Resolution::Rejected;
            }
        }

        state.invalidated = None;
        self.notifier.publish_deferred(Some(value));
        Resolution::Accepted
    }

    /// Emit a synchronizer event
    fn emit(&self, event: SyncEvent) {
        // Drop on a full channel rather than blocking a fetch loop; the
        // receiver is a monitoring aid, not a required consumer.
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full or closed, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}
