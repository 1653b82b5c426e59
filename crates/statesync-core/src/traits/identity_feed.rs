// # Identity Feed Trait
//
// Defines the interface for delivering the tracked identity (e.g. the
// logged-in account) and its changes.
//
// ## Usage
//
// ```rust,ignore
// use statesync_core::traits::IdentityFeed;
// use tokio_stream::StreamExt;
//
// let feed = /* IdentityFeed implementation */;
//
// let current = feed.current().await;
//
// let mut stream = feed.watch();
// while let Some(change) = stream.next().await {
//     println!("identity changed: {:?}", change);
// }
// ```
//
// Identity changes are the external trigger for the synchronizer's fetch
// loop; a feed must only emit on actual change, never poll-and-repeat.

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A detected identity change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEvent {
    /// The new identity, or `None` when the identity was cleared
    pub identity: Option<String>,
    /// The previous identity (if known)
    pub previous: Option<String>,
}

impl IdentityEvent {
    /// Create a new identity change event
    pub fn new(identity: Option<String>, previous: Option<String>) -> Self {
        Self { identity, previous }
    }
}

/// Trait for identity feed implementations
///
/// This trait defines two core capabilities:
/// 1. **current()**: Read the identity as of now
/// 2. **watch()**: Stream of identity change events
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Behavior
///
/// - `watch()` yields events only when the identity actually changes
/// - The stream must be cancellation-safe (dropping it cleans up resources)
#[async_trait]
pub trait IdentityFeed: Send + Sync {
    /// The identity as of now, or `None` when no identity is set
    async fn current(&self) -> Option<String>;

    /// Watch for identity changes
    ///
    /// Returns a stream that yields an [`IdentityEvent`] whenever the
    /// identity changes. The stream runs until the feed is dropped.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = IdentityEvent> + Send + 'static>>;
}

/// An in-process identity feed driven by explicit `set` calls
///
/// Useful for embedding the synchronizer in applications that learn about
/// identity changes through their own channels, and for tests.
///
/// # Example
///
/// ```rust
/// use statesync_core::traits::ManualIdentityFeed;
///
/// let feed = ManualIdentityFeed::new(None);
/// feed.set(Some("account-1".to_string()));
/// ```
#[derive(Clone)]
pub struct ManualIdentityFeed {
    inner: Arc<Mutex<ManualFeedState>>,
}

struct ManualFeedState {
    identity: Option<String>,
    watchers: Vec<mpsc::UnboundedSender<IdentityEvent>>,
}

impl ManualIdentityFeed {
    /// Create a feed holding `initial` as its current identity
    pub fn new(initial: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualFeedState {
                identity: initial,
                watchers: Vec::new(),
            })),
        }
    }

    /// Set the identity, emitting a change event if it differs
    pub fn set(&self, identity: Option<String>) {
        let mut state = self.inner.lock().unwrap();

        if state.identity == identity {
            return;
        }

        let event = IdentityEvent::new(identity.clone(), state.identity.take());
        state.identity = identity;

        // Closed watchers are dropped as a side effect of the failed send.
        state
            .watchers
            .retain(|watcher| watcher.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl IdentityFeed for ManualIdentityFeed {
    async fn current(&self) -> Option<String> {
        self.inner.lock().unwrap().identity.clone()
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = IdentityEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().watchers.push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn manual_feed_emits_only_on_change() {
        let feed = ManualIdentityFeed::new(None);
        let mut stream = feed.watch();

        feed.set(Some("a".to_string()));
        feed.set(Some("a".to_string()));
        feed.set(Some("b".to_string()));

        let first = stream.next().await.unwrap();
        assert_eq!(first.identity.as_deref(), Some("a"));
        assert_eq!(first.previous, None);

        let second = stream.next().await.unwrap();
        assert_eq!(second.identity.as_deref(), Some("b"));
        assert_eq!(second.previous.as_deref(), Some("a"));

        assert_eq!(feed.current().await.as_deref(), Some("b"));
    }
}
