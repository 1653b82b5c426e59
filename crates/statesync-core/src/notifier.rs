// # Change Notifier
//
// Single-value publish/subscribe primitive.
//
// ## Contract
//
// - `publish` coalesces: a value equal to the current one produces zero
//   notifications; a changed value reaches every subscriber exactly once,
//   in subscription order
// - `subscribe` replays: a new subscriber immediately receives the current
//   value, and never any historical ones
// - One subscription per owner: re-subscribing replaces, not duplicates
// - `has_subscribers` lets dependent components decide whether continued
//   work (e.g. polling) is worthwhile
//
// ## Dispatch
//
// State mutation happens under the notifier's lock, but callbacks are
// invoked outside it through a dispatch queue drained by whichever call
// started delivery. A callback that re-enters the notifier (publish,
// subscribe, unsubscribe) therefore cannot deadlock: a re-entrant publish
// enqueues and returns, and the outer drain delivers it afterwards.
// Replays travel through the same queue, so freshness stays monotone: no
// subscriber is ever invoked with an older value after seeing a newer one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Subscriber callback invoked with each accepted value
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscription<T> {
    /// Unique per subscription instance; a replaced subscription's id dies
    /// with it, which voids any replay still queued for it
    id: u64,
    owner: String,
    callback: Callback<T>,
    /// Sequence number of the newest value this subscription has observed
    last_seq: u64,
}

enum QueueItem<T> {
    /// An accepted publish, destined for every subscription that has not
    /// yet seen sequence `seq`
    Broadcast { seq: u64, value: T },
    /// The initial replay for one new subscription
    Replay { sub_id: u64, value: T },
}

struct NotifierState<T> {
    current: T,
    /// Sequence number of `current`; bumped on every accepted publish
    seq: u64,
    next_sub_id: u64,
    subscriptions: Vec<Subscription<T>>,
    pending: VecDeque<QueueItem<T>>,
    /// Whether some call is currently draining `pending`
    dispatching: bool,
}

/// Single-value change notifier
///
/// Holds the latest value, notifies subscribers on change, and replays the
/// latest value to late subscribers. Cloning produces another handle to the
/// same notifier.
///
/// # Example
///
/// ```rust
/// use statesync_core::notifier::ChangeNotifier;
///
/// let notifier = ChangeNotifier::new(0u32);
///
/// notifier.subscribe("ui", |value: &u32| {
///     println!("value is now {value}");
/// });
///
/// notifier.publish(1); // notifies
/// notifier.publish(1); // coalesced, no notification
/// notifier.unsubscribe("ui");
/// ```
pub struct ChangeNotifier<T> {
    state: Arc<Mutex<NotifierState<T>>>,
}

impl<T> Clone for ChangeNotifier<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> ChangeNotifier<T> {
    /// Create a notifier holding `initial` as its current value
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState {
                current: initial,
                seq: 0,
                next_sub_id: 0,
                subscriptions: Vec::new(),
                pending: VecDeque::new(),
                dispatching: false,
            })),
        }
    }

    /// Publish a value, notifying subscribers if it differs from the current one
    ///
    /// Equal consecutive values are coalesced into zero notifications.
    pub fn publish(&self, value: T) {
        self.publish_deferred(value);
        self.drain_pending();
    }

    /// Accept a value without delivering it yet
    ///
    /// Lets a caller make the accept decision and the value swap atomic
    /// under its own lock, then deliver with [`Self::drain_pending`] after
    /// releasing it. Coalescing applies exactly as in `publish`.
    pub(crate) fn publish_deferred(&self, value: T) {
        let mut state = self.state.lock().unwrap();

        if state.current == value {
            return;
        }

        state.current = value.clone();
        state.seq += 1;
        let seq = state.seq;
        state.pending.push_back(QueueItem::Broadcast { seq, value });
    }

    /// Deliver anything enqueued by [`Self::publish_deferred`]
    ///
    /// No-op when another call is already dispatching; that call delivers
    /// the new items.
    pub(crate) fn drain_pending(&self) {
        let became_drainer = self.state.lock().unwrap().claim_drain();

        if became_drainer {
            self.drain();
        }
    }

    /// Register `callback` for `owner`, replacing any existing subscription
    ///
    /// The callback is immediately invoked once with the current value, so
    /// new subscribers are never left stale.
    pub fn subscribe(
        &self,
        owner: impl Into<String>,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) {
        let owner = owner.into();
        let callback: Callback<T> = Arc::new(callback);

        let became_drainer = {
            let mut state = self.state.lock().unwrap();

            let sub_id = state.next_sub_id;
            state.next_sub_id += 1;
            let seq = state.seq;
            let replay_value = state.current.clone();

            state.subscriptions.retain(|sub| sub.owner != owner);
            state.subscriptions.push(Subscription {
                id: sub_id,
                owner,
                callback,
                // Values already accepted are historical for this
                // subscription; only the targeted replay and later
                // publishes reach it.
                last_seq: seq,
            });

            state.pending.push_back(QueueItem::Replay {
                sub_id,
                value: replay_value,
            });

            state.claim_drain()
        };

        if became_drainer {
            self.drain();
        }
    }

    /// Remove the subscription for `owner`; idempotent if absent
    pub fn unsubscribe(&self, owner: &str) {
        let mut state = self.state.lock().unwrap();
        state.subscriptions.retain(|sub| sub.owner != owner);
    }

    /// Whether any subscriber is currently registered
    pub fn has_subscribers(&self) -> bool {
        !self.state.lock().unwrap().subscriptions.is_empty()
    }

    /// Snapshot of the current value
    pub fn current(&self) -> T {
        self.state.lock().unwrap().current.clone()
    }

    /// Deliver pending queue items until the queue is empty
    ///
    /// Only ever runs in one call at a time (`dispatching` flag); the lock
    /// is released around every callback invocation.
    fn drain(&self) {
        loop {
            let deliveries: Vec<(Callback<T>, T)> = {
                let mut state = self.state.lock().unwrap();

                let Some(item) = state.pending.pop_front() else {
                    state.dispatching = false;
                    return;
                };

                match item {
                    QueueItem::Broadcast { seq, value } => state
                        .subscriptions
                        .iter_mut()
                        .filter(|sub| sub.last_seq < seq)
                        .map(|sub| {
                            sub.last_seq = seq;
                            (Arc::clone(&sub.callback), value.clone())
                        })
                        .collect(),
                    QueueItem::Replay { sub_id, value } => state
                        .subscriptions
                        .iter()
                        .filter(|sub| sub.id == sub_id)
                        .map(|sub| (Arc::clone(&sub.callback), value.clone()))
                        .collect(),
                }
            };

            for (callback, value) in deliveries {
                callback(&value);
            }
        }
    }
}

impl<T> NotifierState<T> {
    /// Claim the right to drain the queue; returns false when another call
    /// is already dispatching and will pick the new item up
    fn claim_drain(&mut self) -> bool {
        if self.dispatching {
            false
        } else {
            self.dispatching = true;
            true
        }
    }
}
