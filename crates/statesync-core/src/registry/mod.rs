//! Listener registry for cross-process event fan-out
//!
//! The registry maintains a set of opaque remote endpoints and broadcasts
//! payloads to all of them, pruning endpoints whose peer has gone away.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statesync_core::registry::ListenerRegistry;
//!
//! let registry = ListenerRegistry::new();
//!
//! // New listeners get a targeted ready signal before any broadcast
//! registry.register(Box::new(endpoint)).await;
//!
//! // Fan an event out; unreachable listeners are dropped afterwards
//! registry.broadcast(b"settings-changed").await;
//! ```
//!
//! ## Liveness
//!
//! Two removal paths exist: a send failing with `PeerUnreachable` during a
//! broadcast pass, and the explicit [`ListenerRegistry::prune_unreachable`]
//! sweep for transports that can detect peer death without sending.

use crate::error::EndpointError;
use crate::traits::ListenerEndpoint;
use tokio::sync::Mutex;
use tracing::debug;

/// Payload of the readiness acknowledgement sent to each newly registered
/// listener
///
/// New listeners must receive an explicit readiness signal before any
/// broadcast is meaningful to them. Owners with a transport-specific
/// encoding override it via [`ListenerRegistry::with_ready_payload`].
pub const DEFAULT_READY_PAYLOAD: &[u8] = b"ready";

/// Registry of remote listener endpoints
///
/// ## Thread Safety
///
/// Registry mutation and broadcast iteration share one mutual-exclusion
/// domain. Broadcast is synchronous fan-out in registration order;
/// volumes are small and per-endpoint ordering must be preserved.
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Box<dyn ListenerEndpoint>>>,
    ready_payload: Vec<u8>,
}

impl ListenerRegistry {
    /// Create an empty registry using [`DEFAULT_READY_PAYLOAD`]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            ready_payload: DEFAULT_READY_PAYLOAD.to_vec(),
        }
    }

    /// Create an empty registry with a transport-specific ready payload
    pub fn with_ready_payload(ready_payload: impl Into<Vec<u8>>) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            ready_payload: ready_payload.into(),
        }
    }

    /// Add an endpoint and send it the ready signal
    ///
    /// The ready signal goes to this endpoint only, not broadcast. An
    /// endpoint whose ready send fails is not retained: the peer was
    /// already gone, and unreachable peers are pruned silently.
    pub async fn register(&self, endpoint: Box<dyn ListenerEndpoint>) {
        match endpoint.send(&self.ready_payload).await {
            Ok(()) => {
                self.listeners.lock().await.push(endpoint);
            }
            Err(EndpointError::PeerUnreachable(reason)) => {
                debug!(
                    "Dropping listener '{}' at registration: {}",
                    endpoint.endpoint_name(),
                    reason
                );
            }
        }
    }

    /// Send `payload` to every registered endpoint
    ///
    /// Endpoints whose send fails with a peer-unreachable condition are
    /// collected and removed after the pass completes, so one failing send
    /// does not perturb iteration over the others.
    pub async fn broadcast(&self, payload: &[u8]) {
        let mut listeners = self.listeners.lock().await;

        let mut unreachable = Vec::new();

        for (index, listener) in listeners.iter().enumerate() {
            if let Err(EndpointError::PeerUnreachable(reason)) = listener.send(payload).await {
                debug!(
                    "Listener '{}' unreachable during broadcast: {}",
                    listener.endpoint_name(),
                    reason
                );
                unreachable.push(index);
            }
        }

        for index in unreachable.into_iter().rev() {
            listeners.remove(index);
        }
    }

    /// Drop every endpoint whose transport reports the peer gone
    pub async fn prune_unreachable(&self) {
        let mut listeners = self.listeners.lock().await;

        listeners.retain(|listener| {
            let alive = listener.is_alive();
            if !alive {
                debug!("Pruning dead listener '{}'", listener.endpoint_name());
            }
            alive
        });
    }

    /// Number of registered endpoints
    pub async fn len(&self) -> usize {
        self.listeners.lock().await.len()
    }

    /// Whether no endpoints are registered
    pub async fn is_empty(&self) -> bool {
        self.listeners.lock().await.is_empty()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    struct StubEndpoint {
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
        alive: bool,
    }

    #[async_trait]
    impl ListenerEndpoint for StubEndpoint {
        async fn send(&self, payload: &[u8]) -> Result<(), EndpointError> {
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    #[tokio::test]
    async fn register_sends_targeted_ready_signal() {
        let registry = ListenerRegistry::new();
        let sent = Arc::new(StdMutex::new(Vec::new()));

        registry
            .register(Box::new(StubEndpoint {
                sent: Arc::clone(&sent),
                alive: true,
            }))
            .await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(*sent.lock().unwrap(), vec![DEFAULT_READY_PAYLOAD.to_vec()]);
    }

    #[tokio::test]
    async fn custom_ready_payload_is_used() {
        let registry = ListenerRegistry::with_ready_payload(b"hello".to_vec());
        let sent = Arc::new(StdMutex::new(Vec::new()));

        registry
            .register(Box::new(StubEndpoint {
                sent: Arc::clone(&sent),
                alive: true,
            }))
            .await;

        assert_eq!(*sent.lock().unwrap(), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn prune_drops_dead_endpoints() {
        let registry = ListenerRegistry::new();

        for alive in [true, false, true] {
            registry
                .register(Box::new(StubEndpoint {
                    sent: Arc::new(StdMutex::new(Vec::new())),
                    alive,
                }))
                .await;
        }

        assert_eq!(registry.len().await, 3);
        registry.prune_unreachable().await;
        assert_eq!(registry.len().await, 2);
    }
}
