// # Listener Endpoint Trait
//
// Defines the interface for an opaque remote endpoint the listener registry
// fans events out to.
//
// ## Responsibilities
//
// An endpoint knows how to push one payload to one peer and how to report
// that the peer is gone. The registry never interprets payload contents;
// serialization and transport framing belong to the endpoint's owner.
//
// Liveness is reported two ways: a failed `send` returns
// [`EndpointError::PeerUnreachable`], and `is_alive` lets the registry
// sweep endpoints whose transport can detect death without a send.

use crate::error::EndpointError;
use async_trait::async_trait;

/// Trait for remote listener endpoint implementations
#[async_trait]
pub trait ListenerEndpoint: Send + Sync {
    /// Send one payload to the peer
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The payload was handed to the transport
    /// - `Err(EndpointError::PeerUnreachable)`: The peer is gone; the
    ///   registry removes this endpoint and never calls it again
    async fn send(&self, payload: &[u8]) -> Result<(), EndpointError>;

    /// Whether the peer is still reachable, as far as the transport knows
    ///
    /// Transports without passive liveness detection keep the default.
    fn is_alive(&self) -> bool {
        true
    }

    /// Short name identifying the endpoint (for logging)
    fn endpoint_name(&self) -> &str {
        "endpoint"
    }
}
