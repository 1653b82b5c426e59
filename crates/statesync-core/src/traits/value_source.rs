// # Value Source Trait
//
// Defines the interface for fetching the synchronized value from a remote
// source.
//
// ## Implementations
//
// - HTTP-based: `statesync-source-http` crate
// - In-process: any application-provided implementation (see `demos/`)
//
// ## Responsibilities
//
// A value source performs exactly one remote read per call and classifies
// the outcome. It must not retry internally, cache results, or publish
// anything: pacing, retry policy, and publication are owned by the
// synchronizer. Sources are readers, not decision-makers.

use crate::error::FetchError;
use async_trait::async_trait;

/// Trait for remote value source implementations
///
/// The synchronizer calls `fetch` repeatedly from its background loop and
/// interprets only the error classification, never transport details.
///
/// # Cancellation
///
/// `fetch` runs inside a cancellable task. Implementations should stay
/// cancellation-safe: an aborted in-flight fetch must not leave shared
/// state behind.
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// The value type this source produces
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Fetch the current value for `identity`
    ///
    /// # Returns
    ///
    /// - `Ok(value)`: A definite result for this identity
    /// - `Err(FetchError::Retryable)`: Transient failure; the caller will
    ///   retry under backoff
    /// - `Err(FetchError::Terminal)`: No value will ever arrive for this
    ///   identity; the caller stops retrying
    async fn fetch(&self, identity: &str) -> Result<Self::Value, FetchError>;

    /// Short name identifying the source implementation (for logging)
    fn source_name(&self) -> &'static str;
}
