// # statesync-core
//
// Core library for the background state-synchronization system.
//
// ## Architecture Overview
//
// This library provides the building blocks for keeping a locally published
// value in sync with a remote source:
//
// - **ExponentialBackoff**: Capped, saturating delay sequence for retries
// - **JobTracker**: Named, cancellable background tasks; superseding a name
//   cancels the prior task under that name
// - **ChangeNotifier**: Single-value publish/subscribe with coalescing and
//   replay-to-late-subscribers
// - **ListenerRegistry**: Fan-out to opaque remote endpoints with
//   send-failure liveness pruning
// - **StateSynchronizer**: The composition — identity-triggered background
//   fetch loops publishing through a notifier
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Retry policy, task lifecycle and
//    publication are owned here; transports and value semantics are
//    collaborator traits
// 2. **Event-Driven**: Fetch loops run only while triggered and subscribed
//    to; nothing polls in the idle state
// 3. **Library-First**: All core functionality can be used embedded
// 4. **Contained Failure**: No background job propagates an error out of
//    its loop; each iteration decides retry, stop or discard

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod notifier;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use backoff::ExponentialBackoff;
pub use config::{BackoffConfig, SyncConfig};
pub use engine::{StateSynchronizer, SyncEvent};
pub use error::{EndpointError, Error, FetchError, Result};
pub use jobs::JobTracker;
pub use notifier::ChangeNotifier;
pub use registry::ListenerRegistry;
pub use traits::{IdentityEvent, IdentityFeed, ListenerEndpoint, ManualIdentityFeed, ValueSource};
