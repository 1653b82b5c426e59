//! Test doubles and common utilities for contract tests
//!
//! This module provides controllable doubles that verify the synchronizer's
//! contracts without real transports.

use async_trait::async_trait;
use statesync_core::config::{BackoffConfig, SyncConfig};
use statesync_core::error::{EndpointError, FetchError};
use statesync_core::traits::{ListenerEndpoint, ValueSource};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// What a scripted fetch should produce
#[derive(Debug, Clone)]
pub enum FetchPlan {
    /// A definite value
    Value(String),
    /// A definite value derived from the identity (`"<identity>-value"`)
    EchoIdentity,
    /// A transient failure
    Retryable,
    /// An authoritative "no value will arrive"
    Terminal,
}

struct ScriptedSourceState {
    script: Mutex<VecDeque<FetchPlan>>,
    fallback: FetchPlan,
    /// When present, each fetch consumes one permit before proceeding
    gate: Option<Semaphore>,
    fetch_count: AtomicUsize,
    fetched_identities: Mutex<Vec<String>>,
}

/// A value source driven by a script of planned outcomes
///
/// Fetches pop the front of the script; once it is empty, every fetch
/// follows the fallback plan. Cloning shares the script and counters.
#[derive(Clone)]
pub struct ScriptedValueSource {
    state: Arc<ScriptedSourceState>,
}

impl ScriptedValueSource {
    /// Every fetch follows `fallback`
    pub fn with_fallback(fallback: FetchPlan) -> Self {
        Self::scripted(Vec::new(), fallback)
    }

    /// Fetches follow `plans` in order, then `fallback`
    pub fn scripted(plans: Vec<FetchPlan>, fallback: FetchPlan) -> Self {
        Self {
            state: Arc::new(ScriptedSourceState {
                script: Mutex::new(plans.into()),
                fallback,
                gate: None,
                fetch_count: AtomicUsize::new(0),
                fetched_identities: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every fetch follows `fallback`, but blocks until a permit is
    /// released with [`Self::release_fetches`]
    pub fn gated(fallback: FetchPlan) -> Self {
        Self {
            state: Arc::new(ScriptedSourceState {
                script: Mutex::new(VecDeque::new()),
                fallback,
                gate: Some(Semaphore::new(0)),
                fetch_count: AtomicUsize::new(0),
                fetched_identities: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Allow `n` gated fetches to proceed
    pub fn release_fetches(&self, n: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(n);
        }
    }

    /// Number of fetches that ran (past the gate, if any)
    pub fn fetch_count(&self) -> usize {
        self.state.fetch_count.load(Ordering::SeqCst)
    }

    /// The identities fetches were made for, in order
    pub fn fetched_identities(&self) -> Vec<String> {
        self.state.fetched_identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl ValueSource for ScriptedValueSource {
    type Value = String;

    async fn fetch(&self, identity: &str) -> Result<String, FetchError> {
        if let Some(gate) = &self.state.gate {
            let permit = gate.acquire().await.expect("gate never closes");
            permit.forget();
        }

        self.state.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.state
            .fetched_identities
            .lock()
            .unwrap()
            .push(identity.to_string());

        let plan = self
            .state
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.state.fallback.clone());

        match plan {
            FetchPlan::Value(value) => Ok(value),
            FetchPlan::EchoIdentity => Ok(format!("{identity}-value")),
            FetchPlan::Retryable => Err(FetchError::retryable("scripted transient failure")),
            FetchPlan::Terminal => Err(FetchError::terminal("scripted terminal result")),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A listener endpoint that records payloads and can be told to fail
///
/// Cloning shares the recorded payloads and the failure switch.
#[derive(Clone)]
pub struct RecordingEndpoint {
    name: &'static str,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    unreachable: Arc<AtomicBool>,
}

impl RecordingEndpoint {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            received: Arc::new(Mutex::new(Vec::new())),
            unreachable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every future send fail with a peer-unreachable condition
    pub fn mark_unreachable(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }

    /// The payloads received so far, in order
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListenerEndpoint for RecordingEndpoint {
    async fn send(&self, payload: &[u8]) -> Result<(), EndpointError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(EndpointError::PeerUnreachable("peer went away".to_string()));
        }

        self.received.lock().unwrap().push(payload.to_vec());
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    fn endpoint_name(&self) -> &str {
        self.name
    }
}

/// A subscriber callback that collects every notified value
///
/// Returns the collector handle and a callback suitable for
/// `StateSynchronizer::subscribe`.
pub fn collecting_subscriber<T: Clone + Send + 'static>()
-> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    (seen, move |value: &T| {
        sink.lock().unwrap().push(value.clone());
    })
}

/// Helper to create a SyncConfig with test-sized backoff delays
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        backoff: BackoffConfig {
            base_ms: 5,
            cap_ms: 20,
        },
        max_invalidated_retries: 7,
        event_channel_capacity: 100,
    }
}
