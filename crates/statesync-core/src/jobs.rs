// # Job Tracker
//
// Owns a set of named, cancellable background tasks.
//
// ## Purpose
//
// Callers hand the tracker a name and a future. Starting a job under a name
// that is already running supersedes the old job: the old task is aborted
// and awaited before the new one is spawned, so no two jobs with the same
// name ever run concurrently and a superseded job can produce no side
// effects after `start()` returns.
//
// ## Concurrency
//
// Jobs under distinct names run independently; the tracker is a pure
// bookkeeping layer and never serializes unrelated jobs. Cancellation is
// abort-based: a pending sleep or in-flight await ends at the next
// suspension point, which for fetch loops means within one retry-sleep
// interval.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// A tracked job: the running task plus the id used for self-removal
struct JobHandle {
    id: u64,
    handle: JoinHandle<()>,
}

/// Tracker for named, cancellable background tasks
///
/// Cloning the tracker produces another handle to the same job set.
///
/// # Example
///
/// ```rust,no_run
/// use statesync_core::jobs::JobTracker;
///
/// #[tokio::main]
/// async fn main() {
///     let tracker = JobTracker::new();
///
///     tracker.start("sync", async {
///         // long-running work
///     }).await;
///
///     // Superseding cancels the previous "sync" job first
///     tracker.start("sync", async {}).await;
///
///     tracker.cancel_all().await;
/// }
/// ```
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl JobTracker {
    /// Create a new tracker with no jobs
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a named job, superseding any job already running under `name`
    ///
    /// When `start` returns, the previous job under `name` (if any) has
    /// fully terminated and the new job has been spawned.
    pub async fn start<F>(&self, name: impl Into<String>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut jobs = self.jobs.lock().await;

        if let Some(previous) = jobs.remove(&name) {
            debug!("Superseding job '{}'", name);
            Self::stop(previous).await;
        }

        let jobs_ref = Arc::clone(&self.jobs);
        let job_name = name.clone();
        let handle = tokio::spawn(async move {
            work.await;

            // Remove our own entry, but only if we have not been superseded
            // in the meantime.
            let mut jobs = jobs_ref.lock().await;
            if jobs.get(&job_name).is_some_and(|job| job.id == id) {
                jobs.remove(&job_name);
            }
        });

        jobs.insert(name, JobHandle { id, handle });
    }

    /// Cancel the job running under `name`, if any
    ///
    /// Waits for the task to terminate. Idempotent if no such job exists.
    pub async fn cancel(&self, name: &str) {
        let job = self.jobs.lock().await.remove(name);

        if let Some(job) = job {
            debug!("Cancelling job '{}'", name);
            Self::stop(job).await;
        }
    }

    /// Cancel every tracked job
    ///
    /// Used at teardown. Waits for all tasks to terminate.
    pub async fn cancel_all(&self) {
        let jobs: Vec<_> = self.jobs.lock().await.drain().collect();

        for (name, job) in jobs {
            debug!("Cancelling job '{}'", name);
            Self::stop(job).await;
        }
    }

    /// Whether a job is currently tracked under `name`
    pub async fn is_running(&self, name: &str) -> bool {
        self.jobs.lock().await.contains_key(name)
    }

    /// Number of tracked jobs
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Whether no jobs are tracked
    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Abort a job and wait for the task to fully terminate
    async fn stop(job: JobHandle) {
        job.handle.abort();
        // Await so the caller observes full termination; an aborted task
        // reports JoinError::is_cancelled, which is expected here.
        let _ = job.handle.await;
    }
}
