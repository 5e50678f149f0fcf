//! The worker pool: admission control, the event loop, and pool state.
//!
//! # Components
//!
//! - [`WorkerPool`]: the public handle. Constructing one spawns the event
//!   loop; all methods communicate with it through the shared event queue.
//! - [`dispatcher`]: the single-consumer event loop that owns all mutable
//!   pool state.
//! - [`event`]: the event vocabulary and the time-ordered queue.
//! - [`state`]: workers, the idle set, and the backlog.
//! - [`status`]: the introspection snapshot and its JSON shape.
//!
//! # Job Flow
//!
//! 1. `submit_job` admits the job if the pool is under its cap and enqueues
//!    it for the loop.
//! 2. The loop hands it to a random idle worker, or parks it in the backlog.
//! 3. A background task runs the worker RPC and reports the worker idle or
//!    failed; the client's response is delivered through a oneshot channel.

pub mod dispatcher;
pub mod event;
pub mod state;
pub mod status;

pub use state::{Worker, WorkerAddr, WorkerStatus};
pub use status::{PoolStatus, TimeSpec, WorkerSnapshot};

use std::sync::Arc;

use ed25519_dalek::{SigningKey, VerifyingKey};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::{FarmError, Result};
use crate::pool::dispatcher::Dispatcher;
use crate::pool::event::{Event, Job, SharedState};
use crate::types::{RunRequest, RunResponse, Version};
use crate::worker::{HttpWorkerClient, WorkerClient};

/// Handle to a running worker pool.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Dropping the
/// handle stops the event loop.
pub struct WorkerPool {
    shared: Arc<SharedState>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Start a pool that talks to workers over HTTP, signing run requests
    /// with `secret_key`.
    pub fn new(secret_key: SigningKey, config: PoolConfig) -> Self {
        let client = Arc::new(HttpWorkerClient::new(secret_key, &config));
        Self::with_client(client, config)
    }

    /// Start a pool with a custom worker client. Tests inject mock clients
    /// through here.
    pub fn with_client(client: Arc<dyn WorkerClient>, config: PoolConfig) -> Self {
        let shared = Arc::new(SharedState::new(config.max_queued_jobs));
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&shared),
            client,
            config.rng_seed,
            cancel.clone(),
        );
        tokio::spawn(dispatcher.run());
        Self { shared, cancel }
    }

    /// Submit a job and wait for its outcome.
    ///
    /// Returns `None` if the pool refused the job (at capacity, or shut
    /// down); the caller should retry later. Otherwise the job was accepted
    /// and the result is the worker's response, or a synthetic backend
    /// error if no worker could run it.
    pub async fn submit_job(&self, request: RunRequest) -> Option<RunResponse> {
        let (respond, outcome) = oneshot::channel();
        let job = Job::new(request, respond);
        let job_id = job.id;

        {
            let mut queue = self.shared.queue.lock().await;
            if queue.closed {
                tracing::warn!(job_id = %job_id, "Job rejected: pool is shut down");
                return None;
            }
            if queue.num_queued_jobs >= self.shared.max_queued_jobs {
                tracing::info!(
                    job_id = %job_id,
                    queued = queue.num_queued_jobs,
                    "Job rejected: pool at capacity"
                );
                return None;
            }
            queue.num_queued_jobs += 1;
            queue.push(self.shared.epoch, Event::NewJob(job));
        }
        self.shared.wakeup.notify_one();
        tracing::debug!(job_id = %job_id, "Job admitted");

        match outcome.await {
            Ok(response) => Some(response),
            // The loop stopped before answering; the job was accepted, so
            // the caller still gets a response.
            Err(_) => Some(RunResponse::backend_error()),
        }
    }

    /// Register a worker node. The worker starts out disabled and becomes
    /// available once its first version probe succeeds.
    pub async fn add_worker(&self, host: &str, pubkey: [u8; 32]) -> Result<()> {
        if !host.is_ascii() {
            return Err(FarmError::InvalidHost(host.to_string()));
        }
        let pubkey = VerifyingKey::from_bytes(&pubkey)
            .map_err(|e| FarmError::InvalidKey(e.to_string()))?;

        {
            let queue = self.shared.queue.lock().await;
            if queue.closed {
                return Err(FarmError::PoolClosed);
            }
        }
        self.shared
            .enqueue_immediate(Event::AddWorker {
                host: host.to_string(),
                pubkey,
            })
            .await;
        Ok(())
    }

    /// Sorted, de-duplicated union of all workers' advertised versions.
    pub async fn available_versions(&self) -> Vec<Version> {
        self.shared.versions.read().await.clone()
    }

    /// A consistent snapshot of the pool, taken on the event loop so that
    /// workers, idle flags, and queue lengths agree with each other.
    pub async fn status(&self) -> Result<PoolStatus> {
        let (respond, snapshot) = oneshot::channel();
        {
            let queue = self.shared.queue.lock().await;
            if queue.closed {
                return Err(FarmError::PoolClosed);
            }
        }
        self.shared.enqueue_immediate(Event::Status(respond)).await;
        snapshot.await.map_err(|_| FarmError::PoolClosed)
    }

    /// Stop the event loop. Jobs that were admitted but not yet handed to a
    /// worker are failed with a backend error; subsequent submissions are
    /// rejected.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
