//! The pool's event loop.
//!
//! One long-lived task owns [`PoolState`] and drains the shared event queue
//! in due-time order. Handlers mutate pool state directly; anything that
//! talks to the network (version probes, job dispatch) runs in a spawned
//! background task and reports back by enqueueing a follow-up event. No
//! error escapes the loop: worker failures become events, and every job
//! responder is consumed exactly once on whichever path completes it.

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff;
use crate::pool::event::{Event, Job, SharedState};
use crate::pool::state::{PoolState, Worker, WorkerAddr, WorkerStatus};
use crate::pool::status::{PoolStatus, TimeSpec, WorkerSnapshot};
use crate::sign;
use crate::types::{RunResponse, Version};
use crate::worker::WorkerClient;

/// What one loop iteration decided to do after inspecting the queue head.
enum Step {
    Handle(Event),
    SleepUntil(Instant),
    SleepForever,
}

pub struct Dispatcher {
    shared: Arc<SharedState>,
    client: Arc<dyn WorkerClient>,
    state: PoolState,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        shared: Arc<SharedState>,
        client: Arc<dyn WorkerClient>,
        rng_seed: Option<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            client,
            state: PoolState::new(rng_seed),
            cancel,
        }
    }

    pub async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                self.close().await;
                return;
            }

            let now = Instant::now();
            let step = {
                let mut queue = self.shared.queue.lock().await;
                if let Some(event) = queue.pop_due(now) {
                    Step::Handle(event)
                } else if let Some(due) = queue.next_due() {
                    Step::SleepUntil(due)
                } else {
                    Step::SleepForever
                }
            };

            match step {
                Step::Handle(event) => self.handle(event, now).await,
                Step::SleepUntil(due) => {
                    tokio::select! {
                        _ = self.shared.wakeup.notified() => {}
                        _ = tokio::time::sleep_until(due) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                Step::SleepForever => {
                    tokio::select! {
                        _ = self.shared.wakeup.notified() => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
            }
        }
    }

    async fn handle(&mut self, event: Event, now: Instant) {
        match event {
            Event::AddWorker { host, pubkey } => self.handle_add_worker(host, pubkey, now).await,
            Event::NewJob(job) => self.handle_new_job(job).await,
            Event::WorkerIdle(addr) => self.handle_worker_idle(addr).await,
            Event::VersionRefresh(addr) => self.handle_version_refresh(addr),
            Event::WorkerFailed(addr) => self.handle_worker_failed(addr, now).await,
            Event::WorkerVersions(addr, versions) => {
                self.handle_worker_versions(addr, versions).await
            }
            Event::Status(respond) => self.handle_status(respond).await,
        }
    }

    async fn handle_add_worker(&mut self, host: String, pubkey: VerifyingKey, now: Instant) {
        let addr = WorkerAddr {
            host: host.clone(),
            pubkey,
        };
        if self.state.workers.contains_key(&host) {
            // Re-adding is allowed as an operator nudge: the probe below can
            // heal a stuck worker. The stored backoff interval is kept.
            tracing::info!(host = %host, "Worker already registered, scheduling a probe");
        } else {
            tracing::info!(host = %host, "Worker registered");
            self.state.workers.insert(host, Worker::new(addr.clone(), now));
        }
        self.shared
            .enqueue_immediate(Event::VersionRefresh(addr))
            .await;
    }

    async fn handle_new_job(&mut self, job: Job) {
        if self.state.workers.is_empty() {
            tracing::info!(job_id = %job.id, "No workers registered, failing job");
            self.shared.job_unqueued().await;
            let _ = job.respond.send(RunResponse::backend_error());
            return;
        }

        let Some(host) = self.state.take_random_idle() else {
            tracing::debug!(
                job_id = %job.id,
                backlog = self.state.backlog.len() + 1,
                "All workers busy, job backlogged"
            );
            self.state.backlog.push_back(job);
            return;
        };

        self.shared.job_unqueued().await;
        match self.state.workers.get(&host) {
            Some(worker) => {
                let addr = worker.addr.clone();
                self.dispatch(addr, job);
            }
            None => {
                tracing::error!(host = %host, job_id = %job.id, "Idle host missing from registry");
                let _ = job.respond.send(RunResponse::backend_error());
            }
        }
    }

    async fn handle_worker_idle(&mut self, addr: WorkerAddr) {
        let (disabled, worker_addr) = match self.state.workers.get(&addr.host) {
            Some(worker) => (worker.status.is_disabled(), worker.addr.clone()),
            None => {
                tracing::warn!(host = %addr.host, "Idle signal for unknown worker");
                return;
            }
        };

        if disabled {
            // A pending health check owns this worker until it reports back.
            self.state.idle.remove(&addr.host);
            return;
        }

        match self.state.backlog.pop_front() {
            Some(job) => {
                self.shared.job_unqueued().await;
                self.state.idle.remove(&addr.host);
                tracing::debug!(
                    job_id = %job.id,
                    host = %addr.host,
                    remaining = self.state.backlog.len(),
                    "Dispatching backlogged job"
                );
                self.dispatch(worker_addr, job);
            }
            None => {
                self.state.idle.insert(addr.host);
            }
        }
    }

    /// Probe the worker in the background; the loop itself mutates nothing.
    fn handle_version_refresh(&self, addr: WorkerAddr) {
        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tracing::debug!(host = %addr.host, "Probing worker for versions");
            match client.versions(&addr).await {
                Some(versions) => {
                    shared
                        .enqueue_immediate(Event::WorkerVersions(addr, versions))
                        .await
                }
                None => shared.enqueue_immediate(Event::WorkerFailed(addr)).await,
            }
        });
    }

    async fn handle_worker_failed(&mut self, addr: WorkerAddr, now: Instant) {
        let Some(worker) = self.state.workers.get_mut(&addr.host) else {
            tracing::warn!(host = %addr.host, "Failure report for unknown worker");
            return;
        };

        let wait = match worker.status {
            WorkerStatus::Ok => backoff::START_INTERVAL,
            WorkerStatus::Disabled { wait, .. } => backoff::next_interval(wait),
        };
        worker.status = WorkerStatus::Disabled {
            last_check: now,
            wait,
        };
        let refresh_addr = worker.addr.clone();

        self.state.idle.remove(&addr.host);
        tracing::warn!(
            host = %addr.host,
            wait_secs = wait.as_secs_f64(),
            "Worker disabled, probe scheduled"
        );
        self.shared
            .enqueue(now + wait, Event::VersionRefresh(refresh_addr))
            .await;
    }

    async fn handle_worker_versions(&mut self, addr: WorkerAddr, mut versions: Vec<Version>) {
        let Some(worker) = self.state.workers.get_mut(&addr.host) else {
            tracing::warn!(host = %addr.host, "Version listing for unknown worker");
            return;
        };

        let was_disabled = worker.status.is_disabled();
        versions.sort();
        versions.dedup();
        worker.status = WorkerStatus::Ok;
        worker.versions = versions.clone();
        let idle_addr = worker.addr.clone();
        tracing::info!(host = %addr.host, count = versions.len(), "Worker healthy");

        {
            let mut shared_versions = self.shared.versions.write().await;
            shared_versions.extend(versions);
            shared_versions.sort();
            shared_versions.dedup();
        }

        if was_disabled {
            // Route the recovered worker through the idle handler so it
            // picks up backlog if there is any.
            self.shared
                .enqueue_immediate(Event::WorkerIdle(idle_addr))
                .await;
        }
    }

    async fn handle_status(&mut self, respond: oneshot::Sender<PoolStatus>) {
        let epoch = self.shared.epoch;
        let mut workers: Vec<WorkerSnapshot> = self
            .state
            .workers
            .values()
            .map(|worker| WorkerSnapshot {
                addr: (
                    worker.addr.host.clone(),
                    sign::encode_public_key(&worker.addr.pubkey),
                ),
                disabled: match worker.status {
                    WorkerStatus::Ok => None,
                    WorkerStatus::Disabled { last_check, wait } => Some((
                        TimeSpec::from(last_check.duration_since(epoch)),
                        TimeSpec::from(wait),
                    )),
                },
                versions: worker.versions.clone(),
                idle: self.state.idle.contains(&worker.addr.host),
            })
            .collect();
        workers.sort_by(|a, b| a.addr.0.cmp(&b.addr.0));

        let (job_queue_length, event_queue_length) = {
            let queue = self.shared.queue.lock().await;
            (queue.num_queued_jobs, queue.len())
        };

        let _ = respond.send(PoolStatus {
            workers,
            job_queue_length,
            event_queue_length,
        });
    }

    /// Hand a job to a worker in a background task. The worker is already
    /// out of the idle set; it re-enters through `WorkerIdle` or gets
    /// disabled through `WorkerFailed` when the RPC resolves.
    fn dispatch(&self, addr: WorkerAddr, job: Job) {
        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tracing::info!(job_id = %job.id, host = %addr.host, "Dispatching job");
            match client.run_job(&addr, &job.request).await {
                Some(response) => {
                    let _ = job.respond.send(response);
                    shared.enqueue_immediate(Event::WorkerIdle(addr)).await;
                }
                None => {
                    tracing::warn!(
                        job_id = %job.id,
                        host = %addr.host,
                        "Worker failed while running job"
                    );
                    let _ = job.respond.send(RunResponse::backend_error());
                    shared.enqueue_immediate(Event::WorkerFailed(addr)).await;
                }
            }
        });
    }

    /// Shutdown path: refuse further admissions and fail every job that was
    /// admitted but never handed to a worker, so no caller is left waiting.
    async fn close(&mut self) {
        let mut pending = Vec::new();
        {
            let mut queue = self.shared.queue.lock().await;
            queue.closed = true;
            while let Some(event) = queue.pop_any() {
                if let Event::NewJob(job) = event {
                    pending.push(job);
                }
            }
        }
        pending.extend(self.state.backlog.drain(..));

        if !pending.is_empty() {
            tracing::info!(jobs = pending.len(), "Failing queued jobs on shutdown");
        }
        for job in pending {
            self.shared.job_unqueued().await;
            let _ = job.respond.send(RunResponse::backend_error());
        }
        tracing::info!("Pool event loop stopped");
    }
}
