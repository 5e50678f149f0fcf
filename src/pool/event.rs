//! The shared event queue and the events that drive the pool.
//!
//! All pool mutations travel through here: clients and background tasks
//! insert events, the single event-loop task drains them in due-time order.
//! Compound operations (admission's check-then-enqueue, the loop's
//! peek-then-pop) each run under one lock acquisition so they are
//! linearizable, and every insert signals the wakeup latch afterwards so
//! the loop can never miss an event.

use std::collections::BinaryHeap;

use ed25519_dalek::VerifyingKey;
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::pool::state::WorkerAddr;
use crate::pool::status::PoolStatus;
use crate::types::{RunRequest, RunResponse, Version};

/// An admitted job: the request plus the single-shot responder that
/// delivers the outcome to the waiting client. The responder is consumed
/// exactly once, whichever path completes the job.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub request: RunRequest,
    pub respond: oneshot::Sender<RunResponse>,
}

impl Job {
    pub fn new(request: RunRequest, respond: oneshot::Sender<RunResponse>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            respond,
        }
    }
}

/// Everything the event loop reacts to.
#[derive(Debug)]
pub enum Event {
    /// Register a worker (or re-probe an existing one).
    AddWorker { host: String, pubkey: VerifyingKey },
    /// An admitted job, ready to be handed to a worker.
    NewJob(Job),
    /// A worker finished its job (or recovered) and can take another.
    WorkerIdle(WorkerAddr),
    /// Probe a worker for its supported versions.
    VersionRefresh(WorkerAddr),
    /// A worker RPC failed; disable the worker and schedule a re-probe.
    WorkerFailed(WorkerAddr),
    /// A worker answered a version probe.
    WorkerVersions(WorkerAddr, Vec<Version>),
    /// Take a consistent snapshot of the pool.
    Status(oneshot::Sender<PoolStatus>),
}

struct ScheduledEvent {
    due: Instant,
    seq: u64,
    event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    // Reversed so the BinaryHeap acts as a min-heap on (due, seq): earliest
    // due time first, insertion order among equals.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered event queue plus the admitted-jobs counter. Both live under
/// the same mutex so admission and dispatch accounting are one atomic step.
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
    /// Jobs admitted but not yet handed to a worker or synthetically
    /// completed. Counts jobs still in flight as `NewJob` events as well as
    /// jobs sitting in the backlog.
    pub num_queued_jobs: usize,
    /// Set on shutdown; admission and registration stop here.
    pub closed: bool,
}

impl EventQueue {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            num_queued_jobs: 0,
            closed: false,
        }
    }

    pub fn push(&mut self, due: Instant, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent { due, seq, event });
    }

    /// Pop the head if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Event> {
        if self.heap.peek()?.due <= now {
            Some(self.heap.pop()?.event)
        } else {
            None
        }
    }

    /// Pop the head regardless of due time. Used when draining on shutdown.
    pub fn pop_any(&mut self) -> Option<Event> {
        self.heap.pop().map(|scheduled| scheduled.event)
    }

    /// Due time of the head, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|ev| ev.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// State shared between the pool handle, background tasks, and the event
/// loop. `PoolState` itself is deliberately not here: only the loop task
/// touches it.
pub struct SharedState {
    pub queue: Mutex<EventQueue>,
    /// Level-triggered 0/1 latch rousing the event loop. Signalling while
    /// already set is a no-op; a spurious wakeup just re-inspects the queue.
    pub wakeup: Notify,
    /// Sorted, de-duplicated union of all workers' advertised versions.
    pub versions: RwLock<Vec<Version>>,
    /// The pool's time zero. Immediate events are scheduled at the epoch so
    /// they sort ahead of anything scheduled for a real future instant.
    pub epoch: Instant,
    pub max_queued_jobs: usize,
}

impl SharedState {
    pub fn new(max_queued_jobs: usize) -> Self {
        Self {
            queue: Mutex::new(EventQueue::new()),
            wakeup: Notify::new(),
            versions: RwLock::new(Vec::new()),
            epoch: Instant::now(),
            max_queued_jobs,
        }
    }

    /// Insert an event and rouse the loop.
    pub async fn enqueue(&self, due: Instant, event: Event) {
        {
            let mut queue = self.queue.lock().await;
            queue.push(due, event);
        }
        self.wakeup.notify_one();
    }

    /// Insert an event due immediately.
    pub async fn enqueue_immediate(&self, event: Event) {
        self.enqueue(self.epoch, event).await;
    }

    /// Account for a job leaving the admitted-but-unassigned set.
    pub async fn job_unqueued(&self) {
        let mut queue = self.queue.lock().await;
        queue.num_queued_jobs = queue.num_queued_jobs.saturating_sub(1);
    }
}
