use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::pool::event::Job;
use crate::types::Version;

/// Identity of a worker node: the host is the unique key, the public key
/// verifies its responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAddr {
    pub host: String,
    pub pubkey: VerifyingKey,
}

/// Health of a worker as tracked by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Reachable at last contact.
    Ok,
    /// Unreachable; `last_check + wait` is the earliest next probe.
    Disabled { last_check: Instant, wait: Duration },
}

impl WorkerStatus {
    pub fn is_disabled(&self) -> bool {
        matches!(self, WorkerStatus::Disabled { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Worker {
    pub addr: WorkerAddr,
    pub status: WorkerStatus,
    pub versions: Vec<Version>,
}

impl Worker {
    /// A freshly registered worker: disabled with a zero wait, so the first
    /// health check fires immediately.
    pub fn new(addr: WorkerAddr, now: Instant) -> Self {
        Self {
            addr,
            status: WorkerStatus::Disabled {
                last_check: now,
                wait: Duration::ZERO,
            },
            versions: Vec::new(),
        }
    }
}

/// State owned exclusively by the event-loop task. Nothing in here is ever
/// observed concurrently.
pub struct PoolState {
    /// All known workers, keyed by host. Workers are never removed.
    pub workers: HashMap<String, Worker>,
    /// Hosts of healthy workers with no in-flight job. Kept ordered so that
    /// selection under a fixed RNG seed is reproducible.
    pub idle: BTreeSet<String>,
    /// Admitted jobs waiting for a free worker, oldest first.
    pub backlog: VecDeque<Job>,
    rng: StdRng,
}

impl PoolState {
    pub fn new(rng_seed: Option<u64>) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            workers: HashMap::new(),
            idle: BTreeSet::new(),
            backlog: VecDeque::new(),
            rng,
        }
    }

    /// Remove and return a uniformly random idle host.
    pub fn take_random_idle(&mut self) -> Option<String> {
        if self.idle.is_empty() {
            return None;
        }
        let n = self.rng.gen_range(0..self.idle.len());
        let host = self.idle.iter().nth(n)?.clone();
        self.idle.remove(&host);
        Some(host)
    }
}
