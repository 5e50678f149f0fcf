//! Operational snapshot of the pool, serialized for introspection
//! endpoints. Field names are part of the wire format.

use std::time::Duration;

use serde::Serialize;

use crate::types::Version;

/// A duration (or monotonic timestamp relative to pool start) split into
/// whole seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSpec {
    pub sec: u64,
    pub nsec: u32,
}

impl From<Duration> for TimeSpec {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            nsec: d.subsec_nanos(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    /// `[host, base64 public key]`.
    pub addr: (String, String),
    /// `None` while the worker is healthy; otherwise when the last health
    /// check happened (relative to pool start) and how long the pool waits
    /// before the next one.
    pub disabled: Option<(TimeSpec, TimeSpec)>,
    pub versions: Vec<Version>,
    pub idle: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub workers: Vec<WorkerSnapshot>,
    pub job_queue_length: usize,
    pub event_queue_length: usize,
}
