//! Outbound RPC to worker nodes.
//!
//! A worker is a remote HTTP endpoint that can list the compiler versions
//! it offers and execute a signed run request. The pool only ever talks to
//! workers through the [`WorkerClient`] trait; [`HttpWorkerClient`] is the
//! production implementation, and tests substitute scripted mocks.

pub mod client;
pub mod wire;

pub use client::HttpWorkerClient;

use async_trait::async_trait;

use crate::pool::state::WorkerAddr;
use crate::types::{RunRequest, RunResponse, Version};

/// Stateless client for worker RPC. Implementations collapse every failure
/// mode (timeout, transport error, bad payload, signature mismatch) to
/// `None`; the pool turns that into worker health bookkeeping.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// List the compiler versions the worker offers.
    async fn versions(&self, addr: &WorkerAddr) -> Option<Vec<Version>>;

    /// Execute a job on the worker.
    async fn run_job(&self, addr: &WorkerAddr, request: &RunRequest) -> Option<RunResponse>;
}
