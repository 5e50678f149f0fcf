//! Test harness for pool integration tests.
//!
//! Provides a scripted mock worker client, pool construction helpers, and
//! wait-with-timeout utilities.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use tokio::sync::Mutex;
use tokio::time::Instant;

use compile_farm::config::PoolConfig;
use compile_farm::pool::{WorkerAddr, WorkerPool};
use compile_farm::types::{RunCommand, RunOutput, RunRequest, RunResponse, Version};
use compile_farm::worker::WorkerClient;

/// Public key bytes for a test worker identity.
pub fn worker_pubkey(key_seed: u8) -> [u8; 32] {
    SigningKey::from_bytes(&[key_seed; 32])
        .verifying_key()
        .to_bytes()
}

pub fn versions(names: &[&str]) -> Vec<Version> {
    names.iter().map(|v| v.to_string()).collect()
}

pub fn run_request(source: &str) -> RunRequest {
    RunRequest {
        command: RunCommand::Run,
        source: source.to_string(),
        version: "9.8.1".to_string(),
        opt: "O1".to_string(),
    }
}

/// The output the mock worker produces for a given request.
pub fn expected_output(request: &RunRequest) -> RunOutput {
    RunOutput {
        exit_code: 0,
        stdout: format!("output for {}", request.source),
        stderr: String::new(),
        time_taken_secs: 0.1,
    }
}

/// Scripted worker client.
///
/// Version probes consume a per-host script of results; once the script is
/// exhausted (or absent) the probe succeeds with the host's configured
/// version list, falling back to the defaults. Runs succeed with
/// [`expected_output`] unless failures are switched on. All calls are
/// logged so tests can assert probe timing and dispatch order.
pub struct MockWorkerClient {
    default_versions: Vec<Version>,
    versions_script: Mutex<HashMap<String, VecDeque<Option<Vec<Version>>>>>,
    host_versions: Mutex<HashMap<String, Vec<Version>>>,
    fail_runs: AtomicBool,
    run_delay: Duration,
    pub probe_log: Mutex<Vec<(String, Instant)>>,
    pub run_log: Mutex<Vec<(String, RunRequest)>>,
}

impl MockWorkerClient {
    pub fn new(default_versions: &[&str]) -> Self {
        Self {
            default_versions: versions(default_versions),
            versions_script: Mutex::new(HashMap::new()),
            host_versions: Mutex::new(HashMap::new()),
            fail_runs: AtomicBool::new(false),
            run_delay: Duration::ZERO,
            probe_log: Mutex::new(Vec::new()),
            run_log: Mutex::new(Vec::new()),
        }
    }

    /// Make each run take this long before completing.
    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Queue up version-probe results for a host, consumed one per probe.
    pub async fn script_versions(&self, host: &str, script: Vec<Option<Vec<Version>>>) {
        self.versions_script
            .lock()
            .await
            .insert(host.to_string(), script.into());
    }

    /// Fix the version list a host reports once its script runs dry.
    pub async fn set_versions(&self, host: &str, names: &[&str]) {
        self.host_versions
            .lock()
            .await
            .insert(host.to_string(), versions(names));
    }

    pub fn set_fail_runs(&self, fail: bool) {
        self.fail_runs.store(fail, Ordering::SeqCst);
    }

    /// Gaps between consecutive version probes of a host.
    pub async fn probe_gaps(&self, host: &str) -> Vec<Duration> {
        let log = self.probe_log.lock().await;
        let instants: Vec<Instant> = log
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, at)| *at)
            .collect();
        instants.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Sources of all executed runs, in dispatch order.
    pub async fn run_order(&self) -> Vec<String> {
        self.run_log
            .lock()
            .await
            .iter()
            .map(|(_, request)| request.source.clone())
            .collect()
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn versions(&self, addr: &WorkerAddr) -> Option<Vec<Version>> {
        self.probe_log
            .lock()
            .await
            .push((addr.host.clone(), Instant::now()));

        if let Some(script) = self.versions_script.lock().await.get_mut(&addr.host) {
            if let Some(result) = script.pop_front() {
                return result;
            }
        }
        if let Some(list) = self.host_versions.lock().await.get(&addr.host) {
            return Some(list.clone());
        }
        Some(self.default_versions.clone())
    }

    async fn run_job(&self, addr: &WorkerAddr, request: &RunRequest) -> Option<RunResponse> {
        self.run_log
            .lock()
            .await
            .push((addr.host.clone(), request.clone()));
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        if self.fail_runs.load(Ordering::SeqCst) {
            return None;
        }
        Some(RunResponse::Ok(expected_output(request)))
    }
}

/// Pool with a fixed RNG seed so idle-worker selection is reproducible.
pub fn test_pool(client: Arc<MockWorkerClient>, max_queued_jobs: usize) -> WorkerPool {
    WorkerPool::with_client(client, PoolConfig::new(max_queued_jobs).with_rng_seed(42))
}

/// Register a worker and wait until it shows up healthy and idle.
pub async fn add_healthy_worker(pool: &WorkerPool, host: &str, key_seed: u8) {
    pool.add_worker(host, worker_pubkey(key_seed)).await.unwrap();
    wait_for_idle(pool, host).await;
}

pub async fn wait_for_idle(pool: &WorkerPool, host: &str) {
    let host = host.to_string();
    assert_eventually(
        || async {
            match pool.status().await {
                Ok(status) => status
                    .workers
                    .iter()
                    .any(|w| w.addr.0 == host && w.idle),
                Err(_) => false,
            }
        },
        Duration::from_secs(30),
        &format!("worker {} never became idle", host),
    )
    .await;
}

pub fn assert_duration_near(actual: Duration, expected: Duration, tolerance: Duration) {
    let delta = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        delta <= tolerance,
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(50)).await;
    assert!(result, "{}", message);
}
