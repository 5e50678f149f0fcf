use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of admitted jobs waiting for a worker. Submissions
    /// beyond this are rejected so the caller can retry later.
    pub max_queued_jobs: usize,
    /// Timeout for a version-listing request to a worker.
    pub version_timeout: Duration,
    /// Timeout for a run request to a worker. Compiles can be slow, so this
    /// is much larger than the version timeout.
    pub run_timeout: Duration,
    /// Fixed RNG seed for worker selection. Tests set this to make idle-pick
    /// order reproducible; production leaves it unset.
    pub rng_seed: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_queued_jobs: 100,
            version_timeout: Duration::from_secs(10),
            run_timeout: Duration::from_secs(90),
            rng_seed: None,
        }
    }
}

impl PoolConfig {
    pub fn new(max_queued_jobs: usize) -> Self {
        Self {
            max_queued_jobs,
            ..Default::default()
        }
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}
