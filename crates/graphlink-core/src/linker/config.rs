use crate::error::{LinkError, Result};
use std::time::Duration;

/// Configuration for a linking run
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// Upper bound on nodes loaded per run. Hitting it is logged, not
    /// paginated. Default: 1,000,000.
    pub max_nodes: usize,

    /// Wall-clock budget for the whole parallel pass. Default: 30 minutes.
    pub parallel_timeout: Duration,

    /// Node-error count at which the run logs a systemic problem.
    /// Default: 100.
    pub error_threshold: usize,

    /// Cap on parallel workers. The pool uses
    /// `min(available_parallelism, max_workers)`. Default: 8.
    pub max_workers: usize,

    /// Log parallel progress every N completed nodes. Default: 1000.
    pub progress_log_every: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            max_nodes: 1_000_000,
            parallel_timeout: Duration::from_secs(30 * 60),
            error_threshold: 100,
            max_workers: 8,
            progress_log_every: 1000,
        }
    }
}

impl LinkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    pub fn with_parallel_timeout(mut self, timeout: Duration) -> Self {
        self.parallel_timeout = timeout;
        self
    }

    pub fn with_error_threshold(mut self, threshold: usize) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_progress_log_every(mut self, every: usize) -> Self {
        self.progress_log_every = every;
        self
    }

    /// Number of worker threads for this machine.
    pub fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        available.min(self.max_workers).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_nodes == 0 {
            return Err(LinkError::Validation("max_nodes must be > 0".into()));
        }

        if self.parallel_timeout.is_zero() {
            return Err(LinkError::Validation(
                "parallel_timeout must be > 0".into(),
            ));
        }

        if self.max_workers == 0 {
            return Err(LinkError::Validation("max_workers must be > 0".into()));
        }

        if self.progress_log_every == 0 {
            return Err(LinkError::Validation(
                "progress_log_every must be > 0".into(),
            ));
        }

        Ok(())
    }
}
