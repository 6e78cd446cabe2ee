use crate::storage::SinkReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-phase wall-clock durations of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseDurations {
    #[serde(with = "duration_millis")]
    pub load: Duration,

    #[serde(with = "duration_millis")]
    pub index_build: Duration,

    #[serde(with = "duration_millis")]
    pub structural: Duration,

    #[serde(with = "duration_millis")]
    pub parallel: Duration,

    #[serde(with = "duration_millis")]
    pub index_update: Duration,

    #[serde(with = "duration_millis")]
    pub persistence: Duration,

    #[serde(with = "duration_millis")]
    pub total: Duration,
}

/// Statistics for one linking run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingStats {
    /// Nodes loaded for the application.
    pub total_nodes: usize,

    /// Whether loading stopped at the configured bound.
    pub hit_bound: bool,

    /// CONTAINS edges from the structural pass.
    pub structural_edges: usize,

    /// Same-index edges from the parallel pass.
    pub parallel_edges: usize,

    /// All same-index edge proposals handed to the sink.
    pub total_edges: usize,

    /// Virtual nodes created this run, after deduplication.
    pub new_virtual_nodes: usize,

    /// Cross-index edge proposals handed to the library sink.
    pub library_edges: usize,

    /// Nodes where at least one resolver failed.
    pub node_errors: usize,

    /// Individual resolver failures across all nodes.
    pub resolver_failures: usize,

    /// Virtual nodes that could not be persisted.
    pub virtual_node_errors: usize,

    pub edge_sink: SinkReport,

    pub library_sink: SinkReport,

    pub durations: PhaseDurations,

    /// Resident set growth across the run, where the platform reports it.
    pub memory_delta_bytes: Option<i64>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for LinkingStats {
    fn default() -> Self {
        Self {
            total_nodes: 0,
            hit_bound: false,
            structural_edges: 0,
            parallel_edges: 0,
            total_edges: 0,
            new_virtual_nodes: 0,
            library_edges: 0,
            node_errors: 0,
            resolver_failures: 0,
            virtual_node_errors: 0,
            edge_sink: SinkReport::default(),
            library_sink: SinkReport::default(),
            durations: PhaseDurations::default(),
            memory_delta_bytes: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl LinkingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the finish time and total duration
    pub fn finish(&mut self, total: Duration, memory_delta_bytes: Option<i64>) {
        self.durations.total = total;
        self.memory_delta_bytes = memory_delta_bytes;
        self.finished_at = Some(Utc::now());
    }

    /// Get a summary string for logging
    pub fn summary(&self) -> String {
        let memory = match self.memory_delta_bytes {
            Some(bytes) => format!("{:+.1} MB", bytes as f64 / (1024.0 * 1024.0)),
            None => "n/a".to_string(),
        };
        format!(
            "Linked {} nodes{}: {} edges ({} structural, {} parallel), {} new virtual nodes, \
             {} library edges | errors: {} nodes, {} resolver failures, {} virtual nodes\n  \
             edges: {}\n  library edges: {}\n  \
             phases: load {:?}, index {:?}, structural {:?}, parallel {:?}, \
             index update {:?}, persist {:?}, total {:?} | memory {}",
            self.total_nodes,
            if self.hit_bound { " (bound hit)" } else { "" },
            self.total_edges,
            self.structural_edges,
            self.parallel_edges,
            self.new_virtual_nodes,
            self.library_edges,
            self.node_errors,
            self.resolver_failures,
            self.virtual_node_errors,
            self.edge_sink,
            self.library_sink,
            self.durations.load,
            self.durations.index_build,
            self.durations.structural,
            self.durations.parallel,
            self.durations.index_update,
            self.durations.persistence,
            self.durations.total,
            memory,
        )
    }
}

/// Resident set size of this process in bytes.
///
/// Reads `VmRSS` from `/proc/self/status`, which the kernel reports in kB
/// whatever the page size; `None` on platforms without procfs.
pub(crate) fn resident_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let rest = status.lines().find_map(|l| l.strip_prefix("VmRSS:"))?;
    let mut fields = rest.split_whitespace();
    let value: u64 = fields.next()?.parse().ok()?;
    match fields.next() {
        Some("kB") | None => Some(value * 1024),
        Some(_) => None,
    }
}

// Durations are reported in milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
