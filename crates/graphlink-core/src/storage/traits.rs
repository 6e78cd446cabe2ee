use crate::error::Result;
use crate::library::LibraryEdgeProposal;
use crate::types::{ApplicationId, EdgeProposal, Node};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of applying one edge proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new edge was written.
    Created,
    /// The edge already existed.
    Unchanged,
    /// Not written because an endpoint lacks a persisted identity.
    Skipped,
}

/// Counters reported by a sink after a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SinkReport {
    pub total: usize,
    pub created: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl SinkReport {
    pub fn record(&mut self, outcome: &Result<UpsertOutcome>) {
        self.total += 1;
        match outcome {
            Ok(UpsertOutcome::Created) => self.created += 1,
            Ok(UpsertOutcome::Unchanged) => self.unchanged += 1,
            Ok(UpsertOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.errored += 1,
        }
    }

    pub fn merge(&mut self, other: &SinkReport) {
        self.total += other.total;
        self.created += other.created;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errored += other.errored;
    }
}

/// Log a non-routine outcome for one edge of a batch.
pub(crate) fn log_outcome<E: fmt::Display>(what: &str, edge: &E, outcome: &Result<UpsertOutcome>) {
    match outcome {
        Ok(UpsertOutcome::Skipped) => log::trace!("Skipped {} without identity: {}", what, edge),
        Err(e) => log::warn!("Failed to upsert {} {}: {}", what, edge, e),
        Ok(_) => {}
    }
}

impl fmt::Display for SinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} created={} unchanged={} skipped={} errored={}",
            self.total, self.created, self.unchanged, self.skipped, self.errored
        )
    }
}

/// Source of the declarations to link, and home of materialized nodes.
pub trait NodeStore: Send + Sync {
    /// Load at most `limit` nodes of one application, metadata included.
    fn load_nodes(&self, application_id: ApplicationId, limit: usize) -> Result<Vec<Node>>;

    /// Persist nodes, assigning identities. Idempotent by FQN within the
    /// application: an existing node keeps its identity.
    fn save_nodes(&self, application_id: ApplicationId, nodes: &[Node]) -> Result<Vec<Node>>;
}

/// Persistence boundary for same-index edges.
pub trait EdgeSink: Send + Sync {
    /// Upsert one edge, idempotent by `(source, target, kind)`.
    fn upsert_edge(&self, edge: &EdgeProposal) -> Result<UpsertOutcome>;

    /// Apply a batch, one attempt per edge. A failing edge is logged and
    /// counted; the rest of the batch still runs.
    fn upsert_edges(&self, edges: &[EdgeProposal]) -> SinkReport {
        let mut report = SinkReport::default();
        for edge in edges {
            let outcome = self.upsert_edge(edge);
            log_outcome("edge", edge, &outcome);
            report.record(&outcome);
        }
        log::info!("Edge sink: {}", report);
        report
    }
}

/// Persistence boundary for edges into the library index.
pub trait LibraryEdgeSink: Send + Sync {
    fn upsert_library_edge(&self, edge: &LibraryEdgeProposal) -> Result<UpsertOutcome>;

    fn upsert_library_edges(&self, edges: &[LibraryEdgeProposal]) -> SinkReport {
        let mut report = SinkReport::default();
        for edge in edges {
            let outcome = self.upsert_library_edge(edge);
            log_outcome("library edge", edge, &outcome);
            report.record(&outcome);
        }
        log::info!("Library edge sink: {}", report);
        report
    }
}
