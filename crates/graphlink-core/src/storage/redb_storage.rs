use crate::error::{LinkError, Result};
use crate::library::{LibraryEdgeProposal, LibraryNodeId};
use crate::storage::traits::{
    log_outcome, EdgeSink, LibraryEdgeSink, NodeStore, SinkReport, UpsertOutcome,
};
use crate::types::{ApplicationId, EdgeKind, EdgeProposal, Node, NodeId};
use chrono::{DateTime, Utc};
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

// Table definitions
const NODES: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("nodes");
const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");
const LIBRARY_EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("library_edges");

// Secondary indexes
const NODES_BY_APP: MultimapTableDefinition<&[u8; 16], &[u8; 16]> =
    MultimapTableDefinition::new("nodes_by_app");
const NODE_BY_FQN: TableDefinition<&str, &[u8; 16]> = TableDefinition::new("node_by_fqn");

// Metadata table
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Edges written per write transaction in batch upserts.
pub const EDGE_BATCH_SIZE: usize = 1000;

/// A persisted same-index edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub created_at: DateTime<Utc>,
}

/// A persisted edge from an application node into the library index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredLibraryEdge {
    pub node: NodeId,
    pub library_node: LibraryNodeId,
    pub library_fqn: String,
    pub kind: EdgeKind,
    pub created_at: DateTime<Utc>,
}

/// Redb-backed node store and edge sinks
pub struct RedbGraphStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbGraphStore {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LinkError::Validation(format!("Failed to create directory: {}", e))
            })?;
        }

        let is_new = !path.exists();
        let db = Database::create(&path)?;

        if !is_new {
            Self::check_schema_version(&db)?;
        }

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(NODES)?;
            let _ = write_txn.open_table(EDGES)?;
            let _ = write_txn.open_table(LIBRARY_EDGES)?;
            let _ = write_txn.open_multimap_table(NODES_BY_APP)?;
            let _ = write_txn.open_table(NODE_BY_FQN)?;
            let mut meta = write_txn.open_table(META)?;
            if is_new {
                meta.insert(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION.to_string().as_bytes())?;
            }
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    fn check_schema_version(db: &Database) -> Result<()> {
        let read_txn = db.begin_read()?;
        let version = {
            let table = read_txn.open_table(META).ok();
            table
                .and_then(|t| {
                    t.get(SCHEMA_VERSION_KEY).ok().flatten().and_then(|v| {
                        std::str::from_utf8(v.value())
                            .ok()
                            .and_then(|s| s.parse::<u32>().ok())
                    })
                })
                .unwrap_or(CURRENT_SCHEMA_VERSION)
        };

        if version != CURRENT_SCHEMA_VERSION {
            return Err(LinkError::Validation(format!(
                "Database schema v{} does not match supported v{}",
                version, CURRENT_SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn uuid_to_bytes(id: &Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    fn bytes_to_uuid(bytes: &[u8; 16]) -> Uuid {
        Uuid::from_bytes(*bytes)
    }

    fn fqn_key(application_id: ApplicationId, fqn: &str) -> String {
        format!("{}:{}", application_id, fqn)
    }

    fn edge_key(source: &Uuid, target: &Uuid, kind: EdgeKind) -> String {
        format!("{}:{}:{}", source, target, kind)
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(LinkError::from)
    }

    fn deserialize_node(bytes: &[u8]) -> Result<Node> {
        bincode::deserialize(bytes).map_err(LinkError::from)
    }

    /// Retrieve a node by ID
    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        if let Some(bytes) = table.get(&Self::uuid_to_bytes(&id))? {
            return Ok(Some(Self::deserialize_node(bytes.value())?));
        }
        Ok(None)
    }

    /// Look a node up by its application and FQN
    pub fn find_node(&self, application_id: ApplicationId, fqn: &str) -> Result<Option<Node>> {
        let read_txn = self.db.begin_read()?;
        let fqn_table = read_txn.open_table(NODE_BY_FQN)?;
        let nodes_table = read_txn.open_table(NODES)?;

        let key = Self::fqn_key(application_id, fqn);
        let Some(id) = fqn_table
            .get(key.as_str())?
            .map(|guard| Self::bytes_to_uuid(guard.value()))
        else {
            return Ok(None);
        };
        let node = match nodes_table.get(&Self::uuid_to_bytes(&id))? {
            Some(bytes) => Some(Self::deserialize_node(bytes.value())?),
            None => None,
        };
        Ok(node)
    }

    /// All persisted same-index edges
    pub fn list_edges(&self) -> Result<Vec<StoredEdge>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EDGES)?;
        let mut edges = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            edges.push(bincode::deserialize(value.value())?);
        }
        Ok(edges)
    }

    /// All persisted library edges
    pub fn list_library_edges(&self) -> Result<Vec<StoredLibraryEdge>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIBRARY_EDGES)?;
        let mut edges = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            edges.push(bincode::deserialize(value.value())?);
        }
        Ok(edges)
    }

    pub fn edge_count(&self) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EDGES)?;
        let count = table.iter()?.count() as u64;
        Ok(count)
    }

    pub fn library_edge_count(&self) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LIBRARY_EDGES)?;
        let count = table.iter()?.count() as u64;
        Ok(count)
    }
}

impl NodeStore for RedbGraphStore {
    fn load_nodes(&self, application_id: ApplicationId, limit: usize) -> Result<Vec<Node>> {
        let read_txn = self.db.begin_read()?;
        let app_index = read_txn.open_multimap_table(NODES_BY_APP)?;
        let nodes_table = read_txn.open_table(NODES)?;

        let node_ids: Vec<NodeId> = app_index
            .get(&Self::uuid_to_bytes(&application_id))?
            .take(limit)
            .map(|result| result.map(|guard| Self::bytes_to_uuid(guard.value())))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut nodes = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(bytes) = nodes_table.get(&Self::uuid_to_bytes(&node_id))? {
                nodes.push(Self::deserialize_node(bytes.value())?);
            }
        }
        Ok(nodes)
    }

    fn save_nodes(&self, application_id: ApplicationId, nodes: &[Node]) -> Result<Vec<Node>> {
        for node in nodes {
            node.validate().map_err(LinkError::Validation)?;
        }

        let app_bytes = Self::uuid_to_bytes(&application_id);
        let mut saved = Vec::with_capacity(nodes.len());

        let write_txn = self.db.begin_write()?;
        {
            let mut nodes_table = write_txn.open_table(NODES)?;
            let mut app_index = write_txn.open_multimap_table(NODES_BY_APP)?;
            let mut fqn_table = write_txn.open_table(NODE_BY_FQN)?;

            for node in nodes {
                let key = Self::fqn_key(application_id, &node.fqn);
                let existing = fqn_table
                    .get(key.as_str())?
                    .map(|guard| Self::bytes_to_uuid(guard.value()));
                let id = existing.or(node.id).unwrap_or_else(Uuid::now_v7);
                let id_bytes = Self::uuid_to_bytes(&id);

                let mut stored = node.clone();
                stored.id = Some(id);
                nodes_table.insert(&id_bytes, Self::serialize(&stored)?.as_slice())?;
                if existing.is_none() {
                    app_index.insert(&app_bytes, &id_bytes)?;
                    fqn_table.insert(key.as_str(), &id_bytes)?;
                }
                saved.push(stored);
            }
        }
        write_txn.commit()?;

        Ok(saved)
    }
}

impl RedbGraphStore {
    fn apply_edge(write_txn: &WriteTransaction, edge: &EdgeProposal) -> Result<UpsertOutcome> {
        let (Some(source), Some(target)) = (edge.source.id, edge.target.id) else {
            return Ok(UpsertOutcome::Skipped);
        };

        let nodes_table = write_txn.open_table(NODES)?;
        for id in [source, target] {
            if nodes_table.get(&Self::uuid_to_bytes(&id))?.is_none() {
                return Err(LinkError::NodeNotFound(id));
            }
        }

        let mut edges_table = write_txn.open_table(EDGES)?;
        let key = Self::edge_key(&source, &target, edge.kind);
        if edges_table.get(key.as_str())?.is_some() {
            return Ok(UpsertOutcome::Unchanged);
        }
        let stored = StoredEdge {
            source,
            target,
            kind: edge.kind,
            created_at: Utc::now(),
        };
        edges_table.insert(key.as_str(), Self::serialize(&stored)?.as_slice())?;
        Ok(UpsertOutcome::Created)
    }

    fn apply_library_edge(
        write_txn: &WriteTransaction,
        edge: &LibraryEdgeProposal,
    ) -> Result<UpsertOutcome> {
        let (Some(node), Some(library_node)) = (edge.node.id, edge.library_node.id) else {
            return Ok(UpsertOutcome::Skipped);
        };

        let nodes_table = write_txn.open_table(NODES)?;
        if nodes_table.get(&Self::uuid_to_bytes(&node))?.is_none() {
            return Err(LinkError::NodeNotFound(node));
        }

        let mut edges_table = write_txn.open_table(LIBRARY_EDGES)?;
        let key = Self::edge_key(&node, &library_node, edge.kind);
        if edges_table.get(key.as_str())?.is_some() {
            return Ok(UpsertOutcome::Unchanged);
        }
        let stored = StoredLibraryEdge {
            node,
            library_node,
            library_fqn: edge.library_node.fqn.clone(),
            kind: edge.kind,
            created_at: Utc::now(),
        };
        edges_table.insert(key.as_str(), Self::serialize(&stored)?.as_slice())?;
        Ok(UpsertOutcome::Created)
    }

    /// Apply a batch in chunks of [`EDGE_BATCH_SIZE`], one write transaction
    /// per chunk. Each edge is still checked and counted on its own; if a
    /// chunk fails to commit, the edges it created are counted as errored.
    fn write_batch<E, F>(&self, what: &str, edges: &[E], apply: F) -> SinkReport
    where
        E: fmt::Display,
        F: Fn(&WriteTransaction, &E) -> Result<UpsertOutcome>,
    {
        let mut report = SinkReport::default();

        for chunk in edges.chunks(EDGE_BATCH_SIZE) {
            let mut chunk_report = SinkReport::default();
            let write_txn = match self.db.begin_write() {
                Ok(txn) => txn,
                Err(e) => {
                    log::warn!("Failed to begin write for {} {}s: {}", chunk.len(), what, e);
                    chunk_report.total = chunk.len();
                    chunk_report.errored = chunk.len();
                    report.merge(&chunk_report);
                    continue;
                }
            };

            for edge in chunk {
                let outcome = apply(&write_txn, edge);
                log_outcome(what, edge, &outcome);
                chunk_report.record(&outcome);
            }

            if let Err(e) = write_txn.commit() {
                log::warn!(
                    "Failed to commit {} {}s: {}",
                    chunk_report.created,
                    what,
                    e
                );
                chunk_report.errored += chunk_report.created;
                chunk_report.created = 0;
            }
            report.merge(&chunk_report);
        }

        report
    }
}

impl EdgeSink for RedbGraphStore {
    fn upsert_edge(&self, edge: &EdgeProposal) -> Result<UpsertOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = Self::apply_edge(&write_txn, edge)?;
        write_txn.commit()?;
        Ok(outcome)
    }

    fn upsert_edges(&self, edges: &[EdgeProposal]) -> SinkReport {
        let report = self.write_batch("edge", edges, Self::apply_edge);
        log::info!("Edge sink: {}", report);
        report
    }
}

impl LibraryEdgeSink for RedbGraphStore {
    fn upsert_library_edge(&self, edge: &LibraryEdgeProposal) -> Result<UpsertOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = Self::apply_library_edge(&write_txn, edge)?;
        write_txn.commit()?;
        Ok(outcome)
    }

    fn upsert_library_edges(&self, edges: &[LibraryEdgeProposal]) -> SinkReport {
        let report = self.write_batch("library edge", edges, Self::apply_library_edge);
        log::info!("Library edge sink: {}", report);
        report
    }
}
