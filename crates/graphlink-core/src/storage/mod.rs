mod redb_storage;
mod traits;

pub use redb_storage::{
    RedbGraphStore, StoredEdge, StoredLibraryEdge, CURRENT_SCHEMA_VERSION, EDGE_BATCH_SIZE,
};
pub use traits::{EdgeSink, LibraryEdgeSink, NodeStore, SinkReport, UpsertOutcome};
