use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage operation error: {0}")]
    StorageOperation(#[from] redb::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Parallel linking timed out after {timeout:?} ({completed}/{total} nodes completed)")]
    ParallelTimeout {
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Worker failure: {0}")]
    Worker(String),

    #[error("Resolver {resolver} failed for {fqn}: {reason}")]
    Resolver {
        resolver: &'static str,
        fqn: String,
        reason: String,
    },

    #[error("Library index error: {0}")]
    Library(String),

    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),
}
