pub mod types;
pub mod error;
pub mod index;
pub mod library;
pub mod storage;
pub mod linker;

pub use error::{LinkError, Result};
pub use types::*;
pub use index::SymbolIndex;
pub use library::{
    InMemoryLibraryIndex, IntegrationAnalysis, IntegrationPoint, LibraryEdgeProposal,
    LibraryIndex, LibraryNode, QueueCall, QueueOperation, RouteCall,
};
pub use storage::{
    EdgeSink, LibraryEdgeSink, NodeStore, RedbGraphStore, SinkReport, UpsertOutcome,
    CURRENT_SCHEMA_VERSION,
};
pub use linker::{
    AnnotationResolver, CallResolver, EdgeResolver, GraphLinker, InheritanceResolver,
    IntegrationResolver, LinkContext, LinkerConfig, LinkingStats, Materialized, PhaseDurations,
    ResolverOutput, SignatureDependencyResolver, StructuralLinker, ThrowResolver,
    VirtualNodeFactory,
};
