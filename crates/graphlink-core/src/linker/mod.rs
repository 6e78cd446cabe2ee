//! Graph linking
//!
//! Turns an application's extracted declarations into typed edges: a
//! sequential structural pass, then per-node resolvers on a bounded worker
//! pool, then virtual node materialization and persistence.

mod config;
mod integration;
mod metrics;
mod orchestrator;
mod resolvers;
mod structural;
mod virtual_nodes;

#[cfg(test)]
mod tests;

pub use config::LinkerConfig;
pub use integration::IntegrationResolver;
pub use metrics::{LinkingStats, PhaseDurations};
pub use orchestrator::GraphLinker;
pub use resolvers::{
    extract_type_tokens, AnnotationResolver, CallResolver, EdgeResolver, InheritanceResolver,
    LinkContext, ResolverOutput, SignatureDependencyResolver, ThrowResolver,
};
pub use structural::StructuralLinker;
pub use virtual_nodes::{Materialized, VirtualNodeFactory, VIRTUAL_ORIGIN};
