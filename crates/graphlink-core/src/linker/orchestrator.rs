use crate::error::{LinkError, Result};
use crate::index::SymbolIndex;
use crate::library::{LibraryEdgeProposal, LibraryIndex};
use crate::linker::integration::IntegrationResolver;
use crate::linker::metrics::resident_bytes;
use crate::linker::resolvers::{
    AnnotationResolver, CallResolver, EdgeResolver, InheritanceResolver, LinkContext,
    ResolverOutput, SignatureDependencyResolver, ThrowResolver,
};
use crate::linker::structural::StructuralLinker;
use crate::linker::virtual_nodes::VirtualNodeFactory;
use crate::linker::{LinkerConfig, LinkingStats};
use crate::storage::{EdgeSink, LibraryEdgeSink, NodeStore};
use crate::types::{Application, EdgeProposal, Node};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

type Resolvers = Arc<Vec<Arc<dyn EdgeResolver>>>;

/// Result of running every applicable resolver on one node
#[derive(Debug, Default)]
struct NodeOutcome {
    output: ResolverOutput,
    failures: usize,
}

/// Aggregated output of the parallel pass
#[derive(Debug, Default)]
struct ParallelOutput {
    edges: Vec<EdgeProposal>,
    library_edges: Vec<LibraryEdgeProposal>,
    proposed_nodes: Vec<Arc<Node>>,
    node_errors: usize,
    resolver_failures: usize,
}

/// Links one application's declarations into a dependency graph.
///
/// A run loads the nodes, builds the symbol index, runs the structural
/// pass, fans the per-node resolvers out over a bounded worker pool, folds
/// proposed virtual nodes back into the index and hands every edge to the
/// sinks.
pub struct GraphLinker {
    store: Arc<dyn NodeStore>,
    edge_sink: Arc<dyn EdgeSink>,
    library_sink: Arc<dyn LibraryEdgeSink>,
    resolvers: Resolvers,
    config: LinkerConfig,
}

impl GraphLinker {
    pub fn new(
        store: Arc<dyn NodeStore>,
        edge_sink: Arc<dyn EdgeSink>,
        library_sink: Arc<dyn LibraryEdgeSink>,
        library: Arc<dyn LibraryIndex>,
        config: LinkerConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            edge_sink,
            library_sink,
            resolvers: Arc::new(Self::default_resolvers(library)),
            config,
        })
    }

    /// Per-node resolvers in the order they run for each node.
    pub fn default_resolvers(library: Arc<dyn LibraryIndex>) -> Vec<Arc<dyn EdgeResolver>> {
        vec![
            Arc::new(InheritanceResolver),
            Arc::new(AnnotationResolver),
            Arc::new(SignatureDependencyResolver),
            Arc::new(CallResolver),
            Arc::new(IntegrationResolver::new(library)),
            Arc::new(ThrowResolver),
        ]
    }

    /// Replace the per-node resolver list.
    pub fn with_resolvers(mut self, resolvers: Vec<Arc<dyn EdgeResolver>>) -> Self {
        self.resolvers = Arc::new(resolvers);
        self
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Run one linking pass for `application`.
    ///
    /// Fails on index build errors, on a parallel pass exceeding its
    /// timeout, and on node store load errors. Node-level and edge-level
    /// failures are counted in the returned statistics instead.
    pub fn run(&self, application: &Application) -> Result<LinkingStats> {
        let run_start = Instant::now();
        let memory_before = resident_bytes();
        let mut stats = LinkingStats::new();

        // 1. Load
        let phase = Instant::now();
        // One extra node tells a full application apart from a truncated one
        let mut loaded = self
            .store
            .load_nodes(application.id, self.config.max_nodes.saturating_add(1))?;
        stats.hit_bound = loaded.len() > self.config.max_nodes;
        loaded.truncate(self.config.max_nodes);
        let nodes: Vec<Arc<Node>> = loaded.into_iter().map(Arc::new).collect();
        stats.durations.load = phase.elapsed();
        stats.total_nodes = nodes.len();

        if stats.hit_bound {
            log::warn!(
                "Application {} has more than {} nodes; linking a partial node set",
                application.key,
                self.config.max_nodes
            );
        }
        if nodes.is_empty() {
            log::info!("Application {} has no nodes to link", application.key);
            stats.finish(run_start.elapsed(), memory_delta(memory_before));
            return Ok(stats);
        }
        log::info!(
            "Linking {} nodes for application {}",
            nodes.len(),
            application.key
        );

        // 2. Index build
        let phase = Instant::now();
        let mut index = Arc::new(SymbolIndex::build(nodes.iter().cloned())?);
        stats.durations.index_build = phase.elapsed();

        // 3. Structural pass
        let phase = Instant::now();
        let mut edges = StructuralLinker::link_contains(&nodes, &index);
        stats.structural_edges = edges.len();
        stats.durations.structural = phase.elapsed();

        // 4. Parallel pass
        let phase = Instant::now();
        let parallel = self.run_parallel(Arc::new(nodes), Arc::clone(&index), application)?;
        stats.durations.parallel = phase.elapsed();

        // 5. Aggregate
        stats.parallel_edges = parallel.edges.len();
        stats.node_errors = parallel.node_errors;
        stats.resolver_failures = parallel.resolver_failures;
        if parallel.node_errors >= self.config.error_threshold {
            log::error!(
                "{} nodes failed to link in application {} (threshold {}); continuing with partial edges",
                parallel.node_errors,
                application.key,
                self.config.error_threshold
            );
        } else if parallel.node_errors > 0 {
            log::warn!("{} nodes failed to link", parallel.node_errors);
        }
        edges.extend(parallel.edges);
        let library_edges = parallel.library_edges;

        // 6. Index update
        let phase = Instant::now();
        let new_nodes = VirtualNodeFactory::dedup(parallel.proposed_nodes, &index);
        let (materialized, failed) = self.persist_virtual_nodes(application, new_nodes);
        stats.new_virtual_nodes = materialized.len();
        stats.virtual_node_errors = failed;
        if !materialized.is_empty() {
            rebind_targets(&mut edges, &materialized);
            Arc::make_mut(&mut index).add_nodes(materialized.into_values());
        }
        stats.durations.index_update = phase.elapsed();

        // 7. Persist
        let phase = Instant::now();
        stats.total_edges = edges.len();
        stats.library_edges = library_edges.len();
        stats.edge_sink = self.edge_sink.upsert_edges(&edges);
        stats.library_sink = self.library_sink.upsert_library_edges(&library_edges);
        stats.durations.persistence = phase.elapsed();

        // 8. Stats
        stats.finish(run_start.elapsed(), memory_delta(memory_before));
        log::info!("{}", stats.summary());

        Ok(stats)
    }

    /// Fan the resolvers out over a bounded pool with one timeout for the
    /// whole batch. On timeout the remaining tasks are cancelled and the
    /// run fails.
    fn run_parallel(
        &self,
        nodes: Arc<Vec<Arc<Node>>>,
        index: Arc<SymbolIndex>,
        application: &Application,
    ) -> Result<ParallelOutput> {
        let total = nodes.len();
        let workers = self.config.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("graphlink-worker-{}", i))
            .build()?;

        let progress = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        log::info!("Parallel pass: {} nodes on {} workers", total, workers);

        let handle = {
            let resolvers = Arc::clone(&self.resolvers);
            let application = application.clone();
            let progress = Arc::clone(&progress);
            let cancelled = Arc::clone(&cancelled);
            let log_every = self.config.progress_log_every;

            thread::Builder::new()
                .name("graphlink-parallel".into())
                .spawn(move || {
                    let outcomes: Vec<NodeOutcome> = pool.install(|| {
                        nodes
                            .par_iter()
                            .map(|node| {
                                if cancelled.load(Ordering::Relaxed) {
                                    return NodeOutcome::default();
                                }
                                let ctx = LinkContext {
                                    index: &index,
                                    application: &application,
                                };
                                let outcome = link_node(node, &resolvers, &ctx);
                                let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                                if done % log_every == 0 {
                                    log::info!("Parallel pass progress: {}/{}", done, total);
                                }
                                outcome
                            })
                            .collect()
                    });
                    // The receiver is gone after a timeout
                    let _ = tx.send(outcomes);
                })
                .map_err(|e| LinkError::Worker(format!("failed to spawn parallel pass: {}", e)))?
        };

        let outcomes = match rx.recv_timeout(self.config.parallel_timeout) {
            Ok(outcomes) => outcomes,
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Relaxed);
                let completed = progress.load(Ordering::Relaxed);
                log::error!(
                    "Parallel pass timed out after {:?}: {}/{} nodes completed",
                    self.config.parallel_timeout,
                    completed,
                    total
                );
                return Err(LinkError::ParallelTimeout {
                    timeout: self.config.parallel_timeout,
                    completed,
                    total,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                return Err(LinkError::Worker(
                    "parallel pass ended without results".into(),
                ));
            }
        };
        if handle.join().is_err() {
            return Err(LinkError::Worker("parallel pass thread panicked".into()));
        }

        let mut aggregate = ParallelOutput::default();
        for outcome in outcomes {
            if outcome.failures > 0 {
                aggregate.node_errors += 1;
                aggregate.resolver_failures += outcome.failures;
            }
            let ResolverOutput {
                edges,
                library_edges,
                virtual_nodes,
            } = outcome.output;
            aggregate.edges.extend(edges);
            aggregate.library_edges.extend(library_edges);
            aggregate.proposed_nodes.extend(virtual_nodes);
        }

        log::info!(
            "Parallel pass done: {} edges, {} library edges, {} proposed nodes, {} node errors",
            aggregate.edges.len(),
            aggregate.library_edges.len(),
            aggregate.proposed_nodes.len(),
            aggregate.node_errors
        );
        Ok(aggregate)
    }

    /// Save deduplicated virtual nodes so they get identities.
    ///
    /// Returns the nodes keyed by FQN, persisted where possible, plus the
    /// number that could not be saved.
    fn persist_virtual_nodes(
        &self,
        application: &Application,
        nodes: Vec<Arc<Node>>,
    ) -> (HashMap<String, Arc<Node>>, usize) {
        if nodes.is_empty() {
            return (HashMap::new(), 0);
        }

        let plain: Vec<Node> = nodes.iter().map(|n| n.as_ref().clone()).collect();
        match self.store.save_nodes(application.id, &plain) {
            Ok(saved) => {
                log::info!("Materialized {} virtual nodes", saved.len());
                let map = saved
                    .into_iter()
                    .map(|n| (n.fqn.clone(), Arc::new(n)))
                    .collect();
                (map, 0)
            }
            Err(e) => {
                log::error!(
                    "Failed to persist {} virtual nodes: {}; their edges will be skipped",
                    nodes.len(),
                    e
                );
                let failed = nodes.len();
                let map = nodes.into_iter().map(|n| (n.fqn.clone(), n)).collect();
                (map, failed)
            }
        }
    }
}

/// Run every applicable resolver on `node`, isolating failures and panics.
fn link_node(node: &Arc<Node>, resolvers: &[Arc<dyn EdgeResolver>], ctx: &LinkContext<'_>) -> NodeOutcome {
    let mut outcome = NodeOutcome::default();

    for resolver in resolvers.iter().filter(|r| r.applies_to(node)) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| resolver.link(node, ctx)));
        let reason = match result {
            Ok(Ok(output)) => {
                outcome.output.append(output);
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        outcome.failures += 1;
        let error = LinkError::Resolver {
            resolver: resolver.name(),
            fqn: node.fqn.clone(),
            reason,
        };
        log::error!("{}", error);
    }

    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Point edges at the canonical virtual node for their target FQN.
fn rebind_targets(edges: &mut [EdgeProposal], nodes: &HashMap<String, Arc<Node>>) {
    for edge in edges.iter_mut().filter(|e| e.target.id.is_none()) {
        if let Some(node) = nodes.get(&edge.target.fqn) {
            edge.target = Arc::clone(node);
        }
    }
}

fn memory_delta(before: Option<u64>) -> Option<i64> {
    let after = resident_bytes()?;
    Some(after as i64 - before? as i64)
}
