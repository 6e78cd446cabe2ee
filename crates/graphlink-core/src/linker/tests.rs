//! End-to-end linking runs against a redb store.

use crate::error::{LinkError, Result};
use crate::library::{
    InMemoryLibraryIndex, IntegrationAnalysis, LibraryIndex, LibraryNode,
};
use crate::linker::{
    EdgeResolver, GraphLinker, LinkContext, LinkerConfig, ResolverOutput,
};
use crate::storage::{NodeStore, RedbGraphStore};
use crate::types::{Application, EdgeKind, Node, NodeKind, NodeMeta, RawUsage};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: Arc<RedbGraphStore>,
    app: Application,
}

impl Fixture {
    fn new(nodes: Vec<Node>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbGraphStore::open(dir.path().join("graph.redb")).unwrap());
        let app = Application::new("shop", "Shop");
        store.save_nodes(app.id, &nodes).unwrap();
        Self {
            _dir: dir,
            store,
            app,
        }
    }

    fn linker(&self, library: Arc<dyn LibraryIndex>, config: LinkerConfig) -> GraphLinker {
        GraphLinker::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            library,
            config,
        )
        .unwrap()
    }

    fn edge_keys(&self) -> HashSet<(String, String, EdgeKind)> {
        self.store
            .list_edges()
            .unwrap()
            .into_iter()
            .map(|e| {
                let source = self.store.get_node(e.source).unwrap().unwrap();
                let target = self.store.get_node(e.target).unwrap().unwrap();
                (source.fqn, target.fqn, e.kind)
            })
            .collect()
    }
}

fn config() -> LinkerConfig {
    LinkerConfig::new().with_max_workers(2)
}

fn no_library() -> Arc<dyn LibraryIndex> {
    Arc::new(InMemoryLibraryIndex::new())
}

fn key(source: &str, target: &str, kind: EdgeKind) -> (String, String, EdgeKind) {
    (source.to_string(), target.to_string(), kind)
}

/// pkg { interface I; class A : I { foo(i: I) calls bar; bar() } }
fn small_app() -> Vec<Node> {
    vec![
        Node::new("pkg", "pkg", NodeKind::Package),
        Node::new("pkg.I", "I", NodeKind::Interface).with_package("pkg"),
        Node::new("pkg.A", "A", NodeKind::Class)
            .with_package("pkg")
            .with_meta(NodeMeta::new().with_supertypes(vec!["I".into()])),
        Node::new("pkg.A.foo", "foo", NodeKind::Method)
            .with_package("pkg")
            .with_signature("fun foo(i: I)")
            .with_meta(
                NodeMeta::new()
                    .with_owner("pkg.A")
                    .with_param_types(vec!["I".into()])
                    .with_usages(vec![RawUsage::call("bar")]),
            ),
        Node::new("pkg.A.bar", "bar", NodeKind::Method)
            .with_package("pkg")
            .with_meta(NodeMeta::new().with_owner("pkg.A")),
    ]
}

fn http_library() -> Arc<dyn LibraryIndex> {
    Arc::new(InMemoryLibraryIndex::from_nodes(vec![LibraryNode::method(
        "acme:http:1",
        "com.acme.http.UserClient.fetch",
    )
    .with_integration(IntegrationAnalysis {
        urls: vec!["/users".into()],
        http_methods: vec!["GET".into()],
        ..Default::default()
    })]))
}

/// Two methods on one service calling the same HTTP client method.
fn http_callers() -> Vec<Node> {
    let caller = |name: &str| {
        Node::new(format!("app.Svc.{name}"), name, NodeKind::Method)
            .with_package("app")
            .with_meta(
                NodeMeta::new()
                    .with_owner("app.Svc")
                    .with_imports(vec!["com.acme.http.UserClient".into()])
                    .with_usages(vec![RawUsage::dot_call("UserClient", "fetch")]),
            )
    };
    vec![
        Node::new("app.Svc", "Svc", NodeKind::Service).with_package("app"),
        caller("list"),
        caller("show"),
    ]
}

/// Fails on one node only
struct FailingResolver {
    fqn: &'static str,
    panic: bool,
}

impl EdgeResolver for FailingResolver {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.fqn == self.fqn
    }

    fn link(&self, node: &Arc<Node>, _ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        if self.panic {
            panic!("resolver blew up on {}", node.fqn);
        }
        Err(LinkError::Validation(format!("cannot link {}", node.fqn)))
    }
}

struct SleepingResolver(Duration);

impl EdgeResolver for SleepingResolver {
    fn name(&self) -> &'static str {
        "sleeping"
    }

    fn applies_to(&self, _node: &Node) -> bool {
        true
    }

    fn link(&self, _node: &Arc<Node>, _ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        thread::sleep(self.0);
        Ok(ResolverOutput::default())
    }
}

struct BrokenLibrary;

impl LibraryIndex for BrokenLibrary {
    fn find_library_method(&self, fqn: &str) -> Result<Option<Arc<LibraryNode>>> {
        Err(LinkError::Library(format!("lookup of {} failed", fqn)))
    }
}

#[test]
fn test_links_small_application() {
    let fx = Fixture::new(small_app());
    let stats = fx.linker(no_library(), config()).run(&fx.app).unwrap();

    assert_eq!(stats.total_nodes, 5);
    assert!(!stats.hit_bound);
    assert_eq!(stats.structural_edges, 4);
    assert_eq!(stats.node_errors, 0);
    assert_eq!(stats.new_virtual_nodes, 0);

    let expected: HashSet<_> = [
        key("pkg", "pkg.A", EdgeKind::Contains),
        key("pkg", "pkg.I", EdgeKind::Contains),
        key("pkg.A", "pkg.A.foo", EdgeKind::Contains),
        key("pkg.A", "pkg.A.bar", EdgeKind::Contains),
        key("pkg.A", "pkg.I", EdgeKind::Implements),
        key("pkg.A", "pkg.I", EdgeKind::DependsOn),
        key("pkg.A.foo", "pkg.A.bar", EdgeKind::Calls),
    ]
    .into_iter()
    .collect();
    assert_eq!(fx.edge_keys(), expected);

    // The signature dependency duplicates the inheritance DEPENDS_ON edge
    assert_eq!(stats.total_edges, 8);
    assert_eq!(stats.edge_sink.created, 7);
    assert_eq!(stats.edge_sink.unchanged, 1);
    assert_eq!(fx.store.edge_count().unwrap(), 7);
}

#[test]
fn test_empty_application() {
    let fx = Fixture::new(Vec::new());
    let stats = fx.linker(no_library(), config()).run(&fx.app).unwrap();

    assert_eq!(stats.total_nodes, 0);
    assert_eq!(stats.total_edges, 0);
    assert!(stats.finished_at.is_some());
    assert_eq!(fx.store.edge_count().unwrap(), 0);
}

#[test]
fn test_node_bound_is_reported() {
    let fx = Fixture::new(small_app());
    let stats = fx
        .linker(no_library(), config().with_max_nodes(3))
        .run(&fx.app)
        .unwrap();

    assert!(stats.hit_bound);
    assert_eq!(stats.total_nodes, 3);
}

#[test]
fn test_resolver_failure_is_isolated() {
    let fx = Fixture::new(small_app());
    let mut resolvers = GraphLinker::default_resolvers(no_library());
    resolvers.push(Arc::new(FailingResolver {
        fqn: "pkg.A.foo",
        panic: false,
    }));
    let stats = fx
        .linker(no_library(), config())
        .with_resolvers(resolvers)
        .run(&fx.app)
        .unwrap();

    assert_eq!(stats.node_errors, 1);
    assert_eq!(stats.resolver_failures, 1);
    // Other resolvers on the same node still contributed
    assert!(fx
        .edge_keys()
        .contains(&key("pkg.A.foo", "pkg.A.bar", EdgeKind::Calls)));
}

#[test]
fn test_resolver_panic_is_isolated() {
    let fx = Fixture::new(small_app());
    let mut resolvers = GraphLinker::default_resolvers(no_library());
    resolvers.push(Arc::new(FailingResolver {
        fqn: "pkg.A",
        panic: true,
    }));
    let stats = fx
        .linker(no_library(), config())
        .with_resolvers(resolvers)
        .run(&fx.app)
        .unwrap();

    assert_eq!(stats.node_errors, 1);
    assert_eq!(fx.store.edge_count().unwrap(), 7);
}

#[test]
fn test_library_failure_counts_as_node_error() {
    let fx = Fixture::new(http_callers());
    let stats = fx
        .linker(Arc::new(BrokenLibrary), config())
        .run(&fx.app)
        .unwrap();

    assert_eq!(stats.node_errors, 2);
    assert_eq!(stats.library_edges, 0);
    // Structural edges are still persisted
    assert_eq!(fx.store.edge_count().unwrap(), 2);
}

#[test]
fn test_parallel_timeout_aborts_run() {
    let fx = Fixture::new(small_app());
    let linker = fx
        .linker(
            no_library(),
            config()
                .with_max_workers(1)
                .with_parallel_timeout(Duration::from_millis(50)),
        )
        .with_resolvers(vec![Arc::new(SleepingResolver(Duration::from_millis(300)))]);

    let err = linker.run(&fx.app).unwrap_err();
    assert!(matches!(err, LinkError::ParallelTimeout { total: 5, .. }));
    assert_eq!(fx.store.edge_count().unwrap(), 0);
}

#[test]
fn test_shared_endpoint_materialized_once() {
    let fx = Fixture::new(http_callers());
    let stats = fx.linker(http_library(), config()).run(&fx.app).unwrap();

    assert_eq!(stats.new_virtual_nodes, 1);
    assert_eq!(stats.virtual_node_errors, 0);

    let endpoint = fx
        .store
        .find_node(fx.app.id, "endpoint://GET /users")
        .unwrap()
        .unwrap();
    assert_eq!(endpoint.kind, NodeKind::Endpoint);
    assert_eq!(endpoint.name, "users");

    let edges = fx.edge_keys();
    assert!(edges.contains(&key("app.Svc.list", "endpoint://GET /users", EdgeKind::CallsHttp)));
    assert!(edges.contains(&key("app.Svc.show", "endpoint://GET /users", EdgeKind::CallsHttp)));

    // CALLS_CODE and CALLS_HTTP for each caller
    assert_eq!(stats.library_edges, 4);
    assert_eq!(fx.store.library_edge_count().unwrap(), 4);
    let library_edges = fx.store.list_library_edges().unwrap();
    assert!(library_edges
        .iter()
        .all(|e| e.library_fqn == "com.acme.http.UserClient.fetch"));
}

#[test]
fn test_rerun_is_idempotent() {
    let fx = Fixture::new(http_callers());
    let linker = fx.linker(http_library(), config());

    let first = linker.run(&fx.app).unwrap();
    let edges = fx.store.edge_count().unwrap();
    let library_edges = fx.store.library_edge_count().unwrap();

    let second = linker.run(&fx.app).unwrap();
    assert_eq!(first.new_virtual_nodes, 1);
    assert_eq!(second.new_virtual_nodes, 0);
    assert_eq!(second.total_nodes, first.total_nodes + 1);
    assert_eq!(second.edge_sink.created, 0);
    assert_eq!(second.library_sink.created, 0);
    assert_eq!(fx.store.edge_count().unwrap(), edges);
    assert_eq!(fx.store.library_edge_count().unwrap(), library_edges);
}

#[test]
fn test_rerun_with_rebuilt_library_is_idempotent() {
    let fx = Fixture::new(http_callers());

    let first = fx.linker(http_library(), config()).run(&fx.app).unwrap();
    let library_edges = fx.store.library_edge_count().unwrap();

    // A fresh process builds its library index again from the same data
    let second = fx.linker(http_library(), config()).run(&fx.app).unwrap();

    assert_eq!(first.library_sink.created, 4);
    assert_eq!(second.library_sink.created, 0);
    assert_eq!(second.library_sink.unchanged, 4);
    assert_eq!(fx.store.library_edge_count().unwrap(), library_edges);
}

#[test]
fn test_node_count_equal_to_bound_is_complete() {
    let fx = Fixture::new(small_app());
    let stats = fx
        .linker(no_library(), config().with_max_nodes(5))
        .run(&fx.app)
        .unwrap();

    assert!(!stats.hit_bound);
    assert_eq!(stats.total_nodes, 5);
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RedbGraphStore::open(dir.path().join("graph.redb")).unwrap());
    let result = GraphLinker::new(
        store.clone(),
        store.clone(),
        store,
        no_library(),
        LinkerConfig::new().with_max_workers(0),
    );
    assert!(matches!(result, Err(LinkError::Validation(_))));
}
