use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Type alias for node identifiers
pub type NodeId = Uuid;

/// Type alias for application identifiers
pub type ApplicationId = Uuid;

/// The application whose declarations are being linked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub id: ApplicationId,

    /// Short stable key, e.g. the repository slug.
    pub key: String,

    pub name: String,
}

impl Application {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            key: key.into(),
            name: name.into(),
        }
    }
}

/// A declaration in the application's source, or a virtual touchpoint
/// inferred from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Assigned by persistence. `None` until the node is first saved.
    pub id: Option<NodeId>,

    /// Fully-qualified name. Unique within an application.
    pub fqn: String,

    /// Simple name, e.g. `UserService` or `findById`.
    pub name: String,

    /// Enclosing package, when the declaration has one.
    pub package_name: Option<String>,

    pub kind: NodeKind,

    /// Raw signature as emitted by the parser.
    pub signature: Option<String>,

    pub meta: NodeMeta,
}

impl Node {
    pub fn new(fqn: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Node {
            id: None,
            fqn: fqn.into(),
            name: name.into(),
            package_name: None,
            kind,
            signature: None,
            meta: NodeMeta::default(),
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Package name or the empty string.
    pub fn package_or_empty(&self) -> &str {
        self.package_name.as_deref().unwrap_or("")
    }

    /// Raw signature, preferring the node column over the metadata copy.
    pub fn raw_signature(&self) -> Option<&str> {
        self.signature
            .as_deref()
            .or(self.meta.signature.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Two nodes are the same declaration when their FQNs match.
    pub fn same_identity(&self, other: &Node) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.fqn == other.fqn,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.fqn.trim().is_empty() {
            return Err(format!("Node '{}' has a blank FQN", self.name));
        }
        Ok(())
    }
}

/// Closed vocabulary of declaration kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Repo,
    Module,
    Package,
    Class,
    Interface,
    Enum,
    Record,
    Method,
    Field,
    Exception,
    Test,
    Mapper,
    Service,
    Endpoint,
    Client,
    Topic,
    Job,
    DbTable,
    DbView,
    DbQuery,
    Schema,
    Config,
    Migration,
    Annotation,
}

impl NodeKind {
    pub const ALL: [NodeKind; 24] = [
        NodeKind::Repo,
        NodeKind::Module,
        NodeKind::Package,
        NodeKind::Class,
        NodeKind::Interface,
        NodeKind::Enum,
        NodeKind::Record,
        NodeKind::Method,
        NodeKind::Field,
        NodeKind::Exception,
        NodeKind::Test,
        NodeKind::Mapper,
        NodeKind::Service,
        NodeKind::Endpoint,
        NodeKind::Client,
        NodeKind::Topic,
        NodeKind::Job,
        NodeKind::DbTable,
        NodeKind::DbView,
        NodeKind::DbQuery,
        NodeKind::Schema,
        NodeKind::Config,
        NodeKind::Migration,
        NodeKind::Annotation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Repo => "REPO",
            NodeKind::Module => "MODULE",
            NodeKind::Package => "PACKAGE",
            NodeKind::Class => "CLASS",
            NodeKind::Interface => "INTERFACE",
            NodeKind::Enum => "ENUM",
            NodeKind::Record => "RECORD",
            NodeKind::Method => "METHOD",
            NodeKind::Field => "FIELD",
            NodeKind::Exception => "EXCEPTION",
            NodeKind::Test => "TEST",
            NodeKind::Mapper => "MAPPER",
            NodeKind::Service => "SERVICE",
            NodeKind::Endpoint => "ENDPOINT",
            NodeKind::Client => "CLIENT",
            NodeKind::Topic => "TOPIC",
            NodeKind::Job => "JOB",
            NodeKind::DbTable => "DB_TABLE",
            NodeKind::DbView => "DB_VIEW",
            NodeKind::DbQuery => "DB_QUERY",
            NodeKind::Schema => "SCHEMA",
            NodeKind::Config => "CONFIG",
            NodeKind::Migration => "MIGRATION",
            NodeKind::Annotation => "ANNOTATION",
        }
    }

    /// Declared types: classes and everything classified from a class.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            NodeKind::Class
                | NodeKind::Interface
                | NodeKind::Enum
                | NodeKind::Record
                | NodeKind::Service
                | NodeKind::Mapper
                | NodeKind::Config
                | NodeKind::Exception
                | NodeKind::Client
                | NodeKind::Test
                | NodeKind::Annotation
        )
    }

    /// Declarations owned by a type (`meta.owner_fqn` points at the owner).
    pub fn is_member(self) -> bool {
        matches!(
            self,
            NodeKind::Method | NodeKind::Field | NodeKind::Endpoint | NodeKind::Job | NodeKind::Topic
        )
    }

    /// Declarations with a body: the targets of call, throw and signature resolution.
    pub fn is_function(self) -> bool {
        matches!(
            self,
            NodeKind::Method | NodeKind::Endpoint | NodeKind::Job | NodeKind::Topic
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantics of a graph edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    // Structure and inheritance
    Contains,
    DependsOn,
    Implements,
    Inherits,
    Extends,
    Overrides,
    AnnotatedWith,

    // In-process code
    Calls,
    CallsCode,
    Throws,
    Locks,

    // Network and integration
    CallsHttp,
    CallsGrpc,
    Produces,
    Consumes,
    Queries,
    Reads,
    Writes,
    ContractsWith,
    Configures,
    CircuitBreakerTo,
    RetriesTo,
    TimeoutsTo,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::DependsOn => "DEPENDS_ON",
            EdgeKind::Implements => "IMPLEMENTS",
            EdgeKind::Inherits => "INHERITS",
            EdgeKind::Extends => "EXTENDS",
            EdgeKind::Overrides => "OVERRIDES",
            EdgeKind::AnnotatedWith => "ANNOTATED_WITH",
            EdgeKind::Calls => "CALLS",
            EdgeKind::CallsCode => "CALLS_CODE",
            EdgeKind::Throws => "THROWS",
            EdgeKind::Locks => "LOCKS",
            EdgeKind::CallsHttp => "CALLS_HTTP",
            EdgeKind::CallsGrpc => "CALLS_GRPC",
            EdgeKind::Produces => "PRODUCES",
            EdgeKind::Consumes => "CONSUMES",
            EdgeKind::Queries => "QUERIES",
            EdgeKind::Reads => "READS",
            EdgeKind::Writes => "WRITES",
            EdgeKind::ContractsWith => "CONTRACTS_WITH",
            EdgeKind::Configures => "CONFIGURES",
            EdgeKind::CircuitBreakerTo => "CIRCUIT_BREAKER_TO",
            EdgeKind::RetriesTo => "RETRIES_TO",
            EdgeKind::TimeoutsTo => "TIMEOUTS_TO",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call-site reference collected by the parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RawUsage {
    /// Bare identifier: `doLocalWork()` or `MyClass()`.
    Simple { name: String, is_call: bool },

    /// Dotted access: `receiver.member` or `receiver.member()`.
    Dot {
        receiver: String,
        member: String,
        is_call: bool,
    },
}

impl RawUsage {
    pub fn call(name: impl Into<String>) -> Self {
        RawUsage::Simple {
            name: name.into(),
            is_call: true,
        }
    }

    pub fn dot_call(receiver: impl Into<String>, member: impl Into<String>) -> Self {
        RawUsage::Dot {
            receiver: receiver.into(),
            member: member.into(),
            is_call: true,
        }
    }
}

/// Parsed-out attributes consumed by the resolvers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeMeta {
    /// Annotation names on the element (simple or FQN).
    pub annotations: Vec<String>,

    /// File imports, in source order.
    pub imports: Vec<String>,

    /// Supertype names as written (extends/implements).
    pub supertypes_simple: Vec<String>,

    /// Supertype FQNs the parser already resolved.
    pub supertypes_resolved: Vec<String>,

    pub param_types: Vec<String>,

    pub return_type: Option<String>,

    /// Raw signature copy; the node column wins when both are set.
    pub signature: Option<String>,

    /// Enclosing type for members.
    pub owner_fqn: Option<String>,

    pub raw_usages: Vec<RawUsage>,

    pub throws_types: Vec<String>,

    /// Virtual endpoint URL.
    pub url: Option<String>,

    /// Virtual endpoint HTTP verb, `UNKNOWN` when not known.
    pub http_method: Option<String>,

    /// Virtual topic name.
    pub topic: Option<String>,

    /// Where a virtual node came from, e.g. `library_analysis`.
    pub origin: Option<String>,
}

impl NodeMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner_fqn: impl Into<String>) -> Self {
        self.owner_fqn = Some(owner_fqn.into());
        self
    }

    pub fn with_imports(mut self, imports: Vec<String>) -> Self {
        self.imports = imports;
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_supertypes(mut self, supertypes: Vec<String>) -> Self {
        self.supertypes_simple = supertypes;
        self
    }

    pub fn with_usages(mut self, usages: Vec<RawUsage>) -> Self {
        self.raw_usages = usages;
        self
    }

    pub fn with_throws(mut self, throws_types: Vec<String>) -> Self {
        self.throws_types = throws_types;
        self
    }

    pub fn with_param_types(mut self, param_types: Vec<String>) -> Self {
        self.param_types = param_types;
        self
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }
}

/// Unpersisted candidate edge between two application nodes.
#[derive(Debug, Clone)]
pub struct EdgeProposal {
    pub source: Arc<Node>,
    pub target: Arc<Node>,
    pub kind: EdgeKind,
}

impl EdgeProposal {
    pub fn new(source: &Arc<Node>, target: &Arc<Node>, kind: EdgeKind) -> Self {
        Self {
            source: Arc::clone(source),
            target: Arc::clone(target),
            kind,
        }
    }

    /// `(source fqn, target fqn, kind)`, handy for assertions and logging.
    pub fn key(&self) -> (&str, &str, EdgeKind) {
        (&self.source.fqn, &self.target.fqn, self.kind)
    }
}

impl fmt::Display for EdgeProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source.fqn, self.kind, self.target.fqn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        assert!(NodeKind::Class.is_type());
        assert!(NodeKind::Interface.is_type());
        assert!(!NodeKind::Method.is_type());
        assert!(NodeKind::Method.is_function());
        assert!(NodeKind::Field.is_member());
        assert!(!NodeKind::Field.is_function());
        assert!(!NodeKind::Package.is_member());
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&NodeKind::DbTable).unwrap();
        assert_eq!(json, "\"DB_TABLE\"");
        let json = serde_json::to_string(&EdgeKind::CircuitBreakerTo).unwrap();
        assert_eq!(json, "\"CIRCUIT_BREAKER_TO\"");
        assert_eq!(EdgeKind::CallsHttp.to_string(), "CALLS_HTTP");
    }

    #[test]
    fn test_meta_from_partial_json() {
        let meta: NodeMeta = serde_json::from_str(
            r#"{"owner_fqn":"pkg.A","raw_usages":[{"Simple":{"name":"bar","is_call":true}}]}"#,
        )
        .unwrap();
        assert_eq!(meta.owner_fqn.as_deref(), Some("pkg.A"));
        assert_eq!(meta.raw_usages, vec![RawUsage::call("bar")]);
        assert!(meta.imports.is_empty());
    }

    #[test]
    fn test_raw_signature_prefers_node_column() {
        let mut meta = NodeMeta::new();
        meta.signature = Some("fun a(x: Meta)".into());
        let node = Node::new("p.A.a", "a", NodeKind::Method).with_meta(meta);
        assert_eq!(node.raw_signature(), Some("fun a(x: Meta)"));

        let node = node.with_signature("fun a(x: Column)");
        assert_eq!(node.raw_signature(), Some("fun a(x: Column)"));
    }

    #[test]
    fn test_same_identity() {
        let a = Node::new("p.A", "A", NodeKind::Class);
        let b = Node::new("p.A", "A", NodeKind::Class);
        assert!(a.same_identity(&b));

        let id = Uuid::now_v7();
        let a = a.with_id(id);
        let b = b.with_id(Uuid::now_v7());
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_validate_blank_fqn() {
        assert!(Node::new("  ", "x", NodeKind::Class).validate().is_err());
        assert!(Node::new("p.X", "X", NodeKind::Class).validate().is_ok());
    }
}
