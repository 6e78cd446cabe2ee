//! Read-only library symbol index.
//!
//! Library methods are third-party or company-library declarations analysed
//! ahead of time. Each may carry an [`IntegrationAnalysis`] describing the
//! HTTP endpoints, queue topics and routes it talks to.

use crate::error::Result;
use crate::types::{EdgeKind, Node, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Type alias for library node identifiers
pub type LibraryNodeId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryNode {
    pub id: Option<LibraryNodeId>,

    /// Maven-style coordinate of the owning library.
    pub library: String,

    pub fqn: String,
    pub name: String,
    pub kind: NodeKind,
    pub integration: Option<IntegrationAnalysis>,
}

impl LibraryNode {
    pub fn method(library: impl Into<String>, fqn: impl Into<String>) -> Self {
        let fqn = fqn.into();
        let name = fqn.rsplit('.').next().unwrap_or_default().to_string();
        Self {
            id: None,
            library: library.into(),
            fqn,
            name,
            kind: NodeKind::Method,
            integration: None,
        }
    }

    pub fn with_integration(mut self, analysis: IntegrationAnalysis) -> Self {
        self.integration = Some(analysis);
        self
    }

    /// Name-based identity derived from the library coordinate and FQN.
    ///
    /// Rebuilding an index from the same library data yields the same ids,
    /// so library edges keyed by them stay idempotent across runs.
    pub fn stable_id(&self) -> LibraryNodeId {
        let name = format!("{}/{}", self.library, self.fqn);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

/// Precomputed integration facts for one library method.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegrationAnalysis {
    pub urls: Vec<String>,
    pub http_methods: Vec<String>,
    pub has_retry: bool,
    pub has_timeout: bool,
    pub has_circuit_breaker: bool,
    pub kafka_topics: Vec<String>,
    pub kafka_calls: Vec<QueueCall>,
    pub camel_uris: Vec<String>,
    pub camel_calls: Vec<RouteCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueCall {
    pub topic: String,
    pub operation: String,
    pub client_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteCall {
    pub uri: String,
    pub endpoint_type: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueOperation {
    Produce,
    Consume,
}

impl QueueOperation {
    /// Anything other than `PRODUCE` is treated as a consumer.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("PRODUCE") {
            QueueOperation::Produce
        } else {
            QueueOperation::Consume
        }
    }

    pub fn edge_kind(self) -> EdgeKind {
        match self {
            QueueOperation::Produce => EdgeKind::Produces,
            QueueOperation::Consume => EdgeKind::Consumes,
        }
    }
}

/// An external touchpoint reached through a library method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IntegrationPoint {
    HttpEndpoint {
        url: Option<String>,
        http_method: Option<String>,
        has_retry: bool,
        has_timeout: bool,
        has_circuit_breaker: bool,
    },
    QueueTopic {
        name: Option<String>,
        operation: QueueOperation,
    },
    RouteRule {
        uri: Option<String>,
        endpoint_type: Option<String>,
        direction: String,
    },
}

impl IntegrationAnalysis {
    /// Expand the analysis into integration points.
    ///
    /// Every URL is paired with every HTTP verb (or none when no verb is
    /// known); topics and routes pick up their call details by exact match.
    pub fn integration_points(&self) -> Vec<IntegrationPoint> {
        let mut points = Vec::new();

        let verbs: Vec<Option<&String>> = if self.http_methods.is_empty() {
            vec![None]
        } else {
            self.http_methods.iter().map(Some).collect()
        };
        for url in &self.urls {
            for &verb in &verbs {
                points.push(IntegrationPoint::HttpEndpoint {
                    url: Some(url.clone()),
                    http_method: verb.cloned(),
                    has_retry: self.has_retry,
                    has_timeout: self.has_timeout,
                    has_circuit_breaker: self.has_circuit_breaker,
                });
            }
        }

        for topic in &self.kafka_topics {
            let call = self.kafka_calls.iter().find(|c| &c.topic == topic);
            points.push(IntegrationPoint::QueueTopic {
                name: Some(topic.clone()),
                operation: call
                    .map(|c| QueueOperation::parse(&c.operation))
                    .unwrap_or(QueueOperation::Consume),
            });
        }

        for uri in &self.camel_uris {
            let call = self.camel_calls.iter().find(|c| &c.uri == uri);
            points.push(IntegrationPoint::RouteRule {
                uri: Some(uri.clone()),
                endpoint_type: call.and_then(|c| c.endpoint_type.clone()),
                direction: call
                    .and_then(|c| c.direction.clone())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
            });
        }

        points
    }
}

/// Unpersisted edge from an application node into the library index.
#[derive(Debug, Clone)]
pub struct LibraryEdgeProposal {
    pub kind: EdgeKind,
    pub node: Arc<Node>,
    pub library_node: Arc<LibraryNode>,
}

impl LibraryEdgeProposal {
    pub fn new(kind: EdgeKind, node: &Arc<Node>, library_node: &Arc<LibraryNode>) -> Self {
        Self {
            kind,
            node: Arc::clone(node),
            library_node: Arc::clone(library_node),
        }
    }
}

impl fmt::Display for LibraryEdgeProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{}]-> lib:{}",
            self.node.fqn, self.kind, self.library_node.fqn
        )
    }
}

/// Lookup surface of the library symbol index.
///
/// Implementations must be safe to share across linking workers.
pub trait LibraryIndex: Send + Sync {
    fn find_library_method(&self, fqn: &str) -> Result<Option<Arc<LibraryNode>>>;

    fn extract_integration_points(&self, node: &LibraryNode) -> Result<Vec<IntegrationPoint>> {
        Ok(node
            .integration
            .as_ref()
            .map(IntegrationAnalysis::integration_points)
            .unwrap_or_default())
    }
}

/// Library index held in memory, keyed by method FQN.
#[derive(Debug, Default)]
pub struct InMemoryLibraryIndex {
    methods: HashMap<String, Arc<LibraryNode>>,
}

impl InMemoryLibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the METHOD nodes of `nodes`; others are ignored.
    ///
    /// Nodes without an identity get their [`LibraryNode::stable_id`] so
    /// library edges to them can be persisted.
    pub fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = LibraryNode>,
    {
        let mut index = Self::new();
        for node in nodes {
            index.insert(node);
        }
        index
    }

    pub fn insert(&mut self, mut node: LibraryNode) -> bool {
        if node.kind != NodeKind::Method || node.fqn.trim().is_empty() {
            return false;
        }
        if node.id.is_none() {
            node.id = Some(node.stable_id());
        }
        self.methods.insert(node.fqn.clone(), Arc::new(node));
        true
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl LibraryIndex for InMemoryLibraryIndex {
    fn find_library_method(&self, fqn: &str) -> Result<Option<Arc<LibraryNode>>> {
        Ok(self.methods.get(fqn).cloned())
    }
}
