//! Virtual nodes for external touchpoints.
//!
//! Materialization during the parallel pass only *proposes* nodes; the
//! orchestrator deduplicates proposals by FQN afterwards, so two workers
//! discovering the same endpoint end up sharing a single node.

use crate::index::SymbolIndex;
use crate::types::{Node, NodeKind, NodeMeta};
use std::collections::HashSet;
use std::sync::Arc;

pub const VIRTUAL_ORIGIN: &str = "library_analysis";

const UNKNOWN: &str = "unknown";

/// A node looked up or proposed by the factory.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub node: Arc<Node>,

    /// `true` when the node is a proposal not yet in the index.
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualNodeFactory;

impl VirtualNodeFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn endpoint_fqn(url: &str, http_method: Option<&str>) -> String {
        match http_method {
            Some(method) => format!("endpoint://{} {}", method, url),
            None => format!("endpoint://{}", url),
        }
    }

    pub fn topic_fqn(name: &str) -> String {
        format!("topic://{}", name)
    }

    /// Existing or proposed ENDPOINT node for `url` and `http_method`.
    pub fn endpoint(
        &self,
        url: Option<&str>,
        http_method: Option<&str>,
        index: &SymbolIndex,
    ) -> Materialized {
        let url = non_blank(url).unwrap_or(UNKNOWN);
        let http_method = non_blank(http_method);
        let fqn = Self::endpoint_fqn(url, http_method);

        if let Some(existing) = index.find_by_fqn(&fqn) {
            return Materialized {
                node: Arc::clone(existing),
                is_new: false,
            };
        }

        let name = url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.trim().is_empty())
            .unwrap_or(url);

        let meta = NodeMeta {
            url: Some(url.to_string()),
            http_method: Some(http_method.unwrap_or("UNKNOWN").to_string()),
            origin: Some(VIRTUAL_ORIGIN.to_string()),
            ..NodeMeta::default()
        };

        Materialized {
            node: Arc::new(Node::new(fqn, name, NodeKind::Endpoint).with_meta(meta)),
            is_new: true,
        }
    }

    /// Existing or proposed TOPIC node for `name`.
    pub fn topic(&self, name: Option<&str>, index: &SymbolIndex) -> Materialized {
        let name = non_blank(name).unwrap_or(UNKNOWN);
        let fqn = Self::topic_fqn(name);

        if let Some(existing) = index.find_by_fqn(&fqn) {
            return Materialized {
                node: Arc::clone(existing),
                is_new: false,
            };
        }

        let meta = NodeMeta {
            topic: Some(name.to_string()),
            origin: Some(VIRTUAL_ORIGIN.to_string()),
            ..NodeMeta::default()
        };

        Materialized {
            node: Arc::new(Node::new(fqn, name, NodeKind::Topic).with_meta(meta)),
            is_new: true,
        }
    }

    /// Collapse proposals to one node per FQN.
    ///
    /// The first proposal for a key wins; keys already present in the index
    /// are dropped entirely.
    pub fn dedup(proposals: Vec<Arc<Node>>, index: &SymbolIndex) -> Vec<Arc<Node>> {
        let mut seen = HashSet::new();
        proposals
            .into_iter()
            .filter(|node| index.find_by_fqn(&node.fqn).is_none())
            .filter(|node| seen.insert(node.fqn.clone()))
            .collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
