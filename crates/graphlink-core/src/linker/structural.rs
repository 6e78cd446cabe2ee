use crate::index::SymbolIndex;
use crate::types::{EdgeKind, EdgeProposal, Node, NodeKind};
use std::sync::Arc;

/// Whole-graph containment pass.
///
/// Runs once, sequentially, before the per-node resolvers.
#[derive(Debug, Default)]
pub struct StructuralLinker;

impl StructuralLinker {
    /// CONTAINS edges: package to type, and owner type to member.
    pub fn link_contains(nodes: &[Arc<Node>], index: &SymbolIndex) -> Vec<EdgeProposal> {
        let mut edges = Vec::new();

        for node in nodes.iter().filter(|n| n.kind.is_type()) {
            let Some(pkg) = node
                .package_name
                .as_deref()
                .and_then(|p| index.find_by_fqn(p))
                .filter(|p| p.kind == NodeKind::Package)
            else {
                continue;
            };
            edges.push(EdgeProposal::new(pkg, node, EdgeKind::Contains));
        }

        for node in nodes.iter().filter(|n| n.kind.is_member()) {
            let Some(owner) = node
                .meta
                .owner_fqn
                .as_deref()
                .and_then(|o| index.find_by_fqn(o))
            else {
                continue;
            };
            edges.push(EdgeProposal::new(owner, node, EdgeKind::Contains));
        }

        log::debug!("Structural pass: {} CONTAINS edges", edges.len());
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeMeta;

    #[test]
    fn test_contains_edges() {
        let nodes: Vec<Arc<Node>> = vec![
            Arc::new(Node::new("pkg", "pkg", NodeKind::Package)),
            Arc::new(Node::new("pkg.A", "A", NodeKind::Class).with_package("pkg")),
            Arc::new(Node::new("pkg.Orphan", "Orphan", NodeKind::Class).with_package("nowhere")),
            Arc::new(
                Node::new("pkg.A.foo", "foo", NodeKind::Method)
                    .with_meta(NodeMeta::new().with_owner("pkg.A")),
            ),
            Arc::new(
                Node::new("pkg.A.count", "count", NodeKind::Field)
                    .with_meta(NodeMeta::new().with_owner("pkg.A")),
            ),
            Arc::new(Node::new("pkg.loose", "loose", NodeKind::Method)),
        ];
        let index = SymbolIndex::build(nodes.clone()).unwrap();

        let edges: Vec<_> = StructuralLinker::link_contains(&nodes, &index)
            .iter()
            .map(|e| (e.source.fqn.clone(), e.target.fqn.clone(), e.kind))
            .collect();
        assert_eq!(
            edges,
            vec![
                ("pkg".to_string(), "pkg.A".to_string(), EdgeKind::Contains),
                ("pkg.A".to_string(), "pkg.A.foo".to_string(), EdgeKind::Contains),
                ("pkg.A".to_string(), "pkg.A.count".to_string(), EdgeKind::Contains),
            ]
        );
    }

    #[test]
    fn test_package_must_be_package_kind() {
        let nodes: Vec<Arc<Node>> = vec![
            Arc::new(Node::new("pkg", "pkg", NodeKind::Class)),
            Arc::new(Node::new("pkg.A", "A", NodeKind::Class).with_package("pkg")),
        ];
        let index = SymbolIndex::build(nodes.clone()).unwrap();
        assert!(StructuralLinker::link_contains(&nodes, &index).is_empty());
    }
}
