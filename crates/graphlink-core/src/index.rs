//! In-memory symbol index over one application's declarations.
//!
//! Built once per linking run and shared read-only with the resolvers.
//! The only mutation is [`SymbolIndex::add_nodes`], which the orchestrator
//! calls after the parallel pass to register materialized virtual nodes.

use crate::error::{LinkError, Result};
use crate::types::{Node, NodeKind};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    by_fqn: HashMap<String, Arc<Node>>,
    by_simple: HashMap<String, Vec<Arc<Node>>>,
    by_kind: HashMap<NodeKind, Vec<Arc<Node>>>,
    all: Vec<Arc<Node>>,
}

impl SymbolIndex {
    /// Build the index from the loaded node set.
    ///
    /// Fails when a node has a blank FQN or two nodes share an FQN.
    pub fn build<I>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<Node>>,
    {
        let mut index = SymbolIndex::default();
        for node in nodes {
            node.validate().map_err(LinkError::IndexBuild)?;
            if index.by_fqn.contains_key(&node.fqn) {
                return Err(LinkError::IndexBuild(format!(
                    "Duplicate FQN '{}'",
                    node.fqn
                )));
            }
            index.insert(node);
        }
        Ok(index)
    }

    fn insert(&mut self, node: Arc<Node>) {
        self.by_fqn.insert(node.fqn.clone(), Arc::clone(&node));
        self.by_simple
            .entry(node.name.clone())
            .or_default()
            .push(Arc::clone(&node));
        self.by_kind
            .entry(node.kind)
            .or_default()
            .push(Arc::clone(&node));
        self.all.push(node);
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.all
    }

    pub fn find_by_fqn(&self, fqn: &str) -> Option<&Arc<Node>> {
        self.by_fqn.get(fqn)
    }

    pub fn find_by_kind(&self, kind: NodeKind) -> &[Arc<Node>] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes carrying an annotation whose name contains `name`.
    pub fn find_annotated_with(&self, name: &str) -> Vec<&Arc<Node>> {
        self.all
            .iter()
            .filter(|n| n.meta.annotations.iter().any(|a| a.contains(name)))
            .collect()
    }

    /// Best-effort type resolution.
    ///
    /// Precedence: exact FQN, explicit import, wildcard import, current
    /// package, then any node with the same simple name (first loaded wins).
    pub fn resolve_type(
        &self,
        candidate: &str,
        imports: &[String],
        current_package: &str,
    ) -> Option<&Arc<Node>> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }

        if let Some(node) = self.by_fqn.get(candidate) {
            return Some(node);
        }

        let simple = simple_name(candidate);
        if simple.is_empty() {
            return None;
        }

        let suffix = format!(".{simple}");
        if let Some(node) = imports
            .iter()
            .filter(|imp| imp.ends_with(&suffix))
            .find_map(|imp| self.by_fqn.get(imp.as_str()))
        {
            return Some(node);
        }

        if let Some(node) = imports
            .iter()
            .filter_map(|imp| imp.strip_suffix(".*"))
            .find_map(|prefix| self.by_fqn.get(&format!("{prefix}.{simple}")))
        {
            return Some(node);
        }

        if !current_package.is_empty() {
            if let Some(node) = self.by_fqn.get(&format!("{current_package}.{simple}")) {
                return Some(node);
            }
        }

        self.by_simple.get(simple).and_then(|v| v.first())
    }

    /// Register nodes created after the index was built.
    ///
    /// Nodes whose FQN is already indexed are ignored.
    pub fn add_nodes<I>(&mut self, nodes: I) -> usize
    where
        I: IntoIterator<Item = Arc<Node>>,
    {
        let mut added = 0;
        for node in nodes {
            if node.fqn.trim().is_empty() || self.by_fqn.contains_key(&node.fqn) {
                continue;
            }
            self.insert(node);
            added += 1;
        }
        added
    }
}

/// Reduce a written type reference to its simple name.
///
/// `@Service` -> `Service`, `java.util.List<String>` -> `List`,
/// `Foo?` -> `Foo`, `Bar[]` -> `Bar`.
pub fn simple_name(raw: &str) -> &str {
    let s = raw.trim().trim_start_matches('@');
    let s = match s.find('<') {
        Some(i) => &s[..i],
        None => s,
    };
    let s = s.trim_end_matches("[]").trim_end_matches('?').trim_end_matches("[]");
    let s = s.trim_end_matches("...");
    let tail = match s.rfind('.') {
        Some(i) => &s[i + 1..],
        None => s,
    };
    tail.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(fqn: &str, kind: NodeKind) -> Arc<Node> {
        let name = fqn.rsplit('.').next().unwrap_or(fqn);
        let pkg = fqn.rsplit_once('.').map(|(p, _)| p.to_string());
        let mut n = Node::new(fqn, name, kind);
        n.package_name = pkg;
        Arc::new(n)
    }

    #[test]
    fn test_build_and_lookup() {
        let index = SymbolIndex::build(vec![
            node("pkg.A", NodeKind::Class),
            node("pkg.I", NodeKind::Interface),
            node("pkg.A.foo", NodeKind::Method),
        ])
        .unwrap();

        assert_eq!(index.len(), 3);
        assert!(index.find_by_fqn("pkg.A").is_some());
        assert!(index.find_by_fqn("pkg.B").is_none());
        assert_eq!(index.find_by_kind(NodeKind::Method).len(), 1);
        assert!(index.find_by_kind(NodeKind::Enum).is_empty());
    }

    #[test]
    fn test_build_rejects_duplicate_fqn() {
        let err = SymbolIndex::build(vec![
            node("pkg.A", NodeKind::Class),
            node("pkg.A", NodeKind::Interface),
        ])
        .unwrap_err();
        assert!(matches!(err, LinkError::IndexBuild(_)));
    }

    #[test]
    fn test_build_rejects_blank_fqn() {
        let blank = Arc::new(Node::new("", "x", NodeKind::Class));
        assert!(matches!(
            SymbolIndex::build(vec![blank]),
            Err(LinkError::IndexBuild(_))
        ));
    }

    #[test]
    fn test_resolution_precedence() {
        let imports = vec!["lib.Foo".to_string()];

        // All four candidates present: exact FQN wins.
        let index = SymbolIndex::build(vec![
            node("Foo", NodeKind::Class),
            node("lib.Foo", NodeKind::Class),
            node("pkg.Foo", NodeKind::Class),
            node("other.Foo", NodeKind::Class),
        ])
        .unwrap();
        assert_eq!(index.resolve_type("Foo", &imports, "pkg").unwrap().fqn, "Foo");

        // Without the exact match the import wins.
        let index = SymbolIndex::build(vec![
            node("other.Foo", NodeKind::Class),
            node("lib.Foo", NodeKind::Class),
            node("pkg.Foo", NodeKind::Class),
        ])
        .unwrap();
        assert_eq!(
            index.resolve_type("Foo", &imports, "pkg").unwrap().fqn,
            "lib.Foo"
        );

        // Without the import target the package-local node wins.
        let index = SymbolIndex::build(vec![
            node("other.Foo", NodeKind::Class),
            node("pkg.Foo", NodeKind::Class),
        ])
        .unwrap();
        assert_eq!(
            index.resolve_type("Foo", &imports, "pkg").unwrap().fqn,
            "pkg.Foo"
        );

        // Finally any simple-name match.
        let index = SymbolIndex::build(vec![node("other.Foo", NodeKind::Class)]).unwrap();
        assert_eq!(
            index.resolve_type("Foo", &imports, "pkg").unwrap().fqn,
            "other.Foo"
        );
        assert!(index.resolve_type("Bar", &imports, "pkg").is_none());
    }

    #[test]
    fn test_resolve_wildcard_import() {
        let index = SymbolIndex::build(vec![
            node("lib.util.Foo", NodeKind::Class),
            node("pkg.Foo", NodeKind::Class),
        ])
        .unwrap();
        let imports = vec!["lib.util.*".to_string()];
        assert_eq!(
            index.resolve_type("Foo", &imports, "pkg").unwrap().fqn,
            "lib.util.Foo"
        );
    }

    #[test]
    fn test_resolve_normalises_written_types() {
        let index = SymbolIndex::build(vec![
            node("pkg.Service", NodeKind::Annotation),
            node("pkg.User", NodeKind::Class),
        ])
        .unwrap();
        assert_eq!(index.resolve_type("@Service", &[], "pkg").unwrap().fqn, "pkg.Service");
        assert!(index.resolve_type("List<User>", &[], "pkg").is_none());
        assert_eq!(index.resolve_type("User?", &[], "pkg").unwrap().fqn, "pkg.User");
        assert_eq!(index.resolve_type("User[]", &[], "pkg").unwrap().fqn, "pkg.User");
        assert!(index.resolve_type("   ", &[], "pkg").is_none());
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("java.util.Map<String, List<Foo>>"), "Map");
        assert_eq!(simple_name("@org.springframework.Service"), "Service");
        assert_eq!(simple_name("Foo?"), "Foo");
        assert_eq!(simple_name("Foo[][]"), "Foo");
        assert_eq!(simple_name("String..."), "String");
    }

    #[test]
    fn test_find_annotated_with_substring() {
        let mut n = Node::new("pkg.Ctl", "Ctl", NodeKind::Class);
        n.meta.annotations = vec!["org.springframework.web.bind.annotation.RestController".into()];
        let index = SymbolIndex::build(vec![Arc::new(n), node("pkg.X", NodeKind::Class)]).unwrap();

        let hits = index.find_annotated_with("RestController");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fqn, "pkg.Ctl");
        assert!(index.find_annotated_with("Entity").is_empty());
    }

    #[test]
    fn test_add_nodes_skips_known_fqns() {
        let mut index = SymbolIndex::build(vec![node("pkg.A", NodeKind::Class)]).unwrap();
        let added = index.add_nodes(vec![
            node("pkg.A", NodeKind::Class),
            node("topic://orders", NodeKind::Topic),
        ]);
        assert_eq!(added, 1);
        assert_eq!(index.len(), 2);
        assert!(index.find_by_fqn("topic://orders").is_some());
        assert_eq!(index.find_by_kind(NodeKind::Topic).len(), 1);
    }
}
