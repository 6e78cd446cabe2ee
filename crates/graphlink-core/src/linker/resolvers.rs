use crate::error::Result;
use crate::index::SymbolIndex;
use crate::library::LibraryEdgeProposal;
use crate::types::{Application, EdgeKind, EdgeProposal, Node, NodeKind, RawUsage};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// Read-only context shared by every resolver invocation
#[derive(Clone, Copy)]
pub struct LinkContext<'a> {
    pub index: &'a SymbolIndex,
    pub application: &'a Application,
}

/// Everything one resolver produced for one node
#[derive(Debug, Default)]
pub struct ResolverOutput {
    pub edges: Vec<EdgeProposal>,
    pub library_edges: Vec<LibraryEdgeProposal>,

    /// Proposed virtual nodes, deduplicated by the orchestrator.
    pub virtual_nodes: Vec<Arc<Node>>,
}

impl ResolverOutput {
    pub fn from_edges(edges: Vec<EdgeProposal>) -> Self {
        Self {
            edges,
            ..Self::default()
        }
    }

    pub fn append(&mut self, mut other: ResolverOutput) {
        self.edges.append(&mut other.edges);
        self.library_edges.append(&mut other.library_edges);
        self.virtual_nodes.append(&mut other.virtual_nodes);
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.library_edges.is_empty() && self.virtual_nodes.is_empty()
    }
}

/// A per-node edge resolution strategy.
///
/// Resolvers read the index and never mutate it. Each one declares which
/// nodes it applies to; the orchestrator skips the rest.
pub trait EdgeResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, node: &Node) -> bool;

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput>;
}

/// Supertypes to IMPLEMENTS or INHERITS, each with DEPENDS_ON.
#[derive(Debug, Default)]
pub struct InheritanceResolver;

impl EdgeResolver for InheritanceResolver {
    fn name(&self) -> &'static str {
        "inheritance"
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.kind.is_type()
    }

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        let meta = &node.meta;
        let pkg = node.package_or_empty();
        let mut edges = Vec::new();

        for raw in meta.supertypes_resolved.iter().chain(&meta.supertypes_simple) {
            let Some(target) = ctx.index.resolve_type(raw, &meta.imports, pkg) else {
                log::trace!("Unresolved supertype '{}' of {}", raw, node.fqn);
                continue;
            };
            let kind = if target.kind == NodeKind::Interface {
                EdgeKind::Implements
            } else {
                EdgeKind::Inherits
            };
            edges.push(EdgeProposal::new(node, target, kind));
            edges.push(EdgeProposal::new(node, target, EdgeKind::DependsOn));
        }

        Ok(ResolverOutput::from_edges(edges))
    }
}

/// Annotations to ANNOTATED_WITH + DEPENDS_ON.
#[derive(Debug, Default)]
pub struct AnnotationResolver;

impl EdgeResolver for AnnotationResolver {
    fn name(&self) -> &'static str {
        "annotation"
    }

    fn applies_to(&self, node: &Node) -> bool {
        !node.meta.annotations.is_empty()
    }

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        let meta = &node.meta;
        let pkg = node.package_or_empty();
        let mut edges = Vec::new();

        for annotation in &meta.annotations {
            if let Some(target) = ctx.index.resolve_type(annotation, &meta.imports, pkg) {
                edges.push(EdgeProposal::new(node, target, EdgeKind::AnnotatedWith));
                edges.push(EdgeProposal::new(node, target, EdgeKind::DependsOn));
            }
        }

        Ok(ResolverOutput::from_edges(edges))
    }
}

/// Types named in a function's signature become DEPENDS_ON edges.
///
/// The edge is attributed to the owning type when it is indexed, otherwise
/// to the function itself. Self-edges are never emitted.
#[derive(Debug, Default)]
pub struct SignatureDependencyResolver;

/// Words that look like types in a signature but never name one in the
/// application: language keywords, primitives and standard collections.
const SIGNATURE_BLACKLIST: &[&str] = &[
    // keywords
    "fun", "val", "var", "suspend", "override", "open", "abstract", "final", "static",
    "public", "private", "protected", "internal", "inline", "operator", "vararg",
    "throws", "extends", "super", "return", "void", "this", "null", "true", "false",
    // primitives and builtins
    "Unit", "Nothing", "Any", "Object", "String", "CharSequence", "Int", "Integer", "Long",
    "Short", "Byte", "Double", "Float", "Boolean", "Char", "Character", "Number", "Void",
    // collections and wrappers
    "List", "MutableList", "ArrayList", "Set", "MutableSet", "HashSet", "Map",
    "MutableMap", "HashMap", "Collection", "Iterable", "Sequence", "Array", "Optional",
    "Stream", "Pair", "Triple",
];

fn type_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*")
            .expect("type token regex")
    })
}

/// Candidate type names in a written signature or type expression.
pub fn extract_type_tokens(text: &str) -> Vec<&str> {
    type_token_regex()
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|token| {
            let capitalized = token.chars().next().is_some_and(char::is_uppercase);
            (capitalized || token.contains('.')) && !SIGNATURE_BLACKLIST.contains(token)
        })
        .collect()
}

impl SignatureDependencyResolver {
    fn tokens(node: &Node) -> Vec<&str> {
        let meta = &node.meta;
        if !meta.param_types.is_empty() || meta.return_type.is_some() {
            return meta
                .param_types
                .iter()
                .chain(meta.return_type.iter())
                .flat_map(|t| extract_type_tokens(t))
                .collect();
        }
        node.raw_signature()
            .map(extract_type_tokens)
            .unwrap_or_default()
    }
}

impl EdgeResolver for SignatureDependencyResolver {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.kind.is_function()
    }

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        let meta = &node.meta;
        let pkg = node.package_or_empty();
        let source = meta
            .owner_fqn
            .as_deref()
            .and_then(|fqn| ctx.index.find_by_fqn(fqn))
            .unwrap_or(node);

        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for token in Self::tokens(node) {
            let Some(target) = ctx.index.resolve_type(token, &meta.imports, pkg) else {
                continue;
            };
            if target.same_identity(source) || !seen.insert(target.fqn.as_str()) {
                continue;
            }
            edges.push(EdgeProposal::new(source, target, EdgeKind::DependsOn));
        }

        Ok(ResolverOutput::from_edges(edges))
    }
}

/// Raw usages to CALLS.
///
/// A bare name is first tried as a member of the owner, then (for calls)
/// as a constructor-style type reference. A dotted usage resolves its
/// receiver as a type when capitalized, otherwise as the owner. Usages that
/// do not resolve produce nothing.
#[derive(Debug, Default)]
pub struct CallResolver;

fn is_capitalized(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_uppercase)
}

impl EdgeResolver for CallResolver {
    fn name(&self) -> &'static str {
        "call"
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.kind.is_function()
    }

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        let meta = &node.meta;
        let pkg = node.package_or_empty();
        let owner = meta
            .owner_fqn
            .as_deref()
            .and_then(|fqn| ctx.index.find_by_fqn(fqn));
        if owner.is_none() && meta.owner_fqn.is_some() {
            log::trace!("Owner {:?} of {} is not indexed", meta.owner_fqn, node.fqn);
        }

        let mut edges = Vec::new();
        for usage in &meta.raw_usages {
            let target = match usage {
                RawUsage::Simple { name, is_call } => owner
                    .and_then(|o| ctx.index.find_by_fqn(&format!("{}.{}", o.fqn, name)))
                    .or_else(|| {
                        if *is_call {
                            ctx.index.resolve_type(name, &meta.imports, pkg)
                        } else {
                            None
                        }
                    }),
                RawUsage::Dot {
                    receiver, member, ..
                } => {
                    let receiver_type = if is_capitalized(receiver) {
                        ctx.index.resolve_type(receiver, &meta.imports, pkg)
                    } else {
                        owner
                    };
                    receiver_type
                        .and_then(|r| ctx.index.find_by_fqn(&format!("{}.{}", r.fqn, member)))
                }
            };

            match target {
                Some(target) => edges.push(EdgeProposal::new(node, target, EdgeKind::Calls)),
                None => log::trace!("Unresolved usage {:?} in {}", usage, node.fqn),
            }
        }

        Ok(ResolverOutput::from_edges(edges))
    }
}

/// Declared thrown types to THROWS.
#[derive(Debug, Default)]
pub struct ThrowResolver;

impl EdgeResolver for ThrowResolver {
    fn name(&self) -> &'static str {
        "throw"
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.kind.is_function()
    }

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        let meta = &node.meta;
        let pkg = node.package_or_empty();
        let edges = meta
            .throws_types
            .iter()
            .filter_map(|t| ctx.index.resolve_type(t, &meta.imports, pkg))
            .map(|target| EdgeProposal::new(node, target, EdgeKind::Throws))
            .collect();

        Ok(ResolverOutput::from_edges(edges))
    }
}
