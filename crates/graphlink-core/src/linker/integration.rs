use crate::error::Result;
use crate::library::{IntegrationPoint, LibraryEdgeProposal, LibraryIndex, LibraryNode};
use crate::linker::resolvers::{EdgeResolver, LinkContext, ResolverOutput};
use crate::linker::virtual_nodes::{Materialized, VirtualNodeFactory};
use crate::types::{EdgeKind, EdgeProposal, Node, NodeMeta, RawUsage};
use std::sync::Arc;

/// Calls into library methods, and the endpoints and topics behind them.
///
/// Every library hit yields a CALLS_CODE library edge. Each integration
/// point of the hit additionally yields same-index edges to a virtual node
/// and the matching library edges.
pub struct IntegrationResolver {
    library: Arc<dyn LibraryIndex>,
    factory: VirtualNodeFactory,
}

impl IntegrationResolver {
    pub fn new(library: Arc<dyn LibraryIndex>) -> Self {
        Self {
            library,
            factory: VirtualNodeFactory::new(),
        }
    }

    /// Candidate library FQN for a usage, or `None` when nothing fits.
    fn library_fqn(usage: &RawUsage, node: &Node, ctx: &LinkContext<'_>) -> Option<String> {
        let meta = &node.meta;
        match usage {
            RawUsage::Simple { name, .. } => {
                let suffix = format!(".{name}");
                meta.owner_fqn
                    .as_ref()
                    .map(|owner| format!("{owner}.{name}"))
                    .or_else(|| {
                        // static import of the member itself
                        meta.imports.iter().find(|i| i.ends_with(&suffix)).cloned()
                    })
                    .or_else(|| {
                        // first imported class
                        meta.imports
                            .iter()
                            .find(|i| i.rsplit('.').next().is_some_and(starts_upper))
                            .map(|class| format!("{class}.{name}"))
                    })
                    .or_else(|| name.contains('.').then(|| name.clone()))
            }
            RawUsage::Dot {
                receiver, member, ..
            } => {
                let receiver_type = if starts_upper(receiver) {
                    Self::receiver_fqn(receiver, node, meta, ctx)
                } else {
                    meta.owner_fqn.clone()
                };
                receiver_type.map(|r| format!("{r}.{member}"))
            }
        }
    }

    /// Capitalized receivers are usually library classes the application
    /// index does not know; fall back to the import whose tail matches.
    fn receiver_fqn(
        receiver: &str,
        node: &Node,
        meta: &NodeMeta,
        ctx: &LinkContext<'_>,
    ) -> Option<String> {
        if let Some(t) = ctx
            .index
            .resolve_type(receiver, &meta.imports, node.package_or_empty())
        {
            return Some(t.fqn.clone());
        }
        let suffix = format!(".{receiver}");
        meta.imports
            .iter()
            .find(|i| i.ends_with(&suffix))
            .cloned()
            .or_else(|| receiver.contains('.').then(|| receiver.to_string()))
    }

    fn link_point(
        &self,
        node: &Arc<Node>,
        library_node: &Arc<LibraryNode>,
        point: &IntegrationPoint,
        ctx: &LinkContext<'_>,
        out: &mut ResolverOutput,
    ) {
        match point {
            IntegrationPoint::HttpEndpoint {
                url,
                http_method,
                has_retry,
                has_timeout,
                has_circuit_breaker,
            } => {
                let target = self.materialize(
                    self.factory
                        .endpoint(url.as_deref(), http_method.as_deref(), ctx.index),
                    out,
                );
                let kinds = [
                    (true, EdgeKind::CallsHttp),
                    (*has_retry, EdgeKind::RetriesTo),
                    (*has_timeout, EdgeKind::TimeoutsTo),
                    (*has_circuit_breaker, EdgeKind::CircuitBreakerTo),
                ];
                for (_, kind) in kinds.into_iter().filter(|(on, _)| *on) {
                    Self::both_ways(node, &target, library_node, kind, out);
                }
            }
            IntegrationPoint::QueueTopic { name, operation } => {
                let target = self.materialize(self.factory.topic(name.as_deref(), ctx.index), out);
                Self::both_ways(node, &target, library_node, operation.edge_kind(), out);
            }
            IntegrationPoint::RouteRule {
                uri, endpoint_type, ..
            } => {
                let target =
                    self.materialize(self.factory.endpoint(uri.as_deref(), None, ctx.index), out);
                let is_http = endpoint_type.as_deref() == Some("http")
                    || uri.as_deref().is_some_and(|u| u.starts_with("http"));
                if is_http {
                    Self::both_ways(node, &target, library_node, EdgeKind::CallsHttp, out);
                }
            }
        }
    }

    fn materialize(&self, materialized: Materialized, out: &mut ResolverOutput) -> Arc<Node> {
        if materialized.is_new {
            out.virtual_nodes.push(Arc::clone(&materialized.node));
        }
        materialized.node
    }

    fn both_ways(
        node: &Arc<Node>,
        target: &Arc<Node>,
        library_node: &Arc<LibraryNode>,
        kind: EdgeKind,
        out: &mut ResolverOutput,
    ) {
        out.edges.push(EdgeProposal::new(node, target, kind));
        out.library_edges
            .push(LibraryEdgeProposal::new(kind, node, library_node));
    }
}

fn starts_upper(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_uppercase)
}

impl EdgeResolver for IntegrationResolver {
    fn name(&self) -> &'static str {
        "integration"
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.kind.is_function() && !node.meta.raw_usages.is_empty()
    }

    fn link(&self, node: &Arc<Node>, ctx: &LinkContext<'_>) -> Result<ResolverOutput> {
        let mut out = ResolverOutput::default();

        for usage in &node.meta.raw_usages {
            let Some(fqn) = Self::library_fqn(usage, node, ctx) else {
                continue;
            };
            let Some(library_node) = self.library.find_library_method(&fqn)? else {
                continue;
            };

            out.library_edges
                .push(LibraryEdgeProposal::new(EdgeKind::CallsCode, node, &library_node));

            for point in self.library.extract_integration_points(&library_node)? {
                self.link_point(node, &library_node, &point, ctx, &mut out);
            }
        }

        if !out.is_empty() {
            log::debug!(
                "{} ({}): {} integration edges, {} library edges, {} proposed nodes",
                node.fqn,
                ctx.application.key,
                out.edges.len(),
                out.library_edges.len(),
                out.virtual_nodes.len()
            );
        }
        Ok(out)
    }
}
