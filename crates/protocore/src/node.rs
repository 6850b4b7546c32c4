use crate::{Edge, ExecutionState, Map, NodeError, OutputRecord};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Lazy, finite, one-shot sequence of output records. The last item is the
/// node's authoritative result; an `Err` aborts the whole run.
pub type OutputStream<'a> = BoxStream<'a, Result<OutputRecord, NodeError>>;

/// Core trait that all executable node capabilities implement
pub trait Node: Send + Sync {
    /// Type discriminator this capability is registered under (e.g. "ProtoAgentNode")
    fn node_type(&self) -> &str;

    /// Start executing the node. Nothing runs until the stream is polled.
    fn execute<'a>(&'a self, ctx: NodeContext<'a>) -> OutputStream<'a>;

    /// Optional: Validate configuration at workflow load time
    fn validate_config(&self, _config: &Map) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Execution context passed to each node.
///
/// Everything is borrowed from the coordinator for the duration of one node.
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub node_id: &'a str,

    /// Inputs after edge, template and pass-through resolution
    pub inputs: &'a Map,

    /// Raw static configuration as declared on the node
    pub config: &'a Map,

    /// Every edge of the workflow, in caller-supplied order
    pub edges: &'a [Edge],

    /// Outputs committed by nodes that already finished
    pub state: &'a ExecutionState,

    /// Run-scoped span; capabilities log with `parent: ctx.span`
    pub span: &'a Span,

    pub cancellation: &'a CancellationToken,
}

impl<'a> NodeContext<'a> {
    /// Edges pointing at this node, in edge-list order.
    pub fn incoming_edges(&self) -> impl Iterator<Item = &'a Edge> + 'a {
        let node_id = self.node_id;
        self.edges.iter().filter(move |edge| edge.target == node_id)
    }
}
