use futures::stream;
use futures::StreamExt;
use protocore::{value_to_text, Map, Node, NodeContext, NodeError, OutputRecord, OutputStream};
use protoruntime::{edge_value, NodeFactory, NodeMetadata, PortDefinition};

pub const OUTPUT_NODE: &str = "ProtoOutputNode";

/// Display sink: shows the value of the first connected node that has
/// produced output.
pub struct OutputNode;

impl Node for OutputNode {
    fn node_type(&self) -> &str {
        OUTPUT_NODE
    }

    fn execute<'a>(&'a self, ctx: NodeContext<'a>) -> OutputStream<'a> {
        let content = ctx
            .incoming_edges()
            .find_map(|edge| {
                let value = edge_value(ctx.state, edge);
                if value.is_none() {
                    tracing::warn!(parent: ctx.span, node_id = ctx.node_id, source = %edge.source, "Source node not in state yet");
                }
                value
            })
            .map(|value| value_to_text(&value))
            .unwrap_or_default();

        tracing::info!(parent: ctx.span, node_id = ctx.node_id, chars = content.len(), "Output complete");
        let record = OutputRecord::new().with_output("content", content);
        stream::once(async move { Ok::<_, NodeError>(record) }).boxed()
    }
}

pub struct OutputNodeFactory;

impl NodeFactory for OutputNodeFactory {
    fn create(&self, _config: &Map) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(OutputNode))
    }

    fn node_type(&self) -> &str {
        OUTPUT_NODE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Output Viewer".to_string(),
            description: "Displays streaming output from connected nodes".to_string(),
            category: "output".to_string(),
            inputs: vec![PortDefinition::new("content", "STRING")],
            outputs: vec![],
        }
    }
}
