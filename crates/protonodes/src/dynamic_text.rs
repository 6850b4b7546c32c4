use futures::stream;
use futures::StreamExt;
use protocore::{value_to_text, Map, Node, NodeContext, NodeError, OutputRecord, OutputStream, OUTPUT_HANDLE};
use protoruntime::{edge_value, template, NodeFactory, NodeMetadata, PortDefinition};
use std::collections::HashMap;

pub const DYNAMIC_TEXT_NODE: &str = "ProtoDynamicTextNode";

/// Fills the `{{name}}` placeholders of its `text` template from every
/// connected node, keyed by the edge's target handle.
pub struct DynamicTextNode;

impl DynamicTextNode {
    /// Values on every wired handle. Later edges win.
    fn variables(ctx: &NodeContext<'_>) -> HashMap<String, String> {
        let mut variables = HashMap::new();
        for edge in ctx.incoming_edges() {
            let Some(handle) = edge.target_handle().filter(|h| !h.is_empty()) else {
                continue;
            };
            match edge_value(ctx.state, edge) {
                Some(value) => {
                    variables.insert(handle.to_string(), value_to_text(&value));
                }
                None => tracing::warn!(parent: ctx.span, node_id = ctx.node_id, source = %edge.source, "Source node not in state yet"),
            }
        }
        variables
    }
}

impl Node for DynamicTextNode {
    fn node_type(&self) -> &str {
        DYNAMIC_TEXT_NODE
    }

    fn execute<'a>(&'a self, ctx: NodeContext<'a>) -> OutputStream<'a> {
        let text = ctx.config.get("text").map(value_to_text).unwrap_or_default();
        let variables = Self::variables(&ctx);
        tracing::debug!(parent: ctx.span, node_id = ctx.node_id, variables = ?variables.keys().collect::<Vec<_>>(), "Collected variables");

        let output = template::render(&text, |name| variables.get(name).cloned());
        tracing::info!(parent: ctx.span, node_id = ctx.node_id, chars = output.len(), "Dynamic text complete");

        let record = OutputRecord::new().with_output(OUTPUT_HANDLE, output);
        stream::once(async move { Ok::<_, NodeError>(record) }).boxed()
    }
}

pub struct DynamicTextNodeFactory;

impl NodeFactory for DynamicTextNodeFactory {
    fn create(&self, _config: &Map) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DynamicTextNode))
    }

    fn node_type(&self) -> &str {
        DYNAMIC_TEXT_NODE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "Dynamic Text".to_string(),
            description: "Compose text with variable interpolation using {{variable}} syntax".to_string(),
            category: "text".to_string(),
            inputs: vec![PortDefinition::new("text", "STRING").with_default("")],
            outputs: vec![PortDefinition::new(OUTPUT_HANDLE, "STRING")],
        }
    }
}
