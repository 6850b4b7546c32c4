use futures::stream;
use futures::StreamExt;
use protocore::{Map, Node, NodeContext, NodeError, OutputRecord, OutputStream, Value};
use protoruntime::{NodeFactory, NodeMetadata, PortDefinition};

pub const SCHEMA_NODE: &str = "ProtoSchemaNode";

/// Emits its configured `schema_definition` under `schema`.
pub struct SchemaNode;

impl Node for SchemaNode {
    fn node_type(&self) -> &str {
        SCHEMA_NODE
    }

    fn execute<'a>(&'a self, ctx: NodeContext<'a>) -> OutputStream<'a> {
        let schema = ctx
            .config
            .get("schema_definition")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let name = schema.get("name").and_then(Value::as_str).unwrap_or("unnamed");
        tracing::info!(parent: ctx.span, node_id = ctx.node_id, schema = name, "Schema complete");
        let record = OutputRecord::new().with_output("schema", schema);
        stream::once(async move { Ok::<_, NodeError>(record) }).boxed()
    }

    fn validate_config(&self, config: &Map) -> Result<(), NodeError> {
        match config.get("schema_definition") {
            None | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(NodeError::Configuration(
                "schema_definition must be a JSON object".to_string(),
            )),
        }
    }
}

pub struct SchemaNodeFactory;

impl NodeFactory for SchemaNodeFactory {
    fn create(&self, _config: &Map) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SchemaNode))
    }

    fn node_type(&self) -> &str {
        SCHEMA_NODE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            display_name: "JSON Schema".to_string(),
            description: "Define reusable JSON schema for structured LLM output".to_string(),
            category: "data".to_string(),
            inputs: vec![PortDefinition::new("schema_definition", "JSON")
                .with_default(Value::Object(Map::new()))],
            outputs: vec![PortDefinition::new("schema", "JSON")],
        }
    }
}
