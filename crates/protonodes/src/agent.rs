//! LLM agent node.
//!
//! Builds a generation request from its resolved inputs, hands it to an
//! [`LlmGateway`] and streams the cumulative answer under `response`.
//! Gateway failures, timeouts included, end the node with a single
//! `Error: ...` record instead of failing the run.

use async_stream::stream;
use futures::StreamExt;
use protocore::models::TEMPERATURE;
use protocore::{
    value_to_text, GatewayError, GenerationRequest, LlmGateway, Map, ModelCatalog, Node,
    NodeContext, NodeError, OutputMode, OutputRecord, OutputStream, Value, RESPONSE_HANDLE,
};
use protoruntime::{InputResolver, NodeFactory, NodeMetadata, PortDefinition};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

pub const AGENT_NODE: &str = "ProtoAgentNode";

/// Inputs with a fixed meaning. Any other wired handle is a model parameter.
const FIXED_INPUTS: [&str; 6] = [
    "prompt",
    "model",
    "temperature",
    "output_type",
    "json_schema",
    "model_parameters",
];

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Ceiling for a whole generation, streamed or structured
    pub timeout: Duration,
    pub default_model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            default_model: "claude-haiku-4-5".to_string(),
        }
    }
}

pub struct AgentNode {
    gateway: Arc<dyn LlmGateway>,
    catalog: Arc<ModelCatalog>,
    config: AgentConfig,
}

/// A request ready to send, plus the schema envelope when the answer must be
/// structured.
struct Prepared {
    request: GenerationRequest,
    structured: Option<Value>,
}

impl AgentNode {
    pub fn new(gateway: Arc<dyn LlmGateway>, catalog: Arc<ModelCatalog>, config: AgentConfig) -> Self {
        Self {
            gateway,
            catalog,
            config,
        }
    }

    fn prepare(&self, ctx: &NodeContext<'_>) -> Prepared {
        let resolver = InputResolver::new(ctx.node_id, ctx.edges, ctx.state, ctx.span);
        let input = |name: &str| {
            ctx.inputs
                .get(name)
                .cloned()
                .or_else(|| resolver.edge_input(name))
                .filter(|value| !value.is_null())
        };

        let prompt = input("prompt").map(|v| value_to_text(&v)).unwrap_or_default();
        let model = input("model")
            .and_then(|v| v.as_str().map(str::trim).map(String::from))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        let output_mode = input("output_type")
            .and_then(|v| v.as_str().map(OutputMode::parse))
            .unwrap_or_default();

        let mut params = parameter_bag(ctx, input("model_parameters"));
        resolver.merge_parameter_edges(&mut params, &FIXED_INPUTS);
        self.catalog.enforce_policy(&model, &mut params);
        let params = self.catalog.sanitize_params(&model, &params);

        let configured_schema = ctx.config.get("json_schema").filter(|v| is_present(v));
        let schema = configured_schema
            .is_none()
            .then(|| connected_schema(ctx, &resolver))
            .flatten()
            .or_else(|| explicit_schema(ctx, input("json_schema")));
        let structured = match (output_mode, schema.as_ref()) {
            (OutputMode::Json, Some(schema)) => structured_envelope(schema),
            _ => None,
        };

        tracing::info!(
            parent: ctx.span,
            node_id = ctx.node_id,
            model = %model,
            output_type = ?output_mode,
            structured = structured.is_some(),
            temperature = ?params.get(TEMPERATURE),
            "Agent request prepared"
        );

        Prepared {
            request: GenerationRequest {
                prompt,
                model,
                output_mode,
                schema,
                params,
            },
            structured,
        }
    }
}

impl Node for AgentNode {
    fn node_type(&self) -> &str {
        AGENT_NODE
    }

    fn execute<'a>(&'a self, ctx: NodeContext<'a>) -> OutputStream<'a> {
        Box::pin(stream! {
            let Prepared { request, structured } = self.prepare(&ctx);
            if self.catalog.get(&request.model).is_none() {
                yield Ok(failure(&ctx, &GatewayError::UnknownModel(request.model.clone())));
                return;
            }
            let limit = self.config.timeout;
            let timed_out = || GatewayError::Timeout { seconds: limit.as_secs() };

            if let Some(envelope) = structured {
                let raw = match timeout(limit, self.gateway.generate_structured(&request, &envelope)).await {
                    Ok(Ok(raw)) => raw,
                    Ok(Err(err)) => {
                        yield Ok(failure(&ctx, &err));
                        return;
                    }
                    Err(_) => {
                        yield Ok(failure(&ctx, &timed_out()));
                        return;
                    }
                };

                let record = flatten_json(&raw).unwrap_or_else(|| {
                    tracing::warn!(parent: ctx.span, node_id = ctx.node_id, "Structured answer is not valid JSON, keeping text");
                    response_record(raw.clone())
                });
                tracing::info!(parent: ctx.span, node_id = ctx.node_id, fields = record.len(), "Agent complete");
                yield Ok(record);
                return;
            }

            let deadline = Instant::now() + limit;
            let mut chunks = match timeout_at(deadline, self.gateway.stream(&request)).await {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(err)) => {
                    yield Ok(failure(&ctx, &err));
                    return;
                }
                Err(_) => {
                    yield Ok(failure(&ctx, &timed_out()));
                    return;
                }
            };

            let mut accumulated = String::new();
            let mut received = 0usize;
            loop {
                match timeout_at(deadline, chunks.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        received += 1;
                        accumulated.push_str(&chunk);
                        tracing::trace!(parent: ctx.span, node_id = ctx.node_id, chunk = %chunk, "Token");
                        yield Ok(response_record(accumulated.clone()));
                    }
                    Ok(Some(Err(err))) => {
                        yield Ok(failure(&ctx, &err));
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        yield Ok(failure(&ctx, &timed_out()));
                        return;
                    }
                }
            }
            drop(chunks);

            if request.output_mode == OutputMode::Json {
                match flatten_json(&accumulated) {
                    Some(record) => {
                        tracing::info!(parent: ctx.span, node_id = ctx.node_id, fields = record.len(), "Agent complete");
                        yield Ok(record);
                        return;
                    }
                    None => tracing::warn!(parent: ctx.span, node_id = ctx.node_id, "Failed to parse JSON output, storing as text"),
                }
            }

            tracing::info!(parent: ctx.span, node_id = ctx.node_id, chars = accumulated.len(), chunks = received, "Agent complete");
            if received == 0 {
                yield Ok::<_, NodeError>(response_record(accumulated));
            }
        })
    }

    fn validate_config(&self, config: &Map) -> Result<(), NodeError> {
        if let Some(output_type) = config.get("output_type") {
            if !output_type.is_string() && !output_type.is_null() {
                return Err(NodeError::InvalidInputType {
                    field: "output_type".to_string(),
                    expected: "string".to_string(),
                    actual: json_kind(output_type).to_string(),
                });
            }
        }
        match config.get("model_parameters") {
            None | Some(Value::Null) | Some(Value::Object(_)) | Some(Value::String(_)) => Ok(()),
            Some(other) => Err(NodeError::InvalidInputType {
                field: "model_parameters".to_string(),
                expected: "object".to_string(),
                actual: json_kind(other).to_string(),
            }),
        }
    }
}

fn response_record(text: impl Into<Value>) -> OutputRecord {
    OutputRecord::new().with_output(RESPONSE_HANDLE, text)
}

fn failure(ctx: &NodeContext<'_>, err: &GatewayError) -> OutputRecord {
    tracing::error!(parent: ctx.span, node_id = ctx.node_id, "LLM error: {}", err);
    response_record(format!("Error: {}", err))
}

/// `{"response": raw}` plus every top-level property when `raw` is a JSON
/// object. `None` when `raw` is not JSON at all.
fn flatten_json(raw: &str) -> Option<OutputRecord> {
    let parsed: Value = serde_json::from_str(raw).ok()?;
    let mut record = response_record(raw);
    if let Value::Object(properties) = parsed {
        for (key, value) in properties {
            record.insert(key, value);
        }
    }
    Some(record)
}

/// Provider parameters from the `model_parameters` input, which may be an
/// object or JSON text.
fn parameter_bag(ctx: &NodeContext<'_>, raw: Option<Value>) -> Map {
    match raw {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(Value::String(text)) if text.trim().is_empty() => Map::new(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::warn!(parent: ctx.span, node_id = ctx.node_id, "Malformed model_parameters JSON, defaulting to {{}}");
                Map::new()
            }
        },
        Some(other) => {
            tracing::warn!(parent: ctx.span, node_id = ctx.node_id, kind = json_kind(&other), "Ignoring model_parameters");
            Map::new()
        }
    }
}

/// Schema given directly on the node, as an object or JSON text.
fn explicit_schema(ctx: &NodeContext<'_>, raw: Option<Value>) -> Option<Value> {
    let schema = match raw? {
        Value::String(text) if text.trim().is_empty() => return None,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(parent: ctx.span, node_id = ctx.node_id, "Ignoring unparseable json_schema: {}", err);
                return None;
            }
        },
        value => value,
    };
    is_present(&schema).then_some(schema)
}

/// Schema committed by the node wired to `json_schema`.
fn connected_schema(ctx: &NodeContext<'_>, resolver: &InputResolver<'_>) -> Option<Value> {
    let edge = resolver.first_edge("json_schema")?;
    let record = ctx.state.get(&edge.source)?;
    let handle = edge.source_handle.as_deref().unwrap_or("schema");
    let schema = record.get(handle).or_else(|| record.get("schema"))?.clone();
    tracing::info!(parent: ctx.span, node_id = ctx.node_id, source = %edge.source, "Loaded schema from connected node");
    is_present(&schema).then_some(schema)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// JSON schema sent for structured generation, or `None` when the node
/// schema declares no properties.
pub fn structured_envelope(schema: &Value) -> Option<Value> {
    let properties = schema.get("properties")?.as_object().filter(|p| !p.is_empty())?;
    let title = schema
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("ResponseSchema");
    let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();

    Some(serde_json::json!({
        "title": title,
        "description": "Structured response matching the specified schema",
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub struct AgentNodeFactory {
    gateway: Arc<dyn LlmGateway>,
    catalog: Arc<ModelCatalog>,
    config: AgentConfig,
}

impl AgentNodeFactory {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            catalog: Arc::new(ModelCatalog::builtin()),
            config: AgentConfig::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }
}

impl NodeFactory for AgentNodeFactory {
    fn create(&self, _config: &Map) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(AgentNode::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.catalog),
            self.config.clone(),
        )))
    }

    fn node_type(&self) -> &str {
        AGENT_NODE
    }

    fn metadata(&self) -> NodeMetadata {
        let models: Vec<Value> = self.catalog.names().map(Value::from).collect();
        NodeMetadata {
            display_name: "Agent".to_string(),
            description: "LLM agent with streaming and structured output".to_string(),
            category: "experimental".to_string(),
            inputs: vec![
                PortDefinition::new("prompt", "STRING")
                    .described("Prompt; {{variables}} are filled from connected nodes")
                    .required(),
                PortDefinition::new("model", "STRING")
                    .described(format!("One of: {}", value_to_text(&Value::Array(models))))
                    .with_default(self.config.default_model.clone()),
                PortDefinition::new("temperature", "FLOAT").with_default(0.7),
                PortDefinition::new("output_type", "STRING")
                    .described("text or json")
                    .with_default("text"),
                PortDefinition::new("json_schema", "JSON")
                    .described("Schema for structured output; may be wired from a schema node"),
                PortDefinition::new("model_parameters", "JSON")
                    .described("Provider-specific parameters, e.g. top_k or max_tokens")
                    .with_default(Value::Object(Map::new())),
            ],
            outputs: vec![PortDefinition::new(RESPONSE_HANDLE, "STRING")],
        }
    }
}
