use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use protocore::{
    ChunkStream, Edge, ExecutionEvent, FlowError, GatewayError, GenerationRequest, LlmGateway,
    NodeSpec, OutputRecord, Value, Workflow, WorkflowError,
};
use protonodes::{
    register_all, register_with, AgentConfig, AgentNodeFactory, EchoGateway, AGENT_NODE,
    DYNAMIC_TEXT_NODE, OUTPUT_NODE, SCHEMA_NODE,
};
use protoruntime::{FlowRuntime, NodeRegistry, RuntimeConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> FlowRuntime {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, Arc::new(EchoGateway::new()));
    FlowRuntime::with_registry(
        Arc::new(registry),
        RuntimeConfig {
            progress_interval: Duration::ZERO,
        },
    )
}

async fn run(workflow: Workflow) -> Vec<ExecutionEvent> {
    runtime().execute(workflow).unwrap().collect().await
}

fn output_of(events: &[ExecutionEvent], id: &str) -> OutputRecord {
    events
        .iter()
        .find_map(|e| match e {
            ExecutionEvent::NodeComplete { node_id, output } if node_id == id => output.clone(),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no output for {}", id))
}

#[tokio::test]
async fn test_dynamic_text_into_output_event_sequence() {
    let mut workflow = Workflow::new("e2e");
    workflow.add_node(NodeSpec::new("A", DYNAMIC_TEXT_NODE).with_config("text", "42"));
    workflow.add_node(NodeSpec::new("B", OUTPUT_NODE));
    workflow.edges.push(
        Edge::new("A", "B")
            .with_source_handle("output")
            .with_target_handle("content"),
    );

    let events = run(workflow).await;

    let progress = |id: &str, fraction: f64, message: &str| ExecutionEvent::NodeProgress {
        node_id: id.to_string(),
        progress: fraction,
        message: message.to_string(),
    };
    let start = |id: &str, ty: &str| ExecutionEvent::NodeStart {
        node_id: id.to_string(),
        node_type: ty.to_string(),
    };
    let complete = |id: &str, output: Value| ExecutionEvent::NodeComplete {
        node_id: id.to_string(),
        output: Some(OutputRecord::from(output.as_object().cloned().unwrap())),
    };

    assert_eq!(events.len(), 10);
    assert_eq!(events[0].kind(), "workflow_start");
    assert_eq!(
        events[1..9].to_vec(),
        vec![
            start("A", DYNAMIC_TEXT_NODE),
            progress("A", 0.3, "Processing..."),
            progress("A", 0.7, "Almost done..."),
            complete("A", json!({"output": "42"})),
            start("B", OUTPUT_NODE),
            progress("B", 0.3, "Processing..."),
            progress("B", 0.7, "Almost done..."),
            complete("B", json!({"content": "42"})),
        ]
    );
    assert_eq!(events[9].kind(), "workflow_complete");
}

#[tokio::test]
async fn test_dynamic_text_substitution() {
    let mut workflow = Workflow::new("hello");
    workflow.add_node(NodeSpec::new("who", DYNAMIC_TEXT_NODE).with_config("text", "World"));
    workflow.add_node(NodeSpec::new("greet", DYNAMIC_TEXT_NODE).with_config("text", "Hello {{who}}"));
    workflow.add_node(NodeSpec::new("lonely", DYNAMIC_TEXT_NODE).with_config("text", "Hello {{ who }}"));
    workflow.edges.push(Edge::new("who", "greet").with_target_handle("who"));

    let events = run(workflow).await;

    assert_eq!(output_of(&events, "greet").get("output"), Some(&json!("Hello World")));
    assert_eq!(
        output_of(&events, "lonely").get("output"),
        Some(&json!("Hello {{missing: who}}"))
    );
}

#[tokio::test]
async fn test_dynamic_text_collects_all_edges_and_later_wins() {
    let mut workflow = Workflow::new("many");
    workflow.add_node(NodeSpec::new("a", DYNAMIC_TEXT_NODE).with_config("text", "first"));
    workflow.add_node(NodeSpec::new("b", DYNAMIC_TEXT_NODE).with_config("text", "second"));
    workflow.add_node(NodeSpec::new("n", DYNAMIC_TEXT_NODE).with_config("text", "3"));
    workflow.add_node(
        NodeSpec::new("t", DYNAMIC_TEXT_NODE).with_config("text", "{{x}} / {{y}} / {{x}}"),
    );
    workflow.edges.push(Edge::new("a", "t").with_target_handle("x"));
    workflow.edges.push(Edge::new("n", "t").with_target_handle("y"));
    workflow.edges.push(Edge::new("b", "t").with_target_handle("x"));

    let events = run(workflow).await;
    assert_eq!(
        output_of(&events, "t").get("output"),
        Some(&json!("second / 3 / second"))
    );
}

#[tokio::test]
async fn test_output_honors_first_edge_only() {
    let mut workflow = Workflow::new("two sources");
    workflow.add_node(NodeSpec::new("first", DYNAMIC_TEXT_NODE).with_config("text", ""));
    workflow.add_node(NodeSpec::new("second", DYNAMIC_TEXT_NODE).with_config("text", "non-empty"));
    workflow.add_node(NodeSpec::new("out", OUTPUT_NODE));
    workflow.edges.push(Edge::new("first", "out"));
    workflow.edges.push(Edge::new("second", "out"));

    let events = run(workflow).await;
    assert_eq!(output_of(&events, "out").get("content"), Some(&json!("")));
}

#[tokio::test]
async fn test_output_without_sources_is_empty() {
    let mut workflow = Workflow::new("alone");
    workflow.add_node(NodeSpec::new("out", OUTPUT_NODE));
    workflow.edges.push(Edge::new("ghost", "out"));

    let events = run(workflow).await;
    assert_eq!(output_of(&events, "out").get("content"), Some(&json!("")));
}

#[tokio::test]
async fn test_output_renders_structured_values_as_json() {
    let mut workflow = Workflow::new("schema view");
    workflow.add_node(
        NodeSpec::new("schema", SCHEMA_NODE).with_config("schema_definition", json!({"name": "X"})),
    );
    workflow.add_node(NodeSpec::new("out", OUTPUT_NODE));
    workflow.edges.push(Edge::new("schema", "out").with_source_handle("schema"));

    let events = run(workflow).await;
    assert_eq!(
        output_of(&events, "out").get("content"),
        Some(&json!(r#"{"name":"X"}"#))
    );
}

#[tokio::test]
async fn test_schema_emits_configuration_regardless_of_state() {
    let definition = json!({"name": "X", "properties": {"a": {"type": "string"}}});
    let mut workflow = Workflow::new("schema");
    workflow.add_node(NodeSpec::new("up", DYNAMIC_TEXT_NODE).with_config("text", "noise"));
    workflow.add_node(
        NodeSpec::new("schema", SCHEMA_NODE).with_config("schema_definition", definition.clone()),
    );
    workflow.add_node(NodeSpec::new("bare", SCHEMA_NODE));
    workflow.edges.push(Edge::new("up", "schema").with_target_handle("schema_definition"));

    let events = run(workflow).await;
    assert_eq!(output_of(&events, "schema").get("schema"), Some(&definition));
    assert_eq!(output_of(&events, "bare").get("schema"), Some(&json!({})));
}

#[tokio::test]
async fn test_cycle_emits_nothing() {
    let mut workflow = Workflow::new("loop");
    workflow.add_node(NodeSpec::new("a", DYNAMIC_TEXT_NODE));
    workflow.add_node(NodeSpec::new("b", DYNAMIC_TEXT_NODE));
    workflow.add_node(NodeSpec::new("c", OUTPUT_NODE));
    workflow.edges.push(Edge::new("a", "b"));
    workflow.edges.push(Edge::new("b", "a"));
    workflow.edges.push(Edge::new("b", "c"));

    match runtime().execute(workflow) {
        Err(FlowError::Workflow(err @ WorkflowError::GraphCycle { .. })) => {
            assert!(err.to_string().starts_with("Workflow contains a cycle"));
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("cyclic workflow must not run"),
    }
}

#[tokio::test]
async fn test_echo_agent_pipeline_from_json() {
    let workflow: Workflow = serde_json::from_value(json!({
        "name": "echo",
        "nodes": {
            "out": {"data": {"nodeType": OUTPUT_NODE, "nodeInputs": {}}},
            "agent": {"data": {"nodeType": AGENT_NODE, "nodeInputs": {
                "prompt": "Summarize: {{topic}}",
                "model": "claude-haiku-4-5",
                "temperature": 0.3,
                "output_type": "text"
            }}},
            "topic": {"data": {"nodeType": DYNAMIC_TEXT_NODE, "nodeInputs": {"text": "rust streams"}}}
        },
        "edges": [
            {"source": "agent", "sourceHandle": "response", "target": "out", "targetHandle": "content"},
            {"source": "topic", "sourceHandle": "output", "target": "agent", "targetHandle": "topic"}
        ]
    }))
    .unwrap();

    let events = run(workflow).await;

    let starts: Vec<&str> = events
        .iter()
        .filter(|e| e.kind() == "node_start")
        .filter_map(|e| e.node_id())
        .collect();
    assert_eq!(starts, vec!["topic", "agent", "out"]);

    let previews: Vec<&Value> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeStream { node_id, content } if node_id == "out" => Some(content),
            _ => None,
        })
        .collect();
    assert_eq!(previews.len(), 3);
    assert_eq!(previews.last().copied(), Some(&json!("Summarize: rust streams")));

    assert_eq!(
        output_of(&events, "out").get("content"),
        Some(&json!("Summarize: rust streams"))
    );
    assert_eq!(events.last().map(|e| e.kind()), Some("workflow_complete"));
}

#[tokio::test]
async fn test_schema_drives_structured_agent() {
    let mut workflow = Workflow::new("structured");
    workflow.add_node(NodeSpec::new("schema", SCHEMA_NODE).with_config(
        "schema_definition",
        json!({"name": "City", "properties": {"city": {"type": "string"}, "population": {"type": "integer"}}}),
    ));
    workflow.add_node(
        NodeSpec::new("agent", AGENT_NODE)
            .with_config("prompt", "Largest city?")
            .with_config("output_type", "json")
            .with_config("json_schema", ""),
    );
    workflow.add_node(NodeSpec::new("out", OUTPUT_NODE));
    workflow.edges.push(
        Edge::new("schema", "agent")
            .with_source_handle("schema")
            .with_target_handle("json_schema"),
    );
    workflow.edges.push(Edge::new("agent", "out").with_source_handle("city"));

    let events = run(workflow).await;

    let agent = output_of(&events, "agent");
    assert_eq!(agent.get("city"), Some(&json!("<city>")));
    assert_eq!(agent.get("population"), Some(&json!(0)));
    assert!(agent.response().is_some());
    assert_eq!(output_of(&events, "out").get("content"), Some(&json!("<city>")));
}

#[tokio::test]
async fn test_registry_lists_all_capabilities() {
    let runtime = runtime();
    let types = runtime.registry().list_node_types();
    assert_eq!(
        types,
        vec![AGENT_NODE, DYNAMIC_TEXT_NODE, OUTPUT_NODE, SCHEMA_NODE]
    );

    let agent = runtime.registry().get_metadata(AGENT_NODE).unwrap();
    assert_eq!(agent.display_name, "Agent");
    let inputs: Vec<&str> = agent.inputs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        inputs,
        vec!["prompt", "model", "temperature", "output_type", "json_schema", "model_parameters"]
    );
}

/// Accepts requests and never produces a chunk.
struct StalledGateway;

#[async_trait]
impl LlmGateway for StalledGateway {
    async fn stream(&self, _request: &GenerationRequest) -> Result<ChunkStream, GatewayError> {
        Ok(stream::pending().boxed())
    }

    async fn generate_structured(
        &self,
        _request: &GenerationRequest,
        _schema: &Value,
    ) -> Result<String, GatewayError> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn test_stalled_agent_times_out_and_run_completes() {
    let mut registry = NodeRegistry::new();
    register_with(
        &mut registry,
        AgentNodeFactory::new(Arc::new(StalledGateway)).with_config(AgentConfig {
            timeout: Duration::from_millis(50),
            ..AgentConfig::default()
        }),
    );
    let runtime = FlowRuntime::with_registry(
        Arc::new(registry),
        RuntimeConfig {
            progress_interval: Duration::ZERO,
        },
    );

    let mut workflow = Workflow::new("stalled");
    workflow.add_node(NodeSpec::new("topic", DYNAMIC_TEXT_NODE).with_config("text", "tides"));
    workflow.add_node(NodeSpec::new("agent", AGENT_NODE).with_config("prompt", "About {{topic}}"));
    workflow.add_node(NodeSpec::new("out", OUTPUT_NODE));
    workflow.edges.push(Edge::new("topic", "agent").with_target_handle("topic"));
    workflow.edges.push(
        Edge::new("agent", "out")
            .with_source_handle("response")
            .with_target_handle("content"),
    );

    let events: Vec<ExecutionEvent> = runtime.execute(workflow).unwrap().collect().await;

    assert!(events.iter().all(|e| e.kind() != "error"));
    assert_eq!(events.last().map(|e| e.kind()), Some("workflow_complete"));

    let message = "Error: Request timed out after 0 seconds";
    assert_eq!(output_of(&events, "agent").response(), Some(&json!(message)));
    assert_eq!(output_of(&events, "out").get("content"), Some(&json!(message)));

    // the error record is previewed to the sink like any other response
    let previews: Vec<&Value> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeStream { node_id, content } if node_id == "out" => Some(content),
            _ => None,
        })
        .collect();
    assert_eq!(previews, vec![&json!(message)]);
}
