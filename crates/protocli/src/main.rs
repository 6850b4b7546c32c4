// crates/protocli/src/main.rs

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use protocore::{value_to_text, ExecutionEvent, ModelCatalog, NodeSpec, Workflow};
use protonodes::{
    register_with, AgentConfig, AgentNodeFactory, EchoGateway, AGENT_NODE, DYNAMIC_TEXT_NODE,
    OUTPUT_NODE,
};
use protoruntime::{observe, FlowRuntime, NodeRegistry, RunRecord, RunRecorder, RunStatus, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protoflow")]
#[command(about = "Proto workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Show progress and streamed previews
        #[arg(short, long)]
        verbose: bool,

        /// Delay between echoed chunks, in milliseconds
        #[arg(long, env = "PROTOFLOW_ECHO_DELAY_MS", default_value_t = 0)]
        chunk_delay_ms: u64,

        /// Ceiling for a single agent generation, in seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// List known models and their parameters
    Models,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            verbose,
            chunk_delay_ms,
            timeout_secs,
        } => {
            init_logging(verbose);
            let agent = AgentConfig {
                timeout: Duration::from_secs(timeout_secs),
                ..AgentConfig::default()
            };
            let runtime = build_runtime(Duration::from_millis(chunk_delay_ms), agent);
            run_workflow(&runtime, file, verbose).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Models => {
            list_models();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn build_runtime(chunk_delay: Duration, agent: AgentConfig) -> FlowRuntime {
    let gateway = Arc::new(EchoGateway::new().with_chunk_delay(chunk_delay));
    let mut registry = NodeRegistry::new();
    register_with(&mut registry, AgentNodeFactory::new(gateway).with_config(agent));

    FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::from_env())
}

fn load_workflow(file: &PathBuf) -> Result<Workflow> {
    let workflow_json = std::fs::read_to_string(file)?;
    Ok(serde_json::from_str(&workflow_json)?)
}

async fn run_workflow(runtime: &FlowRuntime, file: PathBuf, verbose: bool) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = load_workflow(&file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let handle = runtime.execute(workflow.clone())?;
    let recorder = RunRecorder::for_workflow(&workflow).with_execution_id(handle.execution_id());

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n🛑 Cancelling...");
            token.cancel();
        }
    });

    let mut events = observe(handle.into_stream(), recorder.clone());
    while let Some(event) = events.next().await {
        print_event(&event, verbose);
    }
    drop(events);

    let record = recorder.snapshot();
    print_summary(&record);

    if record.status == RunStatus::Failed {
        bail!(
            "Workflow failed: {}",
            record.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_event(event: &ExecutionEvent, verbose: bool) {
    match event {
        ExecutionEvent::WorkflowStart { .. } => {
            println!("▶️  Workflow started");
        }
        ExecutionEvent::NodeStart { node_id, node_type } => {
            println!("  ⚡ Starting node: {} ({})", node_id, node_type);
        }
        ExecutionEvent::NodeProgress {
            node_id,
            progress,
            message,
        } => {
            if verbose {
                println!("     📊 [{}] {:.0}% - {}", node_id, progress * 100.0, message);
            }
        }
        ExecutionEvent::NodeStream { node_id, content } => {
            if verbose {
                println!("     📝 [{}] {}", node_id, value_to_text(content));
            }
        }
        ExecutionEvent::NodeComplete { node_id, .. } => {
            println!("  ✅ Node {} completed", node_id);
        }
        ExecutionEvent::WorkflowComplete { .. } => {
            println!("✨ Workflow completed successfully");
        }
        ExecutionEvent::Error { message } => {
            println!("💥 {}", message);
        }
    }
}

fn print_summary(record: &RunRecord) {
    println!();
    println!("📊 Execution Summary:");
    if let Some(execution_id) = record.execution_id {
        println!("   Execution ID: {}", execution_id);
    }
    if let (Some(started), Some(completed)) = (record.started_at, record.completed_at) {
        println!("   Duration: {}ms", (completed - started).num_milliseconds());
    }
    let done = record
        .nodes
        .iter()
        .filter(|n| n.output.is_some())
        .count();
    println!("   Completed: {}/{} nodes", done, record.nodes.len());

    let outputs: Vec<_> = record
        .nodes
        .iter()
        .filter_map(|n| n.output.as_ref().map(|output| (n, output)))
        .filter(|(_, output)| !output.is_empty())
        .collect();

    if !outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (node, output) in outputs {
            println!("   Node {} ({:?}):", node.node_id, node.status);
            for (key, value) in output.iter() {
                println!("     {}: {}", key, value_to_text(value));
            }
        }
    }
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    let runtime = build_runtime(Duration::ZERO, AgentConfig::default());
    runtime.validate(&workflow)?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let runtime = build_runtime(Duration::ZERO, AgentConfig::default());
    let registry = runtime.registry();

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} - {} ({})", node_type, metadata.display_name, metadata.category);
            println!("    {}", metadata.description);
            for port in &metadata.inputs {
                println!("      ← {}: {}", port.name, port.port_type);
            }
            for port in &metadata.outputs {
                println!("      → {}: {}", port.name, port.port_type);
            }
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn list_models() {
    println!("🧠 Known Models:");
    println!();

    for (name, info) in ModelCatalog::builtin().iter() {
        let temperature = if info.supports_temperature { "" } else { ", no temperature" };
        println!("  • {} ({:?}{})", name, info.provider, temperature);
        let params: Vec<&str> = info.valid_params.keys().copied().collect();
        println!("    params: {}", params.join(", "));
    }
}

fn example_workflow() -> Workflow {
    let mut workflow = Workflow::new("Example Agent Workflow");
    workflow.description = Some("Fills a prompt from a text node and shows the answer".to_string());

    let topic = workflow.add_node(
        NodeSpec::new("topic", DYNAMIC_TEXT_NODE)
            .with_label("Topic")
            .with_config("text", "async streams in Rust")
            .with_position(100.0, 100.0),
    );
    let agent = workflow.add_node(
        NodeSpec::new("agent", AGENT_NODE)
            .with_label("Explain")
            .with_config("prompt", "Explain {{topic}} in one paragraph.")
            .with_config("model", "claude-haiku-4-5")
            .with_config("output_type", "text")
            .with_position(300.0, 100.0),
    );
    let output = workflow.add_node(
        NodeSpec::new("output", OUTPUT_NODE)
            .with_label("Answer")
            .with_position(500.0, 100.0),
    );

    workflow.connect(topic, "output", agent.clone(), "topic");
    workflow.connect(agent, "response", output, "content");
    workflow
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let json = serde_json::to_string_pretty(&example_workflow())?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  protoflow run --file {} --verbose", output.display());

    Ok(())
}
