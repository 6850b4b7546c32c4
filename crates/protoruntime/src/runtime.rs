use crate::executor::{ExecutionHandle, WorkflowExecutor};
use crate::graph::ExecutionGraph;
use crate::registry::NodeRegistry;
use protocore::{FlowError, Workflow, WorkflowError, WorkflowId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Main runtime for executing workflows
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    executor: Arc<WorkflowExecutor>,
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
}

impl FlowRuntime {
    /// Create a new runtime with default settings and no node types
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(NodeRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(Arc::clone(&registry), config));

        Self {
            registry,
            executor,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get access to the node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Register a workflow, replacing any with the same id
    pub async fn register_workflow(&self, workflow: Workflow) -> WorkflowId {
        let id = workflow.id;
        let mut workflows = self.workflows.write().await;
        workflows.insert(id, workflow);
        id
    }

    pub async fn get_workflow(&self, workflow_id: WorkflowId) -> Option<Workflow> {
        self.workflows.read().await.get(&workflow_id).cloned()
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.workflows.read().await.values().cloned().collect()
    }

    pub async fn remove_workflow(&self, workflow_id: WorkflowId) -> Option<Workflow> {
        self.workflows.write().await.remove(&workflow_id)
    }

    /// Execute a registered workflow by ID
    pub async fn execute_workflow(&self, workflow_id: WorkflowId) -> Result<ExecutionHandle, FlowError> {
        let workflow = self
            .get_workflow(workflow_id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;

        Ok(self.executor.execute(workflow)?)
    }

    /// Execute a workflow directly (without registration)
    pub fn execute(&self, workflow: Workflow) -> Result<ExecutionHandle, FlowError> {
        Ok(self.executor.execute(workflow)?)
    }

    /// Check a workflow without running it: structure, cycles, node types
    /// and each node's static configuration.
    pub fn validate(&self, workflow: &Workflow) -> Result<(), FlowError> {
        workflow.validate()?;
        ExecutionGraph::build(workflow).execution_order()?;

        for spec in &workflow.nodes {
            let node = self.registry.create_node(spec.node_type(), spec.config())?;
            node.validate_config(spec.config())?;
        }
        Ok(())
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Delay before each synthetic progress checkpoint and before the
    /// capability starts. Zero disables the delays.
    pub progress_interval: Duration,
}

impl RuntimeConfig {
    /// Defaults, with `PROTOFLOW_PROGRESS_MS` overriding the progress interval.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("PROTOFLOW_PROGRESS_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.progress_interval = Duration::from_millis(ms),
                Err(_) => tracing::warn!("Ignoring invalid PROTOFLOW_PROGRESS_MS: {}", raw),
            }
        }
        config
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(500),
        }
    }
}
