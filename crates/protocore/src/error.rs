use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures raised while a capability drains its output sequence.
///
/// Any of these reaching the coordinator aborts the whole run.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Workflow contains a cycle - cannot execute ({ordered} of {total} nodes orderable)")]
    GraphCycle { ordered: usize, total: usize },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
}

/// Errors surfaced by an [`LlmGateway`](crate::LlmGateway).
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Unknown model {0}")]
    UnknownModel(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}
