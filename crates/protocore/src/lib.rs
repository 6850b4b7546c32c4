//! Core abstractions for the workflow engine
//!
//! This crate provides the data model, event types and traits that all other
//! components depend on. It has no runtime dependencies.

mod error;
pub mod events;
mod gateway;
pub mod models;
mod node;
mod record;
mod state;
mod workflow;

pub use error::{FlowError, GatewayError, NodeError, WorkflowError};
pub use events::*;
pub use gateway::{ChunkStream, GenerationRequest, LlmGateway, OutputMode};
pub use models::{ModelCatalog, ModelInfo, ParamSpec, Provider};
pub use node::{Node, NodeContext, OutputStream};
pub use record::{
    extract_handle, value_to_text, Map, OutputRecord, Value, OUTPUT_HANDLE, RESPONSE_HANDLE,
};
pub use state::ExecutionState;
pub use workflow::{Edge, NodeData, NodeId, NodeSpec, Position, Workflow, WorkflowId};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
