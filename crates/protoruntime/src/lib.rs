//! Workflow execution runtime
//!
//! This crate provides the execution engine that orders workflows, resolves
//! node inputs, runs node capabilities one at a time and streams the run as
//! events.

mod executor;
pub mod graph;
mod preview;
pub mod recorder;
mod registry;
pub mod resolver;
mod runtime;
pub mod template;

pub use executor::{ExecutionHandle, WorkflowExecutor, PROGRESS_CHECKPOINTS};
pub use graph::{execution_order, ExecutionGraph};
pub use preview::PreviewChannel;
pub use recorder::{observe, NodeStatus, RunObserver, RunRecord, RunRecorder, RunStatus};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry, PortDefinition};
pub use resolver::{connected_value, edge_value, InputResolver};
pub use runtime::{FlowRuntime, RuntimeConfig};
