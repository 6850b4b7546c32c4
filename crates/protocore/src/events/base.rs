use crate::{NodeId, OutputRecord, Value};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Ordered, append-only outbound event sequence of one run.
/// Dropping it cancels the run.
pub type EventStream = BoxStream<'static, ExecutionEvent>;

/// Events emitted during workflow execution, one self-contained JSON document each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkflowStart {
        timestamp: DateTime<Utc>,
    },
    NodeStart {
        node_id: NodeId,
        node_type: String,
    },
    NodeProgress {
        node_id: NodeId,
        progress: f64,
        message: String,
    },
    /// Preview content addressed to a downstream node that has not run yet.
    NodeStream {
        node_id: NodeId,
        content: Value,
    },
    NodeComplete {
        node_id: NodeId,
        output: Option<OutputRecord>,
    },
    WorkflowComplete {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl ExecutionEvent {
    pub fn workflow_start() -> Self {
        ExecutionEvent::WorkflowStart { timestamp: Utc::now() }
    }

    pub fn workflow_complete() -> Self {
        ExecutionEvent::WorkflowComplete { timestamp: Utc::now() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ExecutionEvent::Error { message: message.into() }
    }

    /// Wire name of the event (the `event` discriminator).
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::WorkflowStart { .. } => "workflow_start",
            ExecutionEvent::NodeStart { .. } => "node_start",
            ExecutionEvent::NodeProgress { .. } => "node_progress",
            ExecutionEvent::NodeStream { .. } => "node_stream",
            ExecutionEvent::NodeComplete { .. } => "node_complete",
            ExecutionEvent::WorkflowComplete { .. } => "workflow_complete",
            ExecutionEvent::Error { .. } => "error",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionEvent::NodeStart { node_id, .. }
            | ExecutionEvent::NodeProgress { node_id, .. }
            | ExecutionEvent::NodeStream { node_id, .. }
            | ExecutionEvent::NodeComplete { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// `workflow_complete` and `error` end a run; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::WorkflowComplete { .. } | ExecutionEvent::Error { .. }
        )
    }

    /// Server-Sent Events frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
