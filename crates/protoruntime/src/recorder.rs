//! Run bookkeeping driven purely by the event sequence.
//!
//! An observer sees every event the coordinator emits, in order, and never
//! alters or reorders them.

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use protocore::{EventStream, ExecutionEvent, ExecutionId, NodeId, OutputRecord, Workflow};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Started,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeExecution {
    pub node_id: NodeId,
    pub node_type: String,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<OutputRecord>,
    pub error: Option<String>,
    /// Preview frames fanned out while this node was producing
    pub stream_events: usize,
}

impl NodeExecution {
    fn pending(node_id: &str, node_type: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            status: NodeStatus::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            stream_events: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub execution_id: Option<ExecutionId>,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub nodes: Vec<NodeExecution>,
    pub events: usize,
}

impl RunRecord {
    pub fn node(&self, node_id: &str) -> Option<&NodeExecution> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}

/// Receives each event of one run.
pub trait RunObserver: Send {
    fn on_event(&mut self, event: &ExecutionEvent);

    /// Called once the event sequence ends or is dropped.
    fn on_end(&mut self) {}
}

/// In-memory [`RunObserver`]. Clones share the same record, so one clone can
/// be handed to [`observe`] while another is queried.
#[derive(Clone)]
pub struct RunRecorder {
    record: Arc<Mutex<RunRecord>>,
    current: Arc<Mutex<Option<NodeId>>>,
}

impl RunRecorder {
    pub fn for_workflow(workflow: &Workflow) -> Self {
        let nodes = workflow
            .nodes
            .iter()
            .map(|node| NodeExecution::pending(&node.id, node.node_type()))
            .collect();

        Self {
            record: Arc::new(Mutex::new(RunRecord {
                execution_id: None,
                status: RunStatus::NotStarted,
                started_at: None,
                completed_at: None,
                error_message: None,
                nodes,
                events: 0,
            })),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Tags the record with the run it observes.
    pub fn with_execution_id(self, execution_id: ExecutionId) -> Self {
        self.lock().execution_id = Some(execution_id);
        self
    }

    pub fn snapshot(&self) -> RunRecord {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RunRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> MutexGuard<'_, Option<NodeId>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn node_mut<'r>(record: &'r mut RunRecord, node_id: &str, node_type: &str) -> &'r mut NodeExecution {
        match record.nodes.iter().position(|n| n.node_id == node_id) {
            Some(index) => &mut record.nodes[index],
            None => {
                record.nodes.push(NodeExecution::pending(node_id, node_type));
                let last = record.nodes.len() - 1;
                &mut record.nodes[last]
            }
        }
    }
}

impl RunObserver for RunRecorder {
    fn on_event(&mut self, event: &ExecutionEvent) {
        let mut current = self.current();
        let mut record = self.lock();
        record.events += 1;

        match event {
            ExecutionEvent::WorkflowStart { timestamp } => {
                record.status = RunStatus::Running;
                record.started_at = Some(*timestamp);
            }
            ExecutionEvent::NodeStart { node_id, node_type } => {
                let node = Self::node_mut(&mut record, node_id, node_type);
                node.status = NodeStatus::Started;
                node.started_at = Some(Utc::now());
                *current = Some(node_id.clone());
            }
            ExecutionEvent::NodeProgress { .. } => {}
            ExecutionEvent::NodeStream { .. } => {
                if let Some(producer) = current.as_deref() {
                    let node = Self::node_mut(&mut record, producer, "");
                    node.status = NodeStatus::Streaming;
                    node.stream_events += 1;
                }
            }
            ExecutionEvent::NodeComplete { node_id, output } => {
                let node = Self::node_mut(&mut record, node_id, "");
                node.status = NodeStatus::Completed;
                node.completed_at = Some(Utc::now());
                node.output = output.clone();
                *current = None;
            }
            ExecutionEvent::WorkflowComplete { timestamp } => {
                record.status = RunStatus::Completed;
                record.completed_at = Some(*timestamp);
            }
            ExecutionEvent::Error { message } => {
                record.status = RunStatus::Failed;
                record.completed_at = Some(Utc::now());
                record.error_message = Some(message.clone());
                if let Some(producer) = current.take() {
                    let node = Self::node_mut(&mut record, &producer, "");
                    node.status = NodeStatus::Failed;
                    node.error = Some(message.clone());
                }
            }
        }
    }

    fn on_end(&mut self) {
        let mut record = self.lock();
        if record.status == RunStatus::Running {
            tracing::warn!("Run ended before completing");
            record.status = RunStatus::Failed;
            record.completed_at = Some(Utc::now());
            record
                .error_message
                .get_or_insert_with(|| "Execution stopped before completion".to_string());
        }
    }
}

struct EndGuard<O: RunObserver>(O);

impl<O: RunObserver> Drop for EndGuard<O> {
    fn drop(&mut self) {
        self.0.on_end();
    }
}

/// Feeds every event through `observer` and yields it unchanged.
///
/// `on_end` runs when the stream finishes or is dropped early.
pub fn observe<O>(events: EventStream, observer: O) -> EventStream
where
    O: RunObserver + 'static,
{
    let mut events = events;
    let mut guard = EndGuard(observer);
    Box::pin(stream! {
        while let Some(event) = events.next().await {
            guard.0.on_event(&event);
            yield event;
        }
    })
}
