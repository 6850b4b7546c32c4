use crate::graph::ExecutionGraph;
use crate::preview::PreviewChannel;
use crate::registry::NodeRegistry;
use crate::resolver::InputResolver;
use crate::runtime::RuntimeConfig;
use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use protocore::{
    EventStream, ExecutionEvent, ExecutionId, ExecutionState, NodeContext, NodeId, OutputRecord,
    Workflow, WorkflowError,
};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Placeholder telemetry emitted before a node's capability runs.
pub const PROGRESS_CHECKPOINTS: [(f64, &str); 2] = [(0.3, "Processing..."), (0.7, "Almost done...")];

/// Drives one workflow at a time through its nodes in topological order and
/// turns the run into an ordered event sequence.
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    config: RuntimeConfig,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Plan a run of `workflow`.
    ///
    /// Structural problems, cycles included, are returned here before any
    /// event exists. Nothing executes until the returned handle is polled.
    pub fn execute(&self, workflow: Workflow) -> Result<ExecutionHandle, WorkflowError> {
        workflow.validate()?;
        let graph = ExecutionGraph::build(&workflow);
        let order = graph.execution_order()?;

        let execution_id = ExecutionId::new_v4();
        let cancellation = CancellationToken::new();
        let span = tracing::info_span!("workflow_run", %execution_id, workflow = %workflow.name);

        tracing::info!(
            parent: &span,
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            "Execution planned"
        );

        let run = Run {
            workflow,
            graph,
            order,
            registry: Arc::clone(&self.registry),
            progress_interval: self.config.progress_interval,
            span,
            cancellation: cancellation.clone(),
        };

        Ok(ExecutionHandle {
            execution_id,
            cancellation,
            events: run.into_events(),
        })
    }
}

/// Everything one run owns while its event stream is alive.
struct Run {
    workflow: Workflow,
    graph: ExecutionGraph,
    order: Vec<NodeId>,
    registry: Arc<NodeRegistry>,
    progress_interval: Duration,
    span: tracing::Span,
    cancellation: CancellationToken,
}

impl Run {
    fn into_events(self) -> EventStream {
        let Run {
            workflow,
            graph,
            order,
            registry,
            progress_interval,
            span,
            cancellation,
        } = self;

        Box::pin(stream! {
            let mut state = ExecutionState::new();

            tracing::info!(parent: &span, "Workflow started");
            yield ExecutionEvent::workflow_start();

            for node_id in &order {
                if cancellation.is_cancelled() {
                    yield cancelled(&span);
                    return;
                }

                // ordering only yields ids of declared nodes
                let Some(spec) = workflow.find_node(node_id) else {
                    continue;
                };
                let node_type = spec.node_type();

                tracing::info!(parent: &span, node_id = %node_id, node_type, "Processing node");
                yield ExecutionEvent::NodeStart {
                    node_id: node_id.clone(),
                    node_type: node_type.to_string(),
                };

                for (progress, message) in PROGRESS_CHECKPOINTS {
                    if !pause(progress_interval, &cancellation).await {
                        yield cancelled(&span);
                        return;
                    }
                    yield ExecutionEvent::NodeProgress {
                        node_id: node_id.clone(),
                        progress,
                        message: message.to_string(),
                    };
                }
                if !pause(progress_interval, &cancellation).await {
                    yield cancelled(&span);
                    return;
                }

                let node = match registry.create_node(node_type, spec.config()) {
                    Ok(node) => node,
                    Err(err @ WorkflowError::UnknownNodeType(_)) => {
                        tracing::warn!(parent: &span, node_id = %node_id, "{}", err);
                        let record = OutputRecord::new().with_output("error", err.to_string());
                        state.commit(node_id.clone(), record.clone());
                        yield ExecutionEvent::NodeComplete {
                            node_id: node_id.clone(),
                            output: Some(record),
                        };
                        continue;
                    }
                    Err(err) => {
                        tracing::error!(parent: &span, node_id = %node_id, "{}", err);
                        yield ExecutionEvent::error(format!("Node {} failed: {}", node_id, err));
                        return;
                    }
                };

                let previews = PreviewChannel::new(graph.successors(node_id));
                let inputs = InputResolver::new(node_id, &workflow.edges, &state, &span)
                    .resolve(spec.config());
                let ctx = NodeContext {
                    node_id,
                    inputs: &inputs,
                    config: spec.config(),
                    edges: &workflow.edges,
                    state: &state,
                    span: &span,
                    cancellation: &cancellation,
                };

                let mut outputs = node.execute(ctx);
                let mut last: Option<OutputRecord> = None;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => None,
                        item = outputs.next() => Some(item),
                    };

                    let item = match next {
                        None => {
                            yield cancelled(&span);
                            return;
                        }
                        Some(None) => break,
                        Some(Some(item)) => item,
                    };

                    match item {
                        Ok(record) => {
                            if let Some(content) = record.response() {
                                for event in previews.publish(content) {
                                    yield event;
                                }
                            }
                            last = Some(record);
                        }
                        Err(err) => {
                            tracing::error!(parent: &span, node_id = %node_id, "Node failed: {}", err);
                            yield ExecutionEvent::error(format!("Node {} failed: {}", node_id, err));
                            return;
                        }
                    }
                }
                drop(outputs);
                drop(node);

                if let Some(record) = last.as_ref().filter(|record| !record.is_empty()) {
                    tracing::debug!(parent: &span, node_id = %node_id, output = %record, "Stored output");
                    state.commit(node_id.clone(), record.clone());
                }

                tracing::info!(parent: &span, node_id = %node_id, "Node complete");
                yield ExecutionEvent::NodeComplete {
                    node_id: node_id.clone(),
                    output: last,
                };
            }

            tracing::info!(parent: &span, outputs = state.len(), "Workflow complete");
            yield ExecutionEvent::workflow_complete();
        })
    }
}

/// Waits out one progress interval. Returns false if the run was cancelled.
async fn pause(interval: Duration, cancellation: &CancellationToken) -> bool {
    if interval.is_zero() {
        return !cancellation.is_cancelled();
    }
    tokio::select! {
        _ = cancellation.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

fn cancelled(span: &tracing::Span) -> ExecutionEvent {
    tracing::warn!(parent: span, "Execution cancelled");
    ExecutionEvent::error("Execution cancelled")
}

/// Live run. Yields the run's events in order; dropping it stops the run and
/// releases whatever the current node holds open.
pub struct ExecutionHandle {
    execution_id: ExecutionId,
    cancellation: CancellationToken,
    events: EventStream,
}

impl ExecutionHandle {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Stop the run. The stream ends with an `error` event.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn into_stream(self) -> EventStream {
        self.events
    }
}

impl Stream for ExecutionHandle {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}
