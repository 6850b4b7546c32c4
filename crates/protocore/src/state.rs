use crate::{NodeId, OutputRecord};
use std::collections::HashMap;

/// Committed outputs of one workflow run, keyed by node id.
///
/// Capabilities only ever see a shared reference; the coordinator commits a
/// node's final record once its output sequence has been fully drained.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    outputs: HashMap<NodeId, OutputRecord>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<&OutputRecord> {
        self.outputs.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.outputs.contains_key(node_id)
    }

    pub fn commit(&mut self, node_id: impl Into<NodeId>, record: OutputRecord) {
        self.outputs.insert(node_id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
