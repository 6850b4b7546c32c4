use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use protocore::{NodeId, Workflow, WorkflowError};
use std::collections::{HashMap, VecDeque};

/// Dependency graph of a workflow.
///
/// Node indices follow declaration order. Edges whose endpoints are not both
/// declared nodes are left out.
pub struct ExecutionGraph {
    graph: DiGraph<NodeId, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl ExecutionGraph {
    pub fn build(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
        let mut index = HashMap::with_capacity(workflow.nodes.len());

        for node in &workflow.nodes {
            let idx = graph.add_node(node.id.clone());
            index.insert(node.id.clone(), idx);
        }

        for edge in &workflow.edges {
            match (index.get(&edge.source), index.get(&edge.target)) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, ());
                }
                _ => tracing::debug!(
                    "Ignoring dangling edge {} -> {}",
                    edge.source,
                    edge.target
                ),
            }
        }

        Self { graph, index }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Topological order by Kahn's algorithm.
    ///
    /// Ready nodes are served first-in first-out: initially in declaration
    /// order, afterwards in the order they become ready. Fails without a
    /// partial order when the edges form a cycle.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, WorkflowError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.node_count());
        while let Some(idx) = ready.pop_front() {
            order.push(self.graph[idx].clone());

            for succ in self.successor_indices(idx) {
                in_degree[succ.index()] -= 1;
                if in_degree[succ.index()] == 0 {
                    ready.push_back(succ);
                }
            }
        }

        if order.len() < self.node_count() {
            return Err(WorkflowError::GraphCycle {
                ordered: order.len(),
                total: self.node_count(),
            });
        }

        tracing::info!("Execution order: {:?}", order);
        Ok(order)
    }

    /// Distinct direct edge-targets of `node_id`, in edge-list order.
    pub fn successors(&self, node_id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(node_id) else {
            return Vec::new();
        };

        let mut seen = Vec::new();
        for succ in self.successor_indices(idx) {
            if !seen.contains(&succ) {
                seen.push(succ);
            }
        }
        seen.into_iter().map(|succ| self.graph[succ].as_str()).collect()
    }

    /// One entry per edge, parallel edges included, in edge-list order.
    fn successor_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        // petgraph lists neighbors most-recently-added edge first
        let mut succ: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        succ.reverse();
        succ
    }
}

/// Builds the graph and orders it in one step.
pub fn execution_order(workflow: &Workflow) -> Result<Vec<NodeId>, WorkflowError> {
    ExecutionGraph::build(workflow).execution_order()
}
