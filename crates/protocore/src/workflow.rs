use crate::{Map, Value, WorkflowError, OUTPUT_HANDLE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = String;

/// Complete workflow definition: a node set keyed by id plus an edge list.
///
/// Node order is significant: the graph builder breaks ties between
/// simultaneously-ready nodes by the order nodes were declared in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "node_map")]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) {
        self.edges.push(
            Edge::new(source, target)
                .with_source_handle(source_handle)
                .with_target_handle(target_handle),
        );
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Rejects definitions whose node ids are empty or not unique.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(WorkflowError::Invalid("node with empty id".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(WorkflowError::Invalid(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

/// Node specification in a workflow.
///
/// Mirrors the editor's node shape: execution-relevant fields live under
/// `data`, everything else (position, selection state, ...) is metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub id: NodeId,
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "nodeType", default = "unknown_node_type")]
    pub node_type: String,
    #[serde(rename = "nodeInputs", default)]
    pub node_inputs: Map,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn unknown_node_type() -> String {
    "unknown".to_string()
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: NodeData {
                node_type: node_type.into(),
                node_inputs: Map::new(),
                label: None,
            },
            position: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.node_inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn node_type(&self) -> &str {
        &self.data.node_type
    }

    /// Static configuration: named inputs mapped to literal values.
    pub fn config(&self) -> &Map {
        &self.data.node_inputs
    }
}

/// Directed connection from one node's output handle to another node's input handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: NodeId,
    #[serde(rename = "sourceHandle", default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    pub target: NodeId,
    #[serde(rename = "targetHandle", default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            source_handle: None,
            target: target.into(),
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    /// Source handle, `"output"` when the edge does not name one.
    pub fn source_handle(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(OUTPUT_HANDLE)
    }

    pub fn target_handle(&self) -> Option<&str> {
        self.target_handle.as_deref()
    }

    pub fn targets(&self, node_id: &str, handle: &str) -> bool {
        self.target == node_id && self.target_handle() == Some(handle)
    }
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// (De)serializes the node list as a JSON object keyed by node id while
/// keeping declaration order, which a plain map type would lose.
mod node_map {
    use super::NodeSpec;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::collections::HashSet;
    use std::fmt;

    pub fn serialize<S: Serializer>(nodes: &[NodeSpec], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(nodes.len()))?;
        for node in nodes {
            map.serialize_entry(&node.id, node)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<NodeSpec>, D::Error> {
        deserializer.deserialize_map(NodeMapVisitor)
    }

    struct NodeMapVisitor;

    impl<'de> Visitor<'de> for NodeMapVisitor {
        type Value = Vec<NodeSpec>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of nodes keyed by node id")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut nodes = Vec::with_capacity(access.size_hint().unwrap_or(0));
            let mut seen = HashSet::new();
            while let Some((key, mut node)) = access.next_entry::<String, NodeSpec>()? {
                if !seen.insert(key.clone()) {
                    return Err(de::Error::custom(format!("duplicate node id: {}", key)));
                }
                node.id = key;
                nodes.push(node);
            }
            Ok(nodes)
        }
    }
}
