//! Input resolution for a single node.
//!
//! A configured input is resolved from, in order: the first edge feeding its
//! handle, `{{name}}` placeholders in a string value, or the literal value.

use crate::template;
use protocore::{extract_handle, value_to_text, Edge, ExecutionState, Map, OutputRecord, Value};
use tracing::Span;

/// Value carried by `edge` once its source has produced output.
///
/// `lookup` maps a node id to its committed record; the value is pulled with
/// the handle fallback order of [`extract_handle`].
pub fn connected_value<'s, F>(lookup: F, edge: &Edge) -> Option<Value>
where
    F: Fn(&str) -> Option<&'s OutputRecord>,
{
    lookup(&edge.source).map(|record| extract_handle(record, edge.source_handle()))
}

/// [`connected_value`] against a run's execution state.
pub fn edge_value(state: &ExecutionState, edge: &Edge) -> Option<Value> {
    connected_value(|id| state.get(id), edge)
}

pub struct InputResolver<'a> {
    node_id: &'a str,
    edges: &'a [Edge],
    state: &'a ExecutionState,
    span: &'a Span,
}

impl<'a> InputResolver<'a> {
    pub fn new(node_id: &'a str, edges: &'a [Edge], state: &'a ExecutionState, span: &'a Span) -> Self {
        Self {
            node_id,
            edges,
            state,
            span,
        }
    }

    /// First edge, in edge-list order, feeding `handle` on this node.
    pub fn first_edge(&self, handle: &str) -> Option<&'a Edge> {
        self.edges.iter().find(|edge| edge.targets(self.node_id, handle))
    }

    /// Value on `handle` from the first connected edge, if its source already ran.
    pub fn edge_input(&self, handle: &str) -> Option<Value> {
        let edge = self.first_edge(handle)?;
        let value = edge_value(self.state, edge);
        if value.is_none() {
            tracing::debug!(
                parent: self.span,
                node_id = self.node_id,
                handle,
                source = %edge.source,
                "Upstream node has no output yet"
            );
        }
        value
    }

    /// Replaces each `{{name}}` with the text of the edge feeding handle `name`.
    pub fn resolve_template(&self, text: &str) -> String {
        template::render(text, |name| self.edge_input(name).map(|value| value_to_text(&value)))
    }

    /// Effective value of one named input given its raw configured value.
    pub fn resolve_input(&self, name: &str, raw: Option<&Value>) -> Option<Value> {
        if let Some(value) = self.edge_input(name) {
            return Some(value);
        }

        match raw {
            Some(Value::String(text)) => Some(Value::String(self.resolve_template(text))),
            Some(_) if self.first_edge(name).is_some() => None,
            Some(value) => Some(value.clone()),
            None => None,
        }
    }

    /// Resolves every configured input. Inputs wired to an upstream node that
    /// has not produced output, and which are not strings, are left out.
    pub fn resolve(&self, config: &Map) -> Map {
        let mut resolved = Map::new();
        for (name, raw) in config {
            match self.resolve_input(name, Some(raw)) {
                Some(value) => {
                    resolved.insert(name.clone(), value);
                }
                None => tracing::debug!(
                    parent: self.span,
                    node_id = self.node_id,
                    input = %name,
                    "Input unresolved"
                ),
            }
        }
        resolved
    }

    /// Merges edges into `params` whose target handle is not one of
    /// `fixed_inputs`; a connected value overrides a configured one.
    pub fn merge_parameter_edges(&self, params: &mut Map, fixed_inputs: &[&str]) {
        for edge in self.edges.iter().filter(|edge| edge.target == self.node_id) {
            let Some(handle) = edge.target_handle().filter(|h| !h.is_empty()) else {
                continue;
            };
            if fixed_inputs.contains(&handle) {
                continue;
            }
            if let Some(value) = edge_value(self.state, edge) {
                tracing::debug!(
                    parent: self.span,
                    node_id = self.node_id,
                    param = handle,
                    "Model parameter from edge"
                );
                params.insert(handle.to_string(), value);
            }
        }
    }
}
