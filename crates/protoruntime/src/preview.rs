use protocore::{ExecutionEvent, NodeId, Value};

/// Live content pushed from a running producer to its downstream nodes.
///
/// Kept apart from [`ExecutionState`](protocore::ExecutionState): a preview
/// is never read by the resolver, and the channel is dropped once the
/// producer commits.
#[derive(Debug)]
pub struct PreviewChannel {
    targets: Vec<NodeId>,
}

impl PreviewChannel {
    /// Channel addressed to `targets`, in the order previews are announced.
    pub fn new<I>(targets: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    /// One `node_stream` event per target carrying `content`.
    pub fn publish<'a>(&'a self, content: &'a Value) -> impl Iterator<Item = ExecutionEvent> + 'a {
        self.targets.iter().map(move |target| ExecutionEvent::NodeStream {
            node_id: target.clone(),
            content: content.clone(),
        })
    }
}
