use std::collections::HashMap;
use std::sync::Arc;

use wireflow_core::error::{BoxError, GraphError, Result};

use crate::{END, START};

/// Body of a node: state in, state out.
pub type NodeFn<S> = dyn Fn(S) -> std::result::Result<S, BoxError> + Send + Sync;

/// A node in the execution graph.
///
/// The node owns the state it is given for the duration of the call and
/// hands back the state the next step sees. Any side effects (console I/O,
/// model calls, file writes) live inside the function.
pub struct Node<S> {
    id: String,
    func: Arc<NodeFn<S>>,
}

impl<S> Node<S> {
    /// Create a node from a fallible function.
    pub fn new<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(S) -> std::result::Result<S, BoxError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(func),
        }
    }

    /// Create a node from a function that cannot fail.
    pub fn infallible<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(S) -> S + Send + Sync + 'static,
    {
        Self::new(id, move |state| Ok(func(state)))
    }

    /// Unique identifier for this node.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn call(&self, state: S) -> std::result::Result<S, BoxError> {
        (self.func)(state)
    }
}

impl<S> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<S> std::fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish()
    }
}

/// Whether an id is one of the reserved sentinels.
pub fn is_sentinel(id: &str) -> bool {
    id == START || id == END
}

/// Nodes of a graph keyed by id, remembering registration order.
pub struct NodeRegistry<S> {
    nodes: HashMap<String, Node<S>>,
    order: Vec<String>,
}

impl<S> NodeRegistry<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a node. Ids must be unique and may not be a sentinel.
    pub fn register(&mut self, node: Node<S>) -> Result<()> {
        if is_sentinel(node.id()) || self.nodes.contains_key(node.id()) {
            return Err(GraphError::DuplicateNode(node.id().to_string()));
        }
        self.order.push(node.id().to_string());
        self.nodes.insert(node.id().to_string(), node);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Node<S>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<S> Default for NodeRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
