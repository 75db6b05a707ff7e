use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::{info, warn};

use wireflow_core::error::{BoxError, GraphError, Result};

use crate::compiled::{CompiledGraph, ExecutorConfig};
use crate::edge::{ConditionalEdge, Edge, EdgeTable};
use crate::node::{Node, NodeRegistry};
use crate::state::GraphState;
use crate::{END, START};

/// Accumulates nodes and edges, then compiles them into an immutable
/// [`CompiledGraph`].
///
/// Every call validates eagerly, so a malformed definition fails before any
/// node can run. Nodes must be added before the edges that mention them.
pub struct GraphBuilder<S> {
    nodes: NodeRegistry<S>,
    edges: EdgeTable<S>,
    schema: Option<Vec<String>>,
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: NodeRegistry::new(),
            edges: EdgeTable::new(),
            schema: None,
        }
    }

    /// Fix the state schema at definition time. Runs whose initial state
    /// reports a different schema fail before the first node.
    pub fn with_schema<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.schema = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Register a node from a fallible function.
    pub fn add_node<F>(&mut self, id: impl Into<String>, func: F) -> Result<&mut Self>
    where
        F: Fn(S) -> std::result::Result<S, BoxError> + Send + Sync + 'static,
    {
        self.nodes.register(Node::new(id, func))?;
        Ok(self)
    }

    /// Register a prebuilt node.
    pub fn add(&mut self, node: Node<S>) -> Result<&mut Self> {
        self.nodes.register(node)?;
        Ok(self)
    }

    /// Always continue from `from` to `to`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        self.check_source(from)?;
        self.check_target(to)?;
        self.edges.insert(from, Edge::Static(to.to_string()))?;
        Ok(self)
    }

    /// After `from`, ask `router` for a label and continue at the branch
    /// mapped to it. Every branch must be a registered node or `END`.
    pub fn add_conditional_edges<L, F, I, T>(
        &mut self,
        from: &str,
        router: F,
        branches: I,
    ) -> Result<&mut Self>
    where
        L: Eq + Hash + Debug + Send + Sync + 'static,
        F: Fn(&S) -> L + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        T: Into<String>,
    {
        self.check_source(from)?;
        let edge = ConditionalEdge::mapped(router, branches);
        for to in edge.targets().unwrap_or_default() {
            self.check_target(to)?;
        }
        self.edges.insert(from, Edge::Conditional(edge))?;
        Ok(self)
    }

    /// After `from`, continue at whatever node id (or `END`) the router
    /// returns. Unknown ids fail the run with a routing error.
    pub fn add_dynamic_edges<F, T>(&mut self, from: &str, router: F) -> Result<&mut Self>
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
        T: Into<String>,
    {
        self.check_source(from)?;
        self.edges
            .insert(from, Edge::Conditional(ConditionalEdge::dynamic(router)))?;
        Ok(self)
    }

    /// Validate and freeze the graph with the default executor settings.
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        self.compile_with(ExecutorConfig::default())
    }

    /// Validate and freeze the graph.
    ///
    /// Fails with `IncompleteGraph` when `START` has no outgoing edge or a
    /// node has none (a dead end other than `END`). Unreachable nodes and a
    /// missing path to `END` are only reported.
    pub fn compile_with(self, config: ExecutorConfig) -> Result<CompiledGraph<S>> {
        if !self.edges.contains(START) {
            return Err(GraphError::IncompleteGraph(
                "START has no outgoing edge".to_string(),
            ));
        }
        if let Some(dead_end) = self.nodes.ids().find(|id| !self.edges.contains(id)) {
            return Err(GraphError::IncompleteGraph(format!(
                "node '{}' has no outgoing edge",
                dead_end
            )));
        }

        let reachable = self.reachable();
        for id in self.nodes.ids().filter(|id| !reachable.contains(*id)) {
            warn!(node_id = %id, "Node is unreachable from START");
        }
        if !reachable.contains(END) {
            warn!("END is not reachable from START; runs will stop only at the step limit");
        }

        info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            max_steps = config.max_steps,
            "Graph compiled"
        );

        Ok(CompiledGraph::new(self.nodes, self.edges, self.schema, config))
    }

    /// Ids reachable from START, END included. A dynamic edge may reach
    /// any node.
    fn reachable(&self) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([START.to_string()]);

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(edge) = self.edges.get(&id) else {
                continue;
            };
            match edge.destinations() {
                Some(destinations) => {
                    queue.extend(destinations.into_iter().map(str::to_string));
                }
                None => {
                    queue.extend(self.nodes.ids().map(str::to_string));
                    queue.push_back(END.to_string());
                }
            }
        }
        seen
    }

    fn check_source(&self, from: &str) -> Result<()> {
        if from == END || (from != START && !self.nodes.contains(from)) {
            return Err(GraphError::UnknownNode(from.to_string()));
        }
        if self.edges.contains(from) {
            return Err(GraphError::ConflictingEdge(from.to_string()));
        }
        Ok(())
    }

    fn check_target(&self, to: &str) -> Result<()> {
        if to == START || (to != END && !self.nodes.contains(to)) {
            return Err(GraphError::UnknownNode(to.to_string()));
        }
        Ok(())
    }
}
