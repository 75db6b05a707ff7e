use std::sync::Arc;

use wireflow_core::config::{EngineConfig, DEFAULT_MAX_STEPS};
use wireflow_core::error::Result;
use wireflow_core::event::EventBus;
use wireflow_core::types::{RunId, StreamMode};

use crate::edge::EdgeTable;
use crate::executor::{ExecutionResult, Run, Superstep};
use crate::node::NodeRegistry;
use crate::state::GraphState;
use crate::stream::GraphStream;

/// Settings fixed when a graph is compiled.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Node invocations allowed per run.
    pub max_steps: usize,
    /// Receives a `GraphEvent` for every run, node and outcome.
    pub event_bus: Option<Arc<EventBus>>,
}

impl ExecutorConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            event_bus: None,
        }
    }
}

impl From<&EngineConfig> for ExecutorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            event_bus: None,
        }
    }
}

/// Per-invocation overrides.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Replaces the compiled step limit for this run.
    pub max_steps: Option<usize>,
    /// Run id reported in events; generated when unset.
    pub run_id: Option<RunId>,
}

impl RunConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// A validated, immutable graph.
///
/// Built once by `GraphBuilder::compile` and never changed afterwards, so it
/// can be invoked any number of times and shared across threads. Every run
/// owns its own state; the graph itself holds none.
pub struct CompiledGraph<S> {
    pub(crate) nodes: NodeRegistry<S>,
    pub(crate) edges: EdgeTable<S>,
    pub(crate) schema: Option<Vec<String>>,
    pub(crate) config: ExecutorConfig,
}

impl<S: GraphState> CompiledGraph<S> {
    pub(crate) fn new(
        nodes: NodeRegistry<S>,
        edges: EdgeTable<S>,
        schema: Option<Vec<String>>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            nodes,
            edges,
            schema,
            config,
        }
    }

    /// Run to completion and return the final state.
    pub fn invoke(&self, initial_state: S) -> Result<S> {
        self.invoke_with(initial_state, &RunConfig::default())
    }

    /// Run to completion with per-invocation overrides.
    pub fn invoke_with(&self, initial_state: S, run_config: &RunConfig) -> Result<S> {
        let mut run = Run::start(self, initial_state, run_config)?;
        loop {
            match run.superstep()? {
                Superstep::Advanced(next, _) => run = next,
                Superstep::Finished(done) => return Ok(done.into_state()),
            }
        }
    }

    /// Run to completion and keep the per-node trace.
    pub fn execute(&self, initial_state: S) -> Result<ExecutionResult<S>> {
        self.execute_with(initial_state, &RunConfig::default())
    }

    /// Run to completion with overrides and keep the per-node trace.
    pub fn execute_with(
        &self,
        initial_state: S,
        run_config: &RunConfig,
    ) -> Result<ExecutionResult<S>> {
        let mut run = Run::start(self, initial_state, run_config)?;
        let mut node_results = Vec::new();
        loop {
            match run.superstep()? {
                Superstep::Advanced(next, record) => {
                    node_results.push(record);
                    run = next;
                }
                Superstep::Finished(done) => return Ok(done.into_result(node_results)),
            }
        }
    }

    /// Lazily run the graph, yielding one item per completed node.
    pub fn stream(&self, initial_state: S, mode: StreamMode) -> GraphStream<'_, S> {
        self.stream_with(initial_state, mode, &RunConfig::default())
    }

    /// Lazily run the graph with per-invocation overrides.
    pub fn stream_with(
        &self,
        initial_state: S,
        mode: StreamMode,
        run_config: &RunConfig,
    ) -> GraphStream<'_, S> {
        GraphStream::new(Run::start(self, initial_state, run_config), mode)
    }

    /// Node ids in registration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.ids()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl<S> std::fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.nodes.ids().collect::<Vec<_>>())
            .field("edges", &self.edges.len())
            .field("max_steps", &self.config.max_steps)
            .finish()
    }
}
