use std::time::Instant;

use tracing::{debug, info, warn};

use wireflow_core::error::{GraphError, Result};
use wireflow_core::types::{GraphEvent, RunId};

use crate::compiled::{CompiledGraph, RunConfig};
use crate::edge::Route;
use crate::state::{schema_difference, GraphState};
use crate::{END, START};

/// Record of one completed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Which node was executed.
    pub node_id: String,
    /// 1-based position of this node in the run.
    pub step: usize,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult<S> {
    pub run_id: RunId,
    /// The state returned by the last node.
    pub state: S,
    /// Per-node records in execution order.
    pub node_results: Vec<NodeRecord>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

impl<S> ExecutionResult<S> {
    /// Node ids in the order they ran.
    pub fn visited(&self) -> Vec<&str> {
        self.node_results.iter().map(|r| r.node_id.as_str()).collect()
    }

    /// How many times a node ran.
    pub fn visits(&self, node_id: &str) -> usize {
        self.node_results
            .iter()
            .filter(|r| r.node_id == node_id)
            .count()
    }

    pub fn total_steps(&self) -> usize {
        self.node_results.len()
    }
}

/// Outcome of one superstep.
pub(crate) enum Superstep<'g, S> {
    /// A node ran; the run continues.
    Advanced(Run<'g, S>, NodeRecord),
    /// Routing reached END.
    Finished(Run<'g, S>),
}

/// One execution of a compiled graph.
///
/// The run owns its state outright and is moved through each superstep, so
/// no other code can observe or change the state between steps.
pub(crate) struct Run<'g, S> {
    graph: &'g CompiledGraph<S>,
    state: S,
    current: String,
    step_count: usize,
    max_steps: usize,
    run_id: RunId,
    started: Instant,
}

impl<'g, S: GraphState> Run<'g, S> {
    /// Begin a run at START.
    pub(crate) fn start(
        graph: &'g CompiledGraph<S>,
        initial_state: S,
        run_config: &RunConfig,
    ) -> Result<Self> {
        let run_id = run_config.run_id.clone().unwrap_or_default();
        let max_steps = run_config.max_steps.unwrap_or(graph.config.max_steps);

        publish(graph, GraphEvent::RunStarted {
            run_id: run_id.clone(),
        });
        info!(run_id = %run_id, max_steps, "Graph run started");

        if let Some(ref expected) = graph.schema {
            let actual = initial_state.schema().unwrap_or_default();
            if &actual != expected {
                let err = GraphError::SchemaViolation {
                    node: START.to_string(),
                    last_node: START.to_string(),
                    step: 0,
                    detail: schema_difference(expected, &actual),
                };
                return Err(failed(graph, &run_id, err));
            }
        }

        Ok(Self {
            graph,
            state: initial_state,
            current: START.to_string(),
            step_count: 0,
            max_steps,
            run_id,
            started: Instant::now(),
        })
    }

    /// Route from the current node, then run the chosen node.
    pub(crate) fn superstep(mut self) -> Result<Superstep<'g, S>> {
        let graph = self.graph;

        let next = match self.route() {
            Ok(next) => next,
            Err(e) => return Err(failed(graph, &self.run_id, e)),
        };
        debug!(run_id = %self.run_id, from = %self.current, to = %next, "Routed");

        if next == END {
            let elapsed_ms = self.started.elapsed().as_millis() as u64;
            publish(graph, GraphEvent::RunComplete {
                run_id: self.run_id.clone(),
                total_steps: self.step_count,
                elapsed_ms,
            });
            info!(
                run_id = %self.run_id,
                steps = self.step_count,
                elapsed_ms,
                "Graph run complete"
            );
            return Ok(Superstep::Finished(self));
        }

        if self.step_count >= self.max_steps {
            let err = GraphError::StepLimitExceeded {
                limit: self.max_steps,
                last_node: self.current.clone(),
                step: self.step_count,
            };
            return Err(failed(graph, &self.run_id, err));
        }

        // Mapped branches are checked at build time; only a dynamic router
        // can name a node that does not exist.
        let Some(node) = graph.nodes.get(&next) else {
            let err = GraphError::Routing {
                node: self.current.clone(),
                label: format!("{:?}", next),
                step: self.step_count,
            };
            return Err(failed(graph, &self.run_id, err));
        };

        publish(graph, GraphEvent::NodeStarted {
            run_id: self.run_id.clone(),
            node: next.clone(),
            step: self.step_count + 1,
        });

        let expected = self.state.schema();
        let node_start = Instant::now();
        let output = node.call(self.state);
        let elapsed_ms = node_start.elapsed().as_millis() as u64;

        let new_state = match output {
            Ok(state) => state,
            Err(source) => {
                let err = GraphError::NodeFailed {
                    node: next,
                    last_node: self.current.clone(),
                    step: self.step_count,
                    source,
                };
                return Err(failed(graph, &self.run_id, err));
            }
        };

        if let Some(expected) = expected {
            let actual = new_state.schema().unwrap_or_default();
            if actual != expected {
                let err = GraphError::SchemaViolation {
                    node: next,
                    last_node: self.current.clone(),
                    step: self.step_count,
                    detail: schema_difference(&expected, &actual),
                };
                return Err(failed(graph, &self.run_id, err));
            }
        }

        self.state = new_state;
        self.step_count += 1;
        self.current = next;

        publish(graph, GraphEvent::NodeCompleted {
            run_id: self.run_id.clone(),
            node: self.current.clone(),
            step: self.step_count,
            elapsed_ms,
        });
        debug!(
            run_id = %self.run_id,
            node_id = %self.current,
            step = self.step_count,
            elapsed_ms,
            "Node execution complete"
        );

        let record = NodeRecord {
            node_id: self.current.clone(),
            step: self.step_count,
            elapsed_ms,
        };
        Ok(Superstep::Advanced(self, record))
    }

    /// Resolve the destination of the current node's outgoing edge.
    fn route(&self) -> Result<String> {
        let edge = self.graph.edges.get(&self.current).ok_or_else(|| {
            // compile() guarantees every node has an edge
            GraphError::IncompleteGraph(format!(
                "node '{}' has no outgoing edge",
                self.current
            ))
        })?;

        match edge.resolve(&self.state) {
            Route::To(next) => Ok(next),
            Route::Unmatched(label) => Err(GraphError::Routing {
                node: self.current.clone(),
                label,
                step: self.step_count,
            }),
        }
    }

    pub(crate) fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn into_state(self) -> S {
        self.state
    }

    pub(crate) fn into_result(self, node_results: Vec<NodeRecord>) -> ExecutionResult<S> {
        ExecutionResult {
            total_elapsed_ms: self.started.elapsed().as_millis() as u64,
            run_id: self.run_id,
            state: self.state,
            node_results,
        }
    }
}

fn publish<S>(graph: &CompiledGraph<S>, event: GraphEvent) {
    if let Some(ref bus) = graph.config.event_bus {
        bus.publish(event);
    }
}

/// Log and publish a run-time error, handing it back to the caller.
fn failed<S>(graph: &CompiledGraph<S>, run_id: &RunId, err: GraphError) -> GraphError {
    warn!(run_id = %run_id, error = %err, "Graph run failed");
    publish(graph, GraphEvent::RunError {
        run_id: run_id.clone(),
        step: err.step().unwrap_or(0),
        error: err.to_string(),
    });
    err
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::builder::GraphBuilder;
    use crate::compiled::ExecutorConfig;
    use crate::state::StateContainer;
    use wireflow_core::event::EventBus;

    fn linear() -> CompiledGraph<i32> {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("double", |n: i32| Ok(n * 2))
            .unwrap()
            .add_node("inc", |n: i32| Ok(n + 1))
            .unwrap()
            .add_edge(START, "double")
            .unwrap()
            .add_edge("double", "inc")
            .unwrap()
            .add_edge("inc", END)
            .unwrap();
        builder.compile().unwrap()
    }

    #[test]
    fn test_linear_invoke() {
        let graph = linear();
        assert_eq!(graph.invoke(5).unwrap(), 11);
        // Reusable across invocations.
        assert_eq!(graph.invoke(0).unwrap(), 1);
    }

    #[test]
    fn test_execution_trace() {
        let result = linear().execute(1).unwrap();
        assert_eq!(result.state, 3);
        assert_eq!(result.visited(), vec!["double", "inc"]);
        assert_eq!(result.total_steps(), 2);
        assert_eq!(result.node_results[0].step, 1);
        assert_eq!(result.node_results[1].step, 2);
    }

    #[test]
    fn test_start_straight_to_end() {
        let mut builder: GraphBuilder<i32> = GraphBuilder::new();
        builder.add_edge(START, END).unwrap();
        let graph = builder.compile().unwrap();
        let result = graph.execute(7).unwrap();
        assert_eq!(result.state, 7);
        assert!(result.node_results.is_empty());
    }

    #[test]
    fn test_step_limit_counts_node_invocations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut builder = GraphBuilder::new();
        builder
            .add_node("spin", move |n: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(n + 1)
            })
            .unwrap()
            .add_edge(START, "spin")
            .unwrap()
            .add_edge("spin", "spin")
            .unwrap();
        let graph = builder
            .compile_with(ExecutorConfig::default().with_max_steps(5))
            .unwrap();

        let err = graph.invoke(0).unwrap_err();
        assert!(matches!(
            err,
            GraphError::StepLimitExceeded { limit: 5, step: 5, .. }
        ));
        assert!(err.to_string().contains("after node 'spin'"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_limit_equal_to_path_length_succeeds() {
        let graph = linear();
        let result = graph.invoke_with(1, &RunConfig::default().with_max_steps(2));
        assert_eq!(result.unwrap(), 3);

        let err = graph
            .invoke_with(1, &RunConfig::default().with_max_steps(1))
            .unwrap_err();
        assert!(matches!(err, GraphError::StepLimitExceeded { limit: 1, .. }));
    }

    #[test]
    fn test_node_error_propagates() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("ok", |n: i32| Ok(n))
            .unwrap()
            .add_node("fail", |_: i32| Err("provider unavailable".into()))
            .unwrap()
            .add_edge(START, "ok")
            .unwrap()
            .add_edge("ok", "fail")
            .unwrap()
            .add_edge("fail", END)
            .unwrap();
        let graph = builder.compile().unwrap();

        match graph.invoke(1).unwrap_err() {
            GraphError::NodeFailed {
                node,
                last_node,
                step,
                source,
            } => {
                assert_eq!(node, "fail");
                assert_eq!(last_node, "ok");
                assert_eq!(step, 1);
                assert_eq!(source.to_string(), "provider unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dynamic_route_to_unknown_node() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("a", |n: i32| Ok(n))
            .unwrap()
            .add_edge(START, "a")
            .unwrap()
            .add_dynamic_edges("a", |_: &i32| "ghost")
            .unwrap();
        let graph = builder.compile().unwrap();

        let err = graph.invoke(0).unwrap_err();
        match err {
            GraphError::Routing { node, label, step } => {
                assert_eq!((node.as_str(), label.as_str(), step), ("a", "\"ghost\"", 1));
            }
            other => panic!("expected routing error, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_violation_detected() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("rebuild", |_: StateContainer| {
                Ok(StateContainer::with_fields(["message", "extra"]))
            })
            .unwrap()
            .add_edge(START, "rebuild")
            .unwrap()
            .add_edge("rebuild", END)
            .unwrap();
        let graph = builder.compile().unwrap();

        let err = graph
            .invoke(StateContainer::with_fields(["message"]))
            .unwrap_err();
        match err {
            GraphError::SchemaViolation { node, detail, .. } => {
                assert_eq!(node, "rebuild");
                assert_eq!(detail, "undeclared fields [extra]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_declared_schema_checks_initial_state() {
        let mut builder = GraphBuilder::new().with_schema(["message"]);
        builder
            .add_node("noop", |s: StateContainer| Ok(s))
            .unwrap()
            .add_edge(START, "noop")
            .unwrap()
            .add_edge("noop", END)
            .unwrap();
        let graph = builder.compile().unwrap();

        assert!(graph.invoke(StateContainer::with_fields(["message"])).is_ok());
        let err = graph
            .invoke(StateContainer::with_fields(["message", "other"]))
            .unwrap_err();
        match err {
            GraphError::SchemaViolation {
                node,
                last_node,
                step,
                ..
            } => {
                assert_eq!((node.as_str(), last_node.as_str(), step), (START, START, 0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_events_published() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();

        let mut builder = GraphBuilder::new();
        builder
            .add_node("only", |n: i32| Ok(n))
            .unwrap()
            .add_edge(START, "only")
            .unwrap()
            .add_edge("only", END)
            .unwrap();
        let graph = builder
            .compile_with(ExecutorConfig::default().with_event_bus(bus))
            .unwrap();

        let run_id = RunId::from_str("run-1");
        graph
            .invoke_with(0, &RunConfig::default().with_run_id(run_id.clone()))
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id(), &run_id);
            kinds.push(match event {
                GraphEvent::RunStarted { .. } => "started",
                GraphEvent::NodeStarted { .. } => "node_started",
                GraphEvent::NodeCompleted { .. } => "node_completed",
                GraphEvent::RunComplete { total_steps, .. } => {
                    assert_eq!(total_steps, 1);
                    "complete"
                }
                GraphEvent::RunError { .. } => "error",
            });
        }
        assert_eq!(
            kinds,
            vec!["started", "node_started", "node_completed", "complete"]
        );
    }

    #[test]
    fn test_run_error_event() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();

        let mut builder = GraphBuilder::new();
        builder
            .add_node("a", |n: i32| Ok(n))
            .unwrap()
            .add_edge(START, "a")
            .unwrap()
            .add_conditional_edges("a", |n: &i32| *n, [(1, END)])
            .unwrap();
        let graph = builder
            .compile_with(ExecutorConfig::default().with_event_bus(bus))
            .unwrap();

        assert!(graph.invoke(2).is_err());
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert!(matches!(last, GraphEvent::RunError { step: 1, .. }));
        assert!(last.is_terminal());
    }
}
