use std::iter::FusedIterator;

use serde_json::Value;

use wireflow_core::error::Result;
use wireflow_core::types::StreamMode;

use crate::executor::{Run, Superstep};
use crate::state::{state_delta, GraphState};

/// One item of a streamed run.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<S> {
    /// Full state after `node` completed.
    Values { node: String, step: usize, state: S },
    /// Top-level fields `node` changed.
    Updates {
        node: String,
        step: usize,
        update: Value,
    },
}

impl<S> StreamEvent<S> {
    /// Node that produced this item.
    pub fn node(&self) -> &str {
        match self {
            Self::Values { node, .. } | Self::Updates { node, .. } => node,
        }
    }

    /// 1-based step of the node that produced this item.
    pub fn step(&self) -> usize {
        match self {
            Self::Values { step, .. } | Self::Updates { step, .. } => *step,
        }
    }

    /// The snapshot, for `Values` items.
    pub fn into_state(self) -> Option<S> {
        match self {
            Self::Values { state, .. } => Some(state),
            Self::Updates { .. } => None,
        }
    }
}

/// Lazy, single-pass view of a run.
///
/// Each call to `next` performs exactly one superstep: it routes, runs one
/// node and yields the result before the following routing decision is
/// made. Every emitted snapshot is an owned copy, so nothing the run does
/// afterwards can change it. After the run reaches END, or after the first
/// error, the iterator is exhausted.
pub struct GraphStream<'g, S> {
    run: Option<Run<'g, S>>,
    pending_error: Option<wireflow_core::GraphError>,
    mode: StreamMode,
    /// Serialized state after the previous item, for `Updates`.
    last: Option<Value>,
    /// Steps completed so far.
    steps: usize,
    final_state: Option<S>,
}

impl<'g, S: GraphState> GraphStream<'g, S> {
    pub(crate) fn new(start: Result<Run<'g, S>>, mode: StreamMode) -> Self {
        let (run, pending_error) = match start {
            Ok(run) => (Some(run), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            run,
            pending_error,
            mode,
            last: None,
            steps: 0,
            final_state: None,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// The state the run ended with, once the stream has reached END.
    pub fn final_state(&self) -> Option<&S> {
        self.final_state.as_ref()
    }

    /// Drain the stream and return the final state.
    ///
    /// The first error met while draining is returned as is. If the caller
    /// already took the run's error from the iterator, this fails with
    /// `Unfinished`.
    pub fn into_final_state(mut self) -> Result<S> {
        for item in self.by_ref() {
            item?;
        }
        let step = self.steps;
        self.final_state.ok_or(wireflow_core::GraphError::Unfinished { step })
    }

    fn advance(&mut self, run: Run<'g, S>) -> Option<Result<StreamEvent<S>>> {
        if self.mode == StreamMode::Updates && self.last.is_none() {
            match serde_json::to_value(run.state()) {
                Ok(value) => self.last = Some(value),
                Err(e) => return Some(Err(e.into())),
            }
        }

        match run.superstep() {
            Ok(Superstep::Advanced(run, record)) => {
                self.steps = record.step;
                let item = match self.mode {
                    StreamMode::Values => Ok(StreamEvent::Values {
                        node: record.node_id,
                        step: record.step,
                        state: run.state().clone(),
                    }),
                    StreamMode::Updates => match serde_json::to_value(run.state()) {
                        Ok(after) => {
                            let update = self
                                .last
                                .as_ref()
                                .map(|before| state_delta(before, &after))
                                .unwrap_or_else(|| after.clone());
                            self.last = Some(after);
                            Ok(StreamEvent::Updates {
                                node: record.node_id,
                                step: record.step,
                                update,
                            })
                        }
                        Err(e) => return Some(Err(e.into())),
                    },
                };
                self.run = Some(run);
                Some(item)
            }
            Ok(Superstep::Finished(run)) => {
                self.final_state = Some(run.into_state());
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'g, S: GraphState> Iterator for GraphStream<'g, S> {
    type Item = Result<StreamEvent<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        let run = self.run.take()?;
        self.advance(run)
    }
}

impl<'g, S: GraphState> FusedIterator for GraphStream<'g, S> {}

impl<'g, S> std::fmt::Debug for GraphStream<'g, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStream")
            .field("mode", &self.mode)
            .field("running", &self.run.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builder::GraphBuilder;
    use crate::compiled::{CompiledGraph, RunConfig};
    use crate::state::StateContainer;
    use crate::{END, START};
    use wireflow_core::GraphError;

    fn scoring_graph() -> CompiledGraph<StateContainer> {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("greet", |mut s: StateContainer| {
                s.set_str("greeting", "hello")?;
                Ok(s)
            })
            .unwrap()
            .add_node("score", |mut s: StateContainer| {
                let score = s.get_i64("score").unwrap_or(0);
                s.set("score", json!(score + 10))?;
                Ok(s)
            })
            .unwrap()
            .add_edge(START, "greet")
            .unwrap()
            .add_edge("greet", "score")
            .unwrap()
            .add_edge("score", END)
            .unwrap();
        builder.compile().unwrap()
    }

    fn initial() -> StateContainer {
        StateContainer::from_pairs([("greeting", json!(null)), ("score", json!(0))])
    }

    #[test]
    fn test_values_stream() {
        let graph = scoring_graph();
        let items: Vec<_> = graph
            .stream(initial(), StreamMode::Values)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].node(), "greet");
        assert_eq!(items[1].step(), 2);
        let last = items[1].clone().into_state().unwrap();
        assert_eq!(last.get_str("greeting"), Some("hello"));
        assert_eq!(last.get_i64("score"), Some(10));
    }

    #[test]
    fn test_updates_stream() {
        let graph = scoring_graph();
        let items: Vec<_> = graph
            .stream(initial(), StreamMode::Updates)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            items,
            vec![
                StreamEvent::Updates {
                    node: "greet".into(),
                    step: 1,
                    update: json!({"greeting": "hello"}),
                },
                StreamEvent::Updates {
                    node: "score".into(),
                    step: 2,
                    update: json!({"score": 10}),
                },
            ]
        );
    }

    #[test]
    fn test_final_state_after_drain() {
        let graph = scoring_graph();
        let mut stream = graph.stream(initial(), StreamMode::Values);
        assert!(stream.final_state().is_none());
        while stream.next().is_some() {}
        assert_eq!(stream.final_state().unwrap().get_i64("score"), Some(10));
        assert!(stream.next().is_none());

        let state = graph
            .stream(initial(), StreamMode::Updates)
            .into_final_state()
            .unwrap();
        assert_eq!(state.get_str("greeting"), Some("hello"));
    }

    #[test]
    fn test_final_state_of_failed_run() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("inc", |n: i32| Ok(n + 1))
            .unwrap()
            .add_node("fail", |_: i32| Err("exhausted".into()))
            .unwrap()
            .add_edge(START, "inc")
            .unwrap()
            .add_edge("inc", "fail")
            .unwrap()
            .add_edge("fail", END)
            .unwrap();
        let graph = builder.compile().unwrap();

        let err = graph
            .stream(0, StreamMode::Values)
            .into_final_state()
            .unwrap_err();
        assert!(matches!(err, GraphError::NodeFailed { step: 1, .. }));

        let mut stream = graph.stream(0, StreamMode::Values);
        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().unwrap().is_err());
        let err = stream.into_final_state().unwrap_err();
        assert!(matches!(err, GraphError::Unfinished { step: 1 }));
        assert!(!err.is_build_error());
    }

    #[test]
    fn test_stream_is_lazy() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut builder = GraphBuilder::new();
        builder
            .add_node("tick", move |n: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(n + 1)
            })
            .unwrap()
            .add_edge(START, "tick")
            .unwrap()
            .add_conditional_edges("tick", |n: &i32| *n >= 3, [(true, END), (false, "tick")])
            .unwrap();
        let graph = builder.compile().unwrap();

        let mut stream = graph.stream(0, StreamMode::Values);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        stream.next();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(stream);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_ends_stream() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node("spin", |n: i32| Ok(n + 1))
            .unwrap()
            .add_edge(START, "spin")
            .unwrap()
            .add_edge("spin", "spin")
            .unwrap();
        let graph = builder.compile().unwrap();

        let mut stream =
            graph.stream_with(0, StreamMode::Values, &RunConfig::default().with_max_steps(3));
        for expected in 1..=3 {
            let item = stream.next().unwrap().unwrap();
            assert_eq!(item.into_state(), Some(expected));
        }
        assert!(matches!(
            stream.next(),
            Some(Err(GraphError::StepLimitExceeded { limit: 3, .. }))
        ));
        assert!(stream.next().is_none());
        assert!(stream.final_state().is_none());
    }
}
