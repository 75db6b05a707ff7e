//! State-graph execution engine.
//!
//! A workflow is a directed graph of named nodes. Each node is a plain
//! function that takes the run's state by value and returns the next state.
//! Edges are either static (always continue to one node) or conditional (a
//! router inspects the state and picks a labelled branch).
//!
//! `GraphBuilder` validates the definition and compiles it into an
//! immutable `CompiledGraph`, which runs from `START` one node at a time
//! until routing reaches `END`. A run can be consumed whole with `invoke`
//! or node by node with `stream`.

pub mod builder;
pub mod compiled;
pub mod edge;
pub mod executor;
pub mod node;
pub mod run_log;
pub mod state;
pub mod stream;

/// Entry sentinel. Only valid as an edge source.
pub const START: &str = "__start__";
/// Terminal sentinel. Only valid as an edge target.
pub const END: &str = "__end__";

pub use builder::GraphBuilder;
pub use compiled::{CompiledGraph, ExecutorConfig, RunConfig};
pub use edge::{ConditionalEdge, Edge, Route};
pub use executor::{ExecutionResult, NodeRecord};
pub use node::Node;
pub use run_log::RunLogger;
pub use state::{GraphState, StateContainer};
pub use stream::{GraphStream, StreamEvent};

pub use wireflow_core::error::{BoxError, GraphError, Result};
pub use wireflow_core::event::EventBus;
pub use wireflow_core::types::{GraphEvent, RunId, StreamMode};
