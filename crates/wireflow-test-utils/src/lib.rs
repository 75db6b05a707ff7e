//! Shared fixtures for wireflow integration tests.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tempfile::NamedTempFile;

use wireflow_graph::{BoxError, GraphState};

/// Input source that advances on every read, independent of graph state.
///
/// Stands in for a console or a human: node closures capture a clone and
/// pull the next scripted line each time they run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    lines: Arc<Mutex<VecDeque<String>>>,
    reads: Arc<Mutex<usize>>,
}

impl ScriptedInput {
    pub fn new<I, T>(lines: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            lines: Arc::new(Mutex::new(lines.into_iter().map(Into::into).collect())),
            reads: Arc::new(Mutex::new(0)),
        }
    }

    /// Next scripted line, or `None` once the script is exhausted.
    pub fn next_line(&self) -> Option<String> {
        *self.reads.lock().unwrap() += 1;
        self.lines.lock().unwrap().pop_front()
    }

    /// Number of reads so far, including reads past the end.
    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    pub fn remaining(&self) -> usize {
        self.lines.lock().unwrap().len()
    }
}

/// Records node visits in order.
#[derive(Debug, Clone, Default)]
pub struct VisitLog {
    visits: Arc<Mutex<Vec<String>>>,
}

impl VisitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node: &str) {
        self.visits.lock().unwrap().push(node.to_string());
    }

    /// Wrap a node function so each call is recorded under `node`.
    pub fn track<S, F>(
        &self,
        node: &str,
        func: F,
    ) -> impl Fn(S) -> Result<S, BoxError> + Send + Sync + 'static
    where
        F: Fn(S) -> Result<S, BoxError> + Send + Sync + 'static,
    {
        let log = self.clone();
        let node = node.to_string();
        move |state| {
            log.record(&node);
            func(state)
        }
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub fn count(&self, node: &str) -> usize {
        self.visits.lock().unwrap().iter().filter(|v| *v == node).count()
    }

    pub fn clear(&self) {
        self.visits.lock().unwrap().clear();
    }
}

/// Chat-turn state: the conversation so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatState {
    pub messages: Vec<String>,
}

impl ChatState {
    pub fn with_user(message: &str) -> Self {
        Self {
            messages: vec![message.to_string()],
        }
    }
}

impl GraphState for ChatState {}

/// Numeric state with a record of every value it took.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Counter {
    pub value: i64,
    pub history: Vec<i64>,
}

impl Counter {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            history: Vec::new(),
        }
    }

    pub fn add(mut self, n: i64) -> Self {
        self.value += n;
        self.history.push(self.value);
        self
    }
}

impl GraphState for Counter {}

/// Write `contents` to a temporary `.toml` file.
pub fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}
