use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a single graph run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What each streamed item carries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Full state snapshot after each node.
    #[default]
    Values,
    /// Only the top-level fields the most recent node changed.
    Updates,
}

impl std::str::FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "values" => Ok(Self::Values),
            "updates" => Ok(Self::Updates),
            other => Err(format!("unknown stream mode: {}", other)),
        }
    }
}

/// Events published while a graph runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// Run started.
    RunStarted { run_id: RunId },
    /// A node is about to be invoked.
    NodeStarted {
        run_id: RunId,
        node: String,
        step: usize,
    },
    /// A node returned its new state.
    NodeCompleted {
        run_id: RunId,
        node: String,
        step: usize,
        elapsed_ms: u64,
    },
    /// Routing reached END.
    RunComplete {
        run_id: RunId,
        total_steps: usize,
        elapsed_ms: u64,
    },
    /// Run aborted with an error.
    RunError {
        run_id: RunId,
        step: usize,
        error: String,
    },
}

impl GraphEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::RunComplete { run_id, .. }
            | Self::RunError { run_id, .. } => run_id,
        }
    }

    /// True for the last event of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunComplete { .. } | Self::RunError { .. })
    }
}
