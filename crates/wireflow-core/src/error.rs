use thiserror::Error;

/// Error type a node function may fail with. Carried unmodified inside
/// [`GraphError::NodeFailed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum GraphError {
    // Build errors
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Conflicting edge: node '{0}' already has an outgoing edge")]
    ConflictingEdge(String),

    #[error("Incomplete graph: {0}")]
    IncompleteGraph(String),

    // Run errors
    #[error("No branch for label {label} after node '{node}' ({step} steps completed)")]
    Routing {
        node: String,
        label: String,
        step: usize,
    },

    #[error("Step limit ({limit}) exceeded after node '{last_node}' ({step} steps completed)")]
    StepLimitExceeded {
        limit: usize,
        last_node: String,
        step: usize,
    },

    /// `node` changed the field set; `last_node` is the last node that
    /// completed (`START` before the first, or for the initial state).
    #[error("Node '{node}' broke the schema: {detail} (after '{last_node}', {step} steps done)")]
    SchemaViolation {
        node: String,
        last_node: String,
        step: usize,
        detail: String,
    },

    /// `node` returned an error; `last_node` is the last node that completed.
    #[error("Node '{node}' failed: {source} (after '{last_node}', {step} steps completed)")]
    NodeFailed {
        node: String,
        last_node: String,
        step: usize,
        #[source]
        source: BoxError,
    },

    /// The final state was requested from a stream whose run had already
    /// failed.
    #[error("Run stopped before reaching END ({step} steps completed)")]
    Unfinished { step: usize },

    // State errors
    #[error("Undeclared state field: {0}")]
    UndeclaredField(String),

    #[error("State field '{field}' is not a {expected} (found {found})")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    /// True for errors raised while building or compiling a graph, before any
    /// node has executed.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNode(_)
                | Self::UnknownNode(_)
                | Self::ConflictingEdge(_)
                | Self::IncompleteGraph(_)
        )
    }

    /// Number of nodes that completed successfully before a run-time error
    /// was raised.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::Routing { step, .. }
            | Self::StepLimitExceeded { step, .. }
            | Self::SchemaViolation { step, .. }
            | Self::NodeFailed { step, .. }
            | Self::Unfinished { step } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_classification() {
        assert!(GraphError::DuplicateNode("a".into()).is_build_error());
        assert!(GraphError::IncompleteGraph("no entry".into()).is_build_error());
        assert!(!GraphError::Routing {
            node: "a".into(),
            label: "\"x\"".into(),
            step: 1,
        }
        .is_build_error());
    }

    #[test]
    fn test_step_reported_for_run_errors() {
        let err = GraphError::StepLimitExceeded {
            limit: 3,
            last_node: "loop".into(),
            step: 3,
        };
        assert_eq!(err.step(), Some(3));
        assert_eq!(
            err.to_string(),
            "Step limit (3) exceeded after node 'loop' (3 steps completed)"
        );
        assert_eq!(GraphError::UnknownNode("x".into()).step(), None);
        let unfinished = GraphError::Unfinished { step: 2 };
        assert_eq!(unfinished.step(), Some(2));
        assert!(!unfinished.is_build_error());
    }

    #[test]
    fn test_node_failure_keeps_source() {
        let inner: BoxError = "model unavailable".into();
        let err = GraphError::NodeFailed {
            node: "respond".into(),
            last_node: "__start__".into(),
            step: 0,
            source: inner,
        };
        let source = std::error::Error::source(&err).expect("source kept");
        assert_eq!(source.to_string(), "model unavailable");
        assert_eq!(
            err.to_string(),
            "Node 'respond' failed: model unavailable (after '__start__', 0 steps completed)"
        );
    }
}
