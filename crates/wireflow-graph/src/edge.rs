use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use wireflow_core::error::{GraphError, Result};

type RouteFn<S> = dyn Fn(&S) -> Route + Send + Sync;

/// Where a conditional edge sends the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Destination node id, or `END`.
    To(String),
    /// The router returned a label with no branch. Holds the label's
    /// `Debug` rendering.
    Unmatched(String),
}

/// A router plus the destinations it may choose from.
pub struct ConditionalEdge<S> {
    router: Arc<RouteFn<S>>,
    /// Declared destinations; `None` when the router names its destination
    /// directly.
    targets: Option<Vec<String>>,
}

impl<S> ConditionalEdge<S> {
    /// Route through a label → destination map.
    ///
    /// The label type is usually a small `enum` per edge, so routers are
    /// matched exhaustively; a label missing from the map still surfaces as
    /// [`Route::Unmatched`].
    pub fn mapped<L, F, I, T>(router: F, branches: I) -> Self
    where
        L: Eq + Hash + Debug + Send + Sync + 'static,
        F: Fn(&S) -> L + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        T: Into<String>,
    {
        let branches: HashMap<L, String> = branches
            .into_iter()
            .map(|(label, to)| (label, to.into()))
            .collect();
        let mut targets: Vec<String> = branches.values().cloned().collect();
        targets.sort();
        targets.dedup();

        Self {
            router: Arc::new(move |state: &S| {
                let label = router(state);
                match branches.get(&label) {
                    Some(to) => Route::To(to.clone()),
                    None => Route::Unmatched(format!("{:?}", label)),
                }
            }),
            targets: Some(targets),
        }
    }

    /// Route to whatever node id (or `END`) the router returns.
    pub fn dynamic<F, T>(router: F) -> Self
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
        T: Into<String>,
    {
        Self {
            router: Arc::new(move |state: &S| Route::To(router(state).into())),
            targets: None,
        }
    }

    /// Evaluate the router against the current state.
    pub fn route(&self, state: &S) -> Route {
        (self.router)(state)
    }

    /// Declared destinations, if the edge has a branch map.
    pub fn targets(&self) -> Option<&[String]> {
        self.targets.as_deref()
    }
}

/// Outgoing edge of one node.
pub enum Edge<S> {
    /// Always continue to the same destination.
    Static(String),
    /// Ask a router which destination to take.
    Conditional(ConditionalEdge<S>),
}

impl<S> Edge<S> {
    /// Resolve the next destination for the given state.
    pub fn resolve(&self, state: &S) -> Route {
        match self {
            Self::Static(to) => Route::To(to.clone()),
            Self::Conditional(edge) => edge.route(state),
        }
    }

    /// Destinations this edge can reach, or `None` when any node may be
    /// chosen at run time.
    pub fn destinations(&self) -> Option<Vec<&str>> {
        match self {
            Self::Static(to) => Some(vec![to.as_str()]),
            Self::Conditional(edge) => edge
                .targets()
                .map(|targets| targets.iter().map(String::as_str).collect()),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::Conditional(_))
    }
}

impl<S> Debug for Edge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(to) => f.debug_tuple("Static").field(to).finish(),
            Self::Conditional(edge) => f
                .debug_struct("Conditional")
                .field("targets", &edge.targets)
                .finish(),
        }
    }
}

/// Outgoing edges keyed by source node id. A source has at most one edge.
pub struct EdgeTable<S> {
    edges: HashMap<String, Edge<S>>,
}

impl<S> EdgeTable<S> {
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    /// Add the outgoing edge for `from`.
    pub fn insert(&mut self, from: impl Into<String>, edge: Edge<S>) -> Result<()> {
        let from = from.into();
        if self.edges.contains_key(&from) {
            return Err(GraphError::ConflictingEdge(from));
        }
        self.edges.insert(from, edge);
        Ok(())
    }

    pub fn get(&self, from: &str) -> Option<&Edge<S>> {
        self.edges.get(from)
    }

    pub fn contains(&self, from: &str) -> bool {
        self.edges.contains_key(from)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether any edge picks its destination without a branch map.
    pub fn has_dynamic(&self) -> bool {
        self.edges.values().any(|e| e.destinations().is_none())
    }
}

impl<S> Default for EdgeTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::END;

    #[derive(Debug, PartialEq, Eq, Hash)]
    enum Check {
        Valid,
        Retry,
    }

    fn check_edge() -> ConditionalEdge<i32> {
        ConditionalEdge::mapped(
            |n: &i32| if *n > 0 { Check::Valid } else { Check::Retry },
            [(Check::Valid, "process"), (Check::Retry, "get_input")],
        )
    }

    #[test]
    fn test_static_edge() {
        let edge: Edge<i32> = Edge::Static("b".into());
        assert_eq!(edge.resolve(&0), Route::To("b".into()));
        assert_eq!(edge.destinations(), Some(vec!["b"]));
        assert!(!edge.is_conditional());
    }

    #[test]
    fn test_mapped_routing() {
        let edge = check_edge();
        assert_eq!(edge.route(&1), Route::To("process".into()));
        assert_eq!(edge.route(&-1), Route::To("get_input".into()));
        assert_eq!(
            edge.targets(),
            Some(&["get_input".to_string(), "process".to_string()][..])
        );
    }

    #[test]
    fn test_unmatched_label() {
        let edge = ConditionalEdge::mapped(
            |n: &i32| if *n == 0 { "zero" } else { "other" },
            [("zero", END)],
        );
        assert_eq!(edge.route(&0), Route::To(END.into()));
        assert_eq!(edge.route(&5), Route::Unmatched("\"other\"".into()));
    }

    #[test]
    fn test_dynamic_routing() {
        let edge = ConditionalEdge::dynamic(|n: &i32| format!("node_{}", n));
        assert_eq!(edge.route(&3), Route::To("node_3".into()));
        assert!(edge.targets().is_none());
        assert!(Edge::Conditional(edge).destinations().is_none());
    }

    #[test]
    fn test_table_rejects_second_edge() {
        let mut table: EdgeTable<i32> = EdgeTable::new();
        table.insert("a", Edge::Static("b".into())).unwrap();
        let err = table
            .insert("a", Edge::Conditional(check_edge()))
            .unwrap_err();
        assert!(matches!(err, GraphError::ConflictingEdge(ref n) if n == "a"));
        assert_eq!(table.len(), 1);
        assert!(!table.has_dynamic());
    }
}
