use serde::Serialize;

use wireflow_graph::{GraphBuilder, GraphError, GraphState, END, START};
use wireflow_test_utils::{ChatState, Counter, ScriptedInput, VisitLog};

#[derive(Debug, Clone, Default, Serialize)]
struct MoveState {
    input: String,
    processed: Option<String>,
}

impl GraphState for MoveState {}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Check {
    Valid,
    Retry,
}

#[test]
fn test_retry_loop_until_valid_input() {
    let input = ScriptedInput::new(["bad", "bad", "ok"]);
    let visits = VisitLog::new();

    let reader = input.clone();
    let mut builder = GraphBuilder::new();
    builder
        .add_node(
            "get_input",
            visits.track("get_input", move |mut s: MoveState| {
                s.input = reader.next_line().ok_or("input exhausted")?;
                Ok(s)
            }),
        )
        .unwrap()
        .add_node(
            "process",
            visits.track("process", |mut s: MoveState| {
                s.processed = Some(s.input.to_uppercase());
                Ok(s)
            }),
        )
        .unwrap()
        .add_edge(START, "get_input")
        .unwrap()
        .add_conditional_edges(
            "get_input",
            |s: &MoveState| {
                if s.input == "ok" {
                    Check::Valid
                } else {
                    Check::Retry
                }
            },
            [(Check::Valid, "process"), (Check::Retry, "get_input")],
        )
        .unwrap()
        .add_edge("process", END)
        .unwrap();
    let graph = builder.compile().unwrap();

    let state = graph.invoke(MoveState::default()).unwrap();

    assert_eq!(visits.count("get_input"), 3);
    assert_eq!(visits.count("process"), 1);
    assert_eq!(
        visits.visits(),
        vec!["get_input", "get_input", "get_input", "process"]
    );
    assert_eq!(state.processed.as_deref(), Some("OK"));
    assert_eq!(input.remaining(), 0);
}

#[test]
fn test_linear_chat_turn() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("respond", |mut s: ChatState| {
            let last = s.messages.last().cloned().unwrap_or_default();
            s.messages.push(format!("You said: {}", last));
            Ok(s)
        })
        .unwrap()
        .add_edge(START, "respond")
        .unwrap()
        .add_edge("respond", END)
        .unwrap();
    let graph = builder.compile().unwrap();

    let state = graph.invoke(ChatState::with_user("hello")).unwrap();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1], "You said: hello");
}

#[test]
fn test_static_routing_is_deterministic() {
    let visits = VisitLog::new();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("a", visits.track("a", |c: Counter| Ok(c.add(1))))
        .unwrap()
        .add_node("b", visits.track("b", |c: Counter| Ok(c.add(10))))
        .unwrap()
        .add_node("c", visits.track("c", |c: Counter| Ok(c.add(100))))
        .unwrap()
        .add_edge(START, "a")
        .unwrap()
        .add_edge("a", "b")
        .unwrap()
        .add_edge("b", "c")
        .unwrap()
        .add_edge("c", END)
        .unwrap();
    let graph = builder.compile().unwrap();

    for _ in 0..3 {
        visits.clear();
        let state = graph.invoke(Counter::new(0)).unwrap();
        assert_eq!(visits.visits(), vec!["a", "b", "c"]);
        assert_eq!(state.history, vec![1, 11, 111]);
    }
}

#[test]
fn test_conditional_routing_picks_mapped_branch() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("classify", |c: Counter| Ok(c))
        .unwrap()
        .add_node("small", |c: Counter| Ok(c.add(1)))
        .unwrap()
        .add_node("large", |c: Counter| Ok(c.add(-1)))
        .unwrap()
        .add_edge(START, "classify")
        .unwrap()
        .add_conditional_edges(
            "classify",
            |c: &Counter| if c.value < 10 { "small" } else { "large" },
            [("small", "small"), ("large", "large")],
        )
        .unwrap()
        .add_edge("small", END)
        .unwrap()
        .add_edge("large", END)
        .unwrap();
    let graph = builder.compile().unwrap();

    assert_eq!(graph.invoke(Counter::new(3)).unwrap().value, 4);
    assert_eq!(graph.invoke(Counter::new(50)).unwrap().value, 49);
}

#[test]
fn test_unmapped_label_halts_run() {
    let visits = VisitLog::new();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("decide", visits.track("decide", |c: Counter| Ok(c.add(1))))
        .unwrap()
        .add_node("next", visits.track("next", |c: Counter| Ok(c)))
        .unwrap()
        .add_edge(START, "decide")
        .unwrap()
        .add_conditional_edges(
            "decide",
            |c: &Counter| if c.value > 5 { "big" } else { "other" },
            [("big", "next")],
        )
        .unwrap()
        .add_edge("next", END)
        .unwrap();
    let graph = builder.compile().unwrap();

    let err = graph.invoke(Counter::new(0)).unwrap_err();
    match err {
        GraphError::Routing { node, label, step } => {
            assert_eq!(node, "decide");
            assert_eq!(label, "\"other\"");
            assert_eq!(step, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(visits.visits(), vec!["decide"]);
}

#[test]
fn test_manufactured_cycle_hits_step_limit() {
    let visits = VisitLog::new();
    let mut builder = GraphBuilder::new();
    builder
        .add_node("ping", visits.track("ping", |c: Counter| Ok(c.add(1))))
        .unwrap()
        .add_node("pong", visits.track("pong", |c: Counter| Ok(c.add(1))))
        .unwrap()
        .add_edge(START, "ping")
        .unwrap()
        .add_edge("ping", "pong")
        .unwrap()
        .add_edge("pong", "ping")
        .unwrap();
    let graph = builder
        .compile_with(wireflow_graph::ExecutorConfig::default().with_max_steps(7))
        .unwrap();

    let err = graph.invoke(Counter::new(0)).unwrap_err();
    assert!(matches!(
        err,
        GraphError::StepLimitExceeded { limit: 7, ref last_node, step: 7 } if last_node == "ping"
    ));
    assert_eq!(visits.visits().len(), 7);
}

#[test]
fn test_default_step_limit() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("loop", |n: u64| Ok(n + 1))
        .unwrap()
        .add_edge(START, "loop")
        .unwrap()
        .add_edge("loop", "loop")
        .unwrap();
    let graph = builder.compile().unwrap();

    let err = graph.invoke(0).unwrap_err();
    assert!(matches!(
        err,
        GraphError::StepLimitExceeded { limit: 10_000, step: 10_000, .. }
    ));
}

#[test]
fn test_loop_with_exit_terminates() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("step", |c: Counter| Ok(c.add(2)))
        .unwrap()
        .add_edge(START, "step")
        .unwrap()
        .add_conditional_edges(
            "step",
            |c: &Counter| c.value >= 10,
            [(true, END), (false, "step")],
        )
        .unwrap();
    let graph = builder.compile().unwrap();

    let result = graph.execute(Counter::new(0)).unwrap();
    assert_eq!(result.state.value, 10);
    assert_eq!(result.visits("step"), 5);
}

#[test]
fn test_node_error_is_downcastable() {
    #[derive(Debug)]
    struct ProviderDown;

    impl std::fmt::Display for ProviderDown {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "provider down")
        }
    }

    impl std::error::Error for ProviderDown {}

    let mut builder = GraphBuilder::new();
    builder
        .add_node("call", |_: ChatState| Err(ProviderDown.into()))
        .unwrap()
        .add_edge(START, "call")
        .unwrap()
        .add_edge("call", END)
        .unwrap();
    let graph = builder.compile().unwrap();

    let err = graph.invoke(ChatState::default()).unwrap_err();
    assert!(err.to_string().contains("provider down"));
    match err {
        GraphError::NodeFailed {
            node,
            last_node,
            step,
            source,
        } => {
            assert_eq!(node, "call");
            assert_eq!(last_node, START);
            assert_eq!(step, 0);
            assert!(source.downcast_ref::<ProviderDown>().is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_dynamic_edges_follow_router() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("supervisor", |c: Counter| Ok(c.add(1)))
        .unwrap()
        .add_node("worker", |c: Counter| Ok(c.add(10)))
        .unwrap()
        .add_edge(START, "supervisor")
        .unwrap()
        .add_dynamic_edges("supervisor", |c: &Counter| {
            if c.value > 10 {
                END
            } else {
                "worker"
            }
        })
        .unwrap()
        .add_edge("worker", "supervisor")
        .unwrap();
    let graph = builder.compile().unwrap();

    let result = graph.execute(Counter::new(0)).unwrap();
    assert_eq!(result.visited(), vec!["supervisor", "worker", "supervisor"]);
    assert_eq!(result.state.value, 12);
}
