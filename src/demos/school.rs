use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wireflow_graph::{
    CompiledGraph, ExecutorConfig, GraphBuilder, GraphState, RunConfig, StreamEvent, StreamMode,
    END, START,
};

use super::{lock, Message, Narrator, SharedRng};

/// Step limit for one workflow run.
pub const STEP_LIMIT: usize = 50;

/// Runs shown from the history file after each workflow.
const RECENT_RUNS: usize = 5;

const PRACTICAL: &[&str] = &[
    "Add water fountains on every floor",
    "Create peer study groups after lunch",
    "Hold weekly tutoring sessions",
    "Start a book swap shelf in the library",
    "Put recycling bins in every classroom",
];

const AMBITIOUS: &[&str] = &[
    "Install smart lockers with facial recognition",
    "Build a new sports complex",
    "Give every student an AI-powered learning tablet",
    "Open a rooftop greenhouse lab",
];

const UNREALISTIC: &[&str] = &[
    "Cancel all homework forever",
    "Make school optional",
    "Replace teachers with robots",
    "Hold school for only two hours a day",
];

/// What sort of idea the student came up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaKind {
    Practical,
    Ambitious,
    Unrealistic,
}

impl IdeaKind {
    fn pool(self) -> &'static [&'static str] {
        match self {
            IdeaKind::Practical => PRACTICAL,
            IdeaKind::Ambitious => AMBITIOUS,
            IdeaKind::Unrealistic => UNREALISTIC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Acceptable,
    NeedsRevision,
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Assessment::Acceptable => "acceptable",
            Assessment::NeedsRevision => "needs_revision",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feasibility {
    Feasible,
    NotFeasible,
}

impl fmt::Display for Feasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feasibility::Feasible => "feasible",
            Feasibility::NotFeasible => "not_feasible",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchoolState {
    pub idea: Option<String>,
    pub idea_kind: Option<IdeaKind>,
    pub teacher_assessment: Option<Assessment>,
    pub principal_feasibility: Option<Feasibility>,
    pub decision: Option<String>,
    pub messages: Vec<Message>,
    pub attempts: u32,
}

impl GraphState for SchoolState {}

impl SchoolState {
    pub fn approved(&self) -> bool {
        self.teacher_assessment == Some(Assessment::Acceptable)
            && self.principal_feasibility == Some(Feasibility::Feasible)
    }
}

/// Supervisor decision for the current assessments, e.g. `acceptable_NA`.
fn decide(state: &SchoolState) -> String {
    let teacher = state
        .teacher_assessment
        .map(|a| a.to_string())
        .unwrap_or_else(|| "NA".to_string());
    let principal = state
        .principal_feasibility
        .map(|f| f.to_string())
        .unwrap_or_else(|| "NA".to_string());
    format!("{}_{}", teacher, principal)
}

/// Pick a kind at random, then an idea of that kind not proposed yet.
fn propose(rng: &mut impl Rng, messages: &[Message]) -> (String, IdeaKind) {
    let roll: f64 = rng.gen();
    let kind = if roll < 0.3 {
        IdeaKind::Practical
    } else if roll < 0.6 {
        IdeaKind::Ambitious
    } else {
        IdeaKind::Unrealistic
    };

    let fresh: Vec<&str> = kind
        .pool()
        .iter()
        .copied()
        .filter(|idea| !messages.iter().any(|m| m.content.ends_with(idea)))
        .collect();
    let candidates = if fresh.is_empty() {
        kind.pool().to_vec()
    } else {
        fresh
    };
    let idea = candidates.choose(rng).copied().unwrap_or(PRACTICAL[0]);
    (idea.to_string(), kind)
}

/// ```text
/// START → student → supervisor ─NA_NA→ teacher ──┐
///            ↑          │  ↑ ─acceptable_NA→ principal
///            │          │  └──────────────────────┘
///            └─revise───┘ ─acceptable_feasible / END→ END
/// ```
pub fn build_graph(
    rng: SharedRng,
    narrate: Narrator,
    max_attempts: u32,
    config: ExecutorConfig,
) -> wireflow_graph::Result<CompiledGraph<SchoolState>> {
    let student_narrator = Arc::clone(&narrate);

    let mut builder = GraphBuilder::new();
    builder
        .add_node("student", move |mut state: SchoolState| {
            state.attempts += 1;
            if state.attempts > max_attempts {
                student_narrator(&format!(
                    "\nMax attempts reached ({}). Ending workflow.\n",
                    max_attempts
                ));
                return Ok(state);
            }
            let (idea, kind) = propose(&mut *lock(&rng)?, &state.messages);
            state
                .messages
                .push(Message::new("student", format!("Idea: {}", idea)));
            state.idea = Some(idea);
            state.idea_kind = Some(kind);
            state.teacher_assessment = None;
            state.principal_feasibility = None;
            Ok(state)
        })?
        .add_node("teacher", |mut state: SchoolState| {
            let kind = state.idea_kind.ok_or("teacher has no idea to review")?;
            let assessment = match kind {
                IdeaKind::Unrealistic => Assessment::NeedsRevision,
                IdeaKind::Practical | IdeaKind::Ambitious => Assessment::Acceptable,
            };
            state
                .messages
                .push(Message::new("teacher", format!("Assessment: {}", assessment)));
            state.teacher_assessment = Some(assessment);
            Ok(state)
        })?
        .add_node("principal", |mut state: SchoolState| {
            let kind = state.idea_kind.ok_or("principal has no idea to review")?;
            let feasibility = match kind {
                IdeaKind::Practical => Feasibility::Feasible,
                IdeaKind::Ambitious | IdeaKind::Unrealistic => Feasibility::NotFeasible,
            };
            state
                .messages
                .push(Message::new(
                    "principal",
                    format!("Feasibility: {}", feasibility),
                ));
            state.principal_feasibility = Some(feasibility);
            Ok(state)
        })?
        .add_node("supervisor", move |mut state: SchoolState| {
            state.decision = Some(if state.attempts > max_attempts {
                "END".to_string()
            } else {
                decide(&state)
            });
            Ok(state)
        })?
        .add_edge(START, "student")?
        .add_edge("student", "supervisor")?
        .add_edge("teacher", "supervisor")?
        .add_edge("principal", "supervisor")?
        .add_conditional_edges(
            "supervisor",
            |state: &SchoolState| state.decision.clone().unwrap_or_else(|| "END".to_string()),
            [
                ("NA_NA".to_string(), "teacher"),
                ("acceptable_NA".to_string(), "principal"),
                ("needs_revision_NA".to_string(), "student"),
                ("acceptable_feasible".to_string(), END),
                ("acceptable_not_feasible".to_string(), "student"),
                ("END".to_string(), END),
            ],
        )?;
    builder.compile_with(config)
}

/// Stream one workflow run, narrating every step.
pub fn run_workflow(
    graph: &CompiledGraph<SchoolState>,
    mode: StreamMode,
    narrate: &Narrator,
) -> anyhow::Result<SchoolState> {
    let run_config = RunConfig::default().with_max_steps(STEP_LIMIT);
    let mut stream = graph.stream_with(SchoolState::default(), mode, &run_config);

    for item in stream.by_ref() {
        match item? {
            StreamEvent::Values { node, step, state } => {
                let state = serde_json::to_string(&state)?;
                narrate(&format!("STEP {} → {}: {}", step, node, state));
            }
            StreamEvent::Updates { node, step, update } => {
                narrate(&format!("STEP {} → {}: {}", step, node, update));
            }
        }
    }

    let state = stream
        .final_state()
        .cloned()
        .context("workflow stopped before reaching END")?;
    info!(
        attempts = state.attempts,
        approved = state.approved(),
        "School workflow finished"
    );
    Ok(state)
}

/// One saved workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub messages: Vec<Message>,
}

pub fn load_history(path: &Path) -> anyhow::Result<Vec<HistoryEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let history: Vec<HistoryEntry> = serde_json::from_str(&data)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(history)
}

/// Append a run to the history file and return the full history.
pub fn save_history(path: &Path, messages: &[Message]) -> anyhow::Result<Vec<HistoryEntry>> {
    let mut history = load_history(path)?;
    history.push(HistoryEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        messages: messages.to_vec(),
    });
    std::fs::write(path, serde_json::to_string_pretty(&history)?)?;
    debug!(path = %path.display(), runs = history.len(), "History saved");
    Ok(history)
}

/// Print the latest runs from the history.
pub fn show_recent(history: &[HistoryEntry], narrate: &Narrator) {
    if history.is_empty() {
        return;
    }
    let rule = "=".repeat(60);
    narrate(&format!(
        "\n{}\nRECENT MESSAGE HISTORY (Latest {} Runs):\n{}",
        rule, RECENT_RUNS, rule
    ));

    let start = history.len().saturating_sub(RECENT_RUNS);
    for (i, entry) in history.iter().enumerate().skip(start) {
        let divider = "-".repeat(60);
        narrate(&format!("\nRun {} - {}\n{}", i + 1, entry.timestamp, divider));
        for msg in &entry.messages {
            narrate(&format!("  {}: {}", msg.role.to_uppercase(), msg.content));
        }
    }
    narrate(&format!(
        "\n{}\nTotal runs saved in file: {}\n{}",
        rule,
        history.len(),
        rule
    ));
}
