use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use wireflow_graph::{
    BoxError, CompiledGraph, ExecutorConfig, GraphBuilder, GraphState, END, START,
};

use super::{lock, Narrator, SharedRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!(
                "invalid priority: {} (expected low, medium or high)",
                other
            )),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        })
    }
}

/// A desk in the hierarchy. Its id doubles as the graph node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
    Director,
    Ceo,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Employee, Role::Manager, Role::Director, Role::Ceo];

    pub fn id(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Director => "director",
            Role::Ceo => "ceo",
        }
    }

    fn label(self) -> String {
        self.id().to_uppercase()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub created_by: Role,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            priority,
            created_by: Role::Employee,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What a bus message carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Body {
    TaskRequest {
        task: Task,
        escalated_by: Option<Role>,
    },
    Approval {
        approved: bool,
        note: String,
        decided_by: Role,
    },
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::TaskRequest { task, .. } => {
                write!(f, "task_request \"{}\" [{}]", task.title, task.priority)
            }
            Body::Approval { approved, note, .. } => {
                let verdict = if *approved { "APPROVED" } else { "REJECTED" };
                write!(f, "approval ({} - {})", verdict, note)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusMessage {
    pub id: String,
    pub from: Role,
    pub to: Role,
    pub task_id: String,
    pub body: Body,
}

/// The decision that reached the employee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub approved: bool,
    pub note: String,
    pub decided_by: Role,
}

/// Shared by every desk: the task, the message bus, and where to go next.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OfficeState {
    pub task: Option<Task>,
    pub messages: Vec<BusMessage>,
    pub approval: Option<Decision>,
    pub next: Option<Role>,
    pub sent: u32,
}

impl GraphState for OfficeState {}

impl OfficeState {
    pub fn new(task: Task) -> Self {
        Self {
            task: Some(task),
            ..Self::default()
        }
    }

    /// Remove and return the messages addressed to `role`.
    fn take_inbox(&mut self, role: Role) -> Vec<BusMessage> {
        let (mine, rest) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.to == role);
        self.messages = rest;
        mine
    }

    /// Put a message on the bus and route to its recipient.
    fn post(&mut self, from: Role, to: Role, task_id: &str, body: Body) {
        self.sent += 1;
        self.messages.push(BusMessage {
            id: format!("{}-{}", from, self.sent),
            from,
            to,
            task_id: task_id.to_string(),
            body,
        });
        self.next = Some(to);
    }

    /// Printable summary of the outcome.
    pub fn report(&self) -> String {
        let title = self.task.as_ref().map(|t| t.title.as_str()).unwrap_or("none");
        let priority = self
            .task
            .as_ref()
            .map(|t| t.priority.to_string().to_uppercase())
            .unwrap_or_else(|| "N/A".to_string());
        let (status, note, decided) = match &self.approval {
            Some(d) => (
                if d.approved { "APPROVED" } else { "REJECTED" },
                d.note.as_str(),
                d.decided_by.label(),
            ),
            None => ("REJECTED", "N/A", "N/A".to_string()),
        };
        format!(
            "  Task:     \"{}\"\n  Priority: {}\n  Status:   {}\n  Note:     {}\n  Decided:  {}",
            title, priority, status, note, decided
        )
    }
}

/// Chance that each level says yes. The manager rolls only for medium
/// priority; the director escalates to the CEO instead of rejecting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odds {
    pub manager: f64,
    pub director: f64,
    pub ceo: f64,
}

impl Default for Odds {
    fn default() -> Self {
        Self {
            manager: 0.8,
            director: 0.6,
            ceo: 0.7,
        }
    }
}

/// One agent's handle on the bus.
struct Desk {
    role: Role,
    narrate: Narrator,
}

impl Desk {
    fn log(&self, text: &str) {
        (self.narrate)(&format!("{:<10} │ {}", self.role.label(), text));
    }

    /// Take this desk's inbox. This also clears the pending route, so
    /// whatever the desk sends decides the next hop.
    fn receive(&self, state: &mut OfficeState) -> Vec<BusMessage> {
        state.next = None;
        let inbox = state.take_inbox(self.role);
        for msg in &inbox {
            self.log(&format!("RECV ← {} | {}", msg.from.label(), msg.body));
        }
        inbox
    }

    fn send(&self, state: &mut OfficeState, to: Role, task_id: &str, body: Body) {
        self.log(&format!("SEND → {} | {}", to.label(), body));
        state.post(self.role, to, task_id, body);
    }

    fn roll(&self, rng: &SharedRng, odds: f64) -> Result<bool, BoxError> {
        Ok(lock(rng)?.gen::<f64>() < odds)
    }
}

fn employee(desk: &Desk, mut state: OfficeState) -> Result<OfficeState, BoxError> {
    let inbox = desk.receive(&mut state);
    if inbox.is_empty() {
        if state.approval.is_some() {
            return Ok(state);
        }
        let task = state.task.clone().ok_or("employee has no task to submit")?;
        desk.log(&format!("Starting task: \"{}\" [{}]", task.title, task.priority));
        let task_id = task.id.clone();
        let body = Body::TaskRequest {
            task,
            escalated_by: None,
        };
        desk.send(&mut state, Role::Manager, &task_id, body);
        return Ok(state);
    }

    for msg in inbox {
        match msg.body {
            Body::Approval {
                approved,
                note,
                decided_by,
            } => {
                desk.log(if approved {
                    "Task APPROVED - workflow complete"
                } else {
                    "Task REJECTED - workflow complete"
                });
                state.approval = Some(Decision {
                    approved,
                    note,
                    decided_by,
                });
            }
            Body::TaskRequest { .. } => {
                return Err(format!("employee got a task request from {}", msg.from).into());
            }
        }
    }
    Ok(state)
}

fn manager(
    desk: &Desk,
    rng: &SharedRng,
    odds: f64,
    mut state: OfficeState,
) -> Result<OfficeState, BoxError> {
    let inbox = desk.receive(&mut state);
    if inbox.is_empty() {
        warn!(agent = %desk.role, "Empty inbox, ending workflow");
    }

    for msg in inbox {
        match msg.body {
            Body::TaskRequest { task, .. } => match task.priority {
                Priority::Low => {
                    desk.log("Auto-approving [low priority]");
                    let body = Body::Approval {
                        approved: true,
                        note: "Manager auto-approved (low priority)".to_string(),
                        decided_by: Role::Manager,
                    };
                    desk.send(&mut state, msg.from, &msg.task_id, body);
                }
                Priority::Medium => {
                    let approved = desk.roll(rng, odds)?;
                    desk.log(if approved {
                        "Approving [medium priority]"
                    } else {
                        "Rejecting [medium priority]"
                    });
                    let note = if approved {
                        "Manager approved"
                    } else {
                        "Manager requested revision"
                    };
                    let body = Body::Approval {
                        approved,
                        note: note.to_string(),
                        decided_by: Role::Manager,
                    };
                    desk.send(&mut state, msg.from, &msg.task_id, body);
                }
                Priority::High => {
                    desk.log("Escalating to DIRECTOR [high priority]");
                    let body = Body::TaskRequest {
                        task,
                        escalated_by: Some(Role::Manager),
                    };
                    desk.send(&mut state, Role::Director, &msg.task_id, body);
                }
            },
            approval @ Body::Approval { .. } => {
                desk.log("Forwarding decision to EMPLOYEE");
                desk.send(&mut state, Role::Employee, &msg.task_id, approval);
            }
        }
    }
    Ok(state)
}

fn director(
    desk: &Desk,
    rng: &SharedRng,
    odds: f64,
    mut state: OfficeState,
) -> Result<OfficeState, BoxError> {
    let inbox = desk.receive(&mut state);
    if inbox.is_empty() {
        warn!(agent = %desk.role, "Empty inbox, ending workflow");
    }

    for msg in inbox {
        match msg.body {
            Body::TaskRequest { task, .. } => {
                if desk.roll(rng, odds)? {
                    desk.log("Approving task");
                    let body = Body::Approval {
                        approved: true,
                        note: "Director approved".to_string(),
                        decided_by: Role::Director,
                    };
                    desk.send(&mut state, msg.from, &msg.task_id, body);
                } else {
                    desk.log("Escalating to CEO");
                    let body = Body::TaskRequest {
                        task,
                        escalated_by: Some(Role::Director),
                    };
                    desk.send(&mut state, Role::Ceo, &msg.task_id, body);
                }
            }
            approval @ Body::Approval { .. } => {
                desk.send(&mut state, Role::Manager, &msg.task_id, approval);
            }
        }
    }
    Ok(state)
}

fn ceo(
    desk: &Desk,
    rng: &SharedRng,
    odds: f64,
    mut state: OfficeState,
) -> Result<OfficeState, BoxError> {
    let inbox = desk.receive(&mut state);
    if inbox.is_empty() {
        warn!(agent = %desk.role, "Empty inbox, ending workflow");
    }

    for msg in inbox {
        match msg.body {
            Body::TaskRequest { .. } => {
                let approved = desk.roll(rng, odds)?;
                desk.log(if approved {
                    "Approving task"
                } else {
                    "Rejecting task"
                });
                let body = Body::Approval {
                    approved,
                    note: if approved { "CEO approved" } else { "CEO rejected" }.to_string(),
                    decided_by: Role::Ceo,
                };
                desk.send(&mut state, msg.from, &msg.task_id, body);
            }
            Body::Approval { .. } => {
                return Err(format!("ceo got an approval from {}", msg.from).into());
            }
        }
    }
    Ok(state)
}

/// Continue at the desk the last message went to, or finish.
fn route(state: &OfficeState) -> &'static str {
    state.next.map(Role::id).unwrap_or(END)
}

/// ```text
/// START → employee ⇄ manager ⇄ director ⇄ ceo
/// ```
/// Every desk routes dynamically through `next`; `employee` ends the run
/// once a decision arrives.
pub fn build_graph(
    rng: SharedRng,
    odds: Odds,
    narrate: Narrator,
    config: ExecutorConfig,
) -> wireflow_graph::Result<CompiledGraph<OfficeState>> {
    let desk = |role: Role| Desk {
        role,
        narrate: Arc::clone(&narrate),
    };
    let employee_desk = desk(Role::Employee);
    let manager_desk = desk(Role::Manager);
    let director_desk = desk(Role::Director);
    let ceo_desk = desk(Role::Ceo);
    let manager_rng = Arc::clone(&rng);
    let director_rng = Arc::clone(&rng);
    let ceo_rng = rng;

    let mut builder = GraphBuilder::new();
    builder
        .add_node(Role::Employee.id(), move |state: OfficeState| {
            employee(&employee_desk, state)
        })?
        .add_node(Role::Manager.id(), move |state: OfficeState| {
            manager(&manager_desk, &manager_rng, odds.manager, state)
        })?
        .add_node(Role::Director.id(), move |state: OfficeState| {
            director(&director_desk, &director_rng, odds.director, state)
        })?
        .add_node(Role::Ceo.id(), move |state: OfficeState| {
            ceo(&ceo_desk, &ceo_rng, odds.ceo, state)
        })?
        .add_edge(START, Role::Employee.id())?;
    for role in Role::ALL {
        builder.add_dynamic_edges(role.id(), route)?;
    }
    builder.compile_with(config)
}

/// Submit `task` and run the hierarchy until a decision reaches the
/// employee.
pub fn run_workflow(
    graph: &CompiledGraph<OfficeState>,
    task: Task,
) -> wireflow_graph::Result<OfficeState> {
    let result = graph.execute(OfficeState::new(task))?;
    info!(
        hops = result.total_steps(),
        approved = result.state.approval.as_ref().map(|d| d.approved),
        "Office workflow finished"
    );
    Ok(result.state)
}
