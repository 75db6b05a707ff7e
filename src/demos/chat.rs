use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use wireflow_graph::{CompiledGraph, ExecutorConfig, GraphBuilder, GraphState, END, START};

use super::{lock, Message};

pub const USER: &str = "user";
pub const AI: &str = "ai";

/// The conversation so far. Each turn adds the user's line and one reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatState {
    pub messages: Vec<Message>,
}

impl GraphState for ChatState {}

/// Produces the assistant's reply to the latest user message.
pub trait Responder: Send {
    fn reply(&mut self, message: &str) -> String;
}

/// Offline responder that echoes the user and remembers earlier turns.
#[derive(Debug, Default)]
pub struct EchoResponder {
    seen: Vec<String>,
}

impl Responder for EchoResponder {
    fn reply(&mut self, message: &str) -> String {
        let reply = match self.seen.iter().position(|m| m.eq_ignore_ascii_case(message)) {
            Some(i) => format!("You said \"{}\" before, in message {}.", message, i + 1),
            None if self.seen.is_empty() => format!("You said: {}", message),
            None => format!(
                "You said: {} (earlier you said \"{}\")",
                message,
                self.seen[self.seen.len() - 1]
            ),
        };
        self.seen.push(message.to_string());
        reply
    }
}

/// `START → respond → END`.
pub fn build_graph<R>(
    responder: Arc<Mutex<R>>,
    config: ExecutorConfig,
) -> wireflow_graph::Result<CompiledGraph<ChatState>>
where
    R: Responder + 'static,
{
    let mut builder = GraphBuilder::new();
    builder
        .add_node("respond", move |mut state: ChatState| {
            let last = state
                .messages
                .last()
                .filter(|m| m.role == USER)
                .map(|m| m.content.clone())
                .ok_or("no user message to respond to")?;
            let reply = lock(&responder)?.reply(&last);
            state.messages.push(Message::new(AI, reply));
            Ok(state)
        })?
        .add_edge(START, "respond")?
        .add_edge("respond", END)?;
    builder.compile_with(config)
}

/// Read lines until `exit` or end of input, running one graph invocation
/// per line. Returns the whole conversation.
pub fn run_session<I, W>(
    graph: &CompiledGraph<ChatState>,
    mut input: I,
    output: &mut W,
) -> anyhow::Result<Vec<Message>>
where
    I: BufRead,
    W: Write,
{
    let mut history: Vec<Message> = Vec::new();

    loop {
        write!(output, "You: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        history.push(Message::new(USER, line));
        let state = graph.invoke(ChatState { messages: history })?;
        history = state.messages;

        if let Some(reply) = history.last() {
            writeln!(output, "\nAI: {}\n", reply.content)?;
        }
        debug!(messages = history.len(), "Chat turn complete");
    }

    Ok(history)
}

/// Write the conversation as `User: ...` / `AI: ...` lines.
pub fn write_transcript(path: &Path, messages: &[Message]) -> anyhow::Result<()> {
    let mut out = String::new();
    for msg in messages {
        let role = if msg.role == USER { "User" } else { "AI" };
        out.push_str(&format!("{}: {}\n", role, msg.content));
    }
    std::fs::write(path, out)?;
    Ok(())
}
