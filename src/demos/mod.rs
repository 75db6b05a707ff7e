//! Workflows bundled with the CLI. Each one is an ordinary graph whose node
//! bodies receive their collaborators (input source, RNG, output sink) when
//! the graph is built.

pub mod chat;
pub mod office;
pub mod rps;
pub mod school;

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use wireflow_graph::BoxError;

/// One line of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Where node bodies report progress.
pub type Narrator = Arc<dyn Fn(&str) + Send + Sync>;

pub fn stdout_narrator() -> Narrator {
    Arc::new(|line: &str| println!("{}", line))
}

/// Narrator that keeps every line, for tests.
#[cfg(test)]
pub fn recording_narrator() -> (Narrator, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let narrator: Narrator = Arc::new(move |line: &str| {
        if let Ok(mut lines) = sink.lock() {
            lines.push(line.to_string());
        }
    });
    (narrator, lines)
}

/// Shared RNG for node bodies; seeded runs are reproducible.
pub type SharedRng = Arc<Mutex<StdRng>>;

pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Arc::new(Mutex::new(rng))
}

/// Lock a mutex from inside a node, turning poisoning into a node error.
pub fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, BoxError> {
    mutex.lock().map_err(|_| "shared resource lock poisoned".into())
}
