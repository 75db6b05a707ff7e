use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use serde::Serialize;

use wireflow_graph::{CompiledGraph, ExecutorConfig, GraphBuilder, GraphState, END, START};

use super::{lock, Narrator, SharedRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    /// The choice this one wins against.
    pub fn beats(self) -> Choice {
        match self {
            Choice::Rock => Choice::Scissors,
            Choice::Scissors => Choice::Paper,
            Choice::Paper => Choice::Rock,
        }
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" => Ok(Choice::Rock),
            "paper" => Ok(Choice::Paper),
            "scissors" => Ok(Choice::Scissors),
            other => Err(format!("invalid choice: {}", other)),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Choice::Rock => "rock",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    User,
    Computer,
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameState {
    pub user_choice: Option<Choice>,
    pub computer_choice: Option<Choice>,
    pub result: Option<Outcome>,
    pub user_score: u32,
    pub computer_score: u32,
    pub ties: u32,
    pub continue_playing: bool,
    pub invalid_inputs: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            user_choice: None,
            computer_choice: None,
            result: None,
            user_score: 0,
            computer_score: 0,
            ties: 0,
            continue_playing: true,
            invalid_inputs: 0,
        }
    }
}

impl GraphState for GameState {}

impl GameState {
    pub fn rounds(&self) -> u32 {
        self.user_score + self.computer_score + self.ties
    }

    pub fn summary(&self) -> String {
        let verdict = match self.user_score.cmp(&self.computer_score) {
            std::cmp::Ordering::Greater => "You won overall!",
            std::cmp::Ordering::Less => "Computer won overall! Better luck next time!",
            std::cmp::Ordering::Equal => "It's a tie overall!",
        };
        format!(
            "Final Score - You: {} | Computer: {} | Ties: {}\n{}",
            self.user_score, self.computer_score, self.ties, verdict
        )
    }
}

/// Supplies the player's moves.
pub trait MoveSource: Send {
    /// Next raw line, or `None` when the player is gone.
    fn next_move(&mut self) -> Option<String>;
}

/// Moves given up front; an exhausted script quits the game.
#[derive(Debug, Default)]
pub struct ScriptedMoves {
    moves: VecDeque<String>,
}

impl ScriptedMoves {
    pub fn new<I, T>(moves: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            moves: moves.into_iter().map(Into::into).collect(),
        }
    }
}

impl MoveSource for ScriptedMoves {
    fn next_move(&mut self) -> Option<String> {
        self.moves.pop_front()
    }
}

/// Prompts on stdout and reads stdin.
#[derive(Debug, Default)]
pub struct StdinMoves;

impl MoveSource for StdinMoves {
    fn next_move(&mut self) -> Option<String> {
        print!("\nEnter your choice (rock/paper/scissors) or 'quit' to exit: ");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

/// Branches after reading input.
#[derive(Debug, PartialEq, Eq, Hash)]
enum InputCheck {
    Valid,
    Retry,
    Quit,
}

fn check_input(state: &GameState) -> InputCheck {
    if !state.continue_playing {
        InputCheck::Quit
    } else if state.user_choice.is_some() {
        InputCheck::Valid
    } else {
        InputCheck::Retry
    }
}

/// ```text
/// START → get_input ─valid→ computer_choice → determine_winner → display_score
///            ↑  └─retry┘ └─quit→ END                                  │
///            └────────────────────────────────────────────────────────┘
/// ```
/// Quitting is only ever decided in `get_input`.
pub fn build_graph<M>(
    moves: Arc<Mutex<M>>,
    rng: SharedRng,
    narrate: Narrator,
    config: ExecutorConfig,
) -> wireflow_graph::Result<CompiledGraph<GameState>>
where
    M: MoveSource + 'static,
{
    let input_narrator = Arc::clone(&narrate);
    let choice_narrator = Arc::clone(&narrate);
    let winner_narrator = Arc::clone(&narrate);
    let score_narrator = narrate;

    let mut builder = GraphBuilder::new();
    builder
        .add_node("get_input", move |mut state: GameState| {
            state.user_choice = None;
            let line = lock(&moves)?.next_move();
            let Some(line) = line else {
                state.continue_playing = false;
                return Ok(state);
            };
            let line = line.trim().to_ascii_lowercase();
            if line == "quit" {
                state.continue_playing = false;
                return Ok(state);
            }
            match line.parse::<Choice>() {
                Ok(choice) => state.user_choice = Some(choice),
                Err(_) => {
                    state.invalid_inputs += 1;
                    input_narrator("Invalid choice! Please try again.");
                }
            }
            Ok(state)
        })?
        .add_node("computer_choice", move |mut state: GameState| {
            let choice = *Choice::ALL
                .choose(&mut *lock(&rng)?)
                .ok_or("no choices available")?;
            state.computer_choice = Some(choice);
            if let Some(user) = state.user_choice {
                choice_narrator(&format!("\nYou chose: {}", user));
            }
            choice_narrator(&format!("Computer chose: {}", choice));
            Ok(state)
        })?
        .add_node("determine_winner", move |mut state: GameState| {
            let (Some(user), Some(computer)) = (state.user_choice, state.computer_choice) else {
                return Err("both players must choose before scoring".into());
            };
            let outcome = if user == computer {
                state.ties += 1;
                winner_narrator("It's a tie!");
                Outcome::Tie
            } else if user.beats() == computer {
                state.user_score += 1;
                winner_narrator("You win!");
                Outcome::User
            } else {
                state.computer_score += 1;
                winner_narrator("Computer wins!");
                Outcome::Computer
            };
            state.result = Some(outcome);
            Ok(state)
        })?
        .add_node("display_score", move |state: GameState| {
            score_narrator(&format!(
                "\nScore - You: {} | Computer: {} | Ties: {}",
                state.user_score, state.computer_score, state.ties
            ));
            Ok(state)
        })?
        .add_edge(START, "get_input")?
        .add_conditional_edges(
            "get_input",
            check_input,
            [
                (InputCheck::Valid, "computer_choice"),
                (InputCheck::Retry, "get_input"),
                (InputCheck::Quit, END),
            ],
        )?
        .add_edge("computer_choice", "determine_winner")?
        .add_edge("determine_winner", "display_score")?
        .add_edge("display_score", "get_input")?;
    builder.compile_with(config)
}
