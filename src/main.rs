mod demos;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wireflow_core::config::AppConfig;
use wireflow_core::event::EventBus;
use wireflow_core::types::{RunId, StreamMode};
use wireflow_graph::{ExecutorConfig, RunLogger};

use demos::{chat, office, rps, school};

#[derive(Parser)]
#[command(name = "wireflow", version, about = "State-graph workflow runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wireflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with an offline echo responder, one graph run per turn
    Chat {
        /// Write the conversation here on exit
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Play rock-paper-scissors
    Rps {
        /// Comma-separated moves instead of reading stdin
        #[arg(long, value_delimiter = ',')]
        moves: Option<Vec<String>>,
        /// RNG seed for the computer's choices
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run the student/teacher/principal review workflow
    School {
        /// RNG seed for the student's ideas
        #[arg(long)]
        seed: Option<u64>,
        /// Stream mode: values or updates
        #[arg(long)]
        mode: Option<StreamMode>,
        /// Ideas the student may propose before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
        /// JSON file collecting the messages of every run
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Send a task up the employee/manager/director/CEO chain
    Office {
        /// Task title
        #[arg(long, default_value = "Prepare Q4 Report")]
        title: String,
        /// Task description
        #[arg(long, default_value = "Compile all metrics for Q4")]
        description: String,
        /// Task priority: low, medium or high
        #[arg(long, default_value = "high")]
        priority: office::Priority,
        /// RNG seed for the approval decisions
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wireflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "wireflow", &mut io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::default()
    };

    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    // Event bus + JSONL run log
    let mut executor_config = ExecutorConfig::from(&config.engine);
    let mut run_logger = None;
    if let (Some(log_dir), Some(log_config)) = (config.log_dir(), config.log.as_ref()) {
        let event_bus = Arc::new(EventBus::default());
        let rx = event_bus.subscribe();
        let cancel = CancellationToken::new();
        let logger = RunLogger::new(log_dir, log_config.level);
        let session = RunId::new().to_string();
        let handle = tokio::spawn(logger.run(rx, session, cancel.clone()));
        info!("RunLogger started (level {})", log_config.level);
        executor_config = executor_config.with_event_bus(event_bus);
        run_logger = Some((handle, cancel));
    }

    let demo = config.demo.clone();
    let stream_mode = config.engine.stream_mode;
    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        match cli.command {
            Commands::Chat { transcript } => {
                let responder = Arc::new(Mutex::new(chat::EchoResponder::default()));
                let graph = chat::build_graph(responder, executor_config)?;
                println!(
                    "wireflow chat v{} (type 'exit' to quit)\n",
                    env!("CARGO_PKG_VERSION")
                );

                let history = chat::run_session(&graph, io::stdin().lock(), &mut io::stdout())?;
                let transcript = transcript.or_else(|| demo.transcript.map(PathBuf::from));
                if let Some(path) = transcript {
                    chat::write_transcript(&path, &history)?;
                    println!("Conversation saved to {}", path.display());
                }
            }
            Commands::Rps { moves, seed } => {
                let rng = demos::shared_rng(seed.or(demo.seed));
                let narrate = demos::stdout_narrator();
                println!("\n=== Rock Paper Scissors ===");
                println!("Type 'quit' to exit the game");

                let state = match moves {
                    Some(moves) => {
                        let source = Arc::new(Mutex::new(rps::ScriptedMoves::new(moves)));
                        rps::build_graph(source, rng, narrate, executor_config)?
                            .invoke(rps::GameState::default())?
                    }
                    None => {
                        let source = Arc::new(Mutex::new(rps::StdinMoves));
                        rps::build_graph(source, rng, narrate, executor_config)?
                            .invoke(rps::GameState::default())?
                    }
                };
                println!("\n=== Game Over ===");
                println!("{}", state.summary());
            }
            Commands::School {
                seed,
                mode,
                max_attempts,
                history,
            } => {
                let narrate = demos::stdout_narrator();
                let graph = school::build_graph(
                    demos::shared_rng(seed.or(demo.seed)),
                    Arc::clone(&narrate),
                    max_attempts.unwrap_or(demo.max_attempts),
                    executor_config,
                )?;
                let state = school::run_workflow(&graph, mode.unwrap_or(stream_mode), &narrate)?;

                let verdict = if state.approved() {
                    "approved"
                } else {
                    "not approved"
                };
                println!(
                    "\nFinal idea: {} ({})",
                    state.idea.as_deref().unwrap_or("none"),
                    verdict
                );
                if let Some(path) = history {
                    let all = school::save_history(&path, &state.messages)?;
                    school::show_recent(&all, &narrate);
                }
            }
            Commands::Office {
                title,
                description,
                priority,
                seed,
            } => {
                let graph = office::build_graph(
                    demos::shared_rng(seed.or(demo.seed)),
                    office::Odds::default(),
                    demos::stdout_narrator(),
                    executor_config,
                )?;
                let task_id = format!("T-{}", chrono::Utc::now().timestamp_millis());
                let task =
                    office::Task::new(task_id, title, priority).with_description(description);

                println!("\n=== Office Hierarchy Workflow ===\n");
                let state = office::run_workflow(&graph, task)?;
                println!("\n=== Final Result ===");
                println!("{}", state.report());
            }
            Commands::Config | Commands::Completions { .. } => {
                unreachable!("handled before the demo runs")
            }
        }
        Ok(())
    })
    .await?;

    if let Some((handle, cancel)) = run_logger {
        cancel.cancel();
        match handle.await {
            Ok(Some(path)) => info!(path = %path.display(), "Run log written"),
            Ok(None) => warn!("Run log could not be written"),
            Err(e) => warn!(error = %e, "RunLogger task failed"),
        }
    }

    outcome
}
