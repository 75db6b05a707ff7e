use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::types::StreamMode;

/// Default bound on node invocations per run.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// Top-level wireflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum node invocations per run before `StepLimitExceeded`.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Default mode for streamed runs.
    #[serde(default)]
    pub stream_mode: StreamMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            stream_mode: StreamMode::default(),
        }
    }
}

fn default_max_steps() -> usize { DEFAULT_MAX_STEPS }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: ./logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Logging level: 1 = run summary only, 2 = per node (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_dir() -> String { "logs".to_string() }
fn default_log_level() -> u8 { 2 }

/// Settings for the bundled demo workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// RNG seed; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Attempts the school workflow allows before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Where the chat demo writes its transcript on exit.
    #[serde(default)]
    pub transcript: Option<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_attempts: default_max_attempts(),
            transcript: None,
        }
    }
}

fn default_max_attempts() -> u32 { 3 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GraphError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(GraphError::Config(
                "engine.max_steps must be at least 1".to_string(),
            ));
        }
        if let Some(ref log) = self.log {
            if !(1..=2).contains(&log.level) {
                return Err(GraphError::Config(format!(
                    "log.level must be 1 or 2, got {}",
                    log.level
                )));
            }
        }
        Ok(())
    }

    /// Resolve the log directory when logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log
            .as_ref()
            .filter(|l| l.enabled)
            .map(|l| expand_home(&l.log_dir))
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
