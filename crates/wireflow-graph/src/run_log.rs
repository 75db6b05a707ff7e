use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use wireflow_core::types::GraphEvent;

/// JSONL run logger.
///
/// Reads `GraphEvent`s from an `EventBus` subscription and appends one JSON
/// object per line. Every line is flushed as it is written, so a crash never
/// leaves a partially written file behind.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Debug, Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1 = run summary, 2 = per node.
    pub fn new(log_dir: impl Into<PathBuf>, level: u8) -> Self {
        Self {
            log_dir: log_dir.into(),
            level,
        }
    }

    /// Write events to `{log_dir}/{session}/{timestamp}.jsonl` until
    /// cancelled or the bus closes. Events already queued when the token
    /// fires are still written.
    ///
    /// Take the subscription before starting the first run so no event is
    /// missed.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<GraphEvent>,
        session: String,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let session_dir = self.log_dir.join(&session);
        if let Err(e) = tokio::fs::create_dir_all(&session_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let log_path = session_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    loop {
                        match rx.try_recv() {
                            Ok(event) => {
                                if self.write_event(&mut writer, &event).await.is_err() {
                                    break;
                                }
                            }
                            Err(TryRecvError::Lagged(n)) => {
                                debug!(skipped = n, "RunLogger lagged, skipped events");
                            }
                            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                        }
                    }
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if let Err(e) = self.write_event(&mut writer, &event).await {
                                error!(error = %e, "Failed to write log entry");
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }

    async fn write_event(
        &self,
        writer: &mut BufWriter<tokio::fs::File>,
        event: &GraphEvent,
    ) -> std::io::Result<()> {
        let Some(entry) = self.event_to_entry(event) else {
            return Ok(());
        };
        let Ok(json) = serde_json::to_string(&entry) else {
            return Ok(());
        };
        writer.write_all(format!("{}\n", json).as_bytes()).await?;
        writer.flush().await
    }

    /// Convert an event to a log entry (None if filtered by level).
    fn event_to_entry(&self, event: &GraphEvent) -> Option<LogEntry> {
        let entry = |event_type, node: Option<&String>, step, detail| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().to_string(),
            event_type,
            node: node.cloned(),
            step,
            detail,
        };

        match event {
            // L1: run summary
            GraphEvent::RunStarted { .. } => Some(entry("run_started", None, None, None)),
            GraphEvent::RunComplete {
                total_steps,
                elapsed_ms,
                ..
            } => Some(entry(
                "run_complete",
                None,
                Some(*total_steps),
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms })),
            )),
            GraphEvent::RunError { step, error, .. } => Some(entry(
                "run_error",
                None,
                Some(*step),
                Some(serde_json::json!({ "error": error })),
            )),

            // L2: per node
            GraphEvent::NodeStarted { node, step, .. } if self.level >= 2 => {
                Some(entry("node_started", Some(node), Some(*step), None))
            }
            GraphEvent::NodeCompleted {
                node,
                step,
                elapsed_ms,
                ..
            } if self.level >= 2 => Some(entry(
                "node_completed",
                Some(node),
                Some(*step),
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms })),
            )),

            _ => None,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}
