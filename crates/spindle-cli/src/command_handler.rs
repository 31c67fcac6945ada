//! CommandHandler - runs a configured external program for a task.
//!
//! The program sees the task through its environment:
//! - `SPINDLE_TASK_ID`, `SPINDLE_TASK_TYPE`
//! - `SPINDLE_INPUT`: the task's input path (empty when none)
//! - `SPINDLE_OUTPUT`: a hidden `.partial` path beside the declared output
//! - `SPINDLE_PAYLOAD`: the full record as JSON
//!
//! On exit status 0 the partial file is renamed onto the declared output,
//! so dependents never observe a half-written file. Each stdout line is a
//! progress message, except `NN%` lines which report a percentage.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use spindle_core::app::TaskProgress;
use spindle_core::config::CommandConfig;
use spindle_core::domain::TaskRecord;
use spindle_core::runtime::TaskHandler;
use spindle_core::SpindleError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

const STDERR_TAIL_LINES: usize = 20;

pub struct CommandHandler {
    program: String,
    args: Vec<String>,
}

impl CommandHandler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

/// `/lib/A.mp4` -> `/lib/.A.mp4.partial`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(output.file_name().unwrap_or(output.as_os_str()));
    name.push(".partial");
    output.with_file_name(name)
}

fn parse_percent(line: &str) -> Option<f32> {
    line.strip_suffix('%')?.trim().parse().ok()
}

#[async_trait]
impl TaskHandler for CommandHandler {
    async fn handle(&self, task: &TaskRecord, progress: &TaskProgress) -> Result<(), SpindleError> {
        let partial = task.output.as_deref().map(partial_path);
        if let Some(parent) = partial.as_deref().and_then(Path::parent) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SpindleError::io(parent, e))?;
        }

        let path_env = |p: Option<&Path>| p.map(|p| p.as_os_str().to_owned()).unwrap_or_default();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("SPINDLE_TASK_ID", task.id.as_str())
            .env("SPINDLE_TASK_TYPE", task.task_type().as_str())
            .env("SPINDLE_INPUT", path_env(task.input.as_deref()))
            .env("SPINDLE_OUTPUT", path_env(partial.as_deref()))
            .env("SPINDLE_PAYLOAD", serde_json::to_string(task)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpindleError::Task(format!("failed to start {}: {e}", self.program)))?;
        debug!(task_id = %task.id, program = %self.program, "command started");

        let stderr = child.stderr.take();
        let stderr_tail = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_percent(line) {
                    Some(pct) => progress.percent(pct),
                    None => progress.message(line),
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SpindleError::Task(format!("failed to wait for {}: {e}", self.program)))?;
        let tail = stderr_tail.await.unwrap_or_default();

        if !status.success() {
            if let Some(partial) = &partial
                && let Err(e) = tokio::fs::remove_file(partial).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %partial.display(), error = %e, "could not remove partial output");
            }
            let tail: Vec<String> = tail.into_iter().collect();
            return Err(SpindleError::Task(format!(
                "{} exited with {status}: {}",
                self.program,
                tail.join("\n")
            )));
        }

        if let (Some(partial), Some(output)) = (&partial, &task.output) {
            tokio::fs::rename(partial, output).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SpindleError::Task(format!(
                        "{} exited successfully but wrote nothing to {}",
                        self.program,
                        partial.display()
                    ))
                } else {
                    SpindleError::io(partial, e)
                }
            })?;
        }
        Ok(())
    }
}
