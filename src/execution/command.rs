//! Shell Command Handler
//!
//! Built-in [`StepHandler`] that runs a step's `command` with bash.
//! Handles:
//! - `{key}` placeholder substitution from the run context
//! - Working directory selection
//! - Output capture (stdout is stored in the context as `<step>.stdout`)
//! - Non-zero exit codes as handler errors

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, error};
use serde_json::{json, Map, Value};
use tokio::process::Command;

use super::context::RunContext;
use super::handler::StepHandler;
use crate::error::HandlerError;
use crate::workflow::WorkflowStep;

/// Environment variable carrying the step name.
pub const STEP_ENV_VAR: &str = "STEPRUNNER_STEP";

/// Environment variable carrying the current attempt number.
pub const ATTEMPT_ENV_VAR: &str = "STEPRUNNER_ATTEMPT";

/// Runs `bash -c <command>` for the step it is registered under.
///
/// The child is killed if the attempt times out or the run is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CommandHandler {
    working_dir: Option<PathBuf>,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs commands inside `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl StepHandler for CommandHandler {
    async fn execute(
        &self,
        step: &WorkflowStep,
        context: &RunContext,
    ) -> Result<Value, HandlerError> {
        let template = step.command.as_deref().ok_or_else(|| {
            HandlerError::failed(format!("Step '{}' has no command", step.name))
        })?;
        let command_text = substitute_placeholders(template, &context.snapshot());
        debug!("Step '{}' command: {}", step.name, command_text);

        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(&command_text)
            .env(STEP_ENV_VAR, &step.name)
            .env(ATTEMPT_ENV_VAR, step.attempts.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
            debug!("Executing in directory: {}", dir.display());
        }

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();

        if output.status.success() {
            if !stdout.is_empty() {
                debug!("Step '{}' output:\n{}", step.name, stdout);
            }
            context.insert_scoped(&step.name, "stdout", Value::String(stdout.clone()));
            return Ok(json!({
                "exit_code": output.status.code().unwrap_or(0),
                "stdout": stdout,
            }));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr.trim_end());
        }

        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let mut message = format!("Command exited with code {}", code);
        if let Some(last_line) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            message.push_str(": ");
            message.push_str(last_line.trim());
        }
        Err(HandlerError::Failed(message))
    }
}

/// Replaces `{key}` with the context value for `key`.
///
/// Only scalar values are substituted; unknown keys are left as written.
/// The template is scanned once, so braces inside a substituted value are
/// never expanded. Values are inserted verbatim, not shell-quoted: the
/// command sees them exactly as bash would see typed text.
fn substitute_placeholders(template: &str, values: &Map<String, Value>) -> String {
    let mut text = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        if let Some(close) = after.find('}') {
            let key = &after[..close];
            if !key.contains('{') {
                if let Some(replacement) = values.get(key).and_then(scalar_text) {
                    text.push_str(&replacement);
                    rest = &after[close + 1..];
                    continue;
                }
            }
        }

        text.push('{');
        rest = after;
    }

    text.push_str(rest);
    text
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
