//! Workflow Data Model
//!
//! Core data structures for workflow definitions and their runs.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: nightly-report
//! description: Fetch data, build the report, publish it
//! on_failure: stop
//! steps:
//!   - name: fetch
//!     timeout_seconds: 30
//!
//!   - name: build
//!     depends_on: [fetch]
//!     max_retries: 1
//!
//!   - name: publish
//!     depends_on: [build]
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::monitoring::ExecutionTimeline;

/// Default per-attempt timeout for a step.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Status of a single step within a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Waiting for dependencies or for the scheduler
    #[default]
    Pending,
    /// An attempt is in flight
    Running,
    /// Handler returned successfully
    Completed,
    /// Attempts exhausted, handler missing, or run cancelled
    Failed,
    /// Never dispatched
    Skipped,
}

impl StepStatus {
    /// Returns true for `completed`, `failed` and `skipped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow-level status, derived from the step statuses.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scheduler does once a step fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Skip every step still pending and finish the run
    #[default]
    Stop,
    /// Keep scheduling steps that do not depend on the failure
    Continue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => f.write_str("stop"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

/// A named unit of work.
///
/// The same struct serves as the template inside a [`WorkflowDefinition`]
/// and as the mutable record inside a [`WorkflowRun`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowStep {
    /// Generated identifier, informational only
    #[serde(default = "new_id")]
    pub step_id: String,

    /// Unique name within the workflow; also the handler lookup key
    pub name: String,

    /// Names of steps that must complete before this one is dispatched
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Wall-clock budget for a single attempt
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Additional attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Shell command for the built-in command handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default)]
    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Last recorded failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of attempts that ended with a handler error
    #[serde(default)]
    pub retry_count: u32,

    /// Number of times the handler was invoked
    #[serde(default)]
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    /// Creates a step with default timeout and retry settings.
    ///
    /// # Example
    ///
    /// ```
    /// use steprunner::workflow::WorkflowStep;
    ///
    /// let step = WorkflowStep::new("publish")
    ///     .depends_on("build")
    ///     .with_timeout(30)
    ///     .with_max_retries(0);
    ///
    /// assert_eq!(step.max_attempts(), 1);
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            step_id: new_id(),
            name: name.into(),
            depends_on: Vec::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            command: None,
            status: StepStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            attempts: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Adds a dependency on another step.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Sets the per-attempt timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets how many retries follow the first failed attempt.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Attaches a shell command for the command handler.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Per-attempt timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Total number of attempts the scheduler may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Copies the template into a fresh run-local record.
    ///
    /// Run-time fields are reset so a definition that was itself loaded
    /// from a finished report starts from `pending`.
    pub(crate) fn instantiate(&self) -> Self {
        Self {
            step_id: self.step_id.clone(),
            name: self.name.clone(),
            depends_on: self.depends_on.clone(),
            timeout_seconds: self.timeout_seconds,
            max_retries: self.max_retries,
            command: self.command.clone(),
            ..Self::new(self.name.clone())
        }
    }
}

/// Immutable workflow template.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowDefinition {
    #[serde(default = "new_id")]
    pub workflow_id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Steps in declaration order
    pub steps: Vec<WorkflowStep>,

    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl WorkflowDefinition {
    /// Creates an empty definition with the `stop` failure policy.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            workflow_id: new_id(),
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            on_failure: FailurePolicy::Stop,
        }
    }

    /// Appends a step.
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends several steps.
    pub fn with_steps(mut self, steps: impl IntoIterator<Item = WorkflowStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Gets a step template by name.
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One execution of a [`WorkflowDefinition`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: RunStatus,

    /// Run-local copies of the definition's steps
    pub steps: Vec<WorkflowStep>,

    /// Final state of the shared context
    #[serde(default)]
    pub context: Map<String, Value>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set when the run was aborted through its cancellation token
    #[serde(default)]
    pub cancelled: bool,

    #[serde(default)]
    pub timeline: ExecutionTimeline,
}

impl WorkflowRun {
    /// Creates a pending run with fresh copies of every step.
    pub fn new(workflow: &WorkflowDefinition, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: new_id(),
            workflow_id: workflow.workflow_id.clone(),
            workflow_name: workflow.name.clone(),
            status: RunStatus::Pending,
            steps: workflow.steps.iter().map(WorkflowStep::instantiate).collect(),
            context: Map::new(),
            started_at,
            completed_at: None,
            cancelled: false,
            timeline: ExecutionTimeline::new(started_at),
        }
    }

    /// Gets a step record by name.
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    #[cfg(test)]
    fn step_mut(&mut self, name: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Returns the steps currently in the given status.
    pub fn steps_with_status(&self, status: StepStatus) -> Vec<&WorkflowStep> {
        self.steps.iter().filter(|s| s.status == status).collect()
    }

    /// Derives the terminal run status from the step statuses.
    pub fn derived_status(&self) -> RunStatus {
        if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the run, once it has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}
