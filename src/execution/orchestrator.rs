//! Workflow Orchestrator
//!
//! The entry point for running workflows:
//! - Handler registration by step name
//! - Up-front dependency validation
//! - Round-based parallel dispatch with a fan-in barrier per round
//! - Failure policy and skip propagation
//! - Cancellation
//! - In-memory registry of finished runs

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::clock::{Clock, SystemClock};
use super::context::RunContext;
use super::handler::{handler_fn, HandlerRegistry, StepHandler};
use super::retry::BackoffPolicy;
use super::step::{join_error_message, StepRunner};
use crate::error::{HandlerError, OrchestratorError, Result};
use crate::monitoring::EventType;
use crate::workflow::{
    validate_definition, ExecutionPlanner, RunStatus, StepStatus, WorkflowDefinition, WorkflowRun,
    WorkflowStep,
};

/// How many finished runs the orchestrator keeps in memory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunRetention {
    /// Keep every run for the orchestrator's lifetime
    #[default]
    Unbounded,
    /// Keep at most this many runs, evicting the oldest first
    Bounded(usize),
    /// Keep nothing; callers persist runs themselves
    Disabled,
}

/// Orchestrator settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Delay schedule between attempts after handler errors
    pub backoff: BackoffPolicy,
    /// Run registry policy
    pub retention: RunRetention,
    /// Reject workflows with unknown, self, duplicate or cyclic
    /// dependencies before any handler runs
    pub validate_dependencies: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            retention: RunRetention::default(),
            validate_dependencies: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retention(mut self, retention: RunRetention) -> Self {
        self.retention = retention;
        self
    }

    /// With validation off, steps with unsatisfiable dependencies are
    /// skipped at run time instead of rejected.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_dependencies = validate;
        self
    }
}

/// Runs in insertion order.
#[derive(Debug, Default)]
struct RunStore {
    order: VecDeque<String>,
    runs: HashMap<String, WorkflowRun>,
}

impl RunStore {
    fn upsert(&mut self, run: &WorkflowRun, retention: RunRetention) {
        let limit = match retention {
            RunRetention::Disabled => return,
            RunRetention::Bounded(limit) => Some(limit),
            RunRetention::Unbounded => None,
        };

        if !self.runs.contains_key(&run.run_id) {
            self.order.push_back(run.run_id.clone());
        }
        self.runs.insert(run.run_id.clone(), run.clone());

        if let Some(limit) = limit {
            while self.order.len() > limit {
                if let Some(evicted) = self.order.pop_front() {
                    self.runs.remove(&evicted);
                }
            }
        }
    }

    fn ordered(&self) -> Vec<WorkflowRun> {
        self.order
            .iter()
            .filter_map(|id| self.runs.get(id).cloned())
            .collect()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.runs.clear();
    }
}

/// Executes workflow definitions against registered step handlers.
///
/// All methods take `&self`; wrap the orchestrator in an `Arc` to run
/// several workflows concurrently or to register handlers while a run is
/// in flight.
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::json;
/// use steprunner::execution::WorkflowOrchestrator;
/// use steprunner::workflow::{WorkflowDefinition, WorkflowStep};
///
/// # async fn demo() -> Result<(), steprunner::OrchestratorError> {
/// let orchestrator = WorkflowOrchestrator::new();
/// orchestrator.register_fn("fetch", |_step, ctx| async move {
///     ctx.insert("rows", json!(10));
///     Ok(json!("fetched"))
/// });
/// orchestrator.register_fn("build", |_step, ctx| async move {
///     Ok(json!({ "rows": ctx.get("rows") }))
/// });
///
/// let workflow = WorkflowDefinition::new("etl", "fetch then build")
///     .with_step(WorkflowStep::new("fetch"))
///     .with_step(WorkflowStep::new("build").depends_on("fetch"));
///
/// let run = orchestrator.execute(&workflow, None).await?;
/// println!("{}: {}", run.workflow_name, run.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WorkflowOrchestrator {
    config: OrchestratorConfig,
    handlers: HandlerRegistry,
    clock: Arc<dyn Clock>,
    runs: Mutex<RunStore>,
}

impl Default for WorkflowOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator with the default configuration.
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self {
            config,
            handlers: HandlerRegistry::new(),
            clock: Arc::new(SystemClock),
            runs: Mutex::new(RunStore::default()),
        }
    }

    /// Replaces the clock used for timestamps, timeouts and backoff.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Registers the handler for `step_name`. The last registration wins.
    pub fn register_handler<H>(&self, step_name: impl Into<String>, handler: H)
    where
        H: StepHandler + 'static,
    {
        self.handlers.register(step_name, Arc::new(handler));
    }

    /// Registers an async closure as the handler for `step_name`.
    pub fn register_fn<F, Fut>(&self, step_name: impl Into<String>, f: F)
    where
        F: Fn(WorkflowStep, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, HandlerError>> + Send + 'static,
    {
        self.register_handler(step_name, handler_fn(f));
    }

    /// Removes the handler for `step_name`, returning true if one existed.
    pub fn unregister_handler(&self, step_name: &str) -> bool {
        self.handlers.unregister(step_name).is_some()
    }

    pub fn has_handler(&self, step_name: &str) -> bool {
        self.handlers.contains(step_name)
    }

    /// The shared handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Executes `workflow` to completion.
    ///
    /// Step failures are recorded on the returned run, never raised.
    /// `Err` means the workflow was rejected by validation or the
    /// scheduler itself faulted.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        context: Option<Map<String, Value>>,
    ) -> Result<WorkflowRun> {
        self.execute_with_cancellation(workflow, context, CancellationToken::new())
            .await
    }

    /// Executes `workflow`, stopping early when `cancel` fires.
    ///
    /// Cancellation interrupts in-flight attempts and backoff sleeps
    /// (those steps end `failed`), skips every pending step and marks the
    /// run cancelled. The run status still follows the steps: a run
    /// cancelled before any step failed ends `completed`.
    pub async fn execute_with_cancellation(
        &self,
        workflow: &WorkflowDefinition,
        context: Option<Map<String, Value>>,
        cancel: CancellationToken,
    ) -> Result<WorkflowRun> {
        if self.config.validate_dependencies {
            if let Err(errors) = validate_definition(workflow) {
                error!(
                    "Rejecting workflow '{}': {} validation errors",
                    workflow.name,
                    errors.len()
                );
                return Err(OrchestratorError::InvalidWorkflow {
                    workflow: workflow.name.clone(),
                    errors,
                });
            }
        }

        let mut run = WorkflowRun::new(workflow, self.clock.now());
        run.status = RunStatus::Running;
        let context = RunContext::from_map(context.unwrap_or_default());

        info!(
            "Starting workflow '{}' (run {}, {} steps, on_failure: {})",
            workflow.name,
            run.run_id,
            run.steps.len(),
            workflow.on_failure
        );
        self.retain(&run);

        // Child token: an internal abort must not cancel the caller's token
        let run_token = cancel.child_token();
        let runner = Arc::new(StepRunner {
            registry: self.handlers.clone(),
            clock: Arc::clone(&self.clock),
            backoff: self.config.backoff,
            cancel: run_token.clone(),
        });
        let mut planner = ExecutionPlanner::new(workflow.on_failure);

        while planner.has_pending(&run.steps) {
            if run_token.is_cancelled() {
                warn!("Workflow '{}' cancelled", workflow.name);
                break;
            }

            let ready = planner.ready_steps(&run.steps);
            if ready.is_empty() {
                warn!(
                    "Workflow '{}': no runnable steps remain, skipping the rest",
                    workflow.name
                );
                break;
            }

            let round = planner.begin_round(ready.len());
            let mut tasks = Vec::with_capacity(ready.len());
            for index in ready {
                let step = run.steps[index].clone();
                run.steps[index].status = StepStatus::Running;

                let runner = Arc::clone(&runner);
                let context = context.clone();
                let task = tokio::spawn(async move { runner.run_step(step, context).await });
                tasks.push((index, task));
            }

            // Fan-in: the round ends when every dispatched step is terminal
            let mut fault = None;
            for (index, task) in tasks {
                match task.await {
                    Ok(outcome) => {
                        run.timeline.extend(outcome.events);
                        planner.record(&outcome.step);
                        run.steps[index] = outcome.step;
                    }
                    Err(join_error) => {
                        // Stop the rest of the round; their outcomes are still collected
                        run_token.cancel();
                        let message = format!(
                            "Step '{}' task failed in round {}: {}",
                            run.steps[index].name,
                            round,
                            join_error_message(join_error)
                        );
                        error!("{}", message);

                        let step = &mut run.steps[index];
                        step.status = StepStatus::Failed;
                        step.error = Some(message.clone());
                        step.completed_at = Some(self.clock.now());
                        planner.record(step);
                        fault.get_or_insert(message);
                    }
                }
            }

            if let Some(message) = fault {
                self.finish_run(&mut run, &planner, &context, cancel.is_cancelled());
                return Err(OrchestratorError::Internal(message));
            }

            if planner.should_stop() {
                warn!(
                    "Workflow '{}' stopping after step failure (on_failure: stop)",
                    workflow.name
                );
                break;
            }
        }

        self.finish_run(&mut run, &planner, &context, run_token.is_cancelled());
        Ok(run)
    }

    /// Skips what never ran, stamps the run terminal and stores it.
    ///
    /// The run status is always derived from the step statuses;
    /// cancellation is reported through `run.cancelled` only.
    fn finish_run(
        &self,
        run: &mut WorkflowRun,
        planner: &ExecutionPlanner,
        context: &RunContext,
        cancelled: bool,
    ) {
        let finished_at = self.clock.now();
        for index in planner.skip_pending(&mut run.steps) {
            run.timeline
                .add_event(run.steps[index].name.clone(), EventType::Skipped, finished_at);
        }

        run.cancelled = cancelled;
        run.context = context.snapshot();
        run.completed_at = Some(finished_at);
        run.status = run.derived_status();

        self.log_summary(run, planner.rounds());
        self.retain(run);
    }

    fn log_summary(&self, run: &WorkflowRun, rounds: usize) {
        let completed = run.steps_with_status(StepStatus::Completed).len();
        let failed = run.steps_with_status(StepStatus::Failed).len();
        let skipped = run.steps_with_status(StepStatus::Skipped).len();
        let summary = format!(
            "Workflow '{}' {} in {} rounds: {} completed, {} failed, {} skipped",
            run.workflow_name, run.status, rounds, completed, failed, skipped
        );

        if run.status == RunStatus::Completed {
            info!("{}", summary);
        } else {
            error!("{}", summary);
        }
    }

    fn store(&self) -> MutexGuard<'_, RunStore> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn retain(&self, run: &WorkflowRun) {
        self.store().upsert(run, self.config.retention);
    }

    /// Returns a copy of a retained run.
    pub fn get_run(&self, run_id: &str) -> Option<WorkflowRun> {
        self.store().runs.get(run_id).cloned()
    }

    /// Retained runs, oldest first.
    pub fn runs(&self) -> Vec<WorkflowRun> {
        self.store().ordered()
    }

    pub fn run_count(&self) -> usize {
        self.store().runs.len()
    }

    pub fn clear_runs(&self) {
        self.store().clear();
    }
}
