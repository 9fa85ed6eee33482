//! Individual Step Execution
//!
//! Runs one dispatched step to a terminal state:
//! - Handler lookup (missing handler fails immediately, no retry)
//! - Attempt loop bounded by `max_retries + 1`
//! - Per-attempt timeout
//! - Exponential backoff after handler errors
//! - Cancellation of in-flight attempts and backoff sleeps

use std::any::Any;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::context::RunContext;
use super::handler::{HandlerRegistry, StepHandler};
use super::retry::BackoffPolicy;
use crate::error::StepError;
use crate::monitoring::{EventType, ExecutionTimeline, TimelineEvent};
use crate::workflow::{StepStatus, WorkflowStep};

/// Final state of a step plus the timeline events it produced.
#[derive(Debug)]
pub(crate) struct StepOutcome {
    pub step: WorkflowStep,
    pub events: Vec<TimelineEvent>,
}

/// Everything a dispatched step needs, shared across one run.
#[derive(Debug)]
pub(crate) struct StepRunner {
    pub registry: HandlerRegistry,
    pub clock: Arc<dyn Clock>,
    pub backoff: BackoffPolicy,
    pub cancel: CancellationToken,
}

impl StepRunner {
    /// Executes `step` until it completes or fails.
    ///
    /// Never returns an error: every fault is recorded on the returned
    /// step record.
    pub async fn run_step(&self, mut step: WorkflowStep, context: RunContext) -> StepOutcome {
        let mut timeline = ExecutionTimeline::new(self.clock.now());

        step.status = StepStatus::Running;
        step.started_at = Some(self.clock.now());
        timeline.add_event(step.name.clone(), EventType::Started, self.clock.now());
        info!("Starting step: {}", step.name);

        let Some(handler) = self.registry.get(&step.name) else {
            let err = StepError::MissingHandler {
                step: step.name.clone(),
            };
            error!("{}", err);
            return self.fail(step, err.to_string(), timeline);
        };

        let max_attempts = step.max_attempts();

        for attempt in 1..=max_attempts {
            step.attempts = attempt;
            let has_next = attempt < max_attempts;

            match self.attempt(Arc::clone(&handler), &step, &context, attempt).await {
                Ok(value) => {
                    step.result = Some(value);
                    step.status = StepStatus::Completed;
                    step.completed_at = Some(self.clock.now());
                    timeline.add_attempt_event(
                        step.name.clone(),
                        EventType::Completed,
                        self.clock.now(),
                        attempt,
                    );
                    info!("Step '{}' completed (attempt {})", step.name, attempt);
                    return StepOutcome {
                        step,
                        events: timeline.get_events().to_vec(),
                    };
                }
                Err(err) if !err.is_retryable() => {
                    // Cancelled, panicked or missing: no further attempts
                    warn!("{}", err);
                    return self.fail(step, err.to_string(), timeline);
                }
                Err(err) => {
                    let backoff = matches!(err, StepError::Handler(_));
                    if backoff {
                        warn!(
                            "Step '{}' attempt {}/{} failed: {}",
                            step.name, attempt, max_attempts, err
                        );
                        step.retry_count = attempt;
                    } else {
                        warn!("{}", err);
                    }
                    step.error = Some(err.to_string());

                    if !has_next {
                        continue;
                    }
                    timeline.add_attempt_event(
                        step.name.clone(),
                        EventType::Retrying,
                        self.clock.now(),
                        attempt,
                    );
                    if !backoff {
                        // Timeouts retry immediately
                        continue;
                    }

                    let delay = self.backoff.delay(attempt);
                    debug!("Step '{}' backing off for {:?}", step.name, delay);

                    let cancelled = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => true,
                        _ = self.clock.sleep(delay) => false,
                    };
                    if cancelled {
                        let err = StepError::Cancelled {
                            step: step.name.clone(),
                            attempt,
                        };
                        warn!("{}", err);
                        return self.fail(step, err.to_string(), timeline);
                    }
                }
            }
        }

        let message = step.error.clone().unwrap_or_default();
        error!(
            "Step '{}' failed after {} attempts: {}",
            step.name, max_attempts, message
        );
        self.fail(step, message, timeline)
    }

    /// Runs one attempt of the handler under the step's timeout.
    ///
    /// The handler runs in its own task so a timeout or cancellation can
    /// abort it, and a panic is contained to this step.
    async fn attempt(
        &self,
        handler: Arc<dyn StepHandler>,
        step: &WorkflowStep,
        context: &RunContext,
        attempt: u32,
    ) -> Result<Value, StepError> {
        let task_step = step.clone();
        let task_context = context.clone();
        let mut task =
            tokio::spawn(async move { handler.execute(&task_step, &task_context).await });

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StepError::Cancelled {
                step: step.name.clone(),
                attempt,
            }),
            joined = &mut task => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(StepError::Handler(err.to_string())),
                Err(join_error) => Err(StepError::Panicked {
                    step: step.name.clone(),
                    message: join_error_message(join_error),
                }),
            },
            _ = self.clock.sleep(step.timeout()) => Err(StepError::Timeout {
                step: step.name.clone(),
                timeout_seconds: step.timeout_seconds,
                attempt,
            }),
        };

        if outcome.is_err() {
            task.abort();
        }
        outcome
    }

    fn fail(
        &self,
        mut step: WorkflowStep,
        message: String,
        mut timeline: ExecutionTimeline,
    ) -> StepOutcome {
        step.status = StepStatus::Failed;
        step.error = Some(message);
        step.completed_at = Some(self.clock.now());
        timeline.add_event(step.name.clone(), EventType::Failed, self.clock.now());
        StepOutcome {
            step,
            events: timeline.get_events().to_vec(),
        }
    }
}

/// Extracts a readable message from a panicked or aborted task.
pub(crate) fn join_error_message(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        return "task was cancelled".to_string();
    }
    panic_message(join_error.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
