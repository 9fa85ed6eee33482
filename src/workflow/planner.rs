//! Execution Planner
//!
//! Bookkeeping for the round-based scheduler:
//! - Ready-set computation
//! - Completed/failed name tracking
//! - Skipping steps that can no longer run

use std::collections::HashSet;

use log::{debug, info};

use super::model::{FailurePolicy, StepStatus, WorkflowStep};

/// Tracks which steps have finished and decides what runs next.
///
/// The planner never owns the step records; the orchestrator passes the
/// run's steps in on every call and the planner answers with indices
/// into that slice.
#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    /// Failure policy of the workflow being executed
    policy: FailurePolicy,
    /// Names of steps that completed successfully
    completed: HashSet<String>,
    /// Names of steps that ended failed
    failed: HashSet<String>,
    /// Number of rounds dispatched so far
    rounds: usize,
}

impl ExecutionPlanner {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            completed: HashSet::new(),
            failed: HashSet::new(),
            rounds: 0,
        }
    }

    /// Returns the indices of steps that are ready to dispatch.
    ///
    /// A step is ready if:
    /// - It is still pending
    /// - Every name in `depends_on` has completed
    /// - Its own name is not in the failed set
    pub fn ready_steps(&self, steps: &[WorkflowStep]) -> Vec<usize> {
        steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.status == StepStatus::Pending)
            .filter(|(_, step)| !self.failed.contains(&step.name))
            .filter(|(_, step)| step.depends_on.iter().all(|dep| self.completed.contains(dep)))
            .map(|(index, _)| index)
            .collect()
    }

    /// Returns true while any step is still pending.
    pub fn has_pending(&self, steps: &[WorkflowStep]) -> bool {
        steps.iter().any(|s| s.status == StepStatus::Pending)
    }

    /// Notes that a round is about to be dispatched.
    pub fn begin_round(&mut self, size: usize) -> usize {
        self.rounds += 1;
        debug!("Round {}: dispatching {} steps", self.rounds, size);
        self.rounds
    }

    /// Records the terminal outcome of a step dispatched in the last round.
    pub fn record(&mut self, step: &WorkflowStep) {
        match step.status {
            StepStatus::Completed => {
                self.completed.insert(step.name.clone());
            }
            StepStatus::Failed => {
                self.failed.insert(step.name.clone());
            }
            other => debug!("Step '{}' finished round in status {}", step.name, other),
        }
    }

    /// Returns true if the failure policy says scheduling must end now.
    pub fn should_stop(&self) -> bool {
        self.policy == FailurePolicy::Stop && !self.failed.is_empty()
    }

    /// Marks every pending step as skipped, returning their indices.
    pub fn skip_pending(&self, steps: &mut [WorkflowStep]) -> Vec<usize> {
        let mut skipped = Vec::new();
        for (index, step) in steps.iter_mut().enumerate() {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Skipped;
                skipped.push(index);
            }
        }

        if !skipped.is_empty() {
            info!("Skipping {} steps that can no longer run", skipped.len());
        }
        skipped
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }
}
