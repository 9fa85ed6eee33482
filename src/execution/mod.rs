//! Workflow Execution Module
//!
//! Runs workflow definitions against registered step handlers with
//! round-based parallel scheduling, per-step timeouts and retries.
//!
//! # Architecture
//!
//! - [`orchestrator`]: Entry point, scheduling loop and run registry
//! - `step`: Individual step execution (attempts, timeout, backoff)
//! - [`handler`]: Handler trait and registry
//! - [`context`]: Context shared by the steps of one run
//! - [`command`]: Built-in shell command handler
//! - [`retry`]: Backoff policy
//! - [`clock`]: Time source used for timestamps and sleeps

pub mod clock;
pub mod command;
pub mod context;
pub mod handler;
pub mod orchestrator;
pub mod retry;
mod step;

pub use clock::{Clock, SystemClock};
pub use command::CommandHandler;
pub use context::RunContext;
pub use handler::{handler_fn, FnHandler, HandlerRegistry, StepHandler};
pub use orchestrator::{OrchestratorConfig, RunRetention, WorkflowOrchestrator};
pub use retry::BackoffPolicy;
