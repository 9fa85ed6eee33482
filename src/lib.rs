//! StepRunner - Dependency-Ordered Workflow Orchestrator
//!
//! Runs named steps in dependency order, dispatching every step whose
//! dependencies have completed as one parallel round. Each step gets a
//! per-attempt timeout, retries with exponential backoff and a
//! workflow-wide failure policy. The work behind a step is supplied by
//! the caller as a handler registered under the step's name.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`workflow`]: Definitions, runs, validation, YAML loading and reports
//! - [`execution`]: Orchestrator, step execution, handlers and run context
//! - [`monitoring`]: Execution timeline and Gantt output
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use steprunner::{WorkflowDefinition, WorkflowOrchestrator, WorkflowStep};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = WorkflowOrchestrator::new();
//!     orchestrator.register_fn("extract", |_step, ctx| async move {
//!         ctx.insert("records", json!(128));
//!         Ok(json!("extracted"))
//!     });
//!     orchestrator.register_fn("load", |_step, ctx| async move {
//!         Ok(json!({ "loaded": ctx.get("records") }))
//!     });
//!
//!     let workflow = WorkflowDefinition::new("etl", "extract then load")
//!         .with_step(WorkflowStep::new("extract"))
//!         .with_step(WorkflowStep::new("load").depends_on("extract"));
//!
//!     let run = orchestrator.execute(&workflow, None).await?;
//!     println!("{} finished: {}", run.workflow_name, run.status);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use error::{HandlerError, OrchestratorError, StepError};
pub use execution::{
    OrchestratorConfig, RunContext, RunRetention, StepHandler, WorkflowOrchestrator,
};
pub use workflow::model::{
    FailurePolicy, RunStatus, StepStatus, WorkflowDefinition, WorkflowRun, WorkflowStep,
};
pub use workflow::parser::load_definition;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "StepRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "StepRunner");
    }

    #[test]
    fn test_module_exports_step() {
        let step = WorkflowStep::new("test").depends_on("setup");
        assert_eq!(step.name, "test");
        assert_eq!(step.depends_on, vec!["setup".to_string()]);
        assert_eq!(step.status, StepStatus::Pending);
    }

    #[test]
    fn test_module_exports_workflow() {
        let workflow = WorkflowDefinition::new("wf", "");
        assert!(workflow.is_empty());
        assert_eq!(workflow.on_failure, FailurePolicy::Stop);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
