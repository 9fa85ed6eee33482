//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, loading,
//! validating and planning workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (WorkflowStep, WorkflowDefinition, WorkflowRun)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Dependency checking and execution layers
//! - [`planner`]: Ready-set computation for the scheduler
//! - [`report`]: JSON reports of finished runs

pub mod model;
pub mod parser;
pub mod planner;
pub mod report;
pub mod validator;

pub use model::{
    FailurePolicy, RunStatus, StepStatus, WorkflowDefinition, WorkflowRun, WorkflowStep,
};
pub use parser::{load_definition, parse_definition};
pub use planner::ExecutionPlanner;
pub use report::{load_run, save_run};
pub use validator::{execution_layers, validate_definition, ValidationError};
