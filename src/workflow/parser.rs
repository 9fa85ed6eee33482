//! Workflow Parser
//!
//! Handles loading workflow definitions from YAML files.

use std::fs;
use std::path::Path;

use log::{debug, info};

use super::model::WorkflowDefinition;
use crate::error::{OrchestratorError, Result};

/// Parses a workflow definition from a YAML string.
///
/// Step names are trimmed; everything else is taken as written.
/// Dependency checks are left to [`validate_definition`](super::validate_definition)
/// so lenient callers can still load a definition with dangling names.
pub fn parse_definition(yaml: &str) -> Result<WorkflowDefinition> {
    let mut workflow: WorkflowDefinition = serde_yaml::from_str(yaml)?;

    for step in &mut workflow.steps {
        step.name = step.name.trim().to_string();
        for dep in &mut step.depends_on {
            *dep = dep.trim().to_string();
        }
    }

    debug!(
        "Parsed workflow '{}': {} steps, on_failure={:?}",
        workflow.name,
        workflow.steps.len(),
        workflow.on_failure
    );
    Ok(workflow)
}

/// Loads a workflow definition from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use steprunner::workflow::load_definition;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_definition("pipeline.yaml")?;
///     println!("Loaded {} steps", workflow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_definition(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|source| OrchestratorError::Io {
        path: path.display().to_string(),
        source,
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());
    parse_definition(&yaml_content)
}
