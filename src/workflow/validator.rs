//! Workflow Validation
//!
//! Checks a definition before it is scheduled:
//! - Step names are present and unique
//! - Every dependency names a step in the same workflow
//! - No step depends on itself
//! - No cyclic dependencies
//!
//! Also computes the execution layers (the rounds a fully successful
//! run would dispatch) using Kahn's algorithm.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use log::{debug, info};

use super::model::WorkflowDefinition;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyName,
    DuplicateStep(String),
    UnknownDependency { step: String, dependency: String },
    SelfDependency(String),
    CyclicDependency(Vec<String>),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Step has empty or whitespace-only name"),
            Self::DuplicateStep(name) => write!(f, "Duplicate step name: '{}'", name),
            Self::UnknownDependency { step, dependency } => {
                write!(f, "Step '{}' depends on unknown step '{}'", step, dependency)
            }
            Self::SelfDependency(name) => write!(f, "Step '{}' depends on itself", name),
            Self::CyclicDependency(names) => write!(
                f,
                "Workflow contains cyclic dependencies between: {}",
                names.join(", ")
            ),
        }
    }
}

/// Validates the dependency structure of a workflow.
///
/// An empty workflow is accepted here: it simply completes with no steps.
/// All reference problems are collected before returning; cycle
/// detection only runs once references are known to be sound.
pub fn validate_definition(workflow: &WorkflowDefinition) -> Result<(), Vec<ValidationError>> {
    debug!(
        "Validating workflow '{}' with {} steps",
        workflow.name,
        workflow.steps.len()
    );

    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for step in &workflow.steps {
        if step.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
            continue;
        }
        if !seen.insert(step.name.as_str()) {
            errors.push(ValidationError::DuplicateStep(step.name.clone()));
        }
    }

    for step in &workflow.steps {
        for dependency in &step.depends_on {
            if *dependency == step.name {
                errors.push(ValidationError::SelfDependency(step.name.clone()));
            } else if !seen.contains(dependency.as_str()) {
                errors.push(ValidationError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let layers = execution_layers(workflow);
    let layered: usize = layers.iter().map(Vec::len).sum();
    if layered != workflow.steps.len() {
        let placed: HashSet<&str> = layers.iter().flatten().map(String::as_str).collect();
        let mut stuck: Vec<String> = workflow
            .steps
            .iter()
            .map(|s| s.name.clone())
            .filter(|name| !placed.contains(name.as_str()))
            .collect();
        stuck.sort();
        return Err(vec![ValidationError::CyclicDependency(stuck)]);
    }

    info!(
        "Workflow '{}' validated: {} steps in {} rounds",
        workflow.name,
        workflow.steps.len(),
        layers.len()
    );
    Ok(())
}

/// Groups steps into the rounds a fully successful run would dispatch.
///
/// Uses Kahn's algorithm level by level; each layer keeps declaration
/// order. Steps caught in a cycle or waiting on unknown names are
/// left out, so callers can compare the total against the step count.
pub fn execution_layers(workflow: &WorkflowDefinition) -> Vec<Vec<String>> {
    let names: HashSet<&str> = workflow.steps.iter().map(|s| s.name.as_str()).collect();

    // Build in-degree and successor maps
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in &workflow.steps {
        let unique_deps: HashSet<&str> = step.depends_on.iter().map(String::as_str).collect();
        in_degree.insert(step.name.as_str(), unique_deps.len());

        // Unknown names still count towards the in-degree: never satisfied
        for dep in unique_deps {
            if names.contains(dep) {
                successors.entry(dep).or_default().push(step.name.as_str());
            }
        }
    }

    // Start with root nodes (in-degree = 0)
    let mut current: VecDeque<&str> = workflow
        .steps
        .iter()
        .map(|s| s.name.as_str())
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();

    let order: HashMap<&str, usize> = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut layers = Vec::new();

    while !current.is_empty() {
        let mut next: Vec<&str> = Vec::new();

        for name in &current {
            for successor in successors.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*successor);
                    }
                }
            }
        }

        layers.push(current.iter().map(|s| s.to_string()).collect());

        next.sort_by_key(|name| order.get(name).copied().unwrap_or(usize::MAX));
        current = next.into_iter().collect();
    }

    debug!("Execution layers: {:?}", layers);
    layers
}
