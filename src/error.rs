//! Error Types
//!
//! Three layers of failure are modelled separately:
//!
//! - [`HandlerError`]: what a step handler returns when its work fails
//! - [`StepError`]: why a step ended `failed` (recorded on the step, never raised)
//! - [`OrchestratorError`]: the few conditions that make `execute` or the
//!   loaders return `Err`

use thiserror::Error;

use crate::workflow::validator::ValidationError;

/// Error returned by a [`StepHandler`](crate::execution::StepHandler).
///
/// The `Display` output is recorded verbatim as the step's `error`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Creates a plain failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Reason a step ended in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("No handler registered for step '{step}'")]
    MissingHandler { step: String },

    #[error("Step '{step}' timed out after {timeout_seconds}s (attempt {attempt})")]
    Timeout {
        step: String,
        timeout_seconds: u64,
        attempt: u32,
    },

    #[error("{0}")]
    Handler(String),

    #[error("Step '{step}' cancelled (attempt {attempt})")]
    Cancelled { step: String, attempt: u32 },

    /// The handler panicked instead of returning `Err`. Not retried:
    /// only returned errors and timeouts count as retryable failures.
    #[error("Step '{step}' panicked: {message}")]
    Panicked { step: String, message: String },
}

impl StepError {
    /// Returns true if another attempt may be made after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Handler(_))
    }
}

/// Errors surfaced to callers of the orchestrator and the workflow loaders.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid workflow '{workflow}': {}", join_messages(.errors))]
    InvalidWorkflow {
        workflow: String,
        errors: Vec<ValidationError>,
    },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to encode run report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used across the crate.
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_message_is_verbatim() {
        let err = HandlerError::failed("Intentional failure");
        assert_eq!(err.to_string(), "Intentional failure");

        let err: HandlerError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_handler_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: HandlerError = io.into();
        assert_eq!(err.to_string(), "missing file");
    }

    #[test]
    fn test_step_error_messages() {
        let err = StepError::MissingHandler {
            step: "deploy".to_string(),
        };
        assert!(err.to_string().contains("'deploy'"));

        let err = StepError::Timeout {
            step: "fetch".to_string(),
            timeout_seconds: 5,
            attempt: 2,
        };
        assert_eq!(err.to_string(), "Step 'fetch' timed out after 5s (attempt 2)");
    }

    #[test]
    fn test_step_error_retryable() {
        assert!(StepError::Handler("x".into()).is_retryable());
        assert!(StepError::Timeout {
            step: "a".into(),
            timeout_seconds: 1,
            attempt: 1
        }
        .is_retryable());
        assert!(!StepError::MissingHandler { step: "a".into() }.is_retryable());
        assert!(!StepError::Cancelled {
            step: "a".into(),
            attempt: 1
        }
        .is_retryable());
        assert!(!StepError::Panicked {
            step: "a".into(),
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_invalid_workflow_lists_every_error() {
        let err = OrchestratorError::InvalidWorkflow {
            workflow: "wf".to_string(),
            errors: vec![
                ValidationError::SelfDependency("a".to_string()),
                ValidationError::UnknownDependency {
                    step: "b".to_string(),
                    dependency: "zz".to_string(),
                },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("Invalid workflow 'wf'"));
        assert!(message.contains("'a' depends on itself"));
        assert!(message.contains("unknown step 'zz'"));
    }
}
