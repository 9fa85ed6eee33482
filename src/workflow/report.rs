//! Run Reports
//!
//! Writes a finished [`WorkflowRun`] to disk as pretty-printed JSON and
//! reads it back. The orchestrator keeps no on-disk state of its own;
//! callers that need results beyond the in-memory registry persist them
//! here.

use std::fs;
use std::path::Path;

use log::info;

use super::model::WorkflowRun;
use crate::error::{OrchestratorError, Result};

/// Saves a run record to `path`, creating parent directories.
pub fn save_run(run: &WorkflowRun, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let io_error = |source| OrchestratorError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }

    let json = serde_json::to_string_pretty(run)?;
    fs::write(path, json).map_err(io_error)?;

    info!("Saved run {} to {}", run.run_id, path.display());
    Ok(())
}

/// Loads a run record previously written by [`save_run`].
pub fn load_run(path: impl AsRef<Path>) -> Result<WorkflowRun> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| OrchestratorError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let run: WorkflowRun = serde_json::from_str(&content)?;
    info!("Loaded run {} from {}", run.run_id, path.display());
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{RunStatus, StepStatus, WorkflowDefinition, WorkflowStep};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn finished_run() -> WorkflowRun {
        let definition = WorkflowDefinition::new("report", "")
            .with_step(WorkflowStep::new("a"))
            .with_step(WorkflowStep::new("b").depends_on("a"));

        let mut run = WorkflowRun::new(&definition, Utc::now());
        run.steps[0].status = StepStatus::Completed;
        run.steps[0].result = Some(json!({"rows": 3}));
        run.steps[1].status = StepStatus::Failed;
        run.steps[1].error = Some("boom".to_string());
        run.status = RunStatus::Failed;
        run.context.insert("a".to_string(), json!(true));
        run.completed_at = Some(Utc::now());
        run
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/nested/run.json");

        save_run(&finished_run(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_saved_report_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        let run = finished_run();

        save_run(&run, &path).unwrap();
        let loaded = load_run(&path).unwrap();

        assert_eq!(loaded.run_id, run.run_id);
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.step("a").unwrap().result, Some(json!({"rows": 3})));
        assert_eq!(loaded.step("b").unwrap().error.as_deref(), Some("boom"));
        assert_eq!(loaded.context.get("a"), Some(&json!(true)));
    }

    #[test]
    fn test_report_uses_lowercase_statuses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        save_run(&finished_run(), &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"failed\""));
        assert!(raw.contains("\"status\": \"completed\""));
    }

    #[test]
    fn test_load_nonexistent() {
        assert!(matches!(
            load_run("/nonexistent/run.json"),
            Err(OrchestratorError::Io { .. })
        ));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_run(&path), Err(OrchestratorError::Report(_))));
    }
}
