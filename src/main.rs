//! StepRunner CLI Entry Point
//!
//! Provides command-line interface for workflow execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow
//! steprunner workflow.yaml
//!
//! # Dry run mode (print execution rounds)
//! steprunner workflow.yaml --dry-run
//!
//! # Seed the run context and write a JSON report
//! steprunner workflow.yaml --context target=release --context jobs=4 --report run.json
//!
//! # Specify working directory for step commands
//! steprunner workflow.yaml --working-dir /path/to/project
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info, warn};
use serde_json::{Map, Value};

use steprunner::execution::{CommandHandler, OrchestratorConfig, WorkflowOrchestrator};
use steprunner::workflow::{
    execution_layers, load_definition, save_run, validate_definition, WorkflowRun,
};
use steprunner::{RunStatus, StepStatus, APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    dry_run: bool,
    lenient: bool,
    context: Map<String, Value>,
    report_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            dry_run: false,
            lenient: false,
            context: Map::new(),
            report_path: None,
            working_dir: None,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Dependency-Ordered Workflow Orchestrator");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: steprunner [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>      Path to workflow YAML file");
    println!();
    println!("Options:");
    println!("  --dry-run            Print the execution rounds without running anything");
    println!("  --context KEY=VALUE  Seed the run context (repeatable, VALUE parsed as JSON)");
    println!("  --report PATH        Write the finished run as JSON");
    println!("  --lenient            Skip steps with unknown dependencies instead of failing");
    println!("  --working-dir PATH   Directory the step commands run in");
    println!("  --verbose            Enable debug logging");
    println!("  --help               Show this help message");
    println!("  --version            Show version information");
    println!();
    println!("Examples:");
    println!("  steprunner pipeline.yaml");
    println!("  steprunner pipeline.yaml --dry-run");
    println!("  steprunner pipeline.yaml --context env=staging --report run.json");
}

/// Parses a `KEY=VALUE` context entry. VALUE is JSON if it parses, else a string.
fn parse_context_entry(entry: &str) -> Result<(String, Value), String> {
    let (key, raw) = entry
        .split_once('=')
        .ok_or_else(|| format!("Invalid context entry (expected KEY=VALUE): {}", entry))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Context entry has an empty key: {}", entry));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--lenient" => {
                config.lenient = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--context" => {
                i += 1;
                if i >= args.len() {
                    return Err("--context requires a KEY=VALUE argument".to_string());
                }
                let (key, value) = parse_context_entry(&args[i])?;
                config.context.insert(key, value);
            }
            "--report" => {
                i += 1;
                if i >= args.len() {
                    return Err("--report requires a path argument".to_string());
                }
                config.report_path = Some(PathBuf::from(&args[i]));
            }
            "--working-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--working-dir requires a path argument".to_string());
                }
                config.working_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Validates the working directory for step commands.
fn check_working_directory(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }

    if !dir.is_dir() {
        return Err(format!("Path is not a directory: {}", dir.display()).into());
    }

    info!("Working directory: {}", dir.display());
    Ok(())
}

/// Prints one line per step plus the run's Gantt chart.
fn print_summary(run: &WorkflowRun) {
    println!();
    println!("{}", "Step results:".bold());

    for step in &run.steps {
        let status = match step.status {
            StepStatus::Completed => step.status.as_str().green(),
            StepStatus::Failed => step.status.as_str().red(),
            StepStatus::Skipped => step.status.as_str().yellow(),
            _ => step.status.as_str().normal(),
        };

        match &step.error {
            Some(error) if step.status == StepStatus::Failed => {
                println!("  {:<24} {:<10} {}", step.name, status, error.dimmed())
            }
            _ => println!(
                "  {:<24} {:<10} attempts: {}",
                step.name, status, step.attempts
            ),
        }
    }

    if let Some(end) = run.completed_at {
        println!("{}", run.timeline.gantt_chart(end));
    }

    let headline = format!("Workflow '{}' {}", run.workflow_name, run.status);
    match run.status {
        RunStatus::Completed => println!("{}", headline.green().bold()),
        _ => println!("{}", headline.red().bold()),
    }
}

/// Main application entry point.
async fn run() -> Result<RunStatus, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    if let Some(dir) = &config.working_dir {
        check_working_directory(dir)?;
    }

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let workflow = load_definition(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!(
        "Workflow loaded: '{}' with {} steps (on_failure: {})",
        workflow.name,
        workflow.len(),
        workflow.on_failure
    );

    if config.dry_run {
        info!("Mode: DRY RUN (steps will not execute)");
        println!();
        if !config.lenient {
            if let Err(errors) = validate_definition(&workflow) {
                for e in &errors {
                    error!("{}", e);
                }
                return Err(format!("Workflow '{}' is invalid", workflow.name).into());
            }
        }
        for (round, names) in execution_layers(&workflow).iter().enumerate() {
            println!("Round {}: {}", round + 1, names.join(", "));
        }
        return Ok(RunStatus::Completed);
    }

    let orchestrator = WorkflowOrchestrator::with_config(
        OrchestratorConfig::default().with_validation(!config.lenient),
    );

    let mut handler = CommandHandler::new();
    if let Some(dir) = config.working_dir {
        handler = handler.with_working_dir(dir);
    }
    for step in workflow.steps.iter().filter(|s| s.command.is_some()) {
        orchestrator.register_handler(step.name.clone(), handler.clone());
    }

    let missing: Vec<&str> = workflow
        .steps
        .iter()
        .filter(|s| s.command.is_none())
        .map(|s| s.name.as_str())
        .collect();
    if !missing.is_empty() {
        warn!("Steps without a command will fail: {}", missing.join(", "));
    }

    let run = orchestrator.execute(&workflow, Some(config.context)).await?;
    print_summary(&run);

    if let Some(path) = config.report_path {
        save_run(&run, &path)?;
        info!("Report written to {}", path.display());
    }

    Ok(run.status)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(RunStatus::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("steprunner")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_arguments(&args(&[])).unwrap();
        assert_eq!(config.workflow_path, DEFAULT_WORKFLOW);
        assert!(!config.dry_run);
        assert!(!config.lenient);
        assert!(config.context.is_empty());
    }

    #[test]
    fn test_parse_flags() {
        let config = parse_arguments(&args(&[
            "build.yaml",
            "--dry-run",
            "--lenient",
            "--context",
            "jobs=4",
            "--context",
            "target=release",
            "--report",
            "out/run.json",
        ]))
        .unwrap();

        assert_eq!(config.workflow_path, "build.yaml");
        assert!(config.dry_run);
        assert!(config.lenient);
        assert_eq!(config.context.get("jobs"), Some(&json!(4)));
        assert_eq!(config.context.get("target"), Some(&json!("release")));
        assert_eq!(config.report_path, Some(PathBuf::from("out/run.json")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&["--bogus"])).is_err());
        assert!(parse_arguments(&args(&["--context"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "b.yaml"])).is_err());
    }

    #[test]
    fn test_context_entry() {
        assert_eq!(
            parse_context_entry("flags=[1,2]").unwrap(),
            ("flags".to_string(), json!([1, 2]))
        );
        assert_eq!(
            parse_context_entry("url=http://x/?a=b").unwrap(),
            ("url".to_string(), json!("http://x/?a=b"))
        );
        assert!(parse_context_entry("novalue").is_err());
        assert!(parse_context_entry("=1").is_err());
    }
}
