use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_service::{
    progress_channel, CancelPolicy, Engine, EngineConfig, ExecutionEvent, LogLevel, TaskStatus,
    WorkflowCompiler, WorkflowValidator,
};

/// Run a workflow file
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow YAML file
    #[arg(long = "file", short = 'f', value_name = "PATH")]
    pub file: PathBuf,

    /// Compile and build the task graph without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum number of parallel workers (0 = number of cores)
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub threads: usize,

    /// Policy applied to a failed task's dependents
    #[arg(long, value_name = "POLICY", default_value = "continue")]
    pub on_failure: CancelPolicy,

    /// Proceed even if static validation reports errors
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let workflow_path = &args.file;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    output::status("Compiling", &format!("{}", workflow_path.display()));
    let workflow = WorkflowCompiler::compile_file(workflow_path)
        .map_err(|e| color_eyre::eyre::eyre!("Compile error: {}", e))?;
    output::info(&format!("Workflow: {} tasks", workflow.tasks.len()));

    if let Err(errors) = WorkflowValidator::validate(&workflow) {
        output::error(&format!("{} validation error(s):", errors.len()));
        for error in &errors {
            output::error(&format!("  - {}", error));
        }
        if !args.force {
            std::process::exit(1);
        }
        output::warning("continuing despite validation errors (--force)");
    }

    let policy = args.on_failure;
    let config = EngineConfig {
        threads: args.threads,
        on_failure: policy,
        dry_run: args.dry_run,
    };

    let (tx, mut rx) = progress_channel();
    let engine = Engine::new(workflow).with_config(config).with_progress(tx);

    // Run in the background; render events in the foreground.
    let exec_handle = tokio::spawn(async move { engine.run().await });

    while let Some(event) = rx.recv().await {
        match &event {
            ExecutionEvent::WorkflowStarted {
                total_tasks,
                workers,
            } => {
                println!();
                output::header(&format!("Workflow ({} tasks, {} workers)", total_tasks, workers));
            }

            ExecutionEvent::WorkflowCompleted { success, duration } => {
                println!();
                if *success {
                    output::success(&format!(
                        "Workflow completed successfully in {:.2}s",
                        duration.as_secs_f64()
                    ));
                } else {
                    output::failure(&format!(
                        "Workflow failed after {:.2}s",
                        duration.as_secs_f64()
                    ));
                }
            }

            ExecutionEvent::PhaseStarted { phase, total_tasks } => {
                output::phase_header(&phase.to_string(), *total_tasks);
            }

            ExecutionEvent::PhaseCompleted { phase, duration } => {
                output::dim(&format!(
                    "  Phase '{}' done ({:.2}s)",
                    phase,
                    duration.as_secs_f64()
                ));
            }

            ExecutionEvent::TaskStarted { name, .. } => {
                println!("    Task '{}'", name);
            }

            ExecutionEvent::TaskOutput { output, .. } => {
                for line in output.lines() {
                    output::task_output(line);
                }
            }

            ExecutionEvent::TaskCompleted {
                name,
                status,
                duration,
                exit_code,
                ..
            } => {
                let exit_info = match exit_code {
                    Some(code) if *code != 0 => format!(" (exit code: {})", code),
                    _ => String::new(),
                };
                let line = format!(
                    "    Task '{}' {} ({:.2}s){}",
                    name,
                    status,
                    duration.as_secs_f64(),
                    exit_info
                );
                if *status == TaskStatus::Successful {
                    output::dim_success(&line);
                } else {
                    output::dim_failure(&line);
                }
            }

            ExecutionEvent::TaskCanceled { name, .. } => {
                output::warning(&format!("  Task '{}' canceled", name));
            }

            ExecutionEvent::TaskSkipped { name, reason, .. } => {
                output::dim(&format!("    Task '{}' skipped: {}", name, reason));
            }

            ExecutionEvent::Log { level, message } => match level {
                LogLevel::Error => output::error(message),
                LogLevel::Warning => output::warning(message),
                _ => output::dim(message),
            },
        }
    }

    let result = exec_handle
        .await?
        .map_err(|e| color_eyre::eyre::eyre!("Failed to build task graph: {}", e))?;

    let failed: Vec<_> = result
        .tasks
        .iter()
        .filter(|report| report.status == TaskStatus::Failed)
        .collect();
    let cleanup_failed = result
        .cleanup
        .iter()
        .filter(|report| report.status == TaskStatus::Failed)
        .count();
    if cleanup_failed > 0 {
        output::warning(&format!("{} cleanup action(s) failed", cleanup_failed));
    }

    if !failed.is_empty() && policy != CancelPolicy::Continue {
        std::process::exit(1);
    }

    Ok(())
}
