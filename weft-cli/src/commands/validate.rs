use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_service::{WorkflowCompiler, WorkflowValidator};

/// Validate a workflow YAML file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow YAML file
    #[arg(long = "file", short = 'f', value_name = "PATH")]
    pub file: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let workflow_path = &args.file;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    output::status("Validating", &format!("{}", workflow_path.display()));

    // Step 1: compile (YAML syntax, structure, foreach expansion,
    // placeholder resolution)
    let workflow = match WorkflowCompiler::compile_file(workflow_path) {
        Ok(workflow) => workflow,
        Err(e) => {
            output::error(&format!("Compile error: {}", e));
            std::process::exit(1);
        }
    };

    output::check("YAML structure valid");

    let with_cleanup = workflow.tasks.iter().filter(|t| t.cleanup.is_some()).count();
    output::check(&format!(
        "Compiled: {} tasks ({} with cleanup)",
        workflow.tasks.len(),
        with_cleanup
    ));

    // Step 2: static validation (duplicate names, dangling dependencies)
    match WorkflowValidator::validate(&workflow) {
        Ok(()) => {
            output::check("Static validation passed");
        }
        Err(errors) => {
            output::error(&format!("{} validation error(s):", errors.len()));
            for error in &errors {
                output::error(&format!("  - {}", error));
            }
            std::process::exit(1);
        }
    }

    println!();
    output::success("Workflow is valid");

    Ok(())
}
