use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_service::{PlanNode, TaskDag, WorkflowCompiler};

/// Show the compiled execution plan
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the workflow YAML file
    #[arg(long = "file", short = 'f', value_name = "PATH")]
    pub file: PathBuf,

    /// Show the cleanup (reverse) direction instead
    #[arg(long)]
    pub reverse: bool,
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let workflow_path = &args.file;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    output::status("Compiling", &format!("{}", workflow_path.display()));
    let workflow = WorkflowCompiler::compile_file(workflow_path)
        .map_err(|e| color_eyre::eyre::eyre!("Compile error: {}", e))?;

    let dag = TaskDag::new(&workflow.tasks, args.reverse)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to build task graph: {}", e))?;

    let direction = if args.reverse { "cleanup" } else { "run" };
    println!();
    output::header(&format!(
        "Execution layers ({} direction, {} tasks)",
        direction,
        workflow.tasks.len()
    ));
    for (index, layer) in dag.layers().iter().enumerate() {
        let mut names = layer.clone();
        names.sort();
        println!("  layer {}: {}", index + 1, names.join(", "));
    }

    println!();
    output::header("Dependency trees (one per sink)");
    for (root, tree) in dag.execution_plan() {
        print_tree(root, tree, 1);
    }

    Ok(())
}

fn print_tree(name: &str, node: &PlanNode, depth: usize) {
    println!("{}{}", "  ".repeat(depth), name);
    for (child, sub) in node.children() {
        print_tree(child, sub, depth + 1);
    }
}
