use color_eyre::Result;

mod commands;
mod output;

use clap::{Parser, Subcommand};

/// Weft - declarative workflow runner
///
/// Compile a YAML workflow into a task graph and execute it with
/// dependency-aware parallelism, then sweep cleanup actions in
/// reverse order.
#[derive(Parser, Debug)]
#[command(name = "weft", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow file
    Run(commands::run::RunArgs),

    /// Validate a workflow file without executing it
    Validate(commands::validate::ValidateArgs),

    /// Show the compiled execution plan
    Plan(commands::plan::PlanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Plan(args) => commands::plan::execute(args),
    }
}
