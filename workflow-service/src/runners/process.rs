// Process Runner
// Translates an action into a child-process invocation and captures
// its combined output

use crate::compiler::{Action, ArgValue, FlagValue, ACTION_KIND_PROCESS};

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Result of one action invocation. A non-zero exit, a spawn error, or
/// an unknown action kind all surface as `success == false` with the
/// captured output (or the error text) attached; the runner itself
/// never fails.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    fn spawn_failure(message: String, elapsed: Duration) -> Self {
        Self {
            success: false,
            exit_code: None,
            output: message,
            elapsed,
        }
    }
}

/// Executes `process` actions as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Expand the action's argument list in order: literals pass
    /// through, `{flag: value}` entries become `--flag=value`, and
    /// `{flag: [v1, v2]}` one `--flag=v` per element.
    pub fn build_args(action: &Action) -> Vec<String> {
        let mut args = Vec::new();
        for arg in &action.with.args {
            match arg {
                ArgValue::Literal(value) => args.push(value.render()),
                ArgValue::Flags(flags) => {
                    for (flag, value) in flags {
                        match value {
                            FlagValue::Scalar(scalar) => {
                                args.push(format!("--{}={}", flag, scalar))
                            }
                            FlagValue::List(items) => {
                                for item in items {
                                    args.push(format!("--{}={}", flag, item));
                                }
                            }
                        }
                    }
                }
            }
        }
        args
    }

    /// Run the action to completion, capturing stdout and stderr
    /// combined. The child is never killed from here; cancellation
    /// only prevents dispatch.
    pub async fn run(&self, action: &Action) -> ProcessOutcome {
        let start = Instant::now();

        if action.kind != ACTION_KIND_PROCESS {
            return ProcessOutcome::spawn_failure(
                format!("unsupported action kind '{}'", action.kind),
                start.elapsed(),
            );
        }

        let args = Self::build_args(action);
        let mut cmd = Command::new(&action.with.path);
        cmd.args(&args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                return ProcessOutcome::spawn_failure(
                    format!("failed to spawn '{}': {}", action.with.path, e),
                    start.elapsed(),
                );
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        ProcessOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined,
            elapsed: start.elapsed(),
        }
    }
}
