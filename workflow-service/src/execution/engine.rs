// Workflow Engine
// Drives the task DAG to completion: drains ready tasks into a bounded
// pool of workers, feeds results back into the DAG, then repeats the
// sweep on a reversed DAG to execute cleanup actions.

use crate::compiler::{Action, Task, Workflow};
use crate::dag::{CancelPolicy, TaskDag, TaskStatus};
use crate::execution::events::{EventSender, ExecutionEvent, Phase, ProgressSender};
use crate::graph::GraphError;
use crate::runners::process::ProcessRunner;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Execution configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum parallel workers (0 = number of cores)
    pub threads: usize,
    /// Policy applied to a failed task's dependents
    pub on_failure: CancelPolicy,
    /// Build the graphs and report the plan without dispatching workers
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            on_failure: CancelPolicy::Continue,
            dry_run: false,
        }
    }
}

/// Requests an orderly stop: no new workers are dispatched, outstanding
/// workers run to completion, and remaining pending tasks are marked
/// canceled.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final record for one task in one phase.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub duration: Duration,
    pub output: String,
}

/// Outcome of a full two-phase run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Forward-phase reports, in completion order.
    pub tasks: Vec<TaskReport>,
    /// Cleanup-phase reports, in completion order.
    pub cleanup: Vec<TaskReport>,
    pub duration: Duration,
    /// True iff no forward task failed.
    pub success: bool,
}

/// Orchestrates a compiled workflow: forward sweep over `do` actions,
/// reverse sweep over `cleanup` actions.
///
/// Workers only run processes; every DAG mutation happens on the
/// engine's own loop, so a completion's `set_status` and
/// `cancel_dependents` are applied as one atomic pair.
pub struct Engine {
    tasks: Vec<Task>,
    config: EngineConfig,
    event_tx: Option<ProgressSender>,
    runner: ProcessRunner,
    abort: AbortHandle,
}

impl Engine {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            tasks: workflow.tasks,
            config: EngineConfig::default(),
            event_tx: None,
            runner: ProcessRunner::new(),
            abort: AbortHandle::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Handle for requesting an orderly stop from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    fn worker_count(&self) -> usize {
        if self.config.threads > 0 {
            self.config.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    /// Execute the workflow. Graph errors (cycles, self-references)
    /// surface here, before any process is spawned.
    pub async fn run(&self) -> Result<RunResult, GraphError> {
        let start = Instant::now();
        self.event_tx.send_event(ExecutionEvent::workflow_started(
            self.tasks.len(),
            self.worker_count(),
        ));

        // Both directions are built up front so graph errors surface
        // even in dry-run mode.
        let forward = TaskDag::new(&self.tasks, false)?;
        let reverse = TaskDag::new(&self.tasks, true)?;

        if self.config.dry_run {
            self.report_plan(&forward);
            let duration = start.elapsed();
            self.event_tx
                .send_event(ExecutionEvent::workflow_completed(true, duration));
            return Ok(RunResult {
                tasks: Vec::new(),
                cleanup: Vec::new(),
                duration,
                success: true,
            });
        }

        let tasks = self.run_phase(forward, Phase::Forward, None).await;
        let forward_statuses: HashMap<String, TaskStatus> = tasks
            .iter()
            .map(|report| (report.name.clone(), report.status))
            .collect();

        let cleanup = self
            .run_phase(reverse, Phase::Cleanup, Some(&forward_statuses))
            .await;

        let success = tasks.iter().all(|r| r.status != TaskStatus::Failed);
        let duration = start.elapsed();
        self.event_tx
            .send_event(ExecutionEvent::workflow_completed(success, duration));

        Ok(RunResult {
            tasks,
            cleanup,
            duration,
            success,
        })
    }

    fn report_plan(&self, dag: &TaskDag) {
        let layers = dag.layers();
        self.event_tx.send_event(ExecutionEvent::info(format!(
            "dry run: {} tasks in {} layers",
            self.tasks.len(),
            layers.len()
        )));
        for (index, layer) in layers.iter().enumerate() {
            let mut names = layer.clone();
            names.sort();
            self.event_tx.send_event(ExecutionEvent::info(format!(
                "layer {}: {}",
                index + 1,
                names.join(", ")
            )));
        }
    }

    /// Drive one DAG direction to completion.
    ///
    /// The loop alternates between draining everything currently ready
    /// and awaiting one worker completion; it never polls while nothing
    /// can change. For the cleanup phase, `forward_statuses` gates which
    /// tasks actually run: only tasks that finished the forward phase
    /// `Successful` or `Failed` (and carry a cleanup action) are
    /// dispatched, the rest are retired immediately so their
    /// dependents unblock.
    async fn run_phase(
        &self,
        mut dag: TaskDag,
        phase: Phase,
        forward_statuses: Option<&HashMap<String, TaskStatus>>,
    ) -> Vec<TaskReport> {
        let phase_start = Instant::now();
        self.event_tx
            .send_event(ExecutionEvent::phase_started(phase, self.tasks.len()));

        let task_index: HashMap<&str, &Task> =
            self.tasks.iter().map(|t| (t.name.as_str(), t)).collect();
        let semaphore = Arc::new(Semaphore::new(self.worker_count()));
        let mut workers = JoinSet::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut reports = Vec::new();

        loop {
            let ready: Vec<String> = dag
                .available_tasks()
                .into_iter()
                .filter(|name| !in_flight.contains(name))
                .collect();

            let mut advanced = false;
            for name in ready {
                if self.abort.is_aborted() || dag.should_be_canceled(&name) {
                    dag.set_status(&name, TaskStatus::Canceled);
                    self.event_tx
                        .send_event(ExecutionEvent::task_canceled(&name, phase));
                    reports.push(TaskReport {
                        name,
                        status: TaskStatus::Canceled,
                        duration: Duration::ZERO,
                        output: String::new(),
                    });
                    advanced = true;
                    continue;
                }

                let Some(task) = task_index.get(name.as_str()) else {
                    // A node with no task behind it cannot be run;
                    // stranded dependents are swept up after the loop.
                    continue;
                };

                let Some(action) = self.action_for(task, phase, forward_statuses) else {
                    dag.set_status(&name, TaskStatus::Successful);
                    self.event_tx.send_event(ExecutionEvent::task_skipped(
                        &name,
                        phase,
                        "nothing to clean up",
                    ));
                    reports.push(TaskReport {
                        name,
                        status: TaskStatus::Successful,
                        duration: Duration::ZERO,
                        output: String::new(),
                    });
                    advanced = true;
                    continue;
                };

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore never closes");
                in_flight.insert(name.clone());
                self.event_tx
                    .send_event(ExecutionEvent::task_started(&name, phase));

                let runner = self.runner.clone();
                workers.spawn(async move {
                    let outcome = runner.run(&action).await;
                    drop(permit);
                    (name, outcome)
                });
            }

            if advanced {
                // Statuses changed without any worker involved; new
                // leaves may already be ready.
                continue;
            }

            match workers.join_next().await {
                Some(Ok((name, outcome))) => {
                    in_flight.remove(&name);
                    let status = if outcome.success {
                        TaskStatus::Successful
                    } else {
                        TaskStatus::Failed
                    };

                    // One atomic update per completion event.
                    dag.set_status(&name, status);
                    if status == TaskStatus::Failed && phase == Phase::Forward {
                        dag.cancel_dependents(&name, self.config.on_failure);
                    }

                    if !outcome.output.is_empty() {
                        self.event_tx.send_event(ExecutionEvent::task_output(
                            &name,
                            phase,
                            &outcome.output,
                        ));
                    }
                    self.event_tx.send_event(ExecutionEvent::task_completed(
                        &name,
                        phase,
                        status,
                        outcome.elapsed,
                        outcome.exit_code,
                    ));
                    reports.push(TaskReport {
                        name,
                        status,
                        duration: outcome.elapsed,
                        output: outcome.output,
                    });
                }
                Some(Err(join_error)) => {
                    self.event_tx.send_event(ExecutionEvent::error(format!(
                        "worker terminated abnormally: {}",
                        join_error
                    )));
                }
                None => break,
            }
        }

        // Anything still pending never became schedulable (its
        // dependencies never completed); retire it as canceled.
        for task in &self.tasks {
            if dag.status_of(&task.name) == TaskStatus::Pending {
                dag.set_status(&task.name, TaskStatus::Canceled);
                self.event_tx.send_event(ExecutionEvent::task_skipped(
                    &task.name,
                    phase,
                    "dependencies never completed",
                ));
                reports.push(TaskReport {
                    name: task.name.clone(),
                    status: TaskStatus::Canceled,
                    duration: Duration::ZERO,
                    output: String::new(),
                });
            }
        }

        self.event_tx
            .send_event(ExecutionEvent::phase_completed(phase, phase_start.elapsed()));
        reports
    }

    /// The action a task contributes to this phase, if it should run at
    /// all.
    fn action_for(
        &self,
        task: &Task,
        phase: Phase,
        forward_statuses: Option<&HashMap<String, TaskStatus>>,
    ) -> Option<Action> {
        match phase {
            Phase::Forward => Some(task.action.clone()),
            Phase::Cleanup => {
                let ran_forward = forward_statuses
                    .and_then(|statuses| statuses.get(&task.name))
                    .map(|status| {
                        matches!(status, TaskStatus::Successful | TaskStatus::Failed)
                    })
                    .unwrap_or(false);
                if ran_forward {
                    task.cleanup.clone()
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ActionSpec, ArgValue, Scalar};
    use crate::execution::events::progress_channel;

    use std::path::Path;

    fn shell_action(script: String) -> Action {
        Action {
            kind: "process".to_string(),
            with: ActionSpec {
                path: "sh".to_string(),
                args: vec![
                    ArgValue::Literal(Scalar::String("-c".to_string())),
                    ArgValue::Literal(Scalar::String(script)),
                ],
            },
        }
    }

    fn logging_task(name: &str, depends_on: &[&str], log: &Path, fail: bool) -> Task {
        let mut script = format!("echo {} >> {}", name, log.display());
        if fail {
            script.push_str("; exit 1");
        }
        Task {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            action: shell_action(script),
            cleanup: None,
        }
    }

    fn with_cleanup(mut task: Task, log: &Path) -> Task {
        task.cleanup = Some(shell_action(format!(
            "echo clean-{} >> {}",
            task.name,
            log.display()
        )));
        task
    }

    fn log_lines(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn status_of(reports: &[TaskReport], name: &str) -> TaskStatus {
        reports.iter().find(|r| r.name == name).unwrap().status
    }

    #[tokio::test]
    async fn test_linear_chain_runs_in_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("a", &["b"], &log, false),
                logging_task("b", &["c"], &log, false),
                logging_task("c", &[], &log, false),
            ],
        };

        let result = Engine::new(workflow).run().await.unwrap();

        assert!(result.success);
        assert_eq!(log_lines(&log), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_failure_cancels_dependents_with_abort_all() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("a", &["b"], &log, false),
                logging_task("b", &[], &log, true),
            ],
        };

        let engine = Engine::new(workflow).with_config(EngineConfig {
            on_failure: CancelPolicy::AbortAll,
            ..Default::default()
        });
        let result = engine.run().await.unwrap();

        assert!(!result.success);
        assert_eq!(status_of(&result.tasks, "b"), TaskStatus::Failed);
        assert_eq!(status_of(&result.tasks, "a"), TaskStatus::Canceled);
        // a's process never ran.
        assert_eq!(log_lines(&log), vec!["b"]);
    }

    #[tokio::test]
    async fn test_continue_policy_lets_unrelated_branches_finish() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("bad", &[], &log, true),
                logging_task("good", &[], &log, false),
                logging_task("after-bad", &["bad"], &log, false),
            ],
        };

        let result = Engine::new(workflow).run().await.unwrap();

        assert!(!result.success);
        assert_eq!(status_of(&result.tasks, "bad"), TaskStatus::Failed);
        assert_eq!(status_of(&result.tasks, "good"), TaskStatus::Successful);
        // Under `continue`, even the failed task's dependents proceed.
        assert_eq!(status_of(&result.tasks, "after-bad"), TaskStatus::Successful);
    }

    #[tokio::test]
    async fn test_abort_related_flows_spares_other_flow() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("sink", &["bad"], &log, false),
                logging_task("bad", &[], &log, true),
                logging_task("other-sink", &["other"], &log, false),
                logging_task("other", &[], &log, false),
            ],
        };

        let engine = Engine::new(workflow).with_config(EngineConfig {
            threads: 1,
            on_failure: CancelPolicy::AbortRelatedFlows,
            ..Default::default()
        });
        let result = engine.run().await.unwrap();

        assert_eq!(status_of(&result.tasks, "sink"), TaskStatus::Canceled);
        assert_eq!(status_of(&result.tasks, "other"), TaskStatus::Successful);
        assert_eq!(status_of(&result.tasks, "other-sink"), TaskStatus::Successful);
    }

    #[tokio::test]
    async fn test_cleanup_runs_in_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                with_cleanup(logging_task("a", &["b"], &log, false), &log),
                with_cleanup(logging_task("b", &[], &log, false), &log),
            ],
        };

        let result = Engine::new(workflow).run().await.unwrap();

        assert!(result.success);
        assert_eq!(
            log_lines(&log),
            vec!["b", "a", "clean-a", "clean-b"],
            "cleanup must sweep dependents before dependencies"
        );
    }

    #[tokio::test]
    async fn test_task_without_cleanup_unblocks_reverse_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        // b has no cleanup; a's cleanup must still run after b is
        // retired on the reverse DAG.
        let workflow = Workflow {
            tasks: vec![
                logging_task("a", &["b"], &log, false),
                with_cleanup(logging_task("b", &[], &log, false), &log),
            ],
        };

        let result = Engine::new(workflow).run().await.unwrap();

        assert!(result.success);
        assert_eq!(log_lines(&log), vec!["b", "a", "clean-b"]);
        assert_eq!(status_of(&result.cleanup, "a"), TaskStatus::Successful);
    }

    #[tokio::test]
    async fn test_cleanup_skipped_for_canceled_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                with_cleanup(logging_task("top", &["bad"], &log, false), &log),
                with_cleanup(logging_task("bad", &[], &log, true), &log),
            ],
        };

        let engine = Engine::new(workflow).with_config(EngineConfig {
            on_failure: CancelPolicy::AbortAll,
            ..Default::default()
        });
        let result = engine.run().await.unwrap();

        assert_eq!(status_of(&result.tasks, "top"), TaskStatus::Canceled);
        let lines = log_lines(&log);
        // bad ran and failed, so its cleanup runs; top never ran, so
        // its cleanup must not.
        assert!(lines.contains(&"clean-bad".to_string()));
        assert!(!lines.contains(&"clean-top".to_string()));
    }

    #[tokio::test]
    async fn test_dry_run_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![logging_task("a", &[], &log, false)],
        };

        let engine = Engine::new(workflow).with_config(EngineConfig {
            dry_run: true,
            ..Default::default()
        });
        let result = engine.run().await.unwrap();

        assert!(result.success);
        assert!(result.tasks.is_empty());
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn test_dry_run_still_surfaces_graph_errors() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("a", &["b"], &log, false),
                logging_task("b", &["a"], &log, false),
            ],
        };

        let engine = Engine::new(workflow).with_config(EngineConfig {
            dry_run: true,
            ..Default::default()
        });
        assert!(engine.run().await.is_err());
    }

    #[tokio::test]
    async fn test_abort_cancels_pending_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("a", &[], &log, false),
                logging_task("b", &["a"], &log, false),
            ],
        };

        let engine = Engine::new(workflow);
        engine.abort();
        let result = engine.run().await.unwrap();

        assert_eq!(status_of(&result.tasks, "a"), TaskStatus::Canceled);
        assert_eq!(status_of(&result.tasks, "b"), TaskStatus::Canceled);
        assert!(log_lines(&log).is_empty());
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![logging_task("only", &[], &log, false)],
        };

        let (tx, mut rx) = progress_channel();
        let engine = Engine::new(workflow).with_progress(tx);
        engine.run().await.unwrap();

        let mut saw_started = false;
        let mut saw_completed = false;
        let mut saw_workflow_end = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecutionEvent::TaskStarted { ref name, phase } => {
                    if name == "only" && phase == Phase::Forward {
                        saw_started = true;
                    }
                }
                ExecutionEvent::TaskCompleted { status, .. } => {
                    if status == TaskStatus::Successful {
                        saw_completed = true;
                    }
                }
                ExecutionEvent::WorkflowCompleted { success, .. } => {
                    saw_workflow_end = success;
                }
                _ => {}
            }
        }
        assert!(saw_started && saw_completed && saw_workflow_end);
    }

    #[tokio::test]
    async fn test_diamond_runs_middle_layer_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let workflow = Workflow {
            tasks: vec![
                logging_task("a", &["b", "c"], &log, false),
                logging_task("b", &["d"], &log, false),
                logging_task("c", &["d"], &log, false),
                logging_task("d", &[], &log, false),
            ],
        };

        let result = Engine::new(workflow).run().await.unwrap();

        assert!(result.success);
        let lines = log_lines(&log);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "d");
        assert_eq!(lines[3], "a");
        // b and c are a layer; their mutual order is unspecified.
        assert!(lines[1..3].contains(&"b".to_string()));
        assert!(lines[1..3].contains(&"c".to_string()));
    }
}
