// Execution Events
// Progress reporting for workflow execution, drained by the caller
// over an unbounded channel

use crate::dag::TaskStatus;

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// The two sweeps of a run: forward over `do` actions, then reverse
/// over `cleanup` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Forward,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Forward => f.write_str("run"),
            Phase::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// Events emitted during workflow execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Workflow execution started
    WorkflowStarted { total_tasks: usize, workers: usize },

    /// Workflow execution completed
    WorkflowCompleted { success: bool, duration: Duration },

    /// A phase (forward or cleanup) started
    PhaseStarted { phase: Phase, total_tasks: usize },

    /// A phase completed
    PhaseCompleted { phase: Phase, duration: Duration },

    /// A worker was dispatched for a task
    TaskStarted { name: String, phase: Phase },

    /// A task reached a terminal status
    TaskCompleted {
        name: String,
        phase: Phase,
        status: TaskStatus,
        duration: Duration,
        exit_code: Option<i32>,
    },

    /// Combined output captured from a task's process
    TaskOutput {
        name: String,
        phase: Phase,
        output: String,
    },

    /// A task was canceled before its worker was dispatched
    TaskCanceled { name: String, phase: Phase },

    /// A task had nothing to run in this phase
    TaskSkipped {
        name: String,
        phase: Phase,
        reason: String,
    },

    /// Log message
    Log { level: LogLevel, message: String },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl ExecutionEvent {
    pub fn workflow_started(total_tasks: usize, workers: usize) -> Self {
        Self::WorkflowStarted {
            total_tasks,
            workers,
        }
    }

    pub fn workflow_completed(success: bool, duration: Duration) -> Self {
        Self::WorkflowCompleted { success, duration }
    }

    pub fn phase_started(phase: Phase, total_tasks: usize) -> Self {
        Self::PhaseStarted { phase, total_tasks }
    }

    pub fn phase_completed(phase: Phase, duration: Duration) -> Self {
        Self::PhaseCompleted { phase, duration }
    }

    pub fn task_started(name: impl Into<String>, phase: Phase) -> Self {
        Self::TaskStarted {
            name: name.into(),
            phase,
        }
    }

    pub fn task_completed(
        name: impl Into<String>,
        phase: Phase,
        status: TaskStatus,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TaskCompleted {
            name: name.into(),
            phase,
            status,
            duration,
            exit_code,
        }
    }

    pub fn task_output(name: impl Into<String>, phase: Phase, output: impl Into<String>) -> Self {
        Self::TaskOutput {
            name: name.into(),
            phase,
            output: output.into(),
        }
    }

    pub fn task_canceled(name: impl Into<String>, phase: Phase) -> Self {
        Self::TaskCanceled {
            name: name.into(),
            phase,
        }
    }

    pub fn task_skipped(name: impl Into<String>, phase: Phase, reason: impl Into<String>) -> Self {
        Self::TaskSkipped {
            name: name.into(),
            phase,
            reason: reason.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
