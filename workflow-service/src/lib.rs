// Workflow Service Library
// Compiles declarative YAML workflows into grounded task lists and
// executes them with dependency-aware parallelism

pub mod compiler;
pub mod dag;
pub mod execution;
pub mod graph;
pub mod runners;

// Re-export commonly used types
pub use compiler::{
    Action, ActionSpec, ArgValue, CompileError, FlagValue, ForeachBinding, Scalar, Task,
    TemplateError, ValidationError, Workflow, WorkflowCompiler, WorkflowValidator,
    ACTION_KIND_PROCESS,
};

pub use dag::{CancelPolicy, PlanNode, TaskDag, TaskStatus, UnknownPolicyError};

pub use execution::{
    progress_channel, AbortHandle, Engine, EngineConfig, EventSender, ExecutionEvent, LogLevel,
    Phase, ProgressReceiver, ProgressSender, RunResult, TaskReport,
};

pub use graph::{DependencyGraph, GraphError, GraphErrorKind};

pub use runners::{ProcessOutcome, ProcessRunner};
