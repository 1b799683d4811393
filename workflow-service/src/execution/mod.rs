// Execution subsystem: engine orchestration and progress events

pub mod engine;
pub mod events;

pub use engine::{AbortHandle, Engine, EngineConfig, RunResult, TaskReport};
pub use events::{
    progress_channel, EventSender, ExecutionEvent, LogLevel, Phase, ProgressReceiver,
    ProgressSender,
};
