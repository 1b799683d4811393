// Runners translate actions into concrete invocations

pub mod process;

pub use process::{ProcessOutcome, ProcessRunner};
