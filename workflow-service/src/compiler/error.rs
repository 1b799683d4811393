// Compiler error types

use crate::compiler::template::TemplateError;

use std::fmt;
use thiserror::Error;

/// Errors that halt compilation before any task runs
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read workflow file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid workflow structure: {0}")]
    InvalidStructure(String),

    #[error("task '{task}' is malformed: {source}")]
    TaskShape {
        task: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("foreach in task '{task}' references undefined variable '{variable}'")]
    ForeachUnknownVariable { task: String, variable: String },

    #[error("foreach variable '{variable}' in task '{task}' is not a sequence")]
    ForeachNotSequence { task: String, variable: String },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A finding from the static validation pass. Validation never aborts
/// compilation by itself; the caller decides whether to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    pub task: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error at task '{}': {}", self.task, self.message)
    }
}

impl std::error::Error for ValidationError {}
