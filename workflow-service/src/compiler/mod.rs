// Workflow Compiler
// Loads the YAML document, normalizes mapping keys to strings, expands
// foreach clauses by cartesian product, substitutes placeholders, and
// yields the compiled task list.

pub mod error;
pub mod models;
pub mod template;
pub mod validate;

pub use error::{CompileError, ValidationError};
pub use models::{
    Action, ActionSpec, ArgValue, FlagValue, ForeachBinding, Scalar, Task, Workflow,
    ACTION_KIND_PROCESS,
};
pub use template::{TemplateError, TemplateErrorKind};
pub use validate::WorkflowValidator;

use serde_yaml::{Mapping, Value};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Turns a raw workflow document into the canonical, fully-resolved
/// task list. Compilation-time errors halt the pipeline before any
/// task runs.
pub struct WorkflowCompiler;

impl WorkflowCompiler {
    /// Compile a workflow from a file on disk.
    pub fn compile_file(path: impl AsRef<Path>) -> Result<Workflow, CompileError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::compile(&source)
    }

    /// Compile a workflow from YAML source.
    pub fn compile(source: &str) -> Result<Workflow, CompileError> {
        let raw: Value = serde_yaml::from_str(source)?;
        let raw = normalize_keys(raw);

        if !raw.is_mapping() {
            return Err(CompileError::InvalidStructure(
                "workflow document must be a mapping".to_string(),
            ));
        }

        let variables = match raw.get("variables") {
            Some(Value::Mapping(mapping)) => variables_map(mapping),
            Some(Value::Null) | None => HashMap::new(),
            Some(_) => {
                return Err(CompileError::InvalidStructure(
                    "'variables' must be a mapping".to_string(),
                ))
            }
        };

        let tasks_value = raw
            .get("tasks")
            .ok_or_else(|| CompileError::InvalidStructure("missing 'tasks' sequence".to_string()))?;
        let raw_tasks = tasks_value.as_sequence().ok_or_else(|| {
            CompileError::InvalidStructure("'tasks' must be a sequence".to_string())
        })?;

        let mut tasks = Vec::new();
        for (index, raw_task) in raw_tasks.iter().enumerate() {
            let mapping = raw_task.as_mapping().ok_or_else(|| {
                CompileError::InvalidStructure(format!("task #{} must be a mapping", index + 1))
            })?;
            for resolved in expand_task(mapping, &variables)? {
                let name = task_name(&resolved);
                let task: Task = serde_yaml::from_value(Value::Mapping(resolved))
                    .map_err(|source| CompileError::TaskShape { task: name, source })?;
                tasks.push(task);
            }
        }

        Ok(Workflow { tasks })
    }
}

/// Expand one raw task mapping into fully grounded records. A task with
/// no `foreach` clause substitutes against the top-level variables and
/// emits a single record; otherwise one record per tuple of the
/// cartesian product of the referenced sequences, each rendered against
/// a fresh variables map extended with the tuple's `as` bindings. The
/// source mapping is never mutated.
fn expand_task(
    task: &Mapping,
    variables: &HashMap<String, Value>,
) -> Result<Vec<Mapping>, CompileError> {
    let name = task_name(task);

    let Some(foreach_value) = task.get("foreach") else {
        return Ok(vec![substitute_mapping(task, variables)?]);
    };

    let bindings: Vec<ForeachBinding> = serde_yaml::from_value(foreach_value.clone())
        .map_err(|source| CompileError::TaskShape {
            task: name.clone(),
            source,
        })?;

    let mut sequences = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        let value = variables.get(&binding.variable).ok_or_else(|| {
            CompileError::ForeachUnknownVariable {
                task: name.clone(),
                variable: binding.variable.clone(),
            }
        })?;
        let sequence = value
            .as_sequence()
            .ok_or_else(|| CompileError::ForeachNotSequence {
                task: name.clone(),
                variable: binding.variable.clone(),
            })?;
        sequences.push(sequence);
    }

    // Fresh record with the foreach clause stripped.
    let body: Mapping = task
        .iter()
        .filter(|(key, _)| key.as_str() != Some("foreach"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut expanded = Vec::new();
    for combination in cartesian_product(&sequences) {
        let mut scoped = variables.clone();
        for (binding, item) in bindings.iter().zip(combination) {
            scoped.insert(binding.alias.clone(), item.clone());
        }
        expanded.push(substitute_mapping(&body, &scoped)?);
    }
    Ok(expanded)
}

/// Cartesian product in declared order: the leftmost sequence varies
/// slowest. An empty binding list yields no tuples.
fn cartesian_product<'a>(sequences: &[&'a Vec<Value>]) -> Vec<Vec<&'a Value>> {
    if sequences.is_empty() {
        return Vec::new();
    }
    let mut combinations: Vec<Vec<&Value>> = vec![Vec::new()];
    for sequence in sequences {
        let mut next = Vec::with_capacity(combinations.len() * sequence.len());
        for combination in &combinations {
            for item in sequence.iter() {
                let mut extended = combination.clone();
                extended.push(item);
                next.push(extended);
            }
        }
        combinations = next;
    }
    combinations
}

fn substitute_mapping(
    mapping: &Mapping,
    variables: &HashMap<String, Value>,
) -> Result<Mapping, TemplateError> {
    let mut out = Mapping::new();
    for (key, value) in mapping {
        out.insert(key.clone(), substitute_value(value, variables)?);
    }
    Ok(out)
}

/// Walk a value tree rendering placeholders in every string leaf. Keys
/// and non-string leaves pass through unchanged.
fn substitute_value(
    value: &Value,
    variables: &HashMap<String, Value>,
) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => Ok(Value::String(template::render(s, variables)?)),
        Value::Sequence(items) => Ok(Value::Sequence(
            items
                .iter()
                .map(|item| substitute_value(item, variables))
                .collect::<Result<_, _>>()?,
        )),
        Value::Mapping(mapping) => Ok(Value::Mapping(substitute_mapping(mapping, variables)?)),
        other => Ok(other.clone()),
    }
}

/// Recursively coerce every mapping key to a string. Non-string scalar
/// keys use their canonical printing; values are recursed into.
fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Mapping(mapping) => {
            let mut out = Mapping::new();
            for (key, val) in mapping {
                out.insert(Value::String(key_string(&key)), normalize_keys(val));
            }
            Value::Mapping(out)
        }
        Value::Sequence(items) => {
            Value::Sequence(items.into_iter().map(normalize_keys).collect())
        }
        other => other,
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn variables_map(mapping: &Mapping) -> HashMap<String, Value> {
    mapping
        .iter()
        .filter_map(|(key, value)| key.as_str().map(|k| (k.to_string(), value.clone())))
        .collect()
}

fn task_name(task: &Mapping) -> String {
    task.get("task")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}
