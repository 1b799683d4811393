// Workflow Models
// Typed forms of the compiled document: tasks, actions, foreach bindings

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;

/// A fully compiled workflow: every task expanded and grounded, in
/// source order (cartesian-product order for expanded tasks).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workflow {
    pub tasks: Vec<Task>,
}

impl Workflow {
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// One unit of work after foreach expansion and placeholder
/// substitution. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "task")]
    pub name: String,
    #[serde(rename = "depends-on", default)]
    pub depends_on: Vec<String>,
    #[serde(rename = "do")]
    pub action: Action,
    #[serde(default)]
    pub cleanup: Option<Action>,
}

/// An action descriptor: `this` selects the handler kind, `with`
/// carries the invocation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "this")]
    pub kind: String,
    pub with: ActionSpec,
}

/// The only action kind is `process`.
pub const ACTION_KIND_PROCESS: &str = "process";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub path: String,
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

/// One element of an action's argument list: a literal, or a mapping of
/// flag name to value(s) that expands to `--flag=value` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Literal(Scalar),
    Flags(BTreeMap<String, FlagValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

/// Scalar leaf usable as an argument, a flag value, or a substitution
/// target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Canonical printing used for `--flag=value` expansion: `true`,
    /// `42`, `1.5`, bare strings.
    pub fn render(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One `{variable, as}` pair from a task's `foreach` clause. A nested
/// `foreach` inside a binding is not supported and is ignored on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachBinding {
    pub variable: String,
    #[serde(rename = "as")]
    pub alias: String,
}
