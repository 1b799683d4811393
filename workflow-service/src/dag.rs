// Task DAG
// Wraps the dependency graph with task lifecycle status, cancellation
// bookkeeping, and the execution-plan trees used by cancel policies.

use crate::compiler::Task;
use crate::graph::{DependencyGraph, GraphError};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a task within one DAG direction. Statuses are
/// monotonic: once terminal, a task never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Successful,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Successful => "successful",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Policy applied to a failed task's dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Keep going; nothing is canceled.
    #[default]
    Continue,
    /// Cancel every task in every execution-plan tree.
    AbortAll,
    /// Cancel the remaining tasks of every root flow containing the
    /// failed task; unrelated flows proceed.
    AbortRelatedFlows,
}

impl fmt::Display for CancelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CancelPolicy::Continue => "continue",
            CancelPolicy::AbortAll => "abort-all",
            CancelPolicy::AbortRelatedFlows => "abort-related-flows",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct UnknownPolicyError(pub String);

impl fmt::Display for UnknownPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown cancel policy '{}' (expected continue, abort-all, or abort-related-flows)",
            self.0
        )
    }
}

impl std::error::Error for UnknownPolicyError {}

impl FromStr for CancelPolicy {
    type Err = UnknownPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(CancelPolicy::Continue),
            "abort-all" => Ok(CancelPolicy::AbortAll),
            "abort-related-flows" => Ok(CancelPolicy::AbortRelatedFlows),
            other => Err(UnknownPolicyError(other.to_string())),
        }
    }
}

/// One node of an execution-plan tree: task name -> sub-tree of its
/// declared parents. Shared sub-structures are materialized by value,
/// so the plan stays a pure tree even when a task has many dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanNode {
    children: BTreeMap<String, PlanNode>,
}

impl PlanNode {
    pub fn children(&self) -> &BTreeMap<String, PlanNode> {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// True iff `name` appears anywhere in this sub-tree.
    pub fn contains(&self, name: &str) -> bool {
        self.children
            .iter()
            .any(|(child, sub)| child == name || sub.contains(name))
    }

    fn collect_into(&self, out: &mut HashSet<String>) {
        for (child, sub) in &self.children {
            out.insert(child.clone());
            sub.collect_into(out);
        }
    }
}

/// A compiled task list arranged for execution in one direction.
///
/// Owns the dependency graph plus the per-task bookkeeping the engine
/// needs: declared-order parent lists, lifecycle statuses, the set of
/// tasks marked for cancellation, and the execution-plan trees rooted
/// at each sink.
#[derive(Debug, Clone)]
pub struct TaskDag {
    graph: DependencyGraph,
    dependency_tree: HashMap<String, Vec<String>>,
    status: HashMap<String, TaskStatus>,
    to_cancel: HashSet<String>,
    execution_plan: BTreeMap<String, PlanNode>,
}

impl TaskDag {
    /// Build the DAG from compiled tasks. With `reverse` set, every
    /// declared edge is transposed so cleanup runs dependents-first.
    /// Self-referential or cyclic dependencies abort the build.
    pub fn new(tasks: &[Task], reverse: bool) -> Result<Self, GraphError> {
        let mut graph = DependencyGraph::new();
        let mut dependency_tree = HashMap::with_capacity(tasks.len());
        let mut status = HashMap::with_capacity(tasks.len());

        for task in tasks {
            graph.add_node(&task.name);
            for parent in &task.depends_on {
                if reverse {
                    graph.depend_on(parent, &task.name)?;
                } else {
                    graph.depend_on(&task.name, parent)?;
                }
            }
            // Declared parents verbatim: order (and duplicates) feed
            // plan construction.
            dependency_tree.insert(task.name.clone(), task.depends_on.clone());
            status.insert(task.name.clone(), TaskStatus::Pending);
        }

        let execution_plan = build_execution_plan(&dependency_tree);

        Ok(Self {
            graph,
            dependency_tree,
            status,
            to_cancel: HashSet::new(),
            execution_plan,
        })
    }

    /// Tasks ready or unblocked for execution, in topological order,
    /// restricted to tasks still pending.
    pub fn available_tasks(&self) -> Vec<String> {
        self.graph
            .top_sorted()
            .into_iter()
            .filter(|name| self.status.get(name) == Some(&TaskStatus::Pending))
            .collect()
    }

    /// Independent layers of the remaining graph.
    pub fn layers(&self) -> Vec<Vec<String>> {
        self.graph.top_sorted_layers()
    }

    /// Record a terminal status and retire the node from the graph so
    /// leaf-peeling advances. Terminal statuses never change; setting a
    /// status on an already-terminal task is a no-op.
    pub fn set_status(&mut self, name: &str, status: TaskStatus) {
        debug_assert!(status.is_terminal(), "tasks cannot return to pending");
        match self.status.get_mut(name) {
            Some(current) if *current == TaskStatus::Pending => {
                *current = status;
                self.graph.remove(name);
            }
            _ => {}
        }
    }

    /// Current status; unknown names read as pending.
    pub fn status_of(&self, name: &str) -> TaskStatus {
        self.status
            .get(name)
            .copied()
            .unwrap_or(TaskStatus::Pending)
    }

    pub fn statuses(&self) -> &HashMap<String, TaskStatus> {
        &self.status
    }

    pub fn dependency_tree(&self) -> &HashMap<String, Vec<String>> {
        &self.dependency_tree
    }

    /// One tree per root task (a task no other task depends on).
    pub fn execution_plan(&self) -> &BTreeMap<String, PlanNode> {
        &self.execution_plan
    }

    /// Mark a single task for cancellation. Only pending tasks can be
    /// marked; returns whether the mark was applied.
    pub fn cancel_task(&mut self, name: &str) -> bool {
        if self.status_of(name) == TaskStatus::Pending {
            self.to_cancel.insert(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn should_be_canceled(&self, name: &str) -> bool {
        self.to_cancel.contains(name)
    }

    pub fn tasks_to_cancel(&self) -> &HashSet<String> {
        &self.to_cancel
    }

    /// Apply the cancel policy after `name` failed. Must be called
    /// together with the failing `set_status` so the pair is observed
    /// atomically by the scheduler.
    pub fn cancel_dependents(&mut self, name: &str, policy: CancelPolicy) {
        match policy {
            CancelPolicy::Continue => {}
            CancelPolicy::AbortAll => {
                for (root, tree) in &self.execution_plan {
                    self.to_cancel.insert(root.clone());
                    tree.collect_into(&mut self.to_cancel);
                }
            }
            CancelPolicy::AbortRelatedFlows => {
                let mut related = HashSet::new();
                for (root, tree) in &self.execution_plan {
                    if root == name || tree.contains(name) {
                        related.insert(root.clone());
                        tree.collect_into(&mut related);
                    }
                }
                for task in related {
                    if !matches!(
                        self.status_of(&task),
                        TaskStatus::Failed | TaskStatus::Successful
                    ) {
                        self.to_cancel.insert(task);
                    }
                }
            }
        }
    }
}

/// Roots are tasks that appear in the dependency tree but never as a
/// parent of any other task; each gets its own plan tree.
fn build_execution_plan(
    dependency_tree: &HashMap<String, Vec<String>>,
) -> BTreeMap<String, PlanNode> {
    let parents: HashSet<&String> = dependency_tree.values().flatten().collect();

    dependency_tree
        .keys()
        .filter(|name| !parents.contains(name))
        .map(|root| (root.clone(), subtask_plan(root, dependency_tree)))
        .collect()
}

fn subtask_plan(name: &str, dependency_tree: &HashMap<String, Vec<String>>) -> PlanNode {
    let mut node = PlanNode::default();
    if let Some(parents) = dependency_tree.get(name) {
        for parent in parents {
            node.children
                .insert(parent.clone(), subtask_plan(parent, dependency_tree));
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Action, ActionSpec};

    fn task(name: &str, depends_on: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            action: Action {
                kind: "process".to_string(),
                with: ActionSpec {
                    path: "/bin/true".to_string(),
                    args: Vec::new(),
                },
            },
            cleanup: None,
        }
    }

    fn linear_chain() -> Vec<Task> {
        // a depends-on b, b depends-on c, c independent.
        vec![task("a", &["b"]), task("b", &["c"]), task("c", &[])]
    }

    fn diamond() -> Vec<Task> {
        vec![
            task("a", &["b", "c"]),
            task("b", &["d"]),
            task("c", &["d"]),
            task("d", &[]),
        ]
    }

    #[test]
    fn test_linear_chain_scheduling() {
        let mut dag = TaskDag::new(&linear_chain(), false).unwrap();

        assert_eq!(dag.available_tasks(), vec!["c"]);
        dag.set_status("c", TaskStatus::Successful);
        assert_eq!(dag.available_tasks(), vec!["b"]);
        dag.set_status("b", TaskStatus::Successful);
        assert_eq!(dag.available_tasks(), vec!["a"]);
        dag.set_status("a", TaskStatus::Successful);
        assert!(dag.available_tasks().is_empty());
    }

    #[test]
    fn test_linear_chain_execution_plan() {
        let dag = TaskDag::new(&linear_chain(), false).unwrap();
        let plan = dag.execution_plan();

        assert_eq!(plan.len(), 1);
        let a = &plan["a"];
        assert_eq!(a.children().len(), 1);
        let b = &a.children()["b"];
        assert_eq!(b.children().len(), 1);
        let c = &b.children()["c"];
        assert!(c.is_empty());
    }

    #[test]
    fn test_reverse_is_transpose() {
        let tasks = diamond();
        let forward = TaskDag::new(&tasks, false).unwrap();
        let reverse = TaskDag::new(&tasks, true).unwrap();

        for task in &tasks {
            for parent in &task.depends_on {
                assert!(forward.graph.has_dependent(parent, &task.name));
                assert!(reverse.graph.has_dependent(&task.name, parent));
            }
        }

        // Cleanup order starts at the sink.
        assert_eq!(reverse.available_tasks()[0], "a");
    }

    #[test]
    fn test_cycle_is_fatal() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        let err = TaskDag::new(&tasks, false).unwrap_err();
        assert_eq!(err.kind, crate::graph::GraphErrorKind::Cycle);
    }

    #[test]
    fn test_self_reference_is_fatal() {
        let tasks = vec![task("a", &["a"])];
        assert!(TaskDag::new(&tasks, false).is_err());
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut dag = TaskDag::new(&linear_chain(), false).unwrap();
        dag.set_status("c", TaskStatus::Failed);
        dag.set_status("c", TaskStatus::Successful);
        assert_eq!(dag.status_of("c"), TaskStatus::Failed);
    }

    #[test]
    fn test_isolated_task_is_available() {
        let tasks = vec![task("solo", &[]), task("a", &["b"]), task("b", &[])];
        let dag = TaskDag::new(&tasks, false).unwrap();
        assert!(dag.available_tasks().contains(&"solo".to_string()));
    }

    #[test]
    fn test_cancel_task_only_when_pending() {
        let mut dag = TaskDag::new(&linear_chain(), false).unwrap();
        dag.set_status("c", TaskStatus::Successful);
        assert!(!dag.cancel_task("c"));
        assert!(dag.cancel_task("b"));
        assert!(dag.should_be_canceled("b"));
        assert!(!dag.should_be_canceled("a"));
    }

    #[test]
    fn test_abort_all_marks_every_plan_task() {
        let mut dag = TaskDag::new(&diamond(), false).unwrap();
        dag.set_status("d", TaskStatus::Successful);
        dag.set_status("b", TaskStatus::Failed);
        dag.cancel_dependents("b", CancelPolicy::AbortAll);

        for name in ["a", "b", "c", "d"] {
            assert!(dag.should_be_canceled(name), "{} not marked", name);
        }
    }

    #[test]
    fn test_continue_marks_nothing() {
        let mut dag = TaskDag::new(&diamond(), false).unwrap();
        dag.set_status("d", TaskStatus::Successful);
        dag.set_status("b", TaskStatus::Failed);
        dag.cancel_dependents("b", CancelPolicy::Continue);
        assert!(dag.tasks_to_cancel().is_empty());
    }

    #[test]
    fn test_abort_related_flows_spares_terminal_tasks() {
        // Diamond plus an unrelated flow x -> y.
        let mut tasks = diamond();
        tasks.push(task("x", &["y"]));
        tasks.push(task("y", &[]));
        let mut dag = TaskDag::new(&tasks, false).unwrap();

        dag.set_status("d", TaskStatus::Successful);
        dag.set_status("b", TaskStatus::Failed);
        dag.cancel_dependents("b", CancelPolicy::AbortRelatedFlows);

        // Pending members of the related flow are marked.
        assert!(dag.should_be_canceled("a"));
        assert!(dag.should_be_canceled("c"));
        // Terminal tasks keep their outcomes.
        assert!(!dag.should_be_canceled("b"));
        assert!(!dag.should_be_canceled("d"));
        // The unrelated flow is untouched.
        assert!(!dag.should_be_canceled("x"));
        assert!(!dag.should_be_canceled("y"));
    }

    #[test]
    fn test_plan_duplicates_shared_subtrees() {
        let dag = TaskDag::new(&diamond(), false).unwrap();
        let plan = dag.execution_plan();

        // d appears under both b and c, materialized independently.
        let a = &plan["a"];
        assert!(a.children()["b"].contains("d"));
        assert!(a.children()["c"].contains("d"));
    }

    #[test]
    fn test_multiple_roots() {
        let tasks = vec![task("a", &["shared"]), task("b", &["shared"]), task("shared", &[])];
        let dag = TaskDag::new(&tasks, false).unwrap();
        let roots: Vec<_> = dag.execution_plan().keys().cloned().collect();
        assert_eq!(roots, vec!["a", "b"]);
    }

    #[test]
    fn test_cancel_policy_parsing() {
        assert_eq!("continue".parse::<CancelPolicy>().unwrap(), CancelPolicy::Continue);
        assert_eq!("abort-all".parse::<CancelPolicy>().unwrap(), CancelPolicy::AbortAll);
        assert_eq!(
            "abort-related-flows".parse::<CancelPolicy>().unwrap(),
            CancelPolicy::AbortRelatedFlows
        );
        assert!("abort-everything".parse::<CancelPolicy>().is_err());
    }
}
