// Dependency Graph
// String-keyed directed acyclic graph with transitive queries and
// layered topological sorting via leaf peeling

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Error type for graph mutations
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// A node cannot depend on itself
    SelfReference,
    /// The edge would close a dependency cycle
    Cycle,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    fn self_reference(node: &str) -> Self {
        Self {
            message: format!("task '{}' cannot depend on itself", node),
            kind: GraphErrorKind::SelfReference,
        }
    }

    fn cycle(child: &str, parent: &str) -> Self {
        Self {
            message: format!(
                "'{}' -> '{}' would close a dependency cycle",
                child, parent
            ),
            kind: GraphErrorKind::Cycle,
        }
    }
}

type NodeSet = HashSet<String>;

/// `DepMap` tracks nodes that stand in some dependency relationship to
/// the node named by the key.
type DepMap = HashMap<String, NodeSet>;

/// Directed acyclic graph over string node identifiers.
///
/// `dependencies` tracks child -> parents (the things a node waits on),
/// `dependents` the inverse. Both relations are kept in lockstep: for
/// every accepted edge `c -> p`, `p` is in `dependencies[c]` and `c` is
/// in `dependents[p]`. Any mutation that would break acyclicity is
/// rejected before either relation is touched.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: NodeSet,
    dependencies: DepMap,
    dependents: DepMap,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with no edges. A no-op if the node already exists.
    pub fn add_node(&mut self, node: &str) {
        self.nodes.insert(node.to_string());
    }

    /// Record that `child` waits on `parent`, inserting either node if
    /// new. Fails if the edge is self-referential or would close a
    /// cycle; repeated insertion of an accepted edge is a no-op. On
    /// failure the graph is left unchanged.
    pub fn depend_on(&mut self, child: &str, parent: &str) -> Result<(), GraphError> {
        if child == parent {
            return Err(GraphError::self_reference(child));
        }
        if self.depends_on(parent, child) {
            return Err(GraphError::cycle(child, parent));
        }

        self.nodes.insert(parent.to_string());
        self.nodes.insert(child.to_string());

        self.dependents
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.dependencies
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());

        Ok(())
    }

    /// True iff `parent` is in the transitive closure of `child`'s parents.
    pub fn depends_on(&self, child: &str, parent: &str) -> bool {
        self.dependencies(child).contains(parent)
    }

    /// True iff `child` is in the transitive closure of `parent`'s dependents.
    pub fn has_dependent(&self, parent: &str, child: &str) -> bool {
        self.dependents(parent).contains(child)
    }

    /// Nodes with nothing left to wait on.
    pub fn leaves(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| !self.dependencies.contains_key(*node))
            .cloned()
            .collect()
    }

    /// Peel leaves off a working clone until no nodes remain. Nodes
    /// within a layer are mutually independent and may run in parallel;
    /// ordering within a layer is unspecified. Nodes caught in a cycle
    /// never surface as leaves and are dropped from the result, but
    /// `depend_on` rejects cycles so the public API never produces such
    /// a graph. Queries never mutate `self`.
    pub fn top_sorted_layers(&self) -> Vec<Vec<String>> {
        let mut layers = Vec::new();
        let mut shrinking = self.clone();
        loop {
            let leaves = shrinking.leaves();
            if leaves.is_empty() {
                break;
            }
            for leaf in &leaves {
                shrinking.remove(leaf);
            }
            layers.push(leaves);
        }
        layers
    }

    /// All nodes in topological order; see [`Self::top_sorted_layers`].
    pub fn top_sorted(&self) -> Vec<String> {
        self.top_sorted_layers().into_iter().flatten().collect()
    }

    /// Full transitive parent closure of `node`; empty when the node is
    /// absent.
    pub fn dependencies(&self, node: &str) -> HashSet<String> {
        self.transitive(node, &self.dependencies)
    }

    /// Full transitive dependent closure of `node`; empty when the node
    /// is absent.
    pub fn dependents(&self, node: &str) -> HashSet<String> {
        self.transitive(node, &self.dependents)
    }

    /// Remove a node and every edge touching it.
    pub fn remove(&mut self, node: &str) {
        if let Some(children) = self.dependents.remove(node) {
            for child in children {
                remove_from_depmap(&mut self.dependencies, &child, node);
            }
        }
        if let Some(parents) = self.dependencies.remove(node) {
            for parent in parents {
                remove_from_depmap(&mut self.dependents, &parent, node);
            }
        }
        self.nodes.remove(node);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Breadth-first closure from `root` following `next` edges.
    fn transitive(&self, root: &str, next: &DepMap) -> HashSet<String> {
        let mut out = HashSet::new();
        if !self.nodes.contains(root) {
            return out;
        }

        let mut frontier = vec![root.to_string()];
        while !frontier.is_empty() {
            let mut discovered = Vec::new();
            for node in &frontier {
                if let Some(neighbors) = next.get(node) {
                    for neighbor in neighbors {
                        if out.insert(neighbor.clone()) {
                            discovered.push(neighbor.clone());
                        }
                    }
                }
            }
            frontier = discovered;
        }

        out
    }
}

fn remove_from_depmap(depmap: &mut DepMap, key: &str, node: &str) {
    if let Some(nodes) = depmap.get_mut(key) {
        nodes.remove(node);
        if nodes.is_empty() {
            depmap.remove(key);
        }
    }
}
