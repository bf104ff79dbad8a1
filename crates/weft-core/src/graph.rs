//! Dependency graph for a workflow's tasks.
//!
//! Design:
//! - Forward edges: task -> its prerequisites (in declaration order)
//! - Reverse edges: task -> its dependents (in insertion order)
//! - Invariant: edges and reverse_edges are kept in sync
//! - Invariant: a node may only name nodes already in the graph as
//!   prerequisites, so insertion order is a topological order and the
//!   graph stays acyclic.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::TaskId;
use crate::error::WorkflowError;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Forward edges: task -> tasks it waits for.
    edges: HashMap<TaskId, Vec<TaskId>>,

    /// Reverse edges: task -> tasks waiting for it.
    /// Precomputed so "who is waiting for this task?" is a lookup.
    reverse_edges: HashMap<TaskId, Vec<TaskId>>,

    /// Nodes in insertion order.
    order: Vec<TaskId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path.
    Gray,
    /// Fully explored.
    Black,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.edges.contains_key(&task)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check that `task` can be inserted with `prerequisites`.
    ///
    /// `staged` holds nodes that will be inserted before `task` by the same
    /// batch; they count as known prerequisites.
    pub fn validate_node(
        &self,
        task: TaskId,
        prerequisites: &[TaskId],
        staged: &HashSet<TaskId>,
    ) -> Result<(), WorkflowError> {
        if self.contains(task) || staged.contains(&task) {
            return Err(WorkflowError::DuplicateTask(task));
        }
        for &prerequisite in prerequisites {
            if prerequisite == task {
                return Err(WorkflowError::SelfDependency(task));
            }
            if !self.contains(prerequisite) && !staged.contains(&prerequisite) {
                return Err(WorkflowError::UnknownPrerequisite { task, prerequisite });
            }
        }
        Ok(())
    }

    /// Insert a node. Callers validate first with `validate_node`.
    ///
    /// Maintains the invariant by updating both:
    /// - edges: task -> prerequisites
    /// - reverse_edges: each prerequisite -> task
    pub fn insert(&mut self, task: TaskId, prerequisites: Vec<TaskId>) {
        for &prerequisite in &prerequisites {
            let waiting = self.reverse_edges.entry(prerequisite).or_default();
            if !waiting.contains(&task) {
                waiting.push(task);
            }
        }
        self.reverse_edges.entry(task).or_default();
        self.edges.insert(task, prerequisites);
        self.order.push(task);
    }

    pub fn prerequisites(&self, task: TaskId) -> &[TaskId] {
        self.edges.get(&task).map(Vec::as_slice).unwrap_or_default()
    }

    /// Direct dependents of `task`.
    ///
    /// These are the only tasks whose readiness can change when `task`
    /// finishes; the caller still checks their other prerequisites.
    pub fn dependents(&self, task: TaskId) -> &[TaskId] {
        self.reverse_edges
            .get(&task)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every task reachable from `task` through dependent edges, breadth
    /// first, each listed once. `task` itself is excluded.
    pub fn transitive_dependents(&self, task: TaskId) -> Vec<TaskId> {
        let mut seen = HashSet::from([task]);
        let mut queue: VecDeque<TaskId> = self.dependents(task).iter().copied().collect();
        let mut result = Vec::new();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            result.push(next);
            queue.extend(self.dependents(next).iter().copied());
        }
        result
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[TaskId] {
        &self.order
    }

    /// Nodes without prerequisites, in insertion order.
    pub fn roots(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .copied()
            .filter(|&task| self.prerequisites(task).is_empty())
            .collect()
    }

    /// Nodes without dependents, in insertion order.
    pub fn leaves(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .copied()
            .filter(|&task| self.dependents(task).is_empty())
            .collect()
    }

    /// Detect a cycle in the declared edges.
    ///
    /// Graphs built through `validate_node` never contain one; this is used on
    /// scratch graphs of a batch's declarations to tell a cycle apart from a
    /// plain forward reference.
    ///
    /// Depth-first search with gray/black coloring: meeting a gray node means
    /// the current path loops back on itself. Returns the loop starting and
    /// ending at the same node.
    pub fn detect_cycle(&self) -> Option<Vec<TaskId>> {
        let mut colors = HashMap::new();
        for &root in &self.order {
            if colors.contains_key(&root) {
                continue;
            }
            // Explicit stack of (node, index of the next prerequisite to visit);
            // it doubles as the current path.
            let mut stack = vec![(root, 0usize)];
            colors.insert(root, Color::Gray);

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let Some(&dep) = self.prerequisites(node).get(*next) else {
                    colors.insert(node, Color::Black);
                    stack.pop();
                    continue;
                };
                *next += 1;

                match colors.get(&dep) {
                    Some(Color::Gray) => {
                        let start = stack.iter().position(|&(n, _)| n == dep)?;
                        let mut cycle: Vec<TaskId> =
                            stack[start..].iter().map(|&(n, _)| n).collect();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Some(Color::Black) => {}
                    None => {
                        colors.insert(dep, Color::Gray);
                        stack.push((dep, 0));
                    }
                }
            }
        }
        None
    }
}
