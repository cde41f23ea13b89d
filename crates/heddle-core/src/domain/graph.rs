//! Dependency graph for managing task dependencies.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges must be kept in sync

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use crate::domain::TaskId;

/// Dependency graph for tracking task dependencies.
///
/// Neighbour sets are ordered so traversal (and therefore the reported
/// cycle) is deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Forward edges: task -> tasks it depends on
    edges: HashMap<TaskId, BTreeSet<TaskId>>,

    /// Reverse edges: task -> tasks that depend on it.
    /// Answers "who is waiting for this task?" without a scan.
    reverse_edges: HashMap<TaskId, BTreeSet<TaskId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
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

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// `add_dependency(b, a)` means "B waits for A":
    /// - edges: B -> {A}
    /// - reverse_edges: A -> {B}
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.edges
            .entry(task.clone())
            .or_default()
            .insert(depends_on.clone());
        self.reverse_edges.entry(depends_on).or_default().insert(task);
    }

    /// Remove a dependency: `task` no longer depends on `depends_on`.
    pub fn remove_dependency(&mut self, task: &TaskId, depends_on: &TaskId) {
        if let Entry::Occupied(mut e) = self.edges.entry(task.clone()) {
            e.get_mut().remove(depends_on);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
        if let Entry::Occupied(mut e) = self.reverse_edges.entry(depends_on.clone()) {
            e.get_mut().remove(task);
            if e.get().is_empty() {
                e.remove_entry();
            }
        }
    }

    /// Tasks that list `completed_task` as a dependency.
    ///
    /// This returns ALL of them, even those with other unresolved
    /// dependencies. The caller decides readiness.
    pub fn get_waiting_tasks(&self, completed_task: &TaskId) -> Vec<TaskId> {
        self.reverse_edges
            .get(completed_task)
            .map(|waiting| waiting.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_dependencies(&self, task: &TaskId) -> bool {
        self.edges.get(task).is_some_and(|deps| !deps.is_empty())
    }

    pub fn get_dependencies(&self, task: &TaskId) -> Vec<TaskId> {
        self.edges
            .get(task)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Detect a cycle in the dependency graph.
    ///
    /// Iterative three-color DFS, O(V + E). Returns the nodes of the first
    /// cycle found in path order, with the entry node repeated at the end
    /// (`[a, b, a]`), or `None` if the graph is a DAG.
    pub fn detect_cycle(&self) -> Option<Vec<TaskId>> {
        let mut color: HashMap<&TaskId, Color> = HashMap::new();

        let mut roots: Vec<&TaskId> = self.edges.keys().collect();
        roots.sort();

        for root in roots {
            if color.contains_key(root) {
                continue;
            }
            if let Some(cycle) = self.dfs_cycle(root, &mut color) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        root: &'a TaskId,
        color: &mut HashMap<&'a TaskId, Color>,
    ) -> Option<Vec<TaskId>> {
        // Each frame holds a node and the neighbours still to visit.
        let mut path: Vec<&TaskId> = vec![root];
        let mut stack: Vec<Box<dyn Iterator<Item = &'a TaskId> + 'a>> =
            vec![self.neighbours(root)];
        color.insert(root, Color::Gray);

        while let Some(frame) = stack.last_mut() {
            match frame.next() {
                Some(next) => match color.get(next) {
                    Some(Color::Gray) => {
                        let start = path.iter().position(|n| *n == next).unwrap_or(0);
                        let mut cycle: Vec<TaskId> =
                            path[start..].iter().map(|n| (*n).clone()).collect();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Some(Color::Black) => {}
                    None => {
                        color.insert(next, Color::Gray);
                        path.push(next);
                        stack.push(self.neighbours(next));
                    }
                },
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        color.insert(done, Color::Black);
                    }
                }
            }
        }
        None
    }

    fn neighbours<'a>(&'a self, node: &TaskId) -> Box<dyn Iterator<Item = &'a TaskId> + 'a> {
        match self.edges.get(node) {
            Some(deps) => Box::new(deps.iter()),
            None => Box::new(std::iter::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = DependencyGraph::new();
        assert!(!graph.has_dependencies(&id("a")));
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("b"), id("a")); // B depends on A

        assert!(graph.has_dependencies(&id("b")));
        assert!(!graph.has_dependencies(&id("a")));
        assert_eq!(graph.get_dependencies(&id("b")), vec![id("a")]);
        assert_eq!(graph.get_waiting_tasks(&id("a")), vec![id("b")]);
    }

    #[test]
    fn remove_dependency_removes_both_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("b"), id("a"));
        graph.remove_dependency(&id("b"), &id("a"));

        assert!(!graph.has_dependencies(&id("b")));
        assert!(graph.get_waiting_tasks(&id("a")).is_empty());
    }

    #[test]
    fn detect_simple_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("a"), id("b"));
        graph.add_dependency(id("b"), id("a"));

        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle, vec![id("a"), id("b"), id("a")]);
    }

    #[test]
    fn detect_self_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("a"), id("a"));

        assert_eq!(graph.detect_cycle(), Some(vec![id("a"), id("a")]));
    }

    #[test]
    fn detect_longer_cycle() {
        let mut graph = DependencyGraph::new();
        // B -> C -> D -> B, with A hanging off B
        graph.add_dependency(id("b"), id("a"));
        graph.add_dependency(id("c"), id("b"));
        graph.add_dependency(id("d"), id("c"));
        graph.add_dependency(id("b"), id("d"));

        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(!cycle.contains(&id("a")));
    }

    #[test]
    fn chain_has_no_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("b"), id("a"));
        graph.add_dependency(id("c"), id("b"));

        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        // A -> B -> C plus the shortcut A -> C
        graph.add_dependency(id("b"), id("a"));
        graph.add_dependency(id("c"), id("b"));
        graph.add_dependency(id("c"), id("a"));

        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn complex_dag_with_cross_edges() {
        let mut graph = DependencyGraph::new();
        //     A
        //    / \
        //   B   C
        //   |\ /|
        //   | X |
        //   |/ \|
        //   D   E
        graph.add_dependency(id("b"), id("a"));
        graph.add_dependency(id("c"), id("a"));
        graph.add_dependency(id("d"), id("b"));
        graph.add_dependency(id("e"), id("b"));
        graph.add_dependency(id("d"), id("c"));
        graph.add_dependency(id("e"), id("c"));

        assert!(graph.detect_cycle().is_none());
    }
}
