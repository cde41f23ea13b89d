//! Dependency resolver: decides when a waiting task becomes ready.
//!
//! # Readiness
//! A task is ready when every dependency is `success` and its edge
//! predicate (if any) holds over `{dep_id: dep_result}`. A predicate that
//! fails to parse or evaluate counts as not holding.
//!
//! # In-degree
//! `in_degree` is the number of dependencies not yet `success`. When all
//! have succeeded but the predicate does not hold, it stays at 1: the
//! predicate edge itself is the unsatisfied one.
//!
//! # Concurrency
//! The resolver reads dependency state outside any lock, then applies the
//! result with a CAS on the dependent. The write only ever lowers
//! `in_degree`, and only the writer that takes it to 0 reports the task as
//! released. Two dependencies finishing at once therefore release their
//! dependent exactly once.

use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{DependencyGraph, Status, Task, TaskId};
use crate::error::{Result, SchedulerError};
use crate::ports::{TaskStore, Update, update_with};
use crate::predicate::Predicate;

pub struct DependencyResolver {
    store: Arc<dyn TaskStore>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Every dependency must already exist and the new edges must not close
    /// a cycle among tasks that have not finished.
    pub async fn validate(&self, task: &Task) -> Result<()> {
        if task.deps.contains(&task.id) {
            return Err(SchedulerError::invalid_dependency(
                &task.id,
                "a task cannot depend on itself",
            ));
        }
        for dep in &task.deps {
            if self.store.get(dep).await?.is_none() {
                return Err(SchedulerError::invalid_dependency(
                    &task.id,
                    format!("unknown dependency {dep}"),
                ));
            }
        }
        self.check_acyclic(task).await
    }

    /// Forward reachability from `task` through not-yet-terminal tasks.
    async fn check_acyclic(&self, task: &Task) -> Result<()> {
        let mut graph = DependencyGraph::new();
        let mut seen: HashSet<TaskId> = HashSet::from([task.id.clone()]);
        let mut frontier: VecDeque<TaskId> = VecDeque::new();

        for dep in &task.deps {
            graph.add_dependency(task.id.clone(), dep.clone());
            if seen.insert(dep.clone()) {
                frontier.push_back(dep.clone());
            }
        }

        while let Some(id) = frontier.pop_front() {
            let Some(current) = self.store.get(&id).await? else {
                continue;
            };
            if current.is_terminal() {
                continue;
            }
            for dep in &current.deps {
                graph.add_dependency(id.clone(), dep.clone());
                if seen.insert(dep.clone()) {
                    frontier.push_back(dep.clone());
                }
            }
        }

        match graph.detect_cycle() {
            Some(cycle) => {
                let path: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
                Err(SchedulerError::invalid_dependency(
                    &task.id,
                    format!("dependency cycle: {}", path.join(" -> ")),
                ))
            }
            None => Ok(()),
        }
    }

    /// Number of unsatisfied edges of `task`, read from the store.
    pub async fn compute_in_degree(&self, task: &Task) -> Result<u32> {
        let mut pending = 0u32;
        let mut results = Map::new();

        for dep in &task.deps {
            match self.store.get(dep).await? {
                Some(dep_task) if dep_task.status.is_success() => {
                    results.insert(
                        dep.to_string(),
                        dep_task.result.clone().unwrap_or(Value::Null),
                    );
                }
                _ => pending += 1,
            }
        }

        if pending > 0 {
            return Ok(pending);
        }
        match &task.edge_pred {
            None => Ok(0),
            Some(source) if predicate_holds(&task.id, source, &results) => Ok(0),
            Some(_) => Ok(1),
        }
    }

    /// Re-evaluate a waiting task. Returns the stored record if this call
    /// moved it to `queued`; the caller must then enqueue it.
    pub async fn release_if_ready(&self, id: &TaskId) -> Result<Option<Task>> {
        let Some(task) = self.store.get(id).await? else {
            return Ok(None);
        };
        if task.status != Status::Waiting || task.in_degree == 0 {
            return Ok(None);
        }

        let in_degree = self.compute_in_degree(&task).await?;
        let (stored, released) = update_with(self.store.as_ref(), id, |t| {
            if t.status != Status::Waiting || t.in_degree == 0 || in_degree >= t.in_degree {
                return Ok(Update::Skip(false));
            }
            t.in_degree = in_degree;
            if in_degree == 0 {
                t.status = Status::Queued;
            }
            Ok(Update::Write(in_degree == 0))
        })
        .await?;

        if released {
            debug!(task_id = %id, "dependencies satisfied, task released");
            Ok(Some(stored))
        } else {
            Ok(None)
        }
    }

    /// Re-evaluate every task that lists `finished` as a dependency.
    /// Returns the tasks released by this call.
    pub async fn on_dependency_finished(&self, finished: &Task) -> Result<Vec<Task>> {
        let dependents = self.store.dependents(&finished.id).await?;
        if dependents.is_empty() {
            return Ok(Vec::new());
        }
        if !finished.status.is_success() {
            debug!(
                task_id = %finished.id,
                status = %finished.status,
                dependents = dependents.len(),
                "dependency did not succeed, dependents stay blocked"
            );
            return Ok(Vec::new());
        }

        let mut released = Vec::new();
        for id in dependents {
            if let Some(task) = self.release_if_ready(&id).await? {
                released.push(task);
            }
        }
        Ok(released)
    }
}

/// Fail-closed predicate evaluation: any error counts as "does not hold".
fn predicate_holds(task: &TaskId, source: &str, results: &Map<String, Value>) -> bool {
    match Predicate::parse(source).and_then(|p| p.evaluate(results)) {
        Ok(holds) => {
            debug!(task_id = %task, predicate = source, holds, "edge predicate evaluated");
            holds
        }
        Err(e) => {
            warn!(task_id = %task, predicate = source, error = %e, "edge predicate failed, treating as unsatisfied");
            false
        }
    }
}
