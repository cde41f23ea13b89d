//! InMemoryTaskStore - TaskStore backed by a HashMap.
//!
//! The dependency graph doubles as the reverse index for `dependents`.
//! Edges are added on insert and never removed: `deps` is write-once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::{DependencyGraph, Task, TaskId};
use crate::error::{Result, SchedulerError};
use crate::ports::{CasOutcome, TaskStore};

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Task>,
    /// Submission order, for stable listings.
    order: Vec<TaskId>,
    graph: DependencyGraph,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<State>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| SchedulerError::Backend(format!("task store poisoned: {e}")))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<bool> {
        let mut state = self.lock()?;
        if state.tasks.contains_key(&task.id) {
            return Ok(false);
        }
        for dep in &task.deps {
            state.graph.add_dependency(task.id.clone(), dep.clone());
        }
        state.order.push(task.id.clone());
        state.tasks.insert(task.id.clone(), task);
        Ok(true)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.lock()?.tasks.get(id).cloned())
    }

    async fn compare_and_swap(&self, expected_version: u64, mut task: Task) -> Result<CasOutcome> {
        let mut state = self.lock()?;
        let current = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| SchedulerError::task_not_found(&task.id))?;

        if current.version != expected_version {
            return Ok(CasOutcome::Conflict(current.clone()));
        }
        task.version = expected_version + 1;
        *current = task.clone();
        Ok(CasOutcome::Swapped(task))
    }

    async fn dependents(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        Ok(self.lock()?.graph.get_waiting_tasks(id))
    }

    async fn list(&self, pool: &str) -> Result<Vec<Task>> {
        let state = self.lock()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|task| task.pool == pool)
            .cloned()
            .collect())
    }
}
