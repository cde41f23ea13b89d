use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{TaskId, TaskRun};
use crate::error::{Result, SchedulerError};
use crate::ports::ResultBackend;

/// Keeps finished task snapshots in memory.
#[derive(Default)]
pub struct InMemoryResultBackend {
    runs: RwLock<HashMap<TaskId, TaskRun>>,
}

impl InMemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultBackend for InMemoryResultBackend {
    async fn store(&self, run: &TaskRun) -> Result<()> {
        self.runs
            .write()
            .map_err(|e| SchedulerError::Backend(format!("result store poisoned: {e}")))?
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn load(&self, id: &TaskId) -> Result<Option<TaskRun>> {
        Ok(self
            .runs
            .read()
            .map_err(|e| SchedulerError::Backend(format!("result store poisoned: {e}")))?
            .get(id)
            .cloned())
    }
}
