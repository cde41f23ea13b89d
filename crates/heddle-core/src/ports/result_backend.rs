//! ResultBackend port: durable store for finished task snapshots.

use async_trait::async_trait;

use crate::domain::{TaskId, TaskRun};
use crate::error::Result;

#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Persist (or overwrite) the snapshot for `run.id`.
    async fn store(&self, run: &TaskRun) -> Result<()>;

    async fn load(&self, id: &TaskId) -> Result<Option<TaskRun>>;
}
