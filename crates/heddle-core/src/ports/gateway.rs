//! Gateway port: what a worker process needs from the scheduler.
//!
//! Workers and spawners depend on this trait rather than on `Scheduler`
//! directly, so the same worker loop can talk to an in-process scheduler or
//! to a remote one behind an RPC client.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    Status, Task, TaskId, TaskPatch, WorkerId, WorkerRecord, WorkerRegistration,
};
use crate::error::Result;

/// What `finish` did.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// The task moved to the terminal status; carries the stored record.
    Applied(Task),
    /// The task was already terminal. Nothing changed.
    Stale(Task),
}

impl FinishOutcome {
    pub fn task(&self) -> &Task {
        match self {
            FinishOutcome::Applied(task) | FinishOutcome::Stale(task) => task,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, FinishOutcome::Applied(_))
    }
}

/// Why a dispatched or running task goes back on the ready queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequeueReason {
    /// The handler declined the task.
    Skipped,
    /// The worker holding it died. Only requeued if that worker still holds
    /// it, which keeps recovery to one requeue per crash.
    WorkerLost(WorkerId),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Pop the next dispatchable task of `pool` and mark it dispatched to
    /// `worker`. `None` when nothing is ready.
    async fn pick(&self, pool: &str, worker: &WorkerId) -> Result<Option<Task>>;

    async fn patch(&self, id: &TaskId, patch: TaskPatch) -> Result<Task>;

    async fn finish(&self, id: &TaskId, status: Status, result: Option<Value>)
    -> Result<FinishOutcome>;

    async fn requeue(&self, id: &TaskId, reason: RequeueReason) -> Result<bool>;

    async fn register_worker(&self, registration: WorkerRegistration) -> Result<WorkerRecord>;

    async fn heartbeat(
        &self,
        id: &WorkerId,
        pool: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<bool>;

    async fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>>;

    /// Requeue everything `id` holds and drop its registration. Returns the
    /// requeued task ids.
    async fn release_worker(&self, id: &WorkerId) -> Result<Vec<TaskId>>;
}
