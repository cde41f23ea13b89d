//! TaskStore port: the authoritative record of every task.
//!
//! # Design
//! - `compare_and_swap` is the only way to change an existing record
//! - a write succeeds only if the stored `version` still equals the version
//!   the caller read; the store then bumps it
//! - `dependents` answers "who lists this task in `deps`" without a scan

use async_trait::async_trait;

use crate::domain::{Task, TaskId};
use crate::error::{Result, SchedulerError};

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// Written; carries the stored record with its new version.
    Swapped(Task),
    /// Someone else wrote first; carries the current record.
    Conflict(Task),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record. Returns `false` (and writes nothing) if the id
    /// is already taken.
    async fn insert(&self, task: Task) -> Result<bool>;

    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    /// Replace the record if its version is still `expected_version`.
    async fn compare_and_swap(&self, expected_version: u64, task: Task) -> Result<CasOutcome>;

    /// Ids of tasks listing `id` as a dependency.
    async fn dependents(&self, id: &TaskId) -> Result<Vec<TaskId>>;

    /// All tasks of `pool`, in submission order.
    async fn list(&self, pool: &str) -> Result<Vec<Task>>;
}

/// What a CAS update closure decided.
pub enum Update<T> {
    /// Write the modified task and return `T`.
    Write(T),
    /// Leave the record as it is and return `T`.
    Skip(T),
}

/// Read-modify-write loop on top of `compare_and_swap`.
///
/// `f` receives a fresh copy of the current record on every attempt and
/// either mutates it (`Update::Write`) or declines (`Update::Skip`). On a
/// version conflict the loop reloads and retries, so `f` must be a pure
/// function of the record it is handed.
pub async fn update_with<T, F>(
    store: &dyn TaskStore,
    id: &TaskId,
    mut f: F,
) -> Result<(Task, T)>
where
    F: FnMut(&mut Task) -> Result<Update<T>> + Send,
    T: Send,
{
    let mut current = store
        .get(id)
        .await?
        .ok_or_else(|| SchedulerError::task_not_found(id))?;

    loop {
        let mut next = current.clone();
        match f(&mut next)? {
            Update::Skip(out) => return Ok((current, out)),
            Update::Write(out) => match store.compare_and_swap(current.version, next).await? {
                CasOutcome::Swapped(stored) => return Ok((stored, out)),
                CasOutcome::Conflict(latest) => {
                    tracing::debug!(task_id = %id, version = latest.version, "cas conflict, retrying");
                    current = latest;
                }
            },
        }
    }
}
