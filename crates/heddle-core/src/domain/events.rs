//! Task lifecycle events.
//!
//! Emitted by the scheduler after each successful state change, carrying the
//! task record as it was written.

use serde::{Deserialize, Serialize};

use super::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Submitted,
    Patched,
    /// Pushed to the ready queue (initially or after release).
    Queued,
    Dispatched,
    Finished,
    /// Returned to the ready queue by crash recovery or a skip.
    Requeued,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, task: Task) -> Self {
        Self { kind, task }
    }
}
