use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Status, Task, TaskId, WorkerId};

/// Snapshot of a task at the moment it reached a terminal status.
///
/// This is what result backends persist. It is independent of the task
/// store, so results survive even if task records are pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: TaskId,
    pub pool: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerId>,
    #[serde(default)]
    pub requeues: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl From<&Task> for TaskRun {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            pool: task.pool.clone(),
            status: task.status,
            result: task.result.clone(),
            worker: task.worker.clone(),
            requeues: task.requeues,
            started_at: task.started_at,
            finished_at: task.finished_at,
            duration_ms: task.duration().map(|d| d.num_milliseconds()),
        }
    }
}
