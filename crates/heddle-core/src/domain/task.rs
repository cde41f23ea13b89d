//! Task record and patch model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Status, TaskId, TaskSpec, WorkerId};

/// The unit of work tracked by the scheduler.
///
/// `status`, `in_degree`, `result` and the timestamps are owned by the
/// scheduler. `labels` and `metadata` are also writable through `patch`.
/// `version` is bumped by the task store on every successful write and is
/// what compare-and-swap keys on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub pool: String,
    #[serde(default)]
    pub payload: Value,
    pub status: Status,

    /// Output of a terminal task, if one was reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default)]
    pub deps: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_pred: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Number of dependency edges not yet satisfied.
    #[serde(default)]
    pub in_degree: u32,

    /// Worker that last reported holding this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerId>,

    /// How many times crash recovery put this task back on the ready queue.
    #[serde(default)]
    pub requeues: u32,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub version: u64,
}

impl Task {
    /// Build a fresh `queued` record from a submission. The resolver decides
    /// the real initial status and in-degree afterwards.
    pub fn from_spec(id: TaskId, spec: TaskSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            pool: spec.pool,
            payload: spec.payload,
            status: Status::Queued,
            result: None,
            deps: dedup_preserving_order(spec.deps),
            edge_pred: spec.edge_pred,
            labels: spec.labels,
            metadata: spec.metadata,
            in_degree: 0,
            worker: None,
            requeues: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time between start and finish, when both are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Apply a patch in place. Returns `true` if anything changed.
    ///
    /// Applying the same patch twice leaves the task as the first application
    /// did: `started_at` is only stamped once, labels are replaced and
    /// metadata keys are overwritten with the same values.
    pub fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) -> bool {
        let before = self.clone();

        if let Some(status) = patch.status {
            self.status = status;
            if status == Status::Running && self.started_at.is_none() {
                self.started_at = Some(now);
            }
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
        if let Some(metadata) = &patch.metadata {
            for (key, value) in metadata {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
        if let Some(worker) = &patch.worker {
            self.worker = Some(worker.clone());
        }

        *self != before
    }
}

/// Restricted field-level update accepted by `patch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    /// Merged key by key into the task's metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerId>,
}

impl TaskPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn labels(labels: Vec<String>) -> Self {
        Self {
            labels: Some(labels),
            ..Self::default()
        }
    }

    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// The same patch minus its status change.
    pub(crate) fn without_status(&self) -> Self {
        Self {
            status: None,
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.labels.is_none()
            && self.metadata.is_none()
            && self.worker.is_none()
    }
}

fn dedup_preserving_order(deps: Vec<TaskId>) -> Vec<TaskId> {
    let mut seen = std::collections::HashSet::new();
    deps.into_iter().filter(|d| seen.insert(d.clone())).collect()
}
