//! Label bookkeeping in the queue backend.
//!
//! Keys: `label:{l}:meta` (hash, see [`LabelMeta`]) and `label:{l}:tasks`
//! (set of task ids carrying the label).

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{LabelGate, LabelMeta, LabelUpdate, TaskId};
use crate::error::{Result, SchedulerError};
use crate::ports::QueueBackend;

fn meta_key(label: &str) -> String {
    format!("label:{label}:meta")
}

fn tasks_key(label: &str) -> String {
    format!("label:{label}:tasks")
}

pub struct LabelBook {
    backend: Arc<dyn QueueBackend>,
}

impl LabelBook {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    pub async fn meta(&self, label: &str) -> Result<LabelMeta> {
        let fields = self.backend.hgetall(&meta_key(label)).await?;
        LabelMeta::from_fields(&fields).map_err(SchedulerError::Backend)
    }

    async fn write(&self, label: &str, meta: &LabelMeta) -> Result<()> {
        self.backend.hset(&meta_key(label), &meta.to_fields()).await
    }

    pub async fn update(&self, label: &str, update: &LabelUpdate) -> Result<LabelMeta> {
        update
            .validate()
            .map_err(|reason| SchedulerError::InvalidLabelUpdate {
                label: label.to_string(),
                reason,
            })?;
        let mut meta = self.meta(label).await?;
        meta.apply(update);
        self.write(label, &meta).await?;
        Ok(meta)
    }

    pub async fn track(&self, label: &str, task: &TaskId) -> Result<()> {
        self.backend.sadd(&tasks_key(label), task.as_str()).await?;
        Ok(())
    }

    pub async fn members(&self, label: &str) -> Result<Vec<TaskId>> {
        Ok(self
            .backend
            .smembers(&tasks_key(label))
            .await?
            .into_iter()
            .map(TaskId::from)
            .collect())
    }

    /// Combined gate over all labels of a task. An expired label wins over
    /// a held one.
    pub async fn gate(&self, labels: &[String], now: DateTime<Utc>) -> Result<LabelGate> {
        let mut gate = LabelGate::Open;
        for label in labels {
            match self.meta(label).await?.gate(label, now) {
                expired @ LabelGate::Expired(_) => return Ok(expired),
                LabelGate::Hold => gate = LabelGate::Hold,
                LabelGate::Open => {}
            }
        }
        Ok(gate)
    }

    /// Advance the rate window of every rate-limited label.
    ///
    /// Best effort: the gate read in `pick` and this write are separate
    /// backend calls, so two workers picking at the same instant can both
    /// pass a rate-limited label once. The window is never lost, only
    /// shared.
    pub async fn note_dispatch(&self, labels: &[String], now: DateTime<Utc>) -> Result<()> {
        for label in labels {
            let mut meta = self.meta(label).await?;
            if meta.note_dispatch(now) {
                self.write(label, &meta).await?;
            }
        }
        Ok(())
    }
}
