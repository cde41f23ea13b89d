use thiserror::Error;

use crate::domain::Status;

/// Errors surfaced by the scheduling core.
///
/// Execution-time handler failures never show up here: the worker records
/// them on the task itself. Stale completions are not errors either, see
/// [`crate::scheduler::FinishOutcome::Stale`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid dependency for task {task}: {reason}")]
    InvalidDependency { task: String, reason: String },

    #[error("no handler available for task {0}")]
    HandlerUnavailable(String),

    #[error("predicate evaluation failed: {0}")]
    PredicateEvaluation(String),

    #[error("invalid status transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: Status,
        to: Status,
    },

    #[error("invalid update for label {label}: {reason}")]
    InvalidLabelUpdate { label: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub fn task_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    pub fn worker_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "worker",
            id: id.to_string(),
        }
    }

    pub fn invalid_dependency(task: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidDependency {
            task: task.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
