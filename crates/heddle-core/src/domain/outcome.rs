//! Handler result model.
//!
//! A handler either produces a result, declines the task it was given, or
//! fails. The worker turns each of these into exactly one call on the
//! scheduler: `finish(success)`, a requeue, or `finish(failed)`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// What a handler returns when it did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The task ran to completion with this result.
    Success { result: Value },

    /// The handler cannot serve this task right now. The task goes back to
    /// the ready queue untouched.
    Skip { reason: String },
}

impl Outcome {
    pub fn success(result: Value) -> Self {
        Outcome::Success { result }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Outcome::Skip {
            reason: reason.into(),
        }
    }
}

/// Handler failure, recorded on the task as `{msg, retryable}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub retryable: bool,
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Result payload stored on the failed task.
    pub fn to_result(&self) -> Value {
        failure_result(&self.message, self.retryable)
    }
}

/// `{msg, retryable}` payload used for every failed task.
pub fn failure_result(message: &str, retryable: bool) -> Value {
    json!({ "msg": message, "retryable": retryable })
}
