//! Task status and its terminal set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a task.
///
/// Terminal set: `success`, `failed`, `cancelled`, `rejected`. Once a task
/// reaches one of these, only an administrative override may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Waiting,
    InputRequired,
    AuthRequired,
    Approved,
    Rejected,
    Dispatched,
    Running,
    Paused,
    Success,
    Failed,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 12] = [
        Status::Queued,
        Status::Waiting,
        Status::InputRequired,
        Status::AuthRequired,
        Status::Approved,
        Status::Rejected,
        Status::Dispatched,
        Status::Running,
        Status::Paused,
        Status::Success,
        Status::Failed,
        Status::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Cancelled | Status::Rejected
        )
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Held by a worker: eligible for crash recovery.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Dispatched | Status::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Waiting => "waiting",
            Status::InputRequired => "input_required",
            Status::AuthRequired => "auth_required",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
            Status::Dispatched => "dispatched",
            Status::Running => "running",
            Status::Paused => "paused",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status: {s}"))
    }
}
