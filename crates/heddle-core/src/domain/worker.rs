use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Capabilities, WorkerId};

/// Registry entry for a live worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub pool: String,
    /// Where the worker can be reached (URL, socket path, ...).
    pub endpoint: String,
    pub capabilities: Capabilities,
    pub last_seen: DateTime<Utc>,
}

impl WorkerRecord {
    /// True once `ttl` has elapsed since the last heartbeat.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.last_seen) > ttl
    }
}

/// Input to `register`.
///
/// `capabilities: None` (or an empty set) asks the registry to fetch the
/// worker's manifest from its endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub id: WorkerId,
    pub pool: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl WorkerRegistration {
    pub fn new(id: WorkerId, pool: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            pool: pool.into(),
            endpoint: endpoint.into(),
            capabilities: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}
