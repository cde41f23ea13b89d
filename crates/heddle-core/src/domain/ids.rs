//! Domain identifiers (strongly-typed IDs).
//!
//! Ids travel as plain strings so collaborators may pick their own task ids
//! at submission time. Ids generated by the scheduler are ULIDs with a type
//! prefix (`task-01J...`, `worker-01J...`), which keeps them sortable by
//! creation time.
//!
//! The phantom marker keeps `TaskId` and `WorkerId` apart at compile time
//! while sharing one implementation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the prefix used for generated ids.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Build a prefixed id from a ULID, e.g. `task-01J0...`.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// Identifier of a Task (unit of work inside a pool).
pub type TaskId = Id<Task>;

/// Identifier of a registered worker process.
pub type WorkerId = Id<Worker>;
