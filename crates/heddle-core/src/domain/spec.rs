//! Submission input for a task.
//!
//! `TaskSpec` is what a collaborator hands to `submit`. Everything except
//! `pool` and `payload` is optional; the scheduler fills in ids, timestamps
//! and the derived in-degree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub pool: String,

    #[serde(default)]
    pub payload: Value,

    /// Caller-chosen id. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<TaskId>,

    /// Boolean expression over `results`, the map of dependency results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_pred: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TaskSpec {
    pub fn new(pool: impl Into<String>, payload: Value) -> Self {
        Self {
            pool: pool.into(),
            payload,
            id: None,
            deps: Vec::new(),
            edge_pred: None,
            labels: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn depends_on(mut self, dep: impl Into<TaskId>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn with_edge_pred(mut self, pred: impl Into<String>) -> Self {
        self.edge_pred = Some(pred.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_fields() {
        let spec = TaskSpec::new("build", json!({"n": 1}))
            .with_id("B")
            .depends_on("A")
            .with_edge_pred("results['A']['v'] == 1")
            .with_label("nightly");

        assert_eq!(spec.id, Some(TaskId::from("B")));
        assert_eq!(spec.deps, vec![TaskId::from("A")]);
        assert_eq!(spec.labels, vec!["nightly".to_string()]);
        assert!(spec.edge_pred.is_some());
    }

    #[test]
    fn minimal_json_deserializes_with_defaults() {
        let spec: TaskSpec = serde_json::from_value(json!({"pool": "p"})).unwrap();
        assert_eq!(spec.pool, "p");
        assert_eq!(spec.payload, Value::Null);
        assert!(spec.deps.is_empty());
        assert!(spec.id.is_none());
    }
}
