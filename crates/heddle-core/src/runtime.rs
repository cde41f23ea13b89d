use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Capabilities, HandlerError, Outcome, Task};
use crate::error::{Result, SchedulerError};

/// A handler for tasks a worker can serve.
///
/// `provides` is the capability set the handler requires of its worker.
/// `dispatch` lets a handler decline a task it is nominally capable of,
/// e.g. based on payload shape.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;

    fn provides(&self) -> &Capabilities;

    fn dispatch(&self, _task: &Task) -> bool {
        true
    }

    async fn handle(&self, task: &Task) -> std::result::Result<Outcome, HandlerError>;
}

/// Ordered registry of handlers.
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, shared behind an `Arc`).
/// - Registration order is selection order.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Names must be unique.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> Result<()> {
        if self.handlers.iter().any(|h| h.name() == handler.name()) {
            return Err(SchedulerError::Config(format!(
                "duplicate handler: {}",
                handler.name()
            )));
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// First handler whose requirements fit `capabilities` and which
    /// accepts `task`.
    pub fn select(&self, capabilities: &Capabilities, task: &Task) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers
            .iter()
            .find(|h| h.provides().is_subset(capabilities) && h.dispatch(task))
    }

    /// Union of every handler's `provides`.
    pub fn provided(&self) -> Capabilities {
        self.handlers
            .iter()
            .fold(Capabilities::new(), |acc, h| acc.union(h.provides()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskSpec};
    use chrono::Utc;
    use serde_json::{Value, json};

    struct Fixed {
        name: &'static str,
        provides: Capabilities,
        accepts: fn(&Task) -> bool,
    }

    #[async_trait]
    impl TaskHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn provides(&self) -> &Capabilities {
            &self.provides
        }

        fn dispatch(&self, task: &Task) -> bool {
            (self.accepts)(task)
        }

        async fn handle(&self, _task: &Task) -> std::result::Result<Outcome, HandlerError> {
            Ok(Outcome::success(json!(self.name)))
        }
    }

    fn handler(name: &'static str, caps: &[&str], accepts: fn(&Task) -> bool) -> Arc<dyn TaskHandler> {
        Arc::new(Fixed {
            name,
            provides: caps.iter().copied().collect(),
            accepts,
        })
    }

    fn task(payload: Value) -> Task {
        Task::from_spec(TaskId::from("t"), TaskSpec::new("p", payload), Utc::now())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register(handler("a", &[], |_| true)).unwrap();
        let err = reg.register(handler("a", &["x"], |_| true)).unwrap_err();
        assert!(err.to_string().contains("duplicate handler"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn selects_first_capable_and_willing_handler() {
        let mut reg = HandlerRegistry::new();
        reg.register(handler("gpu", &["gpu"], |_| true)).unwrap();
        reg.register(handler("picky", &["cpu"], |t| t.payload.get("kind") == Some(&json!("sum"))))
            .unwrap();
        reg.register(handler("fallback", &["cpu"], |_| true)).unwrap();

        let cpu: Capabilities = ["cpu"].into_iter().collect();

        let chosen = reg.select(&cpu, &task(json!({"kind": "sum"}))).unwrap();
        assert_eq!(chosen.name(), "picky");

        let chosen = reg.select(&cpu, &task(json!({"kind": "echo"}))).unwrap();
        assert_eq!(chosen.name(), "fallback");

        assert!(reg.select(&Capabilities::new(), &task(json!({}))).is_none());
    }

    #[test]
    fn provided_is_union_of_handlers() {
        let mut reg = HandlerRegistry::new();
        reg.register(handler("a", &["x"], |_| true)).unwrap();
        reg.register(handler("b", &["y", "x"], |_| true)).unwrap();
        assert_eq!(reg.provided().to_string(), "{x, y}");
        assert_eq!(reg.names(), vec!["a", "b"]);
    }
}
