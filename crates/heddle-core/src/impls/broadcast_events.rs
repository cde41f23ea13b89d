use tokio::sync::broadcast;

use crate::domain::TaskEvent;
use crate::ports::EventSink;

/// Fans task events out to any number of subscribers.
///
/// Slow subscribers lag and lose the oldest events rather than holding up
/// the scheduler; with no subscribers, events are dropped.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<TaskEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: TaskEvent) {
        // send only fails when nobody is subscribed
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskEventKind, TaskId, TaskSpec};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        let task = Task::from_spec(TaskId::from("a"), TaskSpec::new("p", json!({})), Utc::now());
        sink.emit(TaskEvent::new(TaskEventKind::Submitted, task));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TaskEventKind::Submitted);
        assert_eq!(event.task.id, TaskId::from("a"));
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let sink = BroadcastEventSink::new(1);
        let task = Task::from_spec(TaskId::from("a"), TaskSpec::new("p", json!({})), Utc::now());
        sink.emit(TaskEvent::new(TaskEventKind::Queued, task));
    }
}
