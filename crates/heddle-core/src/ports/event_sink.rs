//! EventSink port: where task lifecycle events go.
//!
//! Emission is fire-and-forget. A sink must not fail a state transition
//! that has already been written, so `emit` returns nothing.

use crate::domain::TaskEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TaskEvent) {}
}
