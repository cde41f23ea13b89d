//! Domain model (ids, tasks, workers, labels, events, ...).
//!
//! Everything here is plain data plus pure logic. Nothing in this module
//! touches a backend or spawns a task.

pub mod capability;
pub mod events;
pub mod graph;
pub mod ids;
pub mod labels;
pub mod outcome;
pub mod run;
pub mod spec;
pub mod status;
pub mod task;
pub mod worker;

pub use capability::Capabilities;
pub use events::{TaskEvent, TaskEventKind};
pub use graph::DependencyGraph;
pub use ids::{TaskId, WorkerId};
pub use labels::{LabelGate, LabelMeta, LabelUpdate, MIN_RATE};
pub use outcome::{HandlerError, Outcome, failure_result};
pub use run::TaskRun;
pub use spec::TaskSpec;
pub use status::Status;
pub use task::{Task, TaskPatch};
pub use worker::{WorkerRecord, WorkerRegistration};
