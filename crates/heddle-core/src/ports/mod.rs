//! Ports: the seams between the scheduling core and its backends.
//!
//! Each trait hides one external system (broker, datastore, result store,
//! worker endpoint) so the core runs unchanged against in-memory
//! implementations in tests and real ones in production.

pub mod clock;
pub mod event_sink;
pub mod gateway;
pub mod id_generator;
pub mod manifest;
pub mod queue_backend;
pub mod result_backend;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::gateway::{FinishOutcome, Gateway, RequeueReason};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::manifest::ManifestFetcher;
pub use self::queue_backend::QueueBackend;
pub use self::result_backend::ResultBackend;
pub use self::task_store::{CasOutcome, TaskStore, Update, update_with};
