//! Impls - in-process implementations of the ports.
//!
//! # Included
//! - **InMemoryQueueBackend**: lists, hashes and sets behind one mutex
//! - **InMemoryTaskStore**: CAS task store with a reverse dependency index
//! - **InMemoryResultBackend** / **FileResultBackend**: finished task snapshots
//! - **BroadcastEventSink**: tokio broadcast fan-out of task events
//! - **LocalManifests**: capability manifests of in-process workers
//!
//! Networked backends (a broker, a database) implement the same ports in
//! their own crates.

pub mod broadcast_events;
pub mod file_results;
pub mod inmem_queue;
pub mod inmem_results;
pub mod inmem_store;
pub mod local_manifests;

pub use self::broadcast_events::BroadcastEventSink;
pub use self::file_results::FileResultBackend;
pub use self::inmem_queue::InMemoryQueueBackend;
pub use self::inmem_results::InMemoryResultBackend;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::local_manifests::LocalManifests;
