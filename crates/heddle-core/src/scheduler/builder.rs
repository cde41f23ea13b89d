//! SchedulerBuilder - wiring and start-up validation.
//!
//! Every port defaults to its in-memory implementation, so
//! `Scheduler::builder().build()?` gives a working single-process
//! scheduler. Options are validated once in `build()`, not on every call.

use std::sync::Arc;

use super::{DependencyResolver, LabelBook, Scheduler, SchedulerOptions};
use crate::error::SchedulerError;
use crate::impls::{InMemoryQueueBackend, InMemoryResultBackend, InMemoryTaskStore};
use crate::ports::{
    Clock, EventSink, IdGenerator, ManifestFetcher, NoopEventSink, QueueBackend, ResultBackend,
    SystemClock, TaskStore, UlidGenerator,
};
use crate::registry::WorkerRegistry;

/// # Example
/// ```ignore
/// let scheduler = Scheduler::builder()
///     .queue(Arc::new(InMemoryQueueBackend::new()))
///     .events(Arc::new(BroadcastEventSink::new(256)))
///     .options(options)
///     .build()?;
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn QueueBackend>>,
    results: Option<Arc<dyn ResultBackend>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    manifests: Option<Arc<dyn ManifestFetcher>>,
    options: SchedulerOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("ready queue prefix must not be empty")]
    EmptyQueuePrefix,

    #[error("worker ttl must be greater than zero")]
    ZeroWorkerTtl,

    #[error("reaper interval must be greater than zero")]
    ZeroReaperInterval,
}

impl From<BuildError> for SchedulerError {
    fn from(err: BuildError) -> Self {
        SchedulerError::Config(err.to_string())
    }
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn QueueBackend>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn results(mut self, results: Arc<dyn ResultBackend>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Enables the capability handshake for registrations without one.
    pub fn manifests(mut self, manifests: Arc<dyn ManifestFetcher>) -> Self {
        self.manifests = Some(manifests);
        self
    }

    pub fn options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Scheduler, BuildError> {
        if self.options.ready_queue_prefix.is_empty() {
            return Err(BuildError::EmptyQueuePrefix);
        }
        if self.options.worker_ttl.is_zero() {
            return Err(BuildError::ZeroWorkerTtl);
        }
        if self.options.reaper_interval.is_zero() {
            return Err(BuildError::ZeroReaperInterval);
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let store: Arc<dyn TaskStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let queue: Arc<dyn QueueBackend> = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryQueueBackend::new()));

        let mut registry = WorkerRegistry::new(queue.clone(), clock.clone());
        if let Some(manifests) = self.manifests {
            registry = registry.with_manifests(manifests);
        }

        Ok(Scheduler {
            resolver: DependencyResolver::new(store.clone()),
            labels: LabelBook::new(queue.clone()),
            results: self
                .results
                .unwrap_or_else(|| Arc::new(InMemoryResultBackend::new())),
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventSink)),
            registry,
            store,
            queue,
            clock,
            ids,
            options: self.options,
        })
    }
}
