//! Spawner: keeps a warm pool of worker processes alive for one pool.
//!
//! A worker counts as dead when its task has ended (crash, abort or an
//! unexpected return) or when its registry record has not been refreshed
//! within `idle`. Dead workers are released through the gateway, which
//! requeues whatever they held, and replaced.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Capabilities, TaskId, WorkerId};
use crate::error::Result;
use crate::ports::{Clock, Gateway, IdGenerator, UlidGenerator};
use crate::runtime::HandlerRegistry;
use crate::worker::WorkerProcess;

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnerConfig {
    pub pool: String,
    pub warm_pool: usize,
    /// Liveness poll period; also the workers' idle pick backoff.
    pub poll: Duration,
    /// A worker silent for longer than this is dead.
    pub idle: Duration,
    pub heartbeat: Duration,
    pub capabilities: Capabilities,
}

impl SpawnerConfig {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            warm_pool: 1,
            poll: Duration::from_millis(250),
            idle: Duration::from_secs(15),
            heartbeat: Duration::from_secs(5),
            capabilities: Capabilities::new(),
        }
    }
}

struct Slot {
    worker: WorkerId,
    launched_at: DateTime<Utc>,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<Result<()>>,
}

pub struct Spawner {
    config: SpawnerConfig,
    gateway: Arc<dyn Gateway>,
    handlers: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    slots: Vec<Slot>,
}

impl Spawner {
    pub fn new(
        config: SpawnerConfig,
        gateway: Arc<dyn Gateway>,
        handlers: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        Self {
            config,
            gateway,
            handlers,
            clock,
            ids,
            slots: Vec::new(),
        }
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.slots.iter().map(|s| s.worker.clone()).collect()
    }

    fn launch(&mut self) -> WorkerId {
        let id = self.ids.generate_worker_id();
        let worker = WorkerProcess::new(
            id.clone(),
            self.config.pool.clone(),
            self.handlers.clone(),
            self.gateway.clone(),
        )
        .with_capabilities(self.config.capabilities.clone())
        .with_poll_interval(self.config.poll)
        .with_heartbeat_interval(self.config.heartbeat);

        let (shutdown, rx) = watch::channel(false);
        let join = tokio::spawn(async move { worker.run(rx).await });
        debug!(worker_id = %id, pool = %self.config.pool, "worker launched");
        self.slots.push(Slot {
            worker: id.clone(),
            launched_at: self.clock.now(),
            shutdown,
            join,
        });
        id
    }

    /// Launch workers until the warm pool is full.
    pub fn fill(&mut self) -> Vec<WorkerId> {
        let mut launched = Vec::new();
        while self.slots.len() < self.config.warm_pool {
            launched.push(self.launch());
        }
        launched
    }

    /// Abort a worker without releasing it, as a crash would.
    pub fn kill(&mut self, worker: &WorkerId) -> bool {
        match self.slots.iter().find(|s| &s.worker == worker) {
            Some(slot) => {
                slot.join.abort();
                true
            }
            None => false,
        }
    }

    async fn is_alive(&self, slot: &Slot, now: DateTime<Utc>) -> Result<bool> {
        if slot.join.is_finished() {
            return Ok(false);
        }
        let last_seen = match self.gateway.worker(&slot.worker).await? {
            Some(record) => record.last_seen,
            // not registered yet
            None => slot.launched_at,
        };
        let silent = (now - last_seen).to_std().unwrap_or_default();
        Ok(silent <= self.config.idle)
    }

    /// One liveness pass: release and replace dead workers, then refill.
    /// Returns the tasks that were requeued.
    pub async fn poll_once(&mut self) -> Result<Vec<TaskId>> {
        let now = self.clock.now();
        let mut dead = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if !self.is_alive(slot, now).await? {
                dead.push(i);
            }
        }

        let mut requeued = Vec::new();
        for i in dead.into_iter().rev() {
            let slot = self.slots.swap_remove(i);
            slot.join.abort();
            let tasks = self.gateway.release_worker(&slot.worker).await?;
            warn!(
                worker_id = %slot.worker,
                pool = %self.config.pool,
                requeued = tasks.len(),
                "worker died, replacing"
            );
            requeued.extend(tasks);
        }

        self.fill();
        Ok(requeued)
    }

    /// Supervise until `shutdown` flips to `true`, then stop all workers.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.fill();
        info!(pool = %self.config.pool, warm_pool = self.config.warm_pool, "spawner started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll) => {
                    if let Err(e) = self.poll_once().await {
                        warn!(pool = %self.config.pool, error = %e, "liveness poll failed");
                    }
                }
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// Ask every worker to stop and wait for them.
    pub async fn shutdown(&mut self) {
        for slot in &self.slots {
            // receiver may already be gone
            let _ = slot.shutdown.send(true);
        }
        for slot in self.slots.drain(..) {
            match slot.join.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker_id = %slot.worker, error = %e, "worker exited with error"),
                Err(e) => warn!(worker_id = %slot.worker, error = %e, "worker task failed"),
            }
        }
        info!(pool = %self.config.pool, "spawner stopped");
    }
}

impl Drop for Spawner {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.join.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    fn spawner(warm_pool: usize) -> (Arc<Scheduler>, Spawner) {
        let scheduler = Arc::new(Scheduler::builder().build().unwrap());
        let config = SpawnerConfig {
            warm_pool,
            poll: Duration::from_millis(10),
            ..SpawnerConfig::new("p")
        };
        let spawner = Spawner::new(
            config,
            scheduler.clone(),
            Arc::new(HandlerRegistry::new()),
            scheduler.clock().clone(),
        );
        (scheduler, spawner)
    }

    #[tokio::test]
    async fn fill_launches_warm_pool() {
        let (_scheduler, mut spawner) = spawner(3);
        assert_eq!(spawner.fill().len(), 3);
        assert!(spawner.fill().is_empty());
        assert_eq!(spawner.worker_ids().len(), 3);
    }

    #[tokio::test]
    async fn killed_worker_is_replaced() {
        let (_scheduler, mut spawner) = spawner(1);
        spawner.fill();
        let first = spawner.worker_ids()[0].clone();
        assert!(spawner.kill(&first));

        tokio::time::sleep(Duration::from_millis(20)).await;
        spawner.poll_once().await.unwrap();

        let ids = spawner.worker_ids();
        assert_eq!(ids.len(), 1);
        assert_ne!(ids[0], first);
        spawner.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_deregisters_workers() {
        let (scheduler, mut spawner) = spawner(2);
        spawner.fill();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.workers(Some("p")).await.unwrap().len(), 2);

        spawner.shutdown().await;
        assert!(spawner.worker_ids().is_empty());
        assert!(scheduler.workers(Some("p")).await.unwrap().is_empty());
    }
}
