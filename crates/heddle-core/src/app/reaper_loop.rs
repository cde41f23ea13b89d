//! ReaperLoop - recovery of tasks held by silent workers.
//!
//! # Flow
//! 1. expire workers whose `last_seen` is older than `worker_ttl`
//! 2. requeue the `dispatched`/`running` tasks each expired worker held
//! 3. sleep `interval`, repeat until shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::TaskId;
use crate::error::Result;
use crate::scheduler::Scheduler;

pub struct ReaperLoop {
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

impl ReaperLoop {
    /// Uses the scheduler's configured `reaper_interval`.
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        let interval = scheduler.options().reaper_interval;
        Self {
            scheduler,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn tick(&self) -> Result<Vec<TaskId>> {
        let requeued = self.scheduler.reap_expired_workers().await?;
        if !requeued.is_empty() {
            info!(count = requeued.len(), "reaper requeued tasks");
        }
        Ok(requeued)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, "reaper tick failed");
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Status, TaskSpec, WorkerId, WorkerRegistration};
    use crate::ports::FixedClock;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn tick_requeues_tasks_of_silent_workers() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let scheduler = Arc::new(Scheduler::builder().clock(clock.clone()).build().unwrap());
        let worker = WorkerId::from("w1");
        scheduler
            .register_worker(WorkerRegistration::new(worker.clone(), "p", "local://w1"))
            .await
            .unwrap();
        let id = scheduler.submit(TaskSpec::new("p", json!({}))).await.unwrap();
        scheduler.pick("p", &worker).await.unwrap().unwrap();

        let reaper = ReaperLoop::new(scheduler.clone());
        assert!(reaper.tick().await.unwrap().is_empty());

        clock.advance(chrono::Duration::seconds(16));
        assert_eq!(reaper.tick().await.unwrap(), vec![id.clone()]);

        let task = scheduler.get(&id).await.unwrap();
        assert_eq!(task.status, Status::Queued);
        assert_eq!(task.requeues, 1);
        assert!(scheduler.worker(&worker).await.unwrap().is_none());

        // once per detection
        assert!(reaper.tick().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let scheduler = Arc::new(Scheduler::builder().build().unwrap());
        let reaper = ReaperLoop::new(scheduler).with_interval(Duration::from_millis(5));
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(async move { reaper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        join.await.unwrap();
    }
}
