//! Worker process: pick, select a handler, execute, report.
//!
//! Per task: `picked -> dispatched -> running -> {success | failed}`.
//! A handler error or panic becomes `finish(failed, {msg, retryable})`;
//! nothing a handler does can leave its task stuck in `running`. A `Skip`
//! outcome puts the task back on the ready queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    Capabilities, HandlerError, Outcome, Status, Task, TaskId, TaskPatch, WorkerId,
    WorkerRegistration, failure_result,
};
use crate::error::{Result, SchedulerError};
use crate::ports::{Gateway, RequeueReason};
use crate::runtime::{HandlerRegistry, TaskHandler};

/// What one `run_once` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing was ready.
    Idle,
    /// The task reached (or already had) this terminal status.
    Completed { task: TaskId, status: Status },
    /// The handler declined; the task is back on the ready queue.
    Skipped(TaskId),
}

pub struct WorkerProcess {
    id: WorkerId,
    pool: String,
    endpoint: String,
    capabilities: Capabilities,
    handlers: Arc<HandlerRegistry>,
    gateway: Arc<dyn Gateway>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl WorkerProcess {
    pub fn new(
        id: WorkerId,
        pool: impl Into<String>,
        handlers: Arc<HandlerRegistry>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        let endpoint = format!("local://{id}");
        Self {
            id,
            pool: pool.into(),
            endpoint,
            capabilities: Capabilities::new(),
            handlers,
            gateway,
            poll_interval: Duration::from_millis(250),
            heartbeat_interval: Duration::from_secs(5),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Capabilities this worker advertises: its configured set plus
    /// everything its handlers provide.
    pub fn manifest(&self) -> Capabilities {
        self.capabilities.union(&self.handlers.provided())
    }

    pub async fn register(&self) -> Result<()> {
        let registration =
            WorkerRegistration::new(self.id.clone(), self.pool.clone(), self.endpoint.clone())
                .with_capabilities(self.manifest());
        self.gateway.register_worker(registration).await?;
        Ok(())
    }

    /// Non-blocking: `None` when the pool's ready queue is empty.
    pub async fn pick(&self) -> Result<Option<Task>> {
        self.gateway.pick(&self.pool, &self.id).await
    }

    /// First handler whose `provides` fits the configured capabilities and
    /// which accepts the task.
    pub fn select_handler(&self, task: &Task) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.select(&self.capabilities, task)
    }

    /// Execute a picked task and report the outcome.
    pub async fn handle(&self, task: Task) -> Result<Step> {
        let Some(handler) = self.select_handler(&task).cloned() else {
            let err = SchedulerError::HandlerUnavailable(task.id.to_string());
            warn!(worker_id = %self.id, task_id = %task.id, "no matching handler");
            return self
                .complete(&task.id, Status::Failed, failure_result(&err.to_string(), false))
                .await;
        };

        let running = self
            .gateway
            .patch(
                &task.id,
                TaskPatch::status(Status::Running).with_worker(self.id.clone()),
            )
            .await?;
        if running.is_terminal() {
            debug!(task_id = %task.id, status = %running.status, "task finished before it started");
            return Ok(Step::Completed {
                task: running.id,
                status: running.status,
            });
        }

        debug!(worker_id = %self.id, task_id = %task.id, handler = handler.name(), "handling task");
        match run_guarded(handler, running).await {
            Ok(Outcome::Success { result }) => self.complete(&task.id, Status::Success, result).await,
            Ok(Outcome::Skip { reason }) => {
                debug!(task_id = %task.id, reason = %reason, "handler skipped task");
                self.gateway
                    .requeue(&task.id, RequeueReason::Skipped)
                    .await?;
                Ok(Step::Skipped(task.id))
            }
            Err(err) => {
                warn!(
                    worker_id = %self.id,
                    task_id = %task.id,
                    retryable = err.retryable,
                    error = %err,
                    "handler failed"
                );
                self.complete(&task.id, Status::Failed, err.to_result()).await
            }
        }
    }

    async fn complete(&self, id: &TaskId, status: Status, result: serde_json::Value) -> Result<Step> {
        let outcome = self.gateway.finish(id, status, Some(result)).await?;
        Ok(Step::Completed {
            task: id.clone(),
            status: outcome.task().status,
        })
    }

    pub async fn run_once(&self) -> Result<Step> {
        match self.pick().await? {
            Some(task) => self.handle(task).await,
            None => Ok(Step::Idle),
        }
    }

    /// Register, then pick and handle until `shutdown` flips to `true`.
    ///
    /// Heartbeats run on their own task for the lifetime of the loop. On a
    /// clean exit the worker releases itself, which deregisters it.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.register().await?;
        let heartbeat = AbortOnDrop(tokio::spawn(heartbeat_loop(
            self.gateway.clone(),
            self.id.clone(),
            self.pool.clone(),
            self.endpoint.clone(),
            self.heartbeat_interval,
        )));
        info!(worker_id = %self.id, pool = %self.pool, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(Step::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "worker step failed");
                    true
                }
            };
            if idle && wait_or_shutdown(&mut shutdown, self.poll_interval).await {
                break;
            }
        }

        // stop heartbeats first so they cannot re-register us
        drop(heartbeat);
        self.gateway.release_worker(&self.id).await?;
        info!(worker_id = %self.id, "worker stopped");
        Ok(())
    }
}

/// Sleep for `interval` unless shutdown is requested first. Returns `true`
/// on shutdown (or when the sender is gone).
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(interval) => false,
    }
}

async fn heartbeat_loop(
    gateway: Arc<dyn Gateway>,
    id: WorkerId,
    pool: String,
    endpoint: String,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match gateway.heartbeat(&id, Some(&pool), Some(&endpoint)).await {
            Ok(true) => {}
            Ok(false) => warn!(worker_id = %id, "heartbeat rejected"),
            Err(e) => warn!(worker_id = %id, error = %e, "heartbeat failed"),
        }
    }
}

/// Aborts the wrapped task when dropped, so a handler never outlives the
/// worker that started it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the handler on its own task so a panic is contained and reported.
async fn run_guarded(
    handler: Arc<dyn TaskHandler>,
    task: Task,
) -> std::result::Result<Outcome, HandlerError> {
    let mut guard = AbortOnDrop(tokio::spawn(async move { handler.handle(&task).await }));
    match (&mut guard.0).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::retryable("handler panicked")),
        Err(_) => Err(HandlerError::retryable("handler cancelled")),
    }
}
