//! Scheduler: the single writer of task state.
//!
//! # Operations
//! - tasks: `submit`, `get`, `patch`, `finish`, `cancel`, `result`
//! - dispatch: `pick`, `requeue`, `release_worker`, `reap_expired_workers`,
//!   `sweep_overdue`
//! - pools: `create_pool`, `pools`, `list_ready`, `tasks`
//! - labels: `label`, `update_label`, `pause_label`, `resume_label`,
//!   `cancel_label`
//! - workers: `register_worker`, `heartbeat`, `worker`, `workers`,
//!   `deregister_worker`
//!
//! # Design
//! - every transition is a CAS on the task record, so concurrent callers
//!   never lose updates and each transition happens once
//! - a task is pushed to its ready queue only by the caller whose CAS moved
//!   it to `queued`
//! - queue entries are snapshots; `pick` trusts the task store, not the
//!   entry, and drops entries whose task is no longer `queued`

mod builder;
mod labels;
mod resolver;

pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::labels::LabelBook;
pub use self::resolver::DependencyResolver;
pub use crate::ports::{FinishOutcome, RequeueReason};

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{
    LabelGate, LabelMeta, LabelUpdate, Status, Task, TaskEvent, TaskEventKind, TaskId,
    TaskPatch, TaskRun, TaskSpec, WorkerId, WorkerRecord, WorkerRegistration, failure_result,
};
use crate::error::{Result, SchedulerError};
use crate::ports::{
    Clock, EventSink, Gateway, IdGenerator, QueueBackend, ResultBackend, TaskStore, Update,
    update_with,
};
use crate::predicate::Predicate;
use crate::registry::WorkerRegistry;

pub const POOLS_KEY: &str = "pools";

/// Tunables of a scheduler instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerOptions {
    /// Ready queues live under `{ready_queue_prefix}:{pool}`.
    pub ready_queue_prefix: String,
    /// Workers silent for longer than this are considered dead.
    pub worker_ttl: Duration,
    pub reaper_interval: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            ready_queue_prefix: "ready".to_string(),
            worker_ttl: Duration::from_secs(15),
            reaper_interval: Duration::from_secs(1),
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueBackend>,
    results: Arc<dyn ResultBackend>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    registry: WorkerRegistry,
    resolver: DependencyResolver,
    labels: LabelBook,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ready_key(&self, pool: &str) -> String {
        format!("{}:{pool}", self.options.ready_queue_prefix)
    }

    // ---- tasks -----------------------------------------------------------

    /// Accept a task into its pool.
    ///
    /// Fails with `InvalidDependency` on a self, unknown or cyclic
    /// dependency. If the requested id is taken, a fresh one is generated;
    /// the returned id is authoritative.
    pub async fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        let mut id = spec
            .id
            .clone()
            .unwrap_or_else(|| self.ids.generate_task_id());
        // settle the id first, dependency checks are relative to it
        if self.store.get(&id).await?.is_some() {
            id = self.fresh_id(&id);
        }
        let mut task = Task::from_spec(id, spec, self.clock.now());

        if let Some(source) = &task.edge_pred
            && let Err(e) = Predicate::parse(source)
        {
            warn!(task_id = %task.id, predicate = %source, error = %e, "edge predicate does not parse, task will stay waiting");
        }

        loop {
            self.resolver.validate(&task).await?;
            task.in_degree = self.resolver.compute_in_degree(&task).await?;
            task.status = if task.in_degree > 0 {
                Status::Waiting
            } else {
                Status::Queued
            };
            if self.store.insert(task.clone()).await? {
                break;
            }
            // lost a race for the id
            task.id = self.fresh_id(&task.id);
        }
        let id = task.id.clone();

        self.create_pool(&task.pool).await?;
        for label in &task.labels {
            self.labels.track(label, &id).await?;
        }
        info!(
            task_id = %id,
            pool = %task.pool,
            status = %task.status,
            in_degree = task.in_degree,
            "task submitted"
        );
        self.events
            .emit(TaskEvent::new(TaskEventKind::Submitted, task.clone()));

        if task.status == Status::Queued {
            self.enqueue(&task).await?;
        } else if let Some(released) = self.resolver.release_if_ready(&id).await? {
            // a dependency finished between computing in-degree and insert
            self.enqueue(&released).await?;
        }
        Ok(id)
    }

    fn fresh_id(&self, taken: &TaskId) -> TaskId {
        let fresh = self.ids.generate_task_id();
        warn!(requested = %taken, assigned = %fresh, "task id already in use, assigning a new one");
        fresh
    }

    pub async fn get(&self, id: &TaskId) -> Result<Task> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(id))
    }

    /// Stored snapshot of a finished task.
    pub async fn result(&self, id: &TaskId) -> Result<Option<TaskRun>> {
        self.results.load(id).await
    }

    /// Restricted update of status, labels, metadata and worker.
    ///
    /// A terminal status on a live task goes through `finish`, so
    /// dependents are re-evaluated. Changing a terminal task is an
    /// administrative override and is logged. Patch never touches ready
    /// queues. A patch naming a worker is a worker report and is ignored
    /// once the task is terminal.
    ///
    /// `queued` and `waiting` are owned by the resolver and `requeue`; a
    /// patch moving a task into either fails with `InvalidTransition`.
    pub async fn patch(&self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        let current = self.get(id).await?;

        if let Some(status) = patch.status
            && matches!(status, Status::Queued | Status::Waiting)
            && status != current.status
        {
            return Err(SchedulerError::InvalidTransition {
                task: id.to_string(),
                from: current.status,
                to: status,
            });
        }

        if let Some(status) = patch.status
            && status.is_terminal()
            && !current.is_terminal()
        {
            let rest = patch.without_status();
            if !rest.is_empty() {
                self.apply_patch(id, &rest).await?;
            }
            return self
                .finish(id, status, None)
                .await
                .map(|outcome| outcome.task().clone());
        }

        self.apply_patch(id, &patch).await
    }

    async fn apply_patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        let now = self.clock.now();
        let (stored, before) = update_with(self.store.as_ref(), id, |t| {
            // worker reports for a task that already finished are stale
            if patch.worker.is_some() && t.is_terminal() {
                return Ok(Update::Skip(None));
            }
            let before = t.clone();
            if t.apply_patch(patch, now) {
                Ok(Update::Write(Some(before)))
            } else {
                Ok(Update::Skip(None))
            }
        })
        .await?;

        let Some(before) = before else {
            debug!(task_id = %id, "patch changed nothing");
            return Ok(stored);
        };

        if before.is_terminal() && before.status != stored.status {
            warn!(
                task_id = %id,
                from = %before.status,
                to = %stored.status,
                "administrative status override on a finished task"
            );
        } else {
            debug!(task_id = %id, status = %stored.status, "task patched");
        }

        for label in stored.labels.iter().filter(|l| !before.labels.contains(l)) {
            self.labels.track(label, id).await?;
        }
        self.events
            .emit(TaskEvent::new(TaskEventKind::Patched, stored.clone()));

        if before.is_terminal() && !before.status.is_success() && stored.status.is_success() {
            self.release_dependents(&stored).await?;
        }
        Ok(stored)
    }

    /// Move a task to a terminal status.
    ///
    /// Already-terminal tasks are left alone and `Stale` is returned:
    /// completions may be delivered more than once.
    pub async fn finish(
        &self,
        id: &TaskId,
        status: Status,
        result: Option<Value>,
    ) -> Result<FinishOutcome> {
        if !status.is_terminal() {
            let current = self.get(id).await?;
            return Err(SchedulerError::InvalidTransition {
                task: id.to_string(),
                from: current.status,
                to: status,
            });
        }

        let now = self.clock.now();
        let (stored, applied) = update_with(self.store.as_ref(), id, |t| {
            if t.is_terminal() {
                return Ok(Update::Skip(false));
            }
            t.status = status;
            t.result = result.clone();
            t.finished_at = Some(now);
            Ok(Update::Write(true))
        })
        .await?;

        if !applied {
            debug!(task_id = %id, status = %stored.status, "stale completion ignored");
            return Ok(FinishOutcome::Stale(stored));
        }

        info!(
            task_id = %id,
            pool = %stored.pool,
            status = %status,
            duration_ms = stored.duration().map(|d| d.num_milliseconds()),
            "task finished"
        );
        if let Err(e) = self.results.store(&TaskRun::from(&stored)).await {
            warn!(task_id = %id, error = %e, "failed to store task result");
        }
        let kind = if status == Status::Cancelled {
            TaskEventKind::Cancelled
        } else {
            TaskEventKind::Finished
        };
        self.events.emit(TaskEvent::new(kind, stored.clone()));

        self.release_dependents(&stored).await?;
        Ok(FinishOutcome::Applied(stored))
    }

    pub async fn cancel(&self, id: &TaskId) -> Result<FinishOutcome> {
        self.finish(id, Status::Cancelled, None).await
    }

    async fn release_dependents(&self, finished: &Task) -> Result<()> {
        for task in self.resolver.on_dependency_finished(finished).await? {
            self.enqueue(&task).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, task: &Task) -> Result<()> {
        let entry = serde_json::to_string(task)?;
        self.queue.push(&self.ready_key(&task.pool), entry).await?;
        debug!(task_id = %task.id, pool = %task.pool, "task queued");
        self.events
            .emit(TaskEvent::new(TaskEventKind::Queued, task.clone()));
        Ok(())
    }

    // ---- dispatch --------------------------------------------------------

    /// Hand the next dispatchable task of `pool` to `worker`.
    ///
    /// Label gates apply here: held tasks go back to the tail of the
    /// queue, tasks of an expired label are cancelled. Each queue entry is
    /// looked at most once per call.
    pub async fn pick(&self, pool: &str, worker: &WorkerId) -> Result<Option<Task>> {
        let key = self.ready_key(pool);
        let mut budget = self.queue.len(&key).await?;

        while budget > 0 {
            budget -= 1;
            let Some(raw) = self.queue.pop(&key).await? else {
                return Ok(None);
            };
            let entry: Task = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(pool, error = %e, "dropping undecodable queue entry");
                    continue;
                }
            };
            let Some(current) = self.store.get(&entry.id).await? else {
                warn!(task_id = %entry.id, pool, "dropping queue entry for unknown task");
                continue;
            };
            if current.status != Status::Queued {
                debug!(task_id = %current.id, status = %current.status, "dropping stale queue entry");
                continue;
            }

            let now = self.clock.now();
            match self.labels.gate(&current.labels, now).await? {
                LabelGate::Hold => {
                    self.queue.push(&key, raw).await?;
                    continue;
                }
                LabelGate::Expired(label) => {
                    info!(task_id = %current.id, label = %label, "label deadline passed, cancelling task");
                    let msg = format!("label {label} deadline passed");
                    self.finish(&current.id, Status::Cancelled, Some(json!({ "msg": msg })))
                        .await?;
                    continue;
                }
                LabelGate::Open => {}
            }

            let (stored, dispatched) = update_with(self.store.as_ref(), &current.id, |t| {
                if t.status != Status::Queued {
                    return Ok(Update::Skip(false));
                }
                t.status = Status::Dispatched;
                t.worker = Some(worker.clone());
                Ok(Update::Write(true))
            })
            .await?;
            if !dispatched {
                continue;
            }

            // rate windows are best effort under concurrent picks, see LabelBook
            self.labels.note_dispatch(&stored.labels, now).await?;
            debug!(task_id = %stored.id, worker_id = %worker, pool, "task dispatched");
            self.events
                .emit(TaskEvent::new(TaskEventKind::Dispatched, stored.clone()));
            return Ok(Some(stored));
        }
        Ok(None)
    }

    /// Put a `dispatched`/`running` task back on its ready queue.
    ///
    /// With `WorkerLost(w)` the task must still be held by `w`; the crash
    /// counter `requeues` is bumped. Returns whether the task was requeued.
    pub async fn requeue(&self, id: &TaskId, reason: RequeueReason) -> Result<bool> {
        let (stored, requeued) = update_with(self.store.as_ref(), id, |t| {
            if !t.status.is_in_flight() {
                return Ok(Update::Skip(false));
            }
            if let RequeueReason::WorkerLost(worker) = &reason
                && t.worker.as_ref() != Some(worker)
            {
                return Ok(Update::Skip(false));
            }
            t.status = Status::Queued;
            t.worker = None;
            t.started_at = None;
            if matches!(reason, RequeueReason::WorkerLost(_)) {
                t.requeues += 1;
            }
            Ok(Update::Write(true))
        })
        .await?;

        if !requeued {
            return Ok(false);
        }
        let entry = serde_json::to_string(&stored)?;
        self.queue.push(&self.ready_key(&stored.pool), entry).await?;
        match &reason {
            RequeueReason::WorkerLost(worker) => warn!(
                task_id = %id,
                worker_id = %worker,
                requeues = stored.requeues,
                "worker lost, task requeued"
            ),
            RequeueReason::Skipped => debug!(task_id = %id, "task skipped by handler, requeued"),
        }
        self.events
            .emit(TaskEvent::new(TaskEventKind::Requeued, stored));
        Ok(true)
    }

    /// Requeue everything `worker` holds, then drop its registration.
    pub async fn release_worker(&self, worker: &WorkerId) -> Result<Vec<TaskId>> {
        let pools = match self.registry.get(worker).await? {
            Some(record) => vec![record.pool],
            None => self.pools().await?,
        };
        let requeued = self.release_held(worker, &pools).await?;
        self.registry.deregister(worker).await?;
        Ok(requeued)
    }

    async fn release_held(&self, worker: &WorkerId, pools: &[String]) -> Result<Vec<TaskId>> {
        let mut requeued = Vec::new();
        for pool in pools {
            for task in self.store.list(pool).await? {
                if task.status.is_in_flight()
                    && task.worker.as_ref() == Some(worker)
                    && self
                        .requeue(&task.id, RequeueReason::WorkerLost(worker.clone()))
                        .await?
                {
                    requeued.push(task.id);
                }
            }
        }
        Ok(requeued)
    }

    /// Expire silent workers and recover their in-flight tasks.
    pub async fn reap_expired_workers(&self) -> Result<Vec<TaskId>> {
        let mut requeued = Vec::new();
        for record in self.registry.expire(self.options.worker_ttl).await? {
            requeued.extend(self.release_held(&record.id, &[record.pool]).await?);
        }
        Ok(requeued)
    }

    /// Fail every task of `pool` that has been `running` for longer than
    /// `sla`. Returns the ids it failed.
    pub async fn sweep_overdue(&self, pool: &str, sla: Duration) -> Result<Vec<TaskId>> {
        let now = self.clock.now();
        let sla = chrono::Duration::from_std(sla)
            .map_err(|e| SchedulerError::Config(format!("sla out of range: {e}")))?;
        let mut failed = Vec::new();

        for task in self.store.list(pool).await? {
            let overdue = task.status == Status::Running
                && task.started_at.is_some_and(|started| started + sla < now);
            if !overdue {
                continue;
            }
            let outcome = self
                .finish(
                    &task.id,
                    Status::Failed,
                    Some(failure_result("deadline exceeded", false)),
                )
                .await?;
            if outcome.is_applied() {
                warn!(task_id = %task.id, pool, "task exceeded its deadline");
                failed.push(task.id);
            }
        }
        Ok(failed)
    }

    // ---- pools -----------------------------------------------------------

    /// Record a pool. Returns `false` if it already existed.
    pub async fn create_pool(&self, name: &str) -> Result<bool> {
        let created = self.queue.sadd(POOLS_KEY, name).await?;
        if created {
            info!(pool = name, "pool created");
        }
        Ok(created)
    }

    pub async fn pools(&self) -> Result<Vec<String>> {
        self.queue.smembers(POOLS_KEY).await
    }

    /// Ready-queue contents of `pool`, without consuming them.
    pub async fn list_ready(&self, pool: &str) -> Result<Vec<Task>> {
        self.queue
            .range(&self.ready_key(pool), 0, -1)
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(SchedulerError::from))
            .collect()
    }

    /// Every task record of `pool`, in submission order.
    pub async fn tasks(&self, pool: &str) -> Result<Vec<Task>> {
        self.store.list(pool).await
    }

    // ---- labels ----------------------------------------------------------

    pub async fn label(&self, label: &str) -> Result<LabelMeta> {
        self.labels.meta(label).await
    }

    pub async fn update_label(&self, label: &str, update: LabelUpdate) -> Result<LabelMeta> {
        let meta = self.labels.update(label, &update).await?;
        info!(label, paused = meta.paused, rate = meta.rate, "label updated");
        Ok(meta)
    }

    pub async fn pause_label(&self, label: &str) -> Result<LabelMeta> {
        self.update_label(
            label,
            LabelUpdate {
                paused: Some(true),
                ..LabelUpdate::default()
            },
        )
        .await
    }

    pub async fn resume_label(&self, label: &str) -> Result<LabelMeta> {
        self.update_label(
            label,
            LabelUpdate {
                paused: Some(false),
                ..LabelUpdate::default()
            },
        )
        .await
    }

    /// Cancel every `queued` or `waiting` task carrying `label`.
    pub async fn cancel_label(&self, label: &str) -> Result<Vec<TaskId>> {
        let mut cancelled = Vec::new();
        for id in self.labels.members(label).await? {
            let Some(task) = self.store.get(&id).await? else {
                continue;
            };
            if !matches!(task.status, Status::Queued | Status::Waiting) {
                continue;
            }
            if self.cancel(&id).await?.is_applied() {
                cancelled.push(id);
            }
        }
        info!(label, count = cancelled.len(), "label cancelled");
        Ok(cancelled)
    }

    // ---- workers ---------------------------------------------------------

    pub async fn register_worker(&self, registration: WorkerRegistration) -> Result<WorkerRecord> {
        self.create_pool(&registration.pool).await?;
        self.registry.register(registration).await
    }

    pub async fn heartbeat(
        &self,
        id: &WorkerId,
        pool: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<bool> {
        self.registry.heartbeat(id, pool, endpoint).await
    }

    pub async fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>> {
        self.registry.get(id).await
    }

    pub async fn workers(&self, pool: Option<&str>) -> Result<Vec<WorkerRecord>> {
        self.registry.list(pool).await
    }

    pub async fn deregister_worker(&self, id: &WorkerId) -> Result<bool> {
        self.registry.deregister(id).await
    }
}

#[async_trait]
impl Gateway for Scheduler {
    async fn pick(&self, pool: &str, worker: &WorkerId) -> Result<Option<Task>> {
        Scheduler::pick(self, pool, worker).await
    }

    async fn patch(&self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        Scheduler::patch(self, id, patch).await
    }

    async fn finish(
        &self,
        id: &TaskId,
        status: Status,
        result: Option<Value>,
    ) -> Result<FinishOutcome> {
        Scheduler::finish(self, id, status, result).await
    }

    async fn requeue(&self, id: &TaskId, reason: RequeueReason) -> Result<bool> {
        Scheduler::requeue(self, id, reason).await
    }

    async fn register_worker(&self, registration: WorkerRegistration) -> Result<WorkerRecord> {
        Scheduler::register_worker(self, registration).await
    }

    async fn heartbeat(
        &self,
        id: &WorkerId,
        pool: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<bool> {
        Scheduler::heartbeat(self, id, pool, endpoint).await
    }

    async fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>> {
        Scheduler::worker(self, id).await
    }

    async fn release_worker(&self, id: &WorkerId) -> Result<Vec<TaskId>> {
        Scheduler::release_worker(self, id).await
    }
}
