use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heddle_core::domain::{
    Capabilities, HandlerError, Outcome, Status, Task, TaskId, TaskSpec,
};
use heddle_core::runtime::{HandlerRegistry, TaskHandler};
use heddle_core::scheduler::Scheduler;
use heddle_core::spawner::{Spawner, SpawnerConfig};
use serde_json::json;

/// Hangs on its first call, succeeds afterwards.
struct HangsOnce {
    calls: AtomicU32,
    provides: Capabilities,
}

#[async_trait]
impl TaskHandler for HangsOnce {
    fn name(&self) -> &str {
        "hangs-once"
    }

    fn provides(&self) -> &Capabilities {
        &self.provides
    }

    async fn handle(&self, _task: &Task) -> Result<Outcome, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            std::future::pending::<()>().await;
        }
        Ok(Outcome::success(json!({ "call": call })))
    }
}

async fn wait_for_status(s: &Scheduler, id: &TaskId, status: Status) -> Task {
    for _ in 0..400 {
        let task = s.get(id).await.unwrap();
        if task.status == status {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {id} never reached {status}");
}

fn spawner(s: &Arc<Scheduler>, handler: Arc<HangsOnce>) -> Spawner {
    let mut handlers = HandlerRegistry::new();
    handlers.register(handler).unwrap();
    let config = SpawnerConfig {
        warm_pool: 1,
        poll: Duration::from_millis(10),
        ..SpawnerConfig::new("p")
    };
    Spawner::new(
        config,
        s.clone(),
        Arc::new(handlers),
        s.clock().clone(),
    )
}

#[tokio::test]
async fn killed_worker_task_is_requeued_once_then_completed() {
    let s = Arc::new(Scheduler::builder().build().unwrap());
    let handler = Arc::new(HangsOnce {
        calls: AtomicU32::new(0),
        provides: Capabilities::new(),
    });
    let mut spawner = spawner(&s, handler.clone());

    let id = s.submit(TaskSpec::new("p", json!({}))).await.unwrap();
    spawner.fill();

    let running = wait_for_status(&s, &id, Status::Running).await;
    let first = spawner.worker_ids()[0].clone();
    assert_eq!(running.worker, Some(first.clone()));

    assert!(spawner.kill(&first));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let requeued = spawner.poll_once().await.unwrap();
    assert_eq!(requeued, vec![id.clone()]);
    assert!(s.worker(&first).await.unwrap().is_none());

    let done = wait_for_status(&s, &id, Status::Success).await;
    assert_eq!(done.requeues, 1);
    assert_eq!(done.result, Some(json!({ "call": 1 })));
    assert_ne!(done.worker, Some(first));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

    // nothing else died, nothing is requeued again
    assert!(spawner.poll_once().await.unwrap().is_empty());
    spawner.shutdown().await;
}

#[tokio::test]
async fn spawner_run_drives_a_dependency_chain() {
    let s = Arc::new(Scheduler::builder().build().unwrap());
    let handler = Arc::new(HangsOnce {
        calls: AtomicU32::new(1),
        provides: Capabilities::new(),
    });
    let mut spawner = spawner(&s, handler);

    let a = s.submit(TaskSpec::new("p", json!({}))).await.unwrap();
    let b = s
        .submit(
            TaskSpec::new("p", json!({}))
                .depends_on(a.clone())
                .with_edge_pred(format!("results['{a}']['call'] == 1")),
        )
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::watch::channel(false);
    let join = tokio::spawn(async move { spawner.run(rx).await });

    wait_for_status(&s, &a, Status::Success).await;
    let b = wait_for_status(&s, &b, Status::Success).await;
    assert_eq!(b.result, Some(json!({ "call": 2 })));

    tx.send(true).unwrap();
    join.await.unwrap().unwrap();
    assert!(s.workers(Some("p")).await.unwrap().is_empty());
}
