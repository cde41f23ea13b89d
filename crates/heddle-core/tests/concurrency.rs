use std::sync::Arc;

use heddle_core::domain::{Status, TaskId, TaskSpec, WorkerId};
use heddle_core::scheduler::Scheduler;
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_finishes_release_dependent_once() {
    for _ in 0..20 {
        let s = Arc::new(Scheduler::builder().build().unwrap());
        let mut deps = Vec::new();
        for _ in 0..8 {
            deps.push(s.submit(TaskSpec::new("p", json!({}))).await.unwrap());
        }
        let join = deps
            .iter()
            .fold(TaskSpec::new("p", json!({})), |spec, dep| spec.depends_on(dep.clone()));
        let join = s.submit(join).await.unwrap();

        // drain the roots so only releases are left in the queue
        let worker = WorkerId::from("w");
        for _ in &deps {
            s.pick("p", &worker).await.unwrap().unwrap();
        }

        let handles: Vec<_> = deps
            .iter()
            .cloned()
            .map(|id| {
                let s = s.clone();
                tokio::spawn(async move { s.finish(&id, Status::Success, None).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_applied());
        }

        let ready: Vec<TaskId> = s
            .list_ready("p")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ready, vec![join.clone()]);
        assert_eq!(s.get(&join).await.unwrap().in_degree, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_picks_hand_out_each_task_once() {
    let s = Arc::new(Scheduler::builder().build().unwrap());
    for _ in 0..50 {
        s.submit(TaskSpec::new("p", json!({}))).await.unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let s = s.clone();
            tokio::spawn(async move {
                let worker = WorkerId::from(format!("w{i}"));
                let mut picked = Vec::new();
                while let Some(task) = s.pick("p", &worker).await.unwrap() {
                    picked.push(task.id);
                }
                picked
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let total = all.len();
    all.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    all.dedup();
    assert_eq!(total, 50);
    assert_eq!(all.len(), 50);
}
