use std::sync::Arc;

use chrono::Utc;
use heddle_core::domain::{LabelUpdate, MIN_RATE, Status, TaskSpec, WorkerId};
use heddle_core::error::SchedulerError;
use heddle_core::ports::{Clock, FixedClock};
use heddle_core::scheduler::Scheduler;
use serde_json::json;

fn setup() -> (Arc<FixedClock>, Scheduler) {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let s = Scheduler::builder().clock(clock.clone()).build().unwrap();
    (clock, s)
}

fn labelled(label: &str) -> TaskSpec {
    TaskSpec::new("p", json!({})).with_label(label)
}

#[tokio::test]
async fn paused_label_holds_tasks_in_queue() {
    let (_clock, s) = setup();
    let worker = WorkerId::from("w");
    let id = s.submit(labelled("batch")).await.unwrap();

    s.pause_label("batch").await.unwrap();
    assert!(s.label("batch").await.unwrap().paused);
    assert!(s.pick("p", &worker).await.unwrap().is_none());
    assert_eq!(s.list_ready("p").await.unwrap().len(), 1);

    s.resume_label("batch").await.unwrap();
    assert_eq!(s.pick("p", &worker).await.unwrap().unwrap().id, id);
}

#[tokio::test]
async fn held_tasks_do_not_block_other_labels() {
    let (_clock, s) = setup();
    let worker = WorkerId::from("w");
    s.submit(labelled("slow")).await.unwrap();
    let other = s.submit(labelled("fast")).await.unwrap();

    s.pause_label("slow").await.unwrap();
    assert_eq!(s.pick("p", &worker).await.unwrap().unwrap().id, other);
}

#[tokio::test]
async fn rate_limit_spaces_dispatches() {
    let (clock, s) = setup();
    let worker = WorkerId::from("w");
    s.submit(labelled("api")).await.unwrap();
    s.submit(labelled("api")).await.unwrap();

    s.update_label(
        "api",
        LabelUpdate {
            rate: Some(2.0),
            ..LabelUpdate::default()
        },
    )
    .await
    .unwrap();

    assert!(s.pick("p", &worker).await.unwrap().is_some());
    assert!(s.pick("p", &worker).await.unwrap().is_none());

    clock.advance(chrono::Duration::milliseconds(500));
    assert!(s.pick("p", &worker).await.unwrap().is_some());
}

fn rate(rate: f64) -> LabelUpdate {
    LabelUpdate {
        rate: Some(rate),
        ..LabelUpdate::default()
    }
}

#[tokio::test]
async fn vanishing_rate_is_rejected_and_picks_keep_working() {
    let (_clock, s) = setup();
    let worker = WorkerId::from("w");
    s.submit(labelled("api")).await.unwrap();
    s.submit(labelled("api")).await.unwrap();

    let err = s.update_label("api", rate(1e-14)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidLabelUpdate { .. }));
    assert!(s.label("api").await.unwrap().rate.is_none());

    assert!(s.pick("p", &worker).await.unwrap().is_some());
    assert!(s.pick("p", &worker).await.unwrap().is_some());
}

#[tokio::test]
async fn slowest_rate_holds_for_a_day() {
    let (clock, s) = setup();
    let worker = WorkerId::from("w");
    s.submit(labelled("nightly")).await.unwrap();
    s.submit(labelled("nightly")).await.unwrap();
    s.update_label("nightly", rate(MIN_RATE)).await.unwrap();

    assert!(s.pick("p", &worker).await.unwrap().is_some());
    clock.advance(chrono::Duration::hours(23));
    assert!(s.pick("p", &worker).await.unwrap().is_none());
    clock.advance(chrono::Duration::hours(1));
    assert!(s.pick("p", &worker).await.unwrap().is_some());
}

#[tokio::test]
async fn expired_label_cancels_tasks_at_pick() {
    let (clock, s) = setup();
    let worker = WorkerId::from("w");
    let id = s.submit(labelled("report")).await.unwrap();

    s.update_label(
        "report",
        LabelUpdate {
            deadline: Some(clock.now() + chrono::Duration::seconds(1)),
            ..LabelUpdate::default()
        },
    )
    .await
    .unwrap();
    clock.advance(chrono::Duration::seconds(2));

    assert!(s.pick("p", &worker).await.unwrap().is_none());
    let task = s.get(&id).await.unwrap();
    assert_eq!(task.status, Status::Cancelled);
    assert_eq!(task.result.unwrap()["msg"], json!("label report deadline passed"));
}

#[tokio::test]
async fn cancel_label_only_touches_tasks_not_yet_dispatched() {
    let (_clock, s) = setup();
    let worker = WorkerId::from("w");
    let dispatched = s.submit(labelled("l")).await.unwrap();
    let queued = s.submit(labelled("l")).await.unwrap();
    let waiting = s
        .submit(labelled("l").depends_on(dispatched.clone()))
        .await
        .unwrap();
    let unrelated = s.submit(labelled("other")).await.unwrap();
    s.pick("p", &worker).await.unwrap().unwrap();

    let mut cancelled = s.cancel_label("l").await.unwrap();
    cancelled.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let mut expected = vec![queued.clone(), waiting.clone()];
    expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(cancelled, expected);

    assert_eq!(s.get(&dispatched).await.unwrap().status, Status::Dispatched);
    assert_eq!(s.get(&unrelated).await.unwrap().status, Status::Queued);
}
