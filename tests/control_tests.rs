//! Response envelopes of the control surface.


use grovekeeper::{AppConfig, ControlSurface, NewTree, Nursery, Scheduler, Trigger};
use std::sync::atomic::Ordering;
use std::time::Duration;
use test_utils::{FakeJob, TestDb};

fn hourly() -> Trigger {
    Trigger::every(Duration::from_secs(3600)).unwrap()
}

#[tokio::test]
async fn test_status_of_stopped_scheduler() {
    let control = ControlSurface::new(Scheduler::new(FakeJob::new(), hourly()));

    let json = control.status().await.to_json();

    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["is_running"], false);
    assert_eq!(json["data"]["scheduled_job_count"], 0);
    assert!(json["data"]["last_run"].is_null());
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn test_start_stop_round_trip() {
    let control = ControlSurface::new(Scheduler::new(FakeJob::new(), hourly()));

    let started = control.start().await.to_json();
    assert_eq!(started["data"]["message"], "scheduler started");
    assert_eq!(started["data"]["status"]["is_running"], true);
    assert_eq!(started["data"]["status"]["jobs"][0]["name"], "Fake Job");

    let again = control.start().await.to_json();
    assert_eq!(again["data"]["message"], "scheduler already running");
    assert_eq!(again["data"]["status"]["scheduled_job_count"], 1);

    let stopped = control.stop().await.to_json();
    assert_eq!(stopped["success"], true);
    assert_eq!(stopped["data"]["status"]["is_running"], false);

    let again = control.stop().await.to_json();
    assert_eq!(again["success"], true);
    assert_eq!(again["data"]["message"], "scheduler was not running");
}

#[tokio::test]
async fn test_run_now_success_and_failure() {
    let job = FakeJob::new();
    let control = ControlSurface::new(Scheduler::new(job.clone(), hourly()));

    let ok = control.run_now().await.to_json();
    assert_eq!(ok["success"], true);
    assert_eq!(ok["data"]["run"]["trigger"], "manual");
    assert_eq!(ok["data"]["run"]["rows_affected"], 1);

    job.fail_next.store(true, Ordering::SeqCst);
    let failed = control.run_now().await.to_json();
    assert_eq!(failed["success"], false);
    assert!(failed["error"].as_str().unwrap().contains("no such table"));
    assert_eq!(failed["data"]["run"]["outcome"], "failure");
    assert_eq!(failed["data"]["run"]["trigger"], "manual");
    assert!(failed["data"]["run"]["trigger_time"].is_string());

    let history = control.history().await.to_json();
    assert_eq!(history["data"].as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_busy_run_now_message() {
    let control = ControlSurface::new(Scheduler::new(
        FakeJob::slow(Duration::from_secs(5)),
        hourly(),
    ));

    let first = tokio::spawn({
        let control = control.clone();
        async move { control.run_now().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let busy = control.run_now().await.to_json();
    assert_eq!(busy["success"], false);
    assert_eq!(busy["error"], "a job run is already in progress");

    assert!(first.await.unwrap().success);
}

#[tokio::test]
async fn test_nursery_runs_and_persists() {
    let db = TestDb::new().await;
    let dome = db.dome("North").await;
    db.plant(NewTree::new(dome.id, "Fig", 0, 0).life_days(None))
        .await;

    let config = AppConfig {
        database_url: db.url.clone(),
        ..AppConfig::default()
    };
    let nursery = Nursery::open(&config).await.unwrap();

    let response = nursery.control().run_now().await;
    assert!(response.success, "{:?}", response.error);

    let logged = nursery.run_log().recent(10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].job_id, "daily_tree_life_update");
    assert_eq!(logged[0].rows_affected, 1);

    let status = nursery.scheduler().status().await;
    assert!(!status.is_running);
    assert_eq!(status.last_run.unwrap().rows_affected, 1);
}
