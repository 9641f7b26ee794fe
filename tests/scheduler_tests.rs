//! Scheduler behaviour on tokio's paused clock with a fake job.


use grovekeeper::SchedulerError;
use grovekeeper::scheduler::{RunOutcome, Scheduler, Trigger, TriggerKind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use test_utils::{CollectingSink, FakeJob};
use tokio::time::sleep;

fn every(secs: u64) -> Trigger {
    Trigger::every(Duration::from_secs(secs)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_registers_one_trigger() {
    let job = FakeJob::new();
    let scheduler = Scheduler::new(job.clone(), every(10));

    assert!(scheduler.start().await);
    assert!(!scheduler.start().await);

    sleep(Duration::from_secs(35)).await;

    assert_eq!(job.runs(), 3);
    let status = scheduler.status().await;
    assert!(status.is_running);
    assert_eq!(status.scheduled_job_count, 1);
    assert_eq!(status.jobs[0].id, "fake_job");
    assert!(status.jobs[0].next_run.is_some());

    let history = scheduler.history().await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.trigger == TriggerKind::Scheduled));

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_future_firings() {
    let job = FakeJob::new();
    let scheduler = Scheduler::new(job.clone(), every(10));

    scheduler.start().await;
    sleep(Duration::from_secs(15)).await;
    assert!(scheduler.stop().await);
    assert!(!scheduler.stop().await);

    sleep(Duration::from_secs(100)).await;
    assert_eq!(job.runs(), 1);

    let status = scheduler.status().await;
    assert!(!status.is_running);
    assert_eq!(status.scheduled_job_count, 0);
    assert!(status.jobs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_in_flight_run_finish() {
    let job = FakeJob::slow(Duration::from_secs(5));
    let scheduler = Scheduler::new(job.clone(), every(10));

    scheduler.start().await;
    sleep(Duration::from_secs(12)).await;
    assert_eq!(job.runs(), 0);

    scheduler.stop().await;

    assert_eq!(job.runs(), 1);
    let history = scheduler.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, RunOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_scheduler_can_restart() {
    let job = FakeJob::new();
    let scheduler = Scheduler::new(job.clone(), every(10));

    scheduler.start().await;
    scheduler.stop().await;
    assert!(scheduler.start().await);

    sleep(Duration::from_secs(11)).await;
    assert_eq!(job.runs(), 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_manual_run_is_rejected() {
    let job = FakeJob::slow(Duration::from_secs(5));
    let scheduler = Scheduler::new(job.clone(), every(3600));
    scheduler.start().await;

    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_now().await }
    });
    sleep(Duration::from_secs(1)).await;

    let second = scheduler.run_now().await;
    assert!(matches!(second, Err(SchedulerError::Busy)));

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.trigger, TriggerKind::Manual);
    assert_eq!(job.runs(), 1);
    assert_eq!(scheduler.history().await.len(), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_firing_waits_for_manual_run() {
    let job = FakeJob::slow(Duration::from_secs(15));
    let scheduler = Scheduler::new(job.clone(), every(10));
    scheduler.start().await;

    let manual = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_now().await }
    });

    sleep(Duration::from_secs(31)).await;
    manual.await.unwrap().unwrap();

    let triggers: Vec<TriggerKind> = scheduler
        .history()
        .await
        .iter()
        .map(|r| r.trigger)
        .collect();
    assert_eq!(triggers, vec![TriggerKind::Manual, TriggerKind::Scheduled]);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_recorded_and_schedule_continues() {
    let job = FakeJob::new();
    job.fail_next.store(true, Ordering::SeqCst);
    let scheduler = Scheduler::new(job.clone(), every(10));

    scheduler.start().await;
    sleep(Duration::from_secs(25)).await;

    let history = scheduler.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].outcome, RunOutcome::Failure);
    assert!(
        history[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("no such table")
    );
    assert_eq!(history[1].outcome, RunOutcome::Success);
    assert!(scheduler.is_running().await);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_manual_failure_returned_to_caller() {
    let job = FakeJob::new();
    job.fail_next.store(true, Ordering::SeqCst);
    let scheduler = Scheduler::new(job, every(3600));

    let run = scheduler.run_now().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Failure);
    assert_eq!(run.rows_affected, 0);
    assert_eq!(scheduler.status().await.last_run, Some(run));
}

#[tokio::test]
async fn test_history_is_bounded() {
    let job = FakeJob::new();
    let scheduler = Scheduler::builder(job, every(3600))
        .history_capacity(2)
        .build();

    for _ in 0..5 {
        scheduler.run_now().await.unwrap();
    }

    let rows: Vec<u64> = scheduler
        .history()
        .await
        .iter()
        .map(|r| r.rows_affected)
        .collect();
    assert_eq!(rows, vec![4, 5]);
}

#[tokio::test]
async fn test_runs_are_handed_to_sink() {
    let sink = Arc::new(CollectingSink::default());
    let scheduler = Scheduler::builder(FakeJob::new(), every(3600))
        .run_sink(sink.clone())
        .build();

    let run = scheduler.run_now().await.unwrap();

    assert_eq!(*sink.runs.lock().await, vec![run]);
}
