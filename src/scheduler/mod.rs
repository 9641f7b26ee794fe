//! Background execution of a [`Job`] on a [`Trigger`].
//!
//! A [`Scheduler`] is a cheap, cloneable handle. It owns at most one timer
//! task; every firing (timed or manual) goes through the same run lock, so
//! job executions never overlap and each produces exactly one
//! [`ScheduleRun`].

pub mod history;
pub mod trigger;

pub use history::{
    DEFAULT_HISTORY_CAPACITY, RunHistory, RunOutcome, RunSink, ScheduleRun, TriggerKind,
};
pub use trigger::Trigger;

use crate::core::SchedulerError;
use crate::job::Job;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trigger::FireClock;

/// Snapshot returned by [`Scheduler::status`]
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub scheduled_job_count: usize,
    pub last_run: Option<ScheduleRun>,
    pub jobs: Vec<ScheduledJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub trigger: String,
    pub next_run: Option<DateTime<Local>>,
}

struct TimerTask {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

struct Inner {
    job: Arc<dyn Job>,
    trigger: Trigger,
    run_lock: Mutex<()>,
    timer: Mutex<Option<TimerTask>>,
    history: RwLock<RunHistory>,
    next_run: RwLock<Option<DateTime<Local>>>,
    sink: Option<Arc<dyn RunSink>>,
}

/// Scheduler handle
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use grovekeeper::{Gateway, LifecycleUpdateJob};
/// # use grovekeeper::scheduler::{Scheduler, Trigger};
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = Gateway::from_url("sqlite://nursery.db")?;
/// let job = Arc::new(LifecycleUpdateJob::new(gateway));
///
/// let scheduler = Scheduler::new(job, Trigger::daily(0, 0)?);
/// scheduler.start().await;
///
/// let run = scheduler.run_now().await?;
/// println!("{} trees aged", run.rows_affected);
///
/// scheduler.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Builder for [`Scheduler`]
pub struct SchedulerBuilder {
    job: Arc<dyn Job>,
    trigger: Trigger,
    history_capacity: usize,
    sink: Option<Arc<dyn RunSink>>,
}

impl SchedulerBuilder {
    /// Maximum number of runs kept in memory
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Also hand every run record to `sink`
    pub fn run_sink(mut self, sink: Arc<dyn RunSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                job: self.job,
                trigger: self.trigger,
                run_lock: Mutex::new(()),
                timer: Mutex::new(None),
                history: RwLock::new(RunHistory::new(self.history_capacity)),
                next_run: RwLock::new(None),
                sink: self.sink,
            }),
        }
    }
}

impl Scheduler {
    pub fn new(job: Arc<dyn Job>, trigger: Trigger) -> Self {
        Self::builder(job, trigger).build()
    }

    pub fn builder(job: Arc<dyn Job>, trigger: Trigger) -> SchedulerBuilder {
        SchedulerBuilder {
            job,
            trigger,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sink: None,
        }
    }

    pub fn trigger(&self) -> &Trigger {
        &self.inner.trigger
    }

    /// Register the trigger and start the timer task
    ///
    /// Returns `false` when the scheduler was already running; no second
    /// trigger is registered in that case.
    pub async fn start(&self) -> bool {
        let mut timer = self.inner.timer.lock().await;
        if timer.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!(job = self.inner.job.id(), "scheduler already running");
            return false;
        }

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(timer_loop(
            Arc::downgrade(&self.inner),
            self.inner.trigger.clone(),
            shutdown.clone(),
        ));
        *timer = Some(TimerTask { handle, shutdown });

        info!(
            job = self.inner.job.id(),
            trigger = %self.inner.trigger,
            "scheduler started"
        );
        true
    }

    /// Cancel future firings
    ///
    /// A run already in progress is allowed to finish; this returns once the
    /// timer task has exited. Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.inner.timer.lock().await.take() else {
            return false;
        };

        task.shutdown.notify_one();
        if let Err(err) = task.handle.await {
            error!(error = %err, "scheduler timer task ended abnormally");
        }
        *self.inner.next_run.write().await = None;

        info!(job = self.inner.job.id(), "scheduler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Run the job now, outside the schedule
    ///
    /// Fails with [`SchedulerError::Busy`] if a run is already in progress;
    /// nothing is recorded in that case. A job failure is not an error here:
    /// it comes back as a run whose outcome is [`RunOutcome::Failure`].
    pub async fn run_now(&self) -> Result<ScheduleRun, SchedulerError> {
        let _guard = self
            .inner
            .run_lock
            .try_lock()
            .map_err(|_| SchedulerError::Busy)?;
        Ok(self.inner.execute(TriggerKind::Manual).await)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let is_running = self.is_running().await;
        let last_run = self.inner.history.read().await.last().cloned();
        let next_run = *self.inner.next_run.read().await;

        let jobs = if is_running {
            vec![ScheduledJob {
                id: self.inner.job.id().to_string(),
                name: self.inner.job.name().to_string(),
                trigger: self.inner.trigger.to_string(),
                next_run,
            }]
        } else {
            Vec::new()
        };

        SchedulerStatus {
            is_running,
            scheduled_job_count: jobs.len(),
            last_run,
            jobs,
        }
    }

    /// In-memory run records, oldest first
    pub async fn history(&self) -> Vec<ScheduleRun> {
        self.inner.history.read().await.to_vec()
    }
}

impl Inner {
    /// Run the job and record the outcome. Caller holds `run_lock`.
    async fn execute(&self, kind: TriggerKind) -> ScheduleRun {
        let job_id = self.job.id();
        let trigger_time = Utc::now();
        debug!(job = job_id, trigger = %kind, "job run starting");

        let result = self.job.run().await;
        let run = ScheduleRun::new(job_id, kind, trigger_time, Utc::now(), &result);

        match &result {
            Ok(rows) => info!(job = job_id, trigger = %kind, rows, "job run succeeded"),
            Err(err) => error!(job = job_id, trigger = %kind, error = %err, "job run failed"),
        }

        self.history.write().await.push(run.clone());
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.record(&run).await {
                warn!(job = job_id, error = %err, "failed to persist run record");
            }
        }

        run
    }
}

async fn timer_loop(inner: Weak<Inner>, trigger: Trigger, shutdown: Arc<Notify>) {
    let mut clock = FireClock::new(trigger);

    loop {
        let Some((deadline, wall)) = clock.advance() else {
            info!("trigger has no further fire times");
            break;
        };

        match inner.upgrade() {
            Some(inner) => *inner.next_run.write().await = Some(wall),
            None => break,
        }
        debug!(next_run = %wall, "next firing scheduled");

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = shutdown.notified() => break,
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let _guard = inner.run_lock.lock().await;
        inner.execute(TriggerKind::Scheduled).await;
    }
}
