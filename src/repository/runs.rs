use crate::connection::Gateway;
use crate::core::{PersistenceError, Result};
use crate::scheduler::history::{
    DEFAULT_HISTORY_CAPACITY, RunOutcome, RunSink, ScheduleRun, TriggerKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::any::AnyRow;

/// Persisted run history in the `schedule_run` table
///
/// Keeps at most `capacity` rows; older ones are pruned on every insert.
#[derive(Debug, Clone)]
pub struct RunLog {
    gateway: Gateway,
    capacity: usize,
}

impl RunLog {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub async fn insert(&self, run: &ScheduleRun) -> Result<()> {
        let capacity = i64::try_from(self.capacity).unwrap_or(i64::MAX);
        let rows_affected = i64::try_from(run.rows_affected).unwrap_or(i64::MAX);

        let mut conn = self.gateway.connect().await?;
        let mut tx = conn.begin().await?;
        tx.execute(
            "INSERT INTO schedule_run \
             (job_id, trigger_kind, trigger_time, finished_at, rows_affected, outcome, error_detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                run.job_id.as_str().into(),
                run.trigger.as_str().into(),
                run.trigger_time.to_rfc3339().into(),
                run.finished_at.to_rfc3339().into(),
                rows_affected.into(),
                run.outcome.as_str().into(),
                run.error_detail.clone().into(),
            ],
        )
        .await?;
        tx.execute(
            "DELETE FROM schedule_run WHERE id NOT IN \
             (SELECT id FROM schedule_run ORDER BY id DESC LIMIT $1)",
            &[capacity.into()],
        )
        .await?;
        tx.commit().await
    }

    /// The newest `limit` runs, oldest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<ScheduleRun>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut conn = self.gateway.connect().await?;
        let rows = conn
            .fetch_all(
                "SELECT job_id, trigger_kind, trigger_time, finished_at, rows_affected, \
                 outcome, error_detail FROM schedule_run ORDER BY id DESC LIMIT $1",
                &[limit.into()],
            )
            .await?;

        let mut runs = rows.iter().map(run_from_row).collect::<Result<Vec<_>>>()?;
        runs.reverse();
        Ok(runs)
    }
}

#[async_trait]
impl RunSink for RunLog {
    async fn record(&self, run: &ScheduleRun) -> Result<()> {
        self.insert(run).await
    }
}

fn run_from_row(row: &AnyRow) -> Result<ScheduleRun> {
    let trigger: String = row.try_get("trigger_kind")?;
    let outcome: String = row.try_get("outcome")?;
    let rows_affected: i64 = row.try_get("rows_affected")?;

    Ok(ScheduleRun {
        job_id: row.try_get("job_id")?,
        trigger: TriggerKind::parse(&trigger)
            .ok_or_else(|| PersistenceError::Query(format!("unknown trigger kind '{trigger}'")))?,
        trigger_time: parse_time(&row.try_get::<String, _>("trigger_time")?)?,
        finished_at: parse_time(&row.try_get::<String, _>("finished_at")?)?,
        rows_affected: u64::try_from(rows_affected).unwrap_or(0),
        outcome: RunOutcome::parse(&outcome)
            .ok_or_else(|| PersistenceError::Query(format!("unknown run outcome '{outcome}'")))?,
        error_detail: row.try_get("error_detail")?,
    })
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Query(format!("bad timestamp '{value}': {e}")))
}
