use crate::core::{JobError, PersistenceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// What caused a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Record of one job execution. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub job_id: String,
    pub trigger: TriggerKind,
    pub trigger_time: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_affected: u64,
    pub outcome: RunOutcome,
    pub error_detail: Option<String>,
}

impl ScheduleRun {
    pub fn new(
        job_id: impl Into<String>,
        trigger: TriggerKind,
        trigger_time: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: &Result<u64, JobError>,
    ) -> Self {
        let (rows_affected, outcome, error_detail) = match result {
            Ok(rows) => (*rows, RunOutcome::Success, None),
            Err(err) => (0, RunOutcome::Failure, Some(err.to_string())),
        };
        Self {
            job_id: job_id.into(),
            trigger,
            trigger_time,
            finished_at,
            rows_affected,
            outcome,
            error_detail,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// Bounded in-memory run history, oldest first
#[derive(Debug, Clone)]
pub struct RunHistory {
    runs: VecDeque<ScheduleRun>,
    capacity: usize,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            runs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, run: ScheduleRun) {
        while self.runs.len() >= self.capacity {
            self.runs.pop_front();
        }
        self.runs.push_back(run);
    }

    pub fn last(&self) -> Option<&ScheduleRun> {
        self.runs.back()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<ScheduleRun> {
        self.runs.iter().cloned().collect()
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Durable destination for run records
#[async_trait]
pub trait RunSink: Send + Sync {
    async fn record(&self, run: &ScheduleRun) -> Result<(), PersistenceError>;
}
