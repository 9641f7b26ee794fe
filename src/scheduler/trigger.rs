use crate::core::SchedulerError;
use chrono::{DateTime, Local};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// When a scheduled job fires
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Cron schedule in local wall-clock time (seconds field first)
    Cron {
        expression: String,
        schedule: Box<Schedule>,
    },
    /// Fixed period, measured from the previous firing
    Every(Duration),
}

impl Trigger {
    /// Once a day at `hour:minute` local time
    ///
    /// # Examples
    ///
    /// ```
    /// use grovekeeper::scheduler::Trigger;
    ///
    /// let midnight = Trigger::daily(0, 0).unwrap();
    /// assert_eq!(midnight.to_string(), "cron(0 0 0 * * *)");
    /// assert!(Trigger::daily(24, 0).is_err());
    /// ```
    pub fn daily(hour: u32, minute: u32) -> Result<Self, SchedulerError> {
        if hour > 23 || minute > 59 {
            return Err(SchedulerError::Trigger(format!(
                "{hour:02}:{minute:02} is not a time of day"
            )));
        }
        Self::cron(&format!("0 {minute} {hour} * * *"))
    }

    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        let expression = expression.trim();
        let schedule = Schedule::from_str(expression)
            .map_err(|e| SchedulerError::Trigger(format!("'{expression}': {e}")))?;
        Ok(Self::Cron {
            expression: expression.to_string(),
            schedule: Box::new(schedule),
        })
    }

    pub fn every(period: Duration) -> Result<Self, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::Trigger("period must be non-zero".into()));
        }
        Ok(Self::Every(period))
    }

    /// First fire time strictly after `after`, if any remain
    pub fn next_after(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&after).next(),
            Self::Every(period) => chrono::Duration::from_std(*period)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron { expression, .. } => write!(f, "cron({expression})"),
            Self::Every(period) => write!(f, "every {period:?}"),
        }
    }
}

/// Walks a trigger's fire times on the tokio clock
///
/// Each deadline is derived from the previous planned fire time rather than
/// from "now", so a slow run does not shift the schedule. Fire times that
/// passed while a run was in progress are skipped, not replayed.
#[derive(Debug)]
pub(crate) struct FireClock {
    trigger: Trigger,
    wall: DateTime<Local>,
    instant: Instant,
}

impl FireClock {
    pub(crate) fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            wall: Local::now(),
            instant: Instant::now(),
        }
    }

    /// Next deadline after the last one handed out, skipping any missed
    pub(crate) fn advance(&mut self) -> Option<(Instant, DateTime<Local>)> {
        let now = Instant::now();
        loop {
            let next = self.trigger.next_after(self.wall)?;
            let wait = (next - self.wall).to_std().unwrap_or_default();
            self.wall = next;
            self.instant += wait;
            if self.instant > now {
                return Some((self.instant, self.wall));
            }
        }
    }
}
