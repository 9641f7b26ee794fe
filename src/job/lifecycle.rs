use super::Job;
use crate::connection::Gateway;
use crate::core::JobError;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

pub const LIFECYCLE_JOB_ID: &str = "daily_tree_life_update";
pub const LIFECYCLE_JOB_NAME: &str = "Daily Tree Life Days Update";

const INCREMENT_SQL: &str =
    "UPDATE tree SET life_days = COALESCE(life_days, 0) + 1, updated_at = $1";

/// Adds one day to the age of every tree
///
/// The whole increment is a single statement in a single transaction:
/// either every tree ages by exactly one day or none does.
#[derive(Debug, Clone)]
pub struct LifecycleUpdateJob {
    gateway: Gateway,
}

impl LifecycleUpdateJob {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Job for LifecycleUpdateJob {
    fn id(&self) -> &str {
        LIFECYCLE_JOB_ID
    }

    fn name(&self) -> &str {
        LIFECYCLE_JOB_NAME
    }

    async fn run(&self) -> Result<u64, JobError> {
        let mut conn = self.gateway.connect().await?;
        let mut tx = conn.begin().await?;

        let rows = match tx
            .execute(INCREMENT_SQL, &[Utc::now().to_rfc3339().into()])
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback after failed increment also failed");
                }
                return Err(err.into());
            }
        };
        tx.commit().await?;

        if let Err(err) = conn.close().await {
            debug!(error = %err, "closing connection after commit failed");
        }

        info!(rows, "life days incremented");
        Ok(rows)
    }
}
