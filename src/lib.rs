// ============================================================================
// Grovekeeper Library
// ============================================================================

pub mod config;
pub mod connection;
pub mod control;
pub mod core;
pub mod job;
pub mod model;
pub mod remap;
pub mod repository;
pub mod scheduler;

// Re-export main types for convenience
pub use crate::core::{
    EntityId, JobError, NamespaceId, PersistenceError, RemapError, Result, SchedulerError, Value,
};
pub use model::{Dome, LifeStage, NewTree, PlantType, Tree};

pub use config::AppConfig;
pub use connection::{
    Connection, Gateway, Transaction,
    config::{DatabaseConfig, Dialect},
    schema::{SchemaReport, ensure_schema},
};
pub use control::{ControlResponse, ControlSurface};
pub use job::{Job, LifecycleUpdateJob};
pub use remap::{BrokenRelationship, RemapOutcome, RemapRequest, Remapper};
pub use repository::{GridKind, GridSettingsOutcome, GridSettingsStore, RunLog, TreeRepository};
pub use scheduler::{ScheduleRun, Scheduler, SchedulerStatus, Trigger};

use anyhow::Context;
use std::sync::Arc;

// ============================================================================
// Composition root
// ============================================================================

/// Everything the nursery back office needs, wired together
///
/// Opening a `Nursery` brings the schema up to date and builds a scheduler
/// for the lifecycle job that records runs both in memory and in the
/// `schedule_run` table. The scheduler is not started.
///
/// # Examples
///
/// ```no_run
/// use grovekeeper::{AppConfig, Nursery};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let nursery = Nursery::open(&AppConfig::from_env()?).await?;
///
/// let response = nursery.control().run_now().await;
/// println!("{}", response.to_json());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Nursery {
    gateway: Gateway,
    scheduler: Scheduler,
    control: ControlSurface,
}

impl Nursery {
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let gateway = Gateway::from_url(&config.database_url)
            .context("invalid DATABASE_URL")?;

        let mut conn = gateway
            .connect()
            .await
            .with_context(|| format!("failed to connect to {}", gateway.config().redacted_url()))?;
        ensure_schema(&mut conn)
            .await
            .context("failed to initialize schema")?;
        conn.close().await.context("failed to close setup connection")?;

        let trigger = config.trigger().context("invalid life update schedule")?;
        let run_log = RunLog::new(gateway.clone()).with_capacity(config.history_capacity);
        let scheduler = Scheduler::builder(
            Arc::new(LifecycleUpdateJob::new(gateway.clone())),
            trigger,
        )
        .history_capacity(config.history_capacity)
        .run_sink(Arc::new(run_log))
        .build();

        let control =
            ControlSurface::new(scheduler.clone()).with_remapper(Remapper::new(gateway.clone()));

        Ok(Self {
            gateway,
            scheduler,
            control,
        })
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn control(&self) -> &ControlSurface {
        &self.control
    }

    pub fn trees(&self) -> TreeRepository {
        TreeRepository::new(self.gateway.clone())
    }

    pub fn grid_settings(&self) -> GridSettingsStore {
        GridSettingsStore::new(self.gateway.clone())
    }

    /// Persisted run records
    pub fn run_log(&self) -> RunLog {
        RunLog::new(self.gateway.clone())
    }
}
