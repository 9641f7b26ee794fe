pub mod lifecycle;

pub use lifecycle::LifecycleUpdateJob;

use crate::core::JobError;
use async_trait::async_trait;

/// Unit of work the scheduler can fire
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identifier used in run records and status output
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Execute once, returning the number of rows touched
    async fn run(&self) -> Result<u64, JobError>;
}
