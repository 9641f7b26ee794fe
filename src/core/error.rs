use crate::core::EntityId;
use thiserror::Error;

/// Failures raised at the persistence gateway boundary.
///
/// Nothing above the gateway sees `sqlx::Error`; every driver error is
/// classified into one of these variants first.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl PersistenceError {
    /// True when the backend could not be reached (or never configured).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Connection(_))
    }

    /// True for malformed or constraint-violating statements.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_) | Self::ConstraintViolation(_))
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => Self::Config(e.to_string()),
            sqlx::Error::Database(db) => {
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                    || matches!(db.kind(), sqlx::error::ErrorKind::NotNullViolation)
                {
                    Self::ConstraintViolation(db.message().to_string())
                } else {
                    Self::Query(db.message().to_string())
                }
            }
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::Tls(e) => Self::Connection(e.to_string()),
            e @ (sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_)) => Self::Connection(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Failure of a lifecycle job run, handed back to the scheduler.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("database unreachable: {0}")]
    Connection(#[source] PersistenceError),

    #[error("statement failed: {0}")]
    Query(#[source] PersistenceError),
}

impl From<PersistenceError> for JobError {
    fn from(err: PersistenceError) -> Self {
        if err.is_connection() {
            Self::Connection(err)
        } else {
            Self::Query(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("a job run is already in progress")]
    Busy,

    #[error("job failed: {0}")]
    Job(#[from] JobError),

    #[error("invalid trigger: {0}")]
    Trigger(String),

    #[error("scheduler task error: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum RemapError {
    #[error("entity {0} appears more than once in the source set")]
    DuplicateSource(EntityId),

    #[error("remap rolled back: {0}")]
    Constraint(#[source] PersistenceError),

    #[error("remap could not reach the database: {0}")]
    Connection(#[source] PersistenceError),
}

impl From<PersistenceError> for RemapError {
    fn from(err: PersistenceError) -> Self {
        if err.is_connection() {
            Self::Connection(err)
        } else {
            Self::Constraint(err)
        }
    }
}
