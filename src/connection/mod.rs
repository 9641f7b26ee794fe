pub mod config;
pub mod schema;

use crate::core::{DataType, PersistenceError, Result, Value};
use config::{DatabaseConfig, Dialect};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Connection as _};
use tracing::debug;

/// Persistence gateway
///
/// Owns the connection configuration and hands out one connection per
/// unit of work. There is no pool: lifecycle runs are rare and
/// single-threaded, so each run connects, works, and releases.
///
/// # Examples
///
/// ```no_run
/// # use grovekeeper::Gateway;
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = Gateway::from_url("sqlite://nursery.db")?;
/// let mut conn = gateway.connect().await?;
///
/// let mut tx = conn.begin().await?;
/// tx.execute("UPDATE tree SET name = $1 WHERE id = $2", &["Oak".into(), 1.into()]).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Gateway {
    config: DatabaseConfig,
}

impl Gateway {
    pub fn new(config: DatabaseConfig) -> Self {
        sqlx::any::install_default_drivers();
        Self { config }
    }

    /// Build a gateway from a connection string, detecting the dialect
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(DatabaseConfig::from_url(url)?))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect()
    }

    /// Open a new connection
    pub async fn connect(&self) -> Result<Connection> {
        let connecting = AnyConnection::connect(self.config.url());
        let inner = tokio::time::timeout(self.config.connect_timeout, connecting)
            .await
            .map_err(|_| {
                PersistenceError::Connection(format!(
                    "timed out after {:?} connecting to {}",
                    self.config.connect_timeout,
                    self.config.redacted_url()
                ))
            })?
            .map_err(|e| match PersistenceError::from(e) {
                // Any failure before the session exists means the backend is unreachable.
                PersistenceError::Query(msg) | PersistenceError::ConstraintViolation(msg) => {
                    PersistenceError::Connection(msg)
                }
                other => other,
            })?;

        debug!(dialect = self.dialect().name(), "connection opened");

        Ok(Connection {
            inner,
            dialect: self.dialect(),
        })
    }
}

/// A live database connection
///
/// Released when dropped, on every exit path.
pub struct Connection {
    inner: AnyConnection,
    dialect: Dialect,
}

impl Connection {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Execute a statement outside an explicit transaction
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let result = bind(sqlx::query(sql), params)
            .execute(&mut self.inner)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<AnyRow>> {
        Ok(bind(sqlx::query(sql), params)
            .fetch_all(&mut self.inner)
            .await?)
    }

    pub async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> Result<Option<AnyRow>> {
        Ok(bind(sqlx::query(sql), params)
            .fetch_optional(&mut self.inner)
            .await?)
    }

    /// Begin a transaction
    ///
    /// Dropping the returned transaction without calling
    /// [`Transaction::commit`] rolls it back.
    pub async fn begin(&mut self) -> Result<Transaction<'_>> {
        let inner = self.inner.begin().await?;
        Ok(Transaction {
            inner,
            dialect: self.dialect,
        })
    }

    /// Explicitly close the connection
    pub async fn close(self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// An open write transaction
pub struct Transaction<'c> {
    inner: sqlx::Transaction<'c, Any>,
    dialect: Dialect,
}

impl Transaction<'_> {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let result = bind(sqlx::query(sql), params)
            .execute(&mut *self.inner)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<AnyRow>> {
        Ok(bind(sqlx::query(sql), params)
            .fetch_all(&mut *self.inner)
            .await?)
    }

    pub async fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<AnyRow> {
        Ok(bind(sqlx::query(sql), params)
            .fetch_one(&mut *self.inner)
            .await?)
    }

    pub async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> Result<Option<AnyRow>> {
        Ok(bind(sqlx::query(sql), params)
            .fetch_optional(&mut *self.inner)
            .await?)
    }

    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await?;
        Ok(())
    }
}

fn bind<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null(DataType::Integer) => query.bind(None::<i64>),
            Value::Null(DataType::Text) => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
        };
    }
    query
}
