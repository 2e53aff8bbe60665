use async_trait::async_trait;

use crate::endpoint::{BackendKind, Endpoint};
use crate::error::DbError;
use crate::{postgres, sqlite};

/// A result row. Queries cast every selected column to text.
pub type Row = Vec<Option<String>>;

/// A single open connection to a database.
///
/// Bind values are text (or NULL); statements that need other types cast
/// them server-side. `execute_atomic` runs its statements in one
/// transaction and rolls back on the first failure.
#[async_trait]
pub trait Connection: Send {
    fn backend(&self) -> BackendKind;

    /// Minimal round trip used as a liveness check.
    async fn ping(&mut self) -> Result<(), DbError>;

    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError>;

    async fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError>;

    async fn execute_atomic(&mut self, statements: &[String]) -> Result<(), DbError>;
}

/// Opens connections. The orchestrator owns one and hands it to each
/// startup component; nothing holds a process-wide handle.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, DbError>;
}

/// Dispatches on the endpoint's backend to the real drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, DbError> {
        match endpoint.backend() {
            BackendKind::Postgres => Ok(Box::new(postgres::PgConnection::connect(endpoint).await?)),
            BackendKind::Sqlite => Ok(Box::new(sqlite::SqliteConnection::open(endpoint)?)),
        }
    }
}

/// Convenience for the common "does any row match" check.
pub async fn exists(
    conn: &mut dyn Connection,
    sql: &str,
    param: &str,
) -> Result<bool, DbError> {
    Ok(!conn.query(sql, &[Some(param)]).await?.is_empty())
}
