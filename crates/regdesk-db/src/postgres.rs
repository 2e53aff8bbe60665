use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use crate::connection::{Connection, Row};
use crate::endpoint::{BackendKind, Endpoint};
use crate::error::DbError;

pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, DbError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(endpoint.host())
            .port(endpoint.port())
            .connect_timeout(endpoint.connect_timeout());
        if let Ok(addr) = endpoint.host().parse::<std::net::IpAddr>() {
            config.hostaddr(addr);
        }
        if let Some(user) = endpoint.user() {
            config.user(user);
        }
        if let Some(password) = endpoint.password() {
            config.password(password);
        }
        if let Some(db) = endpoint.database() {
            config.dbname(db);
        }
        if let Some(name) = endpoint.application_name() {
            config.application_name(name);
        }

        let (client, connection) = config.connect(NoTls).await.map_err(classify_connect)?;

        // The connection task ends once `client` is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection closed with error: {e}");
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(classify_connect)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.client.batch_execute(sql).await.map_err(classify_query)
    }

    async fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
        let binds: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self
            .client
            .query(sql, &binds)
            .await
            .map_err(classify_query)?;

        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<_, Option<String>>(i))
                    .collect::<Result<Row, _>>()
                    .map_err(classify_query)
            })
            .collect()
    }

    async fn execute_atomic(&mut self, statements: &[String]) -> Result<(), DbError> {
        let tx = self.client.transaction().await.map_err(classify_query)?;
        for statement in statements {
            tx.batch_execute(statement).await.map_err(classify_query)?;
        }
        tx.commit().await.map_err(classify_query)
    }
}

fn message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

/// Classify a failure seen while establishing or checking a connection.
fn classify_connect(e: tokio_postgres::Error) -> DbError {
    match e.code() {
        Some(code)
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            DbError::Authentication(message(&e))
        }
        Some(code) if *code == SqlState::INVALID_CATALOG_NAME => {
            DbError::MissingDatabase(message(&e))
        }
        _ => DbError::Connection(message(&e)),
    }
}

fn classify_query(e: tokio_postgres::Error) -> DbError {
    if e.is_closed() {
        DbError::Connection(message(&e))
    } else {
        DbError::Query(message(&e))
    }
}
