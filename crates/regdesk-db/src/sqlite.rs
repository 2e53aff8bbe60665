use async_trait::async_trait;
use rusqlite::{OpenFlags, params_from_iter};
use tracing::debug;

use crate::connection::{Connection, Row};
use crate::endpoint::{BackendKind, Endpoint};
use crate::error::DbError;

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(endpoint: &Endpoint) -> Result<Self, DbError> {
        let path = endpoint
            .database()
            .ok_or_else(|| DbError::Connection("sqlite endpoint has no database file".into()))?;
        debug!("opening sqlite database at {path}");

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(path, flags)
            .map_err(|e| DbError::Connection(format!("failed to open database: {e}")))?;

        conn.busy_timeout(endpoint.connect_timeout())
            .map_err(|e| DbError::Connection(format!("failed to set busy timeout: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| DbError::Connection(format!("failed to set pragmas: {e}")))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| DbError::Connection(e.to_string()))
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::Query(e.to_string()))
    }

    async fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DbError::Query(format!("failed to prepare query: {e}")))?;
        let width = stmt.column_count();

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| DbError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| DbError::Query(e.to_string()))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(
                    row.get::<_, Option<String>>(i)
                        .map_err(|e| DbError::Query(format!("failed to read column {i}: {e}")))?,
                );
            }
            out.push(values);
        }
        Ok(out)
    }

    async fn execute_atomic(&mut self, statements: &[String]) -> Result<(), DbError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| DbError::Query(format!("failed to begin transaction: {e}")))?;
        for statement in statements {
            tx.execute_batch(statement)
                .map_err(|e| DbError::Query(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| DbError::Query(format!("failed to commit: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteConnection) {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::sqlite_file(dir.path().join("test.db"));
        let conn = SqliteConnection::open(&endpoint).unwrap();
        (dir, conn)
    }

    #[tokio::test]
    async fn query_returns_text_columns_and_nulls() {
        let (_dir, mut conn) = open_temp();
        conn.execute_batch("CREATE TABLE t (a TEXT, b TEXT)").await.unwrap();
        conn.execute_atomic(&["INSERT INTO t VALUES ('x', NULL)".to_string()])
            .await
            .unwrap();

        let rows = conn
            .query("SELECT a, b FROM t WHERE a = ?1", &[Some("x")])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Some("x".to_string()), None]]);
    }

    #[tokio::test]
    async fn failed_atomic_batch_leaves_no_trace() {
        let (_dir, mut conn) = open_temp();
        conn.execute_batch("CREATE TABLE t (a TEXT PRIMARY KEY)").await.unwrap();

        let result = conn
            .execute_atomic(&[
                "INSERT INTO t VALUES ('one')".to_string(),
                "INSERT INTO nowhere VALUES ('two')".to_string(),
            ])
            .await;
        assert!(matches!(result, Err(DbError::Query(_))));

        let rows = conn.query("SELECT a FROM t", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn missing_parent_directory_is_a_connection_error() {
        let endpoint = Endpoint::sqlite_file("/nonexistent-dir/regdesk/test.db");
        assert!(matches!(
            SqliteConnection::open(&endpoint),
            Err(DbError::Connection(_))
        ));
    }
}
