use tracing::info;

use crate::connection::Connector;
use crate::endpoint::Endpoint;
use crate::error::{DbError, StartupError};
use crate::schema::{self, SchemaDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    Created,
    Skipped,
}

/// Create `schema` wholesale when its table is absent. No incremental
/// evolution: an existing table is left exactly as it is.
pub async fn create_schema_if_absent(
    connector: &dyn Connector,
    endpoint: &Endpoint,
    schema: &SchemaDescriptor,
) -> Result<FallbackOutcome, StartupError> {
    let failed = |e: DbError| StartupError::migration("fallback schema", e);

    let mut conn = connector.connect(endpoint).await.map_err(failed)?;
    if schema::table_exists(conn.as_mut(), schema.table)
        .await
        .map_err(failed)?
    {
        info!("table {} already exists, skipping fallback creation", schema.table);
        return Ok(FallbackOutcome::Skipped);
    }

    let statements = schema.create_statements(conn.backend());
    conn.execute_atomic(&statements).await.map_err(failed)?;
    info!("created table {} from the data model", schema.table);
    Ok(FallbackOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::NativeConnector;
    use crate::schema::REGISTRATION_TABLE;

    #[tokio::test]
    async fn creates_once_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::sqlite_file(dir.path().join("forms.db"));
        let schema = SchemaDescriptor::registration();

        let first = create_schema_if_absent(&NativeConnector, &endpoint, &schema)
            .await
            .unwrap();
        assert_eq!(first, FallbackOutcome::Created);

        let second = create_schema_if_absent(&NativeConnector, &endpoint, &schema)
            .await
            .unwrap();
        assert_eq!(second, FallbackOutcome::Skipped);

        let mut conn = NativeConnector.connect(&endpoint).await.unwrap();
        let columns = schema::table_columns(conn.as_mut(), REGISTRATION_TABLE)
            .await
            .unwrap();
        assert_eq!(columns.len(), 11);
    }

    #[tokio::test]
    async fn existing_table_is_never_altered() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::sqlite_file(dir.path().join("forms.db"));
        let mut conn = NativeConnector.connect(&endpoint).await.unwrap();
        conn.execute_batch("CREATE TABLE registrationform (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();

        let outcome = create_schema_if_absent(
            &NativeConnector,
            &endpoint,
            &SchemaDescriptor::registration(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, FallbackOutcome::Skipped);

        let columns = schema::table_columns(conn.as_mut(), REGISTRATION_TABLE)
            .await
            .unwrap();
        assert_eq!(columns, vec!["id"]);
    }
}
