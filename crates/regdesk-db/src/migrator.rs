use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::connection::{self, Connection, Connector};
use crate::endpoint::Endpoint;
use crate::error::StartupError;
use crate::migrations::{
    self, LEDGER_TABLE, Migration, ledger_append, ledger_contains_query, ledger_remove,
};
use crate::schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Number of migrations applied by this run; zero means already at head.
    Applied(usize),
    /// No migrations are registered, so the caller must fall back.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: Vec<&'static str>,
    pub pending: Vec<&'static str>,
}

/// Applies the registered migration chain and records progress in the ledger.
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(migrations: Vec<Migration>) -> Self {
        Self { migrations }
    }

    /// The chain shipped with this build.
    pub fn registered() -> Self {
        Self::new(migrations::registered())
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Root-to-head order, after checking the chain is a single line.
    pub fn plan(&self) -> Result<Vec<Migration>, StartupError> {
        resolve_chain(&self.migrations)
    }

    pub fn head(&self) -> Result<Option<&'static str>, StartupError> {
        Ok(self.plan()?.last().map(|m| m.id))
    }

    pub async fn upgrade_to_head(
        &self,
        connector: &dyn Connector,
        endpoint: &Endpoint,
    ) -> Result<MigrationOutcome, StartupError> {
        if self.migrations.is_empty() {
            info!("no migrations registered");
            return Ok(MigrationOutcome::NotApplicable);
        }
        // Validate before touching the database.
        let chain = self.plan()?;

        let mut conn = open(connector, endpoint).await?;
        let backend = conn.backend();
        conn.execute_batch(&backend.ledger_table_ddl(LEDGER_TABLE))
            .await
            .map_err(|e| StartupError::migration("ledger", e))?;

        let mut applied = 0;
        for migration in &chain {
            if ledger_contains(conn.as_mut(), migration.id).await? {
                debug!("migration {} already applied", migration.id);
                continue;
            }

            let mut statements = if column_present(conn.as_mut(), migration).await? {
                info!(
                    "migration {} adds a column that already exists, recording it only",
                    migration.id
                );
                Vec::new()
            } else {
                info!("applying migration {}: {}", migration.id, migration.description);
                (migration.forward)(backend)
            };
            statements.push(ledger_append(migration.id));

            if let Err(e) = conn.execute_atomic(&statements).await {
                error!("migration {} failed, nothing recorded: {e}", migration.id);
                return Err(StartupError::migration(migration.id, e));
            }
            applied += 1;
        }

        match chain.last() {
            Some(head) if applied == 0 => info!("database already at head {}", head.id),
            Some(head) => info!("applied {applied} migration(s), now at head {}", head.id),
            None => {}
        }
        Ok(MigrationOutcome::Applied(applied))
    }

    pub async fn status(
        &self,
        connector: &dyn Connector,
        endpoint: &Endpoint,
    ) -> Result<MigrationStatus, StartupError> {
        let chain = self.plan()?;
        let mut conn = open(connector, endpoint).await?;

        let has_ledger = schema::table_exists(conn.as_mut(), LEDGER_TABLE)
            .await
            .map_err(|e| StartupError::migration("ledger", e))?;

        let mut status = MigrationStatus {
            applied: Vec::new(),
            pending: Vec::new(),
        };
        for migration in &chain {
            if has_ledger && ledger_contains(conn.as_mut(), migration.id).await? {
                status.applied.push(migration.id);
            } else {
                status.pending.push(migration.id);
            }
        }
        Ok(status)
    }

    /// Revert applied migrations newer than `target`, head first. `None`
    /// reverts everything. Operator-only; startup never calls this.
    pub async fn downgrade_to(
        &self,
        connector: &dyn Connector,
        endpoint: &Endpoint,
        target: Option<&str>,
    ) -> Result<usize, StartupError> {
        let chain = self.plan()?;
        let keep = match target {
            None => 0,
            Some(id) => {
                chain
                    .iter()
                    .position(|m| m.id == id)
                    .ok_or_else(|| {
                        StartupError::Configuration(format!("unknown migration '{id}'"))
                    })?
                    + 1
            }
        };

        let mut conn = open(connector, endpoint).await?;
        let backend = conn.backend();
        if !schema::table_exists(conn.as_mut(), LEDGER_TABLE)
            .await
            .map_err(|e| StartupError::migration("ledger", e))?
        {
            info!("no migration ledger present, nothing to revert");
            return Ok(0);
        }

        let mut reverted = 0;
        for migration in chain[keep..].iter().rev() {
            if !ledger_contains(conn.as_mut(), migration.id).await? {
                continue;
            }
            info!("reverting migration {}: {}", migration.id, migration.description);
            let mut statements = (migration.reverse)(backend);
            statements.push(ledger_remove(migration.id));
            conn.execute_atomic(&statements)
                .await
                .map_err(|e| StartupError::migration(migration.id, e))?;
            reverted += 1;
        }
        Ok(reverted)
    }
}

async fn open(
    connector: &dyn Connector,
    endpoint: &Endpoint,
) -> Result<Box<dyn Connection>, StartupError> {
    connector
        .connect(endpoint)
        .await
        .map_err(|e| StartupError::migration("connect", e))
}

async fn ledger_contains(conn: &mut dyn Connection, id: &str) -> Result<bool, StartupError> {
    let sql = ledger_contains_query(conn.backend());
    connection::exists(conn, &sql, id)
        .await
        .map_err(|e| StartupError::migration("ledger", e))
}

async fn column_present(
    conn: &mut dyn Connection,
    migration: &Migration,
) -> Result<bool, StartupError> {
    let Some((table, column)) = migration.adds_column else {
        return Ok(false);
    };
    let columns = schema::table_columns(conn, table)
        .await
        .map_err(|e| StartupError::migration(migration.id, e))?;
    Ok(columns.iter().any(|c| c == column))
}

/// Order migrations root to head. Rejects duplicate ids, missing or multiple
/// roots, unknown predecessors, branches, and cycles.
pub fn resolve_chain(migrations: &[Migration]) -> Result<Vec<Migration>, StartupError> {
    if migrations.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = HashSet::new();
    for m in migrations {
        if !ids.insert(m.id) {
            return Err(StartupError::Configuration(format!(
                "migration id '{}' is registered twice",
                m.id
            )));
        }
    }

    let roots: Vec<_> = migrations.iter().filter(|m| m.predecessor.is_none()).collect();
    let root = match roots.as_slice() {
        [root] => *root,
        [] => {
            return Err(StartupError::Configuration(
                "no root migration (every migration names a predecessor)".into(),
            ));
        }
        many => {
            let names: Vec<_> = many.iter().map(|m| m.id).collect();
            return Err(StartupError::Configuration(format!(
                "multiple root migrations: {}",
                names.join(", ")
            )));
        }
    };

    let mut successor: HashMap<&str, &Migration> = HashMap::new();
    for m in migrations {
        let Some(prev) = m.predecessor else { continue };
        if !ids.contains(prev) {
            return Err(StartupError::Configuration(format!(
                "migration '{}' revises unknown migration '{prev}'",
                m.id
            )));
        }
        if let Some(other) = successor.insert(prev, m) {
            return Err(StartupError::Configuration(format!(
                "migrations '{}' and '{}' both revise '{prev}'",
                other.id, m.id
            )));
        }
    }

    let mut ordered = vec![*root];
    let mut current = root.id;
    while let Some(next) = successor.get(current) {
        ordered.push(**next);
        current = next.id;
    }

    if ordered.len() != migrations.len() {
        return Err(StartupError::Configuration(
            "migration chain contains a cycle unreachable from the root".into(),
        ));
    }
    Ok(ordered)
}
