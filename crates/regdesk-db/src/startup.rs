//! Startup sequencing: probe the connection, then bring the schema to the
//! expected shape. Nothing may serve requests until this reaches `Ready`.

use std::future::Future;
use std::sync::Arc;

use regdesk_common::Result;
use regdesk_config::DatabaseConfig;
use tracing::{error, info};

use crate::connection::Connector;
use crate::endpoint::Endpoint;
use crate::error::StartupError;
use crate::fallback::{FallbackOutcome, create_schema_if_absent};
use crate::migrator::{MigrationOutcome, Migrator};
use crate::prober::ConnectionProber;
use crate::provisioner::Provisioner;
use crate::schema::SchemaDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    NotStarted,
    ProbingConnection,
    Migrating,
    Ready,
    Failed,
}

/// How the schema was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Migrated { applied: usize },
    FallbackCreated,
    FallbackSkipped,
}

pub struct StartupOrchestrator {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    prober: ConnectionProber,
    provisioner: Provisioner,
    migrator: Migrator,
    schema: SchemaDescriptor,
    skip_migrations: bool,
    state: StartupState,
}

impl StartupOrchestrator {
    pub fn new(config: &DatabaseConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        Ok(Self {
            connector,
            endpoint: Endpoint::parse(&config.url)?,
            prober: ConnectionProber::from_config(config)?,
            provisioner: Provisioner::from_config(config)?,
            migrator: Migrator::registered(),
            schema: SchemaDescriptor::registration(),
            skip_migrations: config.skip_migrations,
            state: StartupState::NotStarted,
        })
    }

    pub fn with_migrator(mut self, migrator: Migrator) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    /// Run to completion with no external cancellation.
    pub async fn run(&mut self) -> std::result::Result<SchemaOutcome, StartupError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the full sequence, abandoning it if `shutdown` resolves first.
    pub async fn run_until<F>(
        &mut self,
        shutdown: F,
    ) -> std::result::Result<SchemaOutcome, StartupError>
    where
        F: Future<Output = ()>,
    {
        self.ensure_not_started()?;
        let result = tokio::select! {
            result = self.drive() => result,
            () = shutdown => Err(StartupError::Interrupted),
        };

        match &result {
            Ok(outcome) => {
                self.state = StartupState::Ready;
                info!("startup complete ({outcome:?}), ready for requests");
            }
            Err(e) => {
                self.state = StartupState::Failed;
                error!("startup failed: {e}");
            }
        }
        result
    }

    /// Only the probing half; used by maintenance commands that manage
    /// migrations themselves.
    pub async fn probe_until<F>(&mut self, shutdown: F) -> std::result::Result<(), StartupError>
    where
        F: Future<Output = ()>,
    {
        self.ensure_not_started()?;
        let result = tokio::select! {
            result = self.probe() => result,
            () = shutdown => Err(StartupError::Interrupted),
        };
        if result.is_err() {
            self.state = StartupState::Failed;
        }
        result
    }

    /// `Ready` and `Failed` are terminal; a sequence runs at most once.
    fn ensure_not_started(&self) -> std::result::Result<(), StartupError> {
        match self.state {
            StartupState::NotStarted => Ok(()),
            state => Err(StartupError::Configuration(format!(
                "startup sequence already ran (state {state:?})"
            ))),
        }
    }

    async fn drive(&mut self) -> std::result::Result<SchemaOutcome, StartupError> {
        self.probe().await?;

        self.state = StartupState::Migrating;
        let connector = self.connector.as_ref();

        if self.skip_migrations {
            info!("migrations disabled by configuration, using fallback schema creation");
        } else {
            match self.migrator.upgrade_to_head(connector, &self.endpoint).await? {
                MigrationOutcome::Applied(applied) => {
                    return Ok(SchemaOutcome::Migrated { applied });
                }
                MigrationOutcome::NotApplicable => {
                    info!("no migration chain, using fallback schema creation");
                }
            }
        }

        match create_schema_if_absent(connector, &self.endpoint, &self.schema).await? {
            FallbackOutcome::Created => Ok(SchemaOutcome::FallbackCreated),
            FallbackOutcome::Skipped => Ok(SchemaOutcome::FallbackSkipped),
        }
    }

    async fn probe(&mut self) -> std::result::Result<(), StartupError> {
        self.state = StartupState::ProbingConnection;
        info!("waiting for database at {}", self.endpoint);
        self.prober
            .wait_until_ready(self.connector.as_ref(), &self.endpoint, &self.provisioner)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::connection::{Connection, NativeConnector};
    use crate::error::DbError;
    use crate::migrations::Migration;
    use crate::schema::{self, REGISTRATION_TABLE};

    fn sqlite_config(dir: &tempfile::TempDir) -> DatabaseConfig {
        DatabaseConfig {
            url: format!("sqlite:///{}", dir.path().join("forms.db").display()),
            max_attempts: 2,
            interval_secs: 0.0,
            ..DatabaseConfig::default()
        }
    }

    struct Refusing {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self, _: &Endpoint) -> std::result::Result<Box<dyn Connection>, DbError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Connection("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn fresh_sqlite_database_is_migrated_to_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator =
            StartupOrchestrator::new(&sqlite_config(&dir), Arc::new(NativeConnector)).unwrap();
        assert_eq!(orchestrator.state(), StartupState::NotStarted);

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(outcome, SchemaOutcome::Migrated { applied: 2 });
        assert_eq!(orchestrator.state(), StartupState::Ready);

        let mut again =
            StartupOrchestrator::new(&sqlite_config(&dir), Arc::new(NativeConnector)).unwrap();
        let outcome = again.run().await.unwrap();
        assert_eq!(outcome, SchemaOutcome::Migrated { applied: 0 });
    }

    #[tokio::test]
    async fn skip_migrations_uses_fallback_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sqlite_config(&dir);
        config.skip_migrations = true;

        let mut orchestrator =
            StartupOrchestrator::new(&config, Arc::new(NativeConnector)).unwrap();
        assert_eq!(orchestrator.run().await.unwrap(), SchemaOutcome::FallbackCreated);
        let mut again = StartupOrchestrator::new(&config, Arc::new(NativeConnector)).unwrap();
        assert_eq!(again.run().await.unwrap(), SchemaOutcome::FallbackSkipped);

        let mut conn = NativeConnector.connect(orchestrator.endpoint()).await.unwrap();
        assert!(!schema::table_exists(conn.as_mut(), crate::migrations::LEDGER_TABLE)
            .await
            .unwrap());
        assert!(schema::table_exists(conn.as_mut(), REGISTRATION_TABLE).await.unwrap());
    }

    #[tokio::test]
    async fn migrations_enabled_after_fallback_creation_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sqlite_config(&dir);
        config.skip_migrations = true;
        let mut fallback = StartupOrchestrator::new(&config, Arc::new(NativeConnector)).unwrap();
        assert_eq!(fallback.run().await.unwrap(), SchemaOutcome::FallbackCreated);

        config.skip_migrations = false;
        let mut migrating = StartupOrchestrator::new(&config, Arc::new(NativeConnector)).unwrap();
        assert_eq!(
            migrating.run().await.unwrap(),
            SchemaOutcome::Migrated { applied: 2 }
        );
        assert_eq!(migrating.state(), StartupState::Ready);

        let mut conn = NativeConnector.connect(migrating.endpoint()).await.unwrap();
        let columns = schema::table_columns(conn.as_mut(), REGISTRATION_TABLE)
            .await
            .unwrap();
        assert_eq!(columns.len(), 11);
    }

    #[tokio::test]
    async fn empty_migration_registry_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator =
            StartupOrchestrator::new(&sqlite_config(&dir), Arc::new(NativeConnector))
                .unwrap()
                .with_migrator(Migrator::new(Vec::new()));
        assert_eq!(orchestrator.run().await.unwrap(), SchemaOutcome::FallbackCreated);
    }

    #[tokio::test]
    async fn unreachable_database_fails_startup() {
        let connector = Arc::new(Refusing {
            attempts: AtomicUsize::new(0),
        });
        let config = DatabaseConfig {
            max_attempts: 3,
            interval_secs: 0.0,
            ..DatabaseConfig::default()
        };
        let mut orchestrator = StartupOrchestrator::new(&config, connector.clone()).unwrap();

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, StartupError::Unreachable { attempts: 3, .. }));
        assert_eq!(orchestrator.state(), StartupState::Failed);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert!(!err.to_string().contains("forms_password"));
    }

    #[tokio::test]
    async fn failing_migration_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Migration {
            id: "0001",
            predecessor: None,
            description: "broken",
            forward: |_| vec!["CREATE TABLE (".to_string()],
            reverse: |_| Vec::new(),
            adds_column: None,
        };
        let mut orchestrator =
            StartupOrchestrator::new(&sqlite_config(&dir), Arc::new(NativeConnector))
                .unwrap()
                .with_migrator(Migrator::new(vec![broken]));

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, StartupError::Migration { .. }));
        assert_eq!(orchestrator.state(), StartupState::Failed);
    }

    #[tokio::test]
    async fn termination_signal_stops_the_retry_loop() {
        let connector = Arc::new(Refusing {
            attempts: AtomicUsize::new(0),
        });
        let config = DatabaseConfig {
            max_attempts: 1_000,
            interval_secs: 60.0,
            ..DatabaseConfig::default()
        };
        let mut orchestrator = StartupOrchestrator::new(&config, connector.clone()).unwrap();

        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(50));
        let err = orchestrator.run_until(shutdown).await.unwrap_err();

        assert_eq!(err, StartupError::Interrupted);
        assert_eq!(orchestrator.state(), StartupState::Failed);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_states_do_not_rerun() {
        let connector = Arc::new(Refusing {
            attempts: AtomicUsize::new(0),
        });
        let config = DatabaseConfig {
            max_attempts: 1,
            interval_secs: 0.0,
            ..DatabaseConfig::default()
        };
        let mut orchestrator = StartupOrchestrator::new(&config, connector.clone()).unwrap();
        orchestrator.run().await.unwrap_err();

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, StartupError::Configuration(_)));
        assert_eq!(orchestrator.state(), StartupState::Failed);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_connection_string_is_rejected_up_front() {
        let config = DatabaseConfig {
            url: "mysql://u:p@h/db".into(),
            ..DatabaseConfig::default()
        };
        assert!(StartupOrchestrator::new(&config, Arc::new(NativeConnector)).is_err());
    }
}
