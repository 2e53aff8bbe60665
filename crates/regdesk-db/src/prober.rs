use std::time::Duration;

use regdesk_config::DatabaseConfig;
use tracing::{info, warn};

use crate::connection::Connector;
use crate::endpoint::Endpoint;
use crate::error::{DbError, StartupError};
use crate::provisioner::{ProvisionOutcome, Provisioner};

/// Polls the target database until a trivial query succeeds.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionProber {
    max_attempts: u32,
    interval: Duration,
}

impl ConnectionProber {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> regdesk_common::Result<Self> {
        Ok(Self::new(config.max_attempts, config.probe_interval()?))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Retry until the database answers, at most `max_attempts` times.
    ///
    /// Authentication failures end the loop at once. A missing database is
    /// handed to `provisioner` and the loop continues; provisioning failures
    /// are fatal only when no attempt remains. Creating the database on the
    /// last attempt earns one extra attempt to connect to it.
    pub async fn wait_until_ready(
        &self,
        connector: &dyn Connector,
        endpoint: &Endpoint,
        provisioner: &Provisioner,
    ) -> Result<(), StartupError> {
        let mut last_error = String::new();
        let mut allowed = self.max_attempts;
        let mut attempt = 0;

        while attempt < allowed {
            attempt += 1;
            let error = match try_once(connector, endpoint).await {
                Ok(()) => {
                    info!("database ready at {endpoint} (attempt {attempt}/{allowed})");
                    return Ok(());
                }
                Err(e) => e,
            };
            warn!("database not ready (attempt {attempt}/{allowed}) at {endpoint}: {error}");

            match &error {
                DbError::Authentication(message) => {
                    return Err(StartupError::AuthenticationFailure {
                        endpoint: endpoint.masked(),
                        message: message.clone(),
                    });
                }
                DbError::MissingDatabase(_) => {
                    match provisioner.ensure_database_exists(connector, endpoint).await {
                        Ok(ProvisionOutcome::Created)
                            if attempt == allowed && allowed == self.max_attempts =>
                        {
                            info!("database created on the last attempt, trying once more");
                            allowed = allowed.saturating_add(1);
                        }
                        Ok(outcome) => info!("database provisioning: {outcome:?}"),
                        Err(e) if attempt == allowed => return Err(e),
                        Err(e) => warn!("{e}; will retry"),
                    }
                }
                DbError::Connection(_) | DbError::Query(_) => {}
            }
            last_error = error.to_string();

            if attempt < allowed {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(StartupError::Unreachable {
            endpoint: endpoint.masked(),
            attempts: attempt,
            last_error,
        })
    }
}

async fn try_once(connector: &dyn Connector, endpoint: &Endpoint) -> Result<(), DbError> {
    let mut conn = connector.connect(endpoint).await?;
    conn.ping().await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::connection::{Connection, Row};
    use crate::endpoint::BackendKind;

    struct Healthy;

    #[async_trait]
    impl Connection for Healthy {
        fn backend(&self) -> BackendKind {
            BackendKind::Postgres
        }
        async fn ping(&mut self) -> Result<(), DbError> {
            Ok(())
        }
        async fn execute_batch(&mut self, _: &str) -> Result<(), DbError> {
            Ok(())
        }
        async fn query(&mut self, _: &str, _: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
            Ok(Vec::new())
        }
        async fn execute_atomic(&mut self, _: &[String]) -> Result<(), DbError> {
            Ok(())
        }
    }

    /// Replays scripted connect results, then keeps returning `fallback`.
    /// The administrative database refuses connections unless `admin_up`.
    struct Scripted {
        script: Mutex<VecDeque<Result<(), DbError>>>,
        fallback: Result<(), DbError>,
        admin_up: bool,
        attempts: AtomicUsize,
        admin_attempts: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<Result<(), DbError>>, fallback: Result<(), DbError>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                admin_up: false,
                attempts: AtomicUsize::new(0),
                admin_attempts: AtomicUsize::new(0),
            }
        }

        fn with_admin(mut self) -> Self {
            self.admin_up = true;
            self
        }
    }

    #[async_trait]
    impl Connector for Scripted {
        async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, DbError> {
            if endpoint.database() == Some("postgres") {
                self.admin_attempts.fetch_add(1, Ordering::SeqCst);
                if self.admin_up {
                    return Ok(Box::new(Healthy));
                }
                return Err(DbError::Connection("admin refused".into()));
            }
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            next.map(|()| Box::new(Healthy) as Box<dyn Connection>)
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("postgresql://u:s3cr3t@db/forms").unwrap()
    }

    fn provisioner() -> Provisioner {
        Provisioner::new(None, "postgres", false)
    }

    fn prober(attempts: u32) -> ConnectionProber {
        ConnectionProber::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn never_reachable_makes_exactly_n_attempts() {
        for n in [1, 2, 5] {
            let connector = Scripted::new(Vec::new(), Err(DbError::Connection("refused".into())));
            let err = prober(n)
                .wait_until_ready(&connector, &endpoint(), &provisioner())
                .await
                .unwrap_err();

            assert_eq!(connector.attempts.load(Ordering::SeqCst), n as usize);
            match err {
                StartupError::Unreachable {
                    endpoint,
                    attempts,
                    last_error,
                } => {
                    assert_eq!(attempts, n);
                    assert_eq!(endpoint, "postgresql://u:***@db:5432/forms");
                    assert!(last_error.contains("refused"));
                }
                other => panic!("expected Unreachable, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn authentication_failure_short_circuits() {
        let connector = Scripted::new(
            Vec::new(),
            Err(DbError::Authentication("password authentication failed".into())),
        );
        let err = prober(10)
            .wait_until_ready(&connector, &endpoint(), &provisioner())
            .await
            .unwrap_err();

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(err, StartupError::AuthenticationFailure { .. }));
        assert!(!err.to_string().contains("s3cr3t"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let connector = Scripted::new(
            vec![
                Err(DbError::Connection("refused".into())),
                Err(DbError::Connection("starting up".into())),
            ],
            Ok(()),
        );
        prober(5)
            .wait_until_ready(&connector, &endpoint(), &provisioner())
            .await
            .unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_database_delegates_to_provisioner_and_keeps_retrying() {
        let connector = Scripted::new(
            vec![Err(DbError::MissingDatabase("database \"forms\" does not exist".into()))],
            Ok(()),
        );
        prober(3)
            .wait_until_ready(&connector, &endpoint(), &provisioner())
            .await
            .unwrap();
        assert_eq!(connector.admin_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provisioning_failure_on_last_attempt_is_fatal() {
        let connector = Scripted::new(
            Vec::new(),
            Err(DbError::MissingDatabase("database \"forms\" does not exist".into())),
        );
        let err = prober(2)
            .wait_until_ready(&connector, &endpoint(), &provisioner())
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Provisioning { .. }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(connector.admin_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn database_created_on_last_attempt_gets_one_more_try() {
        let connector = Scripted::new(
            vec![
                Err(DbError::Connection("refused".into())),
                Err(DbError::MissingDatabase("database \"forms\" does not exist".into())),
            ],
            Ok(()),
        )
        .with_admin();
        prober(2)
            .wait_until_ready(&connector, &endpoint(), &provisioner())
            .await
            .unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(connector.admin_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extra_try_after_creation_is_granted_once() {
        let connector = Scripted::new(
            Vec::new(),
            Err(DbError::MissingDatabase("database \"forms\" does not exist".into())),
        )
        .with_admin();
        let err = prober(1)
            .wait_until_ready(&connector, &endpoint(), &provisioner())
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Unreachable { attempts: 2, .. }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(connector.admin_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skipped_provisioning_ends_in_unreachable() {
        let connector = Scripted::new(
            Vec::new(),
            Err(DbError::MissingDatabase("database \"forms\" does not exist".into())),
        );
        let err = prober(2)
            .wait_until_ready(&connector, &endpoint(), &Provisioner::new(None, "postgres", true))
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Unreachable { attempts: 2, .. }));
        assert_eq!(connector.admin_attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(ConnectionProber::new(0, Duration::ZERO).max_attempts(), 1);
        let from_config = ConnectionProber::from_config(&DatabaseConfig::default()).unwrap();
        assert_eq!(from_config.max_attempts(), 30);

        let oversized = DatabaseConfig {
            interval_secs: 1e20,
            ..DatabaseConfig::default()
        };
        assert!(ConnectionProber::from_config(&oversized).is_err());
    }
}
