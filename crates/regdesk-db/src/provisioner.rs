use regdesk_common::Result;
use regdesk_config::DatabaseConfig;
use tracing::{debug, info};

use crate::connection::{self, Connector};
use crate::dialect::{DATABASE_EXISTS_QUERY, create_database};
use crate::endpoint::Endpoint;
use crate::error::StartupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
    Skipped,
}

/// Creates the target database through a short-lived administrative
/// connection when the server reports it missing.
#[derive(Debug, Clone)]
pub struct Provisioner {
    admin_endpoint: Option<Endpoint>,
    admin_database: String,
    skip: bool,
}

impl Provisioner {
    pub fn new(admin_endpoint: Option<Endpoint>, admin_database: impl Into<String>, skip: bool) -> Self {
        Self {
            admin_endpoint,
            admin_database: admin_database.into(),
            skip,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let admin_endpoint = config
            .admin_url
            .as_deref()
            .map(Endpoint::parse)
            .transpose()?;
        Ok(Self::new(
            admin_endpoint,
            config.admin_database.clone(),
            config.skip_create,
        ))
    }

    /// Explicit admin endpoint, or `target` pointed at the administrative
    /// database.
    pub fn admin_endpoint_for(&self, target: &Endpoint) -> Endpoint {
        match &self.admin_endpoint {
            Some(admin) => admin.clone(),
            None => target.with_database(self.admin_database.clone()),
        }
    }

    pub async fn ensure_database_exists(
        &self,
        connector: &dyn Connector,
        target: &Endpoint,
    ) -> std::result::Result<ProvisionOutcome, StartupError> {
        if !target.backend().has_server_databases() {
            debug!("{} has no server-level databases, skipping creation", target.backend());
            return Ok(ProvisionOutcome::Skipped);
        }
        if self.skip {
            debug!("database creation disabled by configuration");
            return Ok(ProvisionOutcome::Skipped);
        }
        let Some(name) = target.database() else {
            debug!("no database named in {target}, skipping creation");
            return Ok(ProvisionOutcome::Skipped);
        };

        let admin = self.admin_endpoint_for(target);
        let failed = |e: crate::error::DbError| StartupError::Provisioning {
            endpoint: admin.masked(),
            message: e.to_string(),
        };

        // Statements on this connection run outside any transaction block,
        // which CREATE DATABASE requires. Dropped on return.
        let mut conn = connector.connect(&admin).await.map_err(failed)?;
        if connection::exists(conn.as_mut(), DATABASE_EXISTS_QUERY, name)
            .await
            .map_err(failed)?
        {
            debug!("database '{name}' already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        conn.execute_batch(&create_database(name))
            .await
            .map_err(failed)?;
        info!("created database '{name}' via {admin}");
        Ok(ProvisionOutcome::Created)
    }
}
