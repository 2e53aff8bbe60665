pub mod connection;
pub mod dialect;
pub mod endpoint;
pub mod error;
pub mod fallback;
pub mod migrations;
pub mod migrator;
mod postgres;
pub mod prober;
pub mod provisioner;
pub mod registration_store;
pub mod schema;
mod sqlite;
pub mod startup;

pub use connection::{Connection, Connector, NativeConnector, Row};
pub use endpoint::{BackendKind, Endpoint};
pub use error::{DbError, StartupError};
pub use fallback::{FallbackOutcome, create_schema_if_absent};
pub use migrations::Migration;
pub use migrator::{MigrationOutcome, MigrationStatus, Migrator};
pub use prober::ConnectionProber;
pub use provisioner::{ProvisionOutcome, Provisioner};
pub use registration_store::RegistrationStore;
pub use schema::{REGISTRATION_TABLE, SchemaDescriptor};
pub use startup::{SchemaOutcome, StartupOrchestrator, StartupState};
