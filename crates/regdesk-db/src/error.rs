use thiserror::Error;

/// A classified driver failure.
///
/// The prober decides whether to retry, provision, or give up purely from the
/// variant, so backends must map their native errors carefully.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("database does not exist: {0}")]
    MissingDatabase(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Reasons the startup sequence cannot reach `Ready`.
///
/// Endpoints are always carried in their masked rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("database at {endpoint} unreachable after {attempts} attempt(s): {last_error}")]
    Unreachable {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    #[error("authentication to {endpoint} failed: {message}")]
    AuthenticationFailure { endpoint: String, message: String },

    #[error("migration step {stage} failed: {message}")]
    Migration { stage: String, message: String },

    #[error("could not provision database via {endpoint}: {message}")]
    Provisioning { endpoint: String, message: String },

    #[error("invalid migration chain: {0}")]
    Configuration(String),

    #[error("startup interrupted by termination signal")]
    Interrupted,
}

impl StartupError {
    pub(crate) fn migration(stage: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Migration {
            stage: stage.into(),
            message: err.to_string(),
        }
    }
}

impl From<StartupError> for regdesk_common::Error {
    fn from(e: StartupError) -> Self {
        regdesk_common::Error::Startup(e.to_string())
    }
}

impl From<DbError> for regdesk_common::Error {
    fn from(e: DbError) -> Self {
        regdesk_common::Error::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_convert_into_common_errors() {
        let err: regdesk_common::Error = StartupError::Interrupted.into();
        assert_eq!(
            err.to_string(),
            "startup error: startup interrupted by termination signal"
        );

        let err: regdesk_common::Error = DbError::Query("syntax error".into()).into();
        assert_eq!(err.to_string(), "database error: query failed: syntax error");
    }
}
