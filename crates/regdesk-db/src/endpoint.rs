use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use regdesk_common::{Error, Result, SECRET_PLACEHOLDER};
use percent_encoding::percent_decode_str;
use url::{Host, Url};

const LEGACY_POSTGRES_SCHEME: &str = "postgres://";
const POSTGRES_SCHEME: &str = "postgresql://";
const SQLITE_SCHEME: &str = "sqlite://";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Sqlite,
}

impl BackendKind {
    /// Whether the server has a database namespace that can be created with
    /// `CREATE DATABASE`.
    pub fn has_server_databases(self) -> bool {
        matches!(self, BackendKind::Postgres)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Postgres => f.write_str("postgresql"),
            BackendKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Rewrite the legacy `postgres://` alias to the canonical scheme.
pub fn normalize_scheme(raw: &str) -> Cow<'_, str> {
    match raw.strip_prefix(LEGACY_POSTGRES_SCHEME) {
        Some(rest) => Cow::Owned(format!("{POSTGRES_SCHEME}{rest}")),
        None => Cow::Borrowed(raw),
    }
}

/// A parsed connection target. Built once from configuration and never
/// mutated; [`Endpoint::with_database`] returns a new value.
///
/// `Display` and `Debug` both mask the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    backend: BackendKind,
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    connect_timeout: Duration,
    application_name: Option<String>,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize_scheme(raw.trim());
        if normalized.starts_with(POSTGRES_SCHEME) {
            Self::parse_postgres(&normalized)
        } else if let Some(rest) = normalized.strip_prefix(SQLITE_SCHEME) {
            Self::parse_sqlite(rest)
        } else {
            let scheme = match normalized.split_once("://") {
                Some((scheme, _)) => scheme,
                None => "<none>",
            };
            Err(Error::Config(format!(
                "unsupported database scheme '{scheme}' (expected postgresql:// or sqlite://)"
            )))
        }
    }

    fn parse_postgres(raw: &str) -> Result<Self> {
        // Never echo `raw` back: it carries the password.
        let url = Url::parse(raw)
            .map_err(|e| Error::Config(format!("malformed postgresql connection string: {e}")))?;

        // IPv6 literals come back bracketed; the driver wants the bare address.
        let host = match url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Domain(name)) if !name.is_empty() => name.to_string(),
            _ => "localhost".to_string(),
        };
        let user = Some(percent_decode(url.username())?).filter(|u| !u.is_empty());
        let password = url.password().map(percent_decode).transpose()?;
        let database = Some(percent_decode(url.path().trim_start_matches('/'))?)
            .filter(|d| !d.is_empty());

        let mut connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        let mut application_name = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "connect_timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        Error::Config(format!("connect_timeout must be whole seconds, got '{value}'"))
                    })?;
                    connect_timeout = Duration::from_secs(secs);
                }
                "application_name" => application_name = Some(value.into_owned()),
                other => tracing::debug!("ignoring connection option '{other}'"),
            }
        }

        Ok(Self {
            backend: BackendKind::Postgres,
            host,
            port: url.port().unwrap_or(DEFAULT_POSTGRES_PORT),
            user,
            password,
            database,
            connect_timeout,
            application_name,
        })
    }

    /// `sqlite:///relative.db` and `sqlite:////absolute/path.db`.
    fn parse_sqlite(rest: &str) -> Result<Self> {
        let path = rest.split('?').next().unwrap_or_default();
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() || path == ":memory:" {
            return Err(Error::Config(
                "sqlite connection strings must name a database file".into(),
            ));
        }
        Ok(Self {
            backend: BackendKind::Sqlite,
            host: String::new(),
            port: 0,
            user: None,
            password: None,
            database: Some(percent_decode(path)?),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            application_name: None,
        })
    }

    pub fn sqlite_file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            host: String::new(),
            port: 0,
            user: None,
            password: None,
            database: Some(path.into().to_string_lossy().into_owned()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            application_name: None,
        }
    }

    /// Same server and credentials, different database.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..self.clone()
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Database name for server backends, file path for SQLite.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    pub fn masked(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            BackendKind::Sqlite => {
                write!(f, "sqlite:///{}", self.database.as_deref().unwrap_or_default())
            }
            BackendKind::Postgres => {
                f.write_str(POSTGRES_SCHEME)?;
                if let Some(user) = &self.user {
                    f.write_str(user)?;
                    if self.password.is_some() {
                        write!(f, ":{SECRET_PLACEHOLDER}")?;
                    }
                    f.write_str("@")?;
                }
                if self.host.contains(':') {
                    write!(f, "[{}]:{}", self.host, self.port)?;
                } else {
                    write!(f, "{}:{}", self.host, self.port)?;
                }
                if let Some(db) = &self.database {
                    write!(f, "/{db}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| SECRET_PLACEHOLDER))
            .field("database", &self.database)
            .finish()
    }
}

fn percent_decode(input: &str) -> Result<String> {
    percent_decode_str(input)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| Error::Config("connection string contains invalid UTF-8 escapes".into()))
}
