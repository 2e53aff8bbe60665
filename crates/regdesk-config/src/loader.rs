use std::path::{Path, PathBuf};

use regdesk_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const TRUTHY: &[&str] = &["1", "true", "yes", "on", "y", "t"];
const FALSY: &[&str] = &["", "0", "false", "no", "off", "n", "f"];

/// Builds the process-wide [`AppConfig`] once at startup.
///
/// Sources, lowest precedence first: built-in defaults, an optional YAML or
/// TOML file, then environment variables (after `.env` is loaded).
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    skip_dotenv: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Do not read a `.env` file before consulting the environment.
    pub fn without_dotenv(mut self) -> Self {
        self.skip_dotenv = true;
        self
    }

    pub fn load(&self) -> Result<AppConfig> {
        if !self.skip_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => info!("loaded environment from {}", path.display()),
                Err(e) if e.not_found() => debug!("no .env file found"),
                Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
            }
        }
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.file {
            Some(path) => read_file(path)?,
            None => AppConfig::default(),
        };
        apply_env(&mut config, lookup)?;
        validate(&config)?;
        Ok(config)
    }
}

fn read_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
        other => {
            return Err(Error::Config(format!(
                "unsupported config extension: {other}"
            )));
        }
    };
    info!("loaded config from {}", path.display());
    Ok(config)
}

fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let db = &mut config.database;
    if let Some(url) = lookup("DATABASE_URL") {
        db.url = url;
    }
    if let Some(url) = lookup("DATABASE_ADMIN_URL") {
        db.admin_url = Some(url).filter(|u| !u.trim().is_empty());
    }
    if let Some(name) = lookup("DATABASE_ADMIN_DB") {
        db.admin_database = name;
    }
    if let Some(raw) = lookup("DB_CONNECT_MAX_ATTEMPTS") {
        db.max_attempts = raw.trim().parse().map_err(|_| {
            Error::Config(format!(
                "DB_CONNECT_MAX_ATTEMPTS must be a positive integer, got '{raw}'"
            ))
        })?;
    }
    if let Some(raw) = lookup("DB_CONNECT_INTERVAL_SECS") {
        db.interval_secs = raw.trim().parse().map_err(|_| {
            Error::Config(format!(
                "DB_CONNECT_INTERVAL_SECS must be a number of seconds, got '{raw}'"
            ))
        })?;
    }
    if let Some(raw) = lookup("DB_SKIP_CREATE") {
        db.skip_create = parse_flag("DB_SKIP_CREATE", &raw)?;
    }
    if let Some(raw) = lookup("DB_SKIP_MIGRATIONS") {
        db.skip_migrations = parse_flag("DB_SKIP_MIGRATIONS", &raw)?;
    }

    let gw = &mut config.gateway;
    if let Some(host) = lookup("HOST") {
        gw.host = host;
    }
    if let Some(raw) = lookup("PORT") {
        gw.port = raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("PORT must be a TCP port, got '{raw}'")))?;
    }
    if let Some(key) = lookup("API_KEY") {
        gw.api_key = Some(key).filter(|k| !k.is_empty());
    }
    if let Some(raw) = lookup("CORS_ALLOW_ORIGINS") {
        gw.cors_allow_origins = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    Ok(())
}

fn validate(config: &AppConfig) -> Result<()> {
    let db = &config.database;
    if db.url.trim().is_empty() {
        return Err(Error::Config("DATABASE_URL must not be empty".into()));
    }
    if db.max_attempts == 0 {
        return Err(Error::Config(
            "DB_CONNECT_MAX_ATTEMPTS must be at least 1".into(),
        ));
    }
    db.probe_interval()?;
    if db.admin_database.trim().is_empty() {
        return Err(Error::Config("DATABASE_ADMIN_DB must not be empty".into()));
    }
    Ok(())
}

/// Parse a boolean-like flag. Unrecognised tokens are rejected rather than
/// silently treated as false.
pub fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    let token = raw.trim().to_ascii_lowercase();
    if TRUTHY.contains(&token.as_str()) {
        Ok(true)
    } else if FALSY.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(Error::Config(format!(
            "{key} must be a boolean (one of {} or {}), got '{raw}'",
            TRUTHY.join("/"),
            FALSY[1..].join("/")
        )))
    }
}
