// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend configuration.
//!
//! Values are resolved once at process start with the precedence
//! **environment variable > host config file > hard-coded default** and are never
//! mutated afterwards.
//!
//! # Example
//!
//! ```
//! use admin_bootstrap::{BackendConfig, Dialect};
//!
//! // Defaults only
//! let config = BackendConfig::resolve(|_| None, None).unwrap();
//! assert_eq!(config.dialect, Dialect::Mysql);
//! assert_eq!(config.port, 3306);
//! assert_eq!(config.database, "certificates_db");
//!
//! // Environment wins
//! let config = BackendConfig::resolve(
//!     |key| match key {
//!         "DB_TYPE" => Some("postgres".to_string()),
//!         "DB_NAME" => Some("cards".to_string()),
//!         _ => None,
//!     },
//!     None,
//! )
//! .unwrap();
//! assert_eq!(config.dialect, Dialect::Postgres);
//! assert_eq!(config.port, 5432);
//! assert_eq!(config.user, "postgres");
//! assert_eq!(config.connection_url(), "postgres://postgres@localhost:5432/cards");
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const ENV_DB_TYPE: &str = "DB_TYPE";
pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_DB_CONNECTION_LIMIT: &str = "DB_CONNECTION_LIMIT";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported database type '{0}' (expected mysql, postgres or memory)")]
    UnknownDialect(String),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read host config {path}: {reason}")]
    HostFile { path: String, reason: String },
}

/// SQL dialect of the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Mysql,
    Postgres,
    /// Degraded mode used when no SQL backend is reachable.
    Memory,
}

impl Dialect {
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Postgres => 5432,
            Self::Memory => 0,
        }
    }

    #[must_use]
    pub fn default_user(self) -> &'static str {
        match self {
            Self::Mysql => "root",
            Self::Postgres => "postgres",
            Self::Memory => "",
        }
    }

    /// The other SQL dialect, used by the schema probe's one-shot cross-dialect attempt.
    #[must_use]
    pub fn alternate(self) -> Option<Self> {
        match self {
            Self::Mysql => Some(Self::Postgres),
            Self::Postgres => Some(Self::Mysql),
            Self::Memory => None,
        }
    }

    #[must_use]
    pub fn is_sql(self) -> bool {
        !matches!(self, Self::Memory)
    }

    /// Whether a connection string's scheme belongs to this dialect.
    #[must_use]
    pub fn accepts_url(self, url: &str) -> bool {
        match self {
            Self::Mysql => url.starts_with("mysql:"),
            Self::Postgres => url.starts_with("postgres:") || url.starts_with("postgresql:"),
            Self::Memory => false,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mysql => write!(f, "mysql"),
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(ConfigError::UnknownDialect(other.to_string())),
        }
    }
}

/// Host-provided structured configuration (JSON file).
///
/// ```json
/// { "database": { "type": "mysql", "host": "localhost", "port": 3306,
///                 "user": "root", "password": "secret", "name": "certificates_db",
///                 "connectionLimit": 10 } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub database: HostDatabaseConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDatabaseConfig {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub connection_limit: Option<u32>,
}

impl HostConfig {
    /// Load the host config file. A missing file is not an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::HostFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ConfigError::HostFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

fn default_host() -> String { "localhost".to_string() }
fn default_database() -> String { "certificates_db".to_string() }
fn default_connection_limit() -> u32 { 10 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(10) }
fn default_health_check_timeout() -> Duration { Duration::from_secs(5) }

/// Resolved connection parameters for the active dialect.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub dialect: Dialect,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connection_limit: u32,
    /// Full connection string; supersedes host/port/user/password/database when set.
    pub url: Option<String>,
    pub acquire_timeout: Duration,
    pub health_check_timeout: Duration,
    /// Fall back to the in-memory backend when the SQL backend is unreachable at startup.
    pub memory_fallback: bool,
}

impl BackendConfig {
    /// Defaults for a dialect with no environment or host overrides.
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            host: default_host(),
            port: dialect.default_port(),
            user: dialect.default_user().to_string(),
            password: String::new(),
            database: default_database(),
            connection_limit: default_connection_limit(),
            url: None,
            acquire_timeout: default_acquire_timeout(),
            health_check_timeout: default_health_check_timeout(),
            memory_fallback: true,
        }
    }

    /// In-memory backend (degraded mode, also handy for tests).
    #[must_use]
    pub fn memory() -> Self {
        Self::for_dialect(Dialect::Memory)
    }

    /// Resolve from an environment lookup and an optional host config.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; empty values count as unset.
    pub fn resolve<F>(lookup: F, host: Option<&HostConfig>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let host_db = host.map(|h| &h.database);

        let dialect = match env(ENV_DB_TYPE).or_else(|| host_db.and_then(|d| d.kind.clone())) {
            Some(raw) => raw.parse::<Dialect>()?,
            None => Dialect::Mysql,
        };

        let mut config = Self::for_dialect(dialect);

        if let Some(host_name) = env(ENV_DB_HOST).or_else(|| host_db.and_then(|d| d.host.clone())) {
            config.host = host_name;
        }
        config.port = match env(ENV_DB_PORT) {
            Some(raw) => parse_value(ENV_DB_PORT, &raw)?,
            None => host_db.and_then(|d| d.port).unwrap_or(config.port),
        };
        if let Some(user) = env(ENV_DB_USER).or_else(|| host_db.and_then(|d| d.user.clone())) {
            config.user = user;
        }
        // An explicitly empty DB_PASSWORD is meaningful, so read it without the emptiness filter.
        if let Some(password) = lookup(ENV_DB_PASSWORD).or_else(|| host_db.and_then(|d| d.password.clone())) {
            config.password = password;
        }
        if let Some(name) = env(ENV_DB_NAME).or_else(|| host_db.and_then(|d| d.name.clone())) {
            config.database = name;
        }
        config.connection_limit = match env(ENV_DB_CONNECTION_LIMIT) {
            Some(raw) => parse_value(ENV_DB_CONNECTION_LIMIT, &raw)?,
            None => host_db
                .and_then(|d| d.connection_limit)
                .unwrap_or(config.connection_limit),
        };
        if config.connection_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_DB_CONNECTION_LIMIT,
                value: "0".to_string(),
            });
        }

        if let Some(url) = env(ENV_DATABASE_URL) {
            if dialect.accepts_url(&url) {
                config.url = Some(url);
            } else {
                warn!(dialect = %dialect, "Ignoring DATABASE_URL: scheme does not match the configured dialect");
            }
        }

        Ok(config)
    }

    /// Resolve from the process environment and the host config file at `host_path`.
    pub fn from_env(host_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let host = HostConfig::load(host_path)?;
        Self::resolve(|key| std::env::var(key).ok(), host.as_ref())
    }

    /// Connection string for the sqlx `Any` driver.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.clone();
        }
        let scheme = match self.dialect {
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Memory => return "memory:".to_string(),
        };
        let credentials = if self.password.is_empty() {
            encode_userinfo(&self.user)
        } else {
            format!("{}:{}", encode_userinfo(&self.user), encode_userinfo(&self.password))
        };
        format!(
            "{}://{}@{}:{}/{}",
            scheme, credentials, self.host, self.port, self.database
        )
    }
}

// Keep the password out of logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("database", &self.database)
            .field("connection_limit", &self.connection_limit)
            .field("url", &self.url.as_ref().map(|_| "***"))
            .field("acquire_timeout", &self.acquire_timeout)
            .field("health_check_timeout", &self.health_check_timeout)
            .field("memory_fallback", &self.memory_fallback)
            .finish()
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// Percent-encode the characters that would break the userinfo part of a URL.
fn encode_userinfo(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
