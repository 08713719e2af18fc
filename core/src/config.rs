//! Configuration — environment variables, with defaults for everything optional.
//!
//! RULE: connection parameters are never hard-coded.
//! Binaries load `.env.local` / `.env` first; the library only reads the env.

use crate::error::{IngestError, IngestResult};
use chrono::Duration;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_SOCKET_ROOT: &str = "/cloudsql";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_SQL_DIR: &str = "sql";

#[derive(Clone, Deserialize)]
pub struct DbConfig {
    pub username: String,
    pub password: String,
    /// Host name or IP. Ignored when `cloud_instance` is set.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    /// Managed-cloud instance identifier; selects the unix-socket topology.
    #[serde(default)]
    pub cloud_instance: Option<String>,
    #[serde(default = "default_socket_root")]
    pub socket_root: String,
    /// Single schema pinned as the search path.
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_pool_max")]
    pub pool_max_size: u32,
    /// Pooled connections older than this are closed and replaced.
    #[serde(default = "default_recycle")]
    pub pool_recycle_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_socket_root() -> String {
    DEFAULT_SOCKET_ROOT.into()
}
fn default_schema() -> String {
    DEFAULT_SCHEMA.into()
}
fn default_pool_max() -> u32 {
    5
}
fn default_recycle() -> u64 {
    1800
}
fn default_connect_timeout() -> u64 {
    10
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("cloud_instance", &self.cloud_instance)
            .field("socket_root", &self.socket_root)
            .field("schema", &self.schema)
            .field("pool_max_size", &self.pool_max_size)
            .field("pool_recycle_secs", &self.pool_recycle_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Where the database lives, as far as the transport is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Managed-cloud unix socket directory, e.g. `/cloudsql/<instance>`.
    CloudSocket { socket_dir: String },
    /// Direct TCP connection.
    Tcp { host: String, port: u16 },
}

impl Topology {
    pub fn is_loopback(&self) -> bool {
        match self {
            Topology::CloudSocket { .. } => false,
            Topology::Tcp { host, .. } => {
                host.eq_ignore_ascii_case("localhost")
                    || host
                        .trim_matches(|c| c == '[' || c == ']')
                        .parse::<IpAddr>()
                        .map(|ip| ip.is_loopback())
                        .unwrap_or(false)
            }
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::CloudSocket { socket_dir } => write!(f, "socket {socket_dir}"),
            Topology::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

impl DbConfig {
    /// Read from the process environment.
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| IngestError::Connection(format!("missing configuration {key}")))
        };

        let cloud_instance = get("CLOUD_SQL_INSTANCE");
        let host = get("DB_IP");
        if cloud_instance.is_none() && host.is_none() {
            return Err(IngestError::Connection(
                "missing configuration DB_IP (or CLOUD_SQL_INSTANCE)".into(),
            ));
        }

        let config = Self {
            username: required("DB_USERNAME")?,
            password: required("DB_PASSWORD")?,
            host,
            port: parse_or(get("DB_PORT"), "DB_PORT", DEFAULT_PORT)?,
            database: required("DB_NAME")?,
            cloud_instance,
            socket_root: get("CLOUD_SQL_SOCKET_DIR").unwrap_or_else(default_socket_root),
            schema: get("DB_SCHEMA").unwrap_or_else(default_schema),
            pool_max_size: parse_or(get("DB_POOL_MAX"), "DB_POOL_MAX", default_pool_max())?,
            pool_recycle_secs: parse_or(
                get("DB_POOL_RECYCLE_SECS"),
                "DB_POOL_RECYCLE_SECS",
                default_recycle(),
            )?,
            connect_timeout_secs: parse_or(
                get("DB_CONNECT_TIMEOUT_SECS"),
                "DB_CONNECT_TIMEOUT_SECS",
                default_connect_timeout(),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.pool_max_size == 0 {
            return Err(IngestError::Connection("DB_POOL_MAX must be at least 1".into()));
        }
        if self.pool_recycle_secs == 0 {
            return Err(IngestError::Connection("DB_POOL_RECYCLE_SECS must be at least 1".into()));
        }
        crate::types::checked_identifier(&self.schema)
            .map_err(|e| IngestError::Connection(e.to_string()))?;
        self.topology().map(|_| ())
    }

    /// Cloud instance wins over a host when both are configured.
    pub fn topology(&self) -> IngestResult<Topology> {
        if let Some(instance) = &self.cloud_instance {
            let root = self.socket_root.trim_end_matches('/');
            return Ok(Topology::CloudSocket {
                socket_dir: format!("{root}/{instance}"),
            });
        }
        match &self.host {
            Some(host) => Ok(Topology::Tcp {
                host: host.clone(),
                port: self.port,
            }),
            None => Err(IngestError::Connection("no host or cloud instance configured".into())),
        }
    }

    /// Local database for tests; never connected to.
    pub fn default_test() -> Self {
        Self {
            username: "postgres".into(),
            password: "password".into(),
            host: Some("127.0.0.1".into()),
            port: DEFAULT_PORT,
            database: "wind_curtailment".into(),
            cloud_instance: None,
            socket_root: default_socket_root(),
            schema: default_schema(),
            pool_max_size: default_pool_max(),
            pool_recycle_secs: default_recycle(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> IngestResult<T> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| IngestError::Connection(format!("{key} is not a valid number: '{v}'"))),
    }
}

/// Everything a dashboard or batch process needs besides the database itself.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    /// Directory holding the Reader's query templates.
    pub sql_dir: PathBuf,
    pub cache_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = DbConfig::from_lookup(&lookup)?;
        let sql_dir = lookup("SQL_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SQL_DIR));
        let cache_ttl_secs = parse_or(lookup("CACHE_TTL_SECS"), "CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;
        let config = Self {
            db,
            sql_dir,
            cache_ttl_secs,
        };
        config.cache_ttl()?;
        Ok(config)
    }

    /// Cache lifetime as a duration. Values chrono cannot represent are rejected.
    pub fn cache_ttl(&self) -> IngestResult<Duration> {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                IngestError::Connection(format!("CACHE_TTL_SECS is out of range: {}", self.cache_ttl_secs))
            })
    }

    pub fn default_test() -> Self {
        Self {
            db: DbConfig::default_test(),
            sql_dir: PathBuf::from(DEFAULT_SQL_DIR),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}
