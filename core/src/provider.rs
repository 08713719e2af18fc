//! Connection provider — turns a `DbConfig` into a pooled, reusable store.
//!
//! RULES:
//!   - Build once per process and pass the store by reference. Never rebuild per call.
//!   - TCP to anything but loopback must be encrypted; the handshake fails rather
//!     than falling back to plaintext.
//!   - The search path is pinned to the configured schema on every connection.
//!   - Pooled connections are validated on checkout and recycled after
//!     `pool_recycle_secs`.

use crate::{
    config::{DbConfig, Topology},
    error::{IngestError, IngestResult},
    store::{CurtailmentStore, PgStore},
    types::checked_identifier,
};
use postgres::config::SslMode;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres_rustls::MakeRustlsConnect;

/// Transport encryption demanded for a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPolicy {
    /// Unix socket: TLS does not apply.
    Disabled,
    /// Loopback TCP: use TLS if the server offers it.
    Optional,
    /// Remote TCP: TLS or no connection.
    Required,
}

impl TransportPolicy {
    pub fn for_topology(topology: &Topology) -> Self {
        match topology {
            Topology::CloudSocket { .. } => TransportPolicy::Disabled,
            Topology::Tcp { .. } if topology.is_loopback() => TransportPolicy::Optional,
            Topology::Tcp { .. } => TransportPolicy::Required,
        }
    }

    fn ssl_mode(self) -> SslMode {
        match self {
            TransportPolicy::Disabled => SslMode::Disable,
            TransportPolicy::Optional => SslMode::Prefer,
            TransportPolicy::Required => SslMode::Require,
        }
    }
}

/// Startup options that pin unqualified names to `schema`.
pub fn search_path_options(schema: &str) -> IngestResult<String> {
    let schema = checked_identifier(schema).map_err(|e| IngestError::Connection(e.to_string()))?;
    if schema.contains(' ') {
        // libpq splits startup options on whitespace.
        return Err(IngestError::Connection(format!("schema '{schema}' cannot be pinned as search_path")));
    }
    Ok(format!("-c search_path={schema}"))
}

/// Postgres client configuration for `config`, without connecting.
pub fn pg_config(config: &DbConfig) -> IngestResult<(postgres::Config, TransportPolicy)> {
    config.validate()?;
    let topology = config.topology()?;
    let policy = TransportPolicy::for_topology(&topology);

    let mut pg = postgres::Config::new();
    pg.user(&config.username)
        .password(&config.password)
        .dbname(&config.database)
        .options(&search_path_options(&config.schema)?)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .ssl_mode(policy.ssl_mode());
    match &topology {
        // A host starting with '/' is a unix socket directory.
        Topology::CloudSocket { socket_dir } => {
            pg.host(socket_dir);
        }
        Topology::Tcp { host, port } => {
            pg.host(host).port(*port);
        }
    }
    Ok((pg, policy))
}

fn tls_connector() -> IngestResult<MakeRustlsConnect> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| IngestError::Connection(format!("TLS setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(tls))
}

pub struct ConnectionProvider {
    config: DbConfig,
}

impl ConnectionProvider {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> IngestResult<Self> {
        Ok(Self::new(DbConfig::from_env()?))
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Build the pool. One idle connection is opened eagerly, so an unreachable
    /// server fails here and not on first use.
    pub fn connect(&self) -> IngestResult<PgStore> {
        let (pg, policy) = pg_config(&self.config)?;
        let topology = self.config.topology()?;
        log::info!(
            "connecting to postgres db={} user={} at {topology} (tls {policy:?}, search_path={})",
            self.config.database,
            self.config.username,
            self.config.schema,
        );

        let manager = PostgresConnectionManager::new(pg, tls_connector()?);
        let pool = Pool::builder()
            .max_size(self.config.pool_max_size)
            .min_idle(Some(1))
            .test_on_check_out(true)
            .max_lifetime(Some(Duration::from_secs(self.config.pool_recycle_secs)))
            .connection_timeout(Duration::from_secs(self.config.connect_timeout_secs.max(1)))
            .build(manager)
            .map_err(|e| IngestError::Connection(format!("cannot reach {topology}: {e}")))?;

        let store = PgStore::from_pool(pool, self.config.schema.clone());
        log::debug!("postgres pool ready ({:?})", store.pool_state());
        Ok(store)
    }

    /// Connect and make sure the append-only tables exist.
    pub fn connect_and_bootstrap(&self) -> IngestResult<PgStore> {
        let store = self.connect()?;
        store.ensure_schema()?;
        Ok(store)
    }
}
