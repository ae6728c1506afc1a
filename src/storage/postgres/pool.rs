//! Connection manager: owns the PostgreSQL connection pool.

use crate::config::PgdocConfig;
use crate::storage::dsn::{redact_dsn, sanitize_dsn, validate_dsn};
use crate::{Error, Result};
use deadpool_postgres::{Config, Object, Pool, Runtime};
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;
use tokio_postgres::NoTls;

/// Helper to map pool errors.
pub(super) fn pool_error(e: impl fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "postgres_get_client".to_string(),
        cause: e.to_string(),
    }
}

/// Lifecycle handle for the process-wide connection pool.
///
/// The connection string is validated and sanitised when the manager is
/// built, so configuration errors surface before any connection attempt.
/// The pool itself is created lazily by [`connect`](Self::connect) or the
/// first [`client`](Self::client) checkout, and torn down by
/// [`close`](Self::close).
pub struct PgConnectionManager {
    /// Sanitised connection string.
    dsn: String,
    /// Parsed connection parameters.
    config: tokio_postgres::Config,
    pool_max_size: usize,
    pool_timeout: Duration,
    pool: RwLock<Option<Pool>>,
}

impl fmt::Debug for PgConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectionManager")
            .field("dsn", &redact_dsn(&self.dsn))
            .field("pool_max_size", &self.pool_max_size)
            .field("pool_timeout", &self.pool_timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl PgConnectionManager {
    /// Default maximum connections in pool.
    pub const DEFAULT_POOL_MAX_SIZE: usize = 10;

    /// Default acquire/create/recycle timeout.
    pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a manager with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the connection string is missing,
    /// truncated or unparseable.
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_settings(
            database_url,
            Self::DEFAULT_POOL_MAX_SIZE,
            Self::DEFAULT_POOL_TIMEOUT,
        )
    }

    /// Creates a manager from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no database URL is configured or
    /// it is malformed.
    pub fn from_config(config: &PgdocConfig) -> Result<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            Error::Configuration(
                "no database URL configured; set PGDOC_DATABASE_URL or SUPABASE_DB_URL"
                    .to_string(),
            )
        })?;
        Self::with_pool_settings(
            url,
            config.pool_max_size,
            Duration::from_secs(config.pool_timeout_secs),
        )
    }

    /// Creates a manager with explicit pool bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the connection string is missing,
    /// truncated or unparseable.
    pub fn with_pool_settings(
        database_url: &str,
        pool_max_size: usize,
        pool_timeout: Duration,
    ) -> Result<Self> {
        validate_dsn(database_url)?;
        let dsn = sanitize_dsn(database_url.trim());
        let config = Self::parse_connection_url(&dsn)?;
        Ok(Self {
            dsn,
            config,
            pool_max_size: pool_max_size.max(1),
            pool_timeout,
            pool: RwLock::new(None),
        })
    }

    /// Parses the connection URL into a tokio-postgres config.
    fn parse_connection_url(url: &str) -> Result<tokio_postgres::Config> {
        url.parse::<tokio_postgres::Config>().map_err(|e| {
            Error::Configuration(format!(
                "invalid database URL {}: {e}",
                redact_dsn(url)
            ))
        })
    }

    /// Extracts host string from tokio-postgres Host.
    #[cfg(unix)]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        match h {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
        }
    }

    /// Extracts host string from tokio-postgres Host (Windows: Tcp only).
    #[cfg(not(unix))]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        let tokio_postgres::config::Host::Tcp(s) = h;
        s.clone()
    }

    /// Builds a deadpool config from the parsed connection parameters.
    ///
    /// Waiting for, creating and recycling a connection are each bounded by
    /// the pool timeout; recycling uses the fast method.
    fn build_pool_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host = self.config.get_hosts().first().map(Self::host_to_string);
        cfg.port = self.config.get_ports().first().copied();
        cfg.user = self.config.get_user().map(String::from);
        cfg.password = self
            .config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = self.config.get_dbname().map(String::from);
        cfg.application_name = Some(
            self.config
                .get_application_name()
                .unwrap_or(env!("CARGO_PKG_NAME"))
                .to_string(),
        );

        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: self.pool_max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(self.pool_timeout),
                create: Some(self.pool_timeout),
                recycle: Some(self.pool_timeout),
            },
            ..Default::default()
        });

        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        cfg
    }

    /// Returns the maximum number of pooled connections.
    #[must_use]
    pub const fn pool_max_size(&self) -> usize {
        self.pool_max_size
    }

    /// Returns whether a pool currently exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.pool.read().is_ok_and(|pool| pool.is_some())
    }

    /// Returns the live pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before [`connect`](Self::connect) (or
    /// after [`close`](Self::close)).
    pub fn pool(&self) -> Result<Pool> {
        let guard = self.pool.read().map_err(|_| Error::OperationFailed {
            operation: "postgres_pool".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;
        guard.clone().ok_or(Error::NotConnected)
    }

    /// Returns the pool, creating it if needed.
    fn ensure_pool(&self) -> Result<Pool> {
        let mut guard = self.pool.write().map_err(|_| Error::OperationFailed {
            operation: "postgres_create_pool".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = self
            .build_pool_config()
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::OperationFailed {
                operation: "postgres_create_pool".to_string(),
                cause: e.to_string(),
            })?;
        tracing::info!(
            dsn = %redact_dsn(&self.dsn),
            max_size = self.pool_max_size,
            "Created PostgreSQL connection pool"
        );
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Creates the pool if needed and checks out one connection to prove
    /// the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the pool cannot be built or no
    /// connection can be established within the timeout.
    pub async fn connect(&self) -> Result<()> {
        let client = self.client().await?;
        drop(client);
        Ok(())
    }

    /// Checks out a pooled connection, creating the pool on first use.
    ///
    /// The connection returns to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if no connection is available.
    pub async fn client(&self) -> Result<Object> {
        let pool = self.ensure_pool()?;
        pool.get().await.map_err(pool_error)
    }

    /// Closes the pool. A later checkout creates a fresh one.
    pub fn close(&self) {
        let pool = match self.pool.write() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(pool) = pool {
            pool.close();
            tracing::info!("Closed PostgreSQL connection pool");
        }
    }
}
