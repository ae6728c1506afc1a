//! Configuration management.
//!
//! Settings are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (explicit path, or `pgdoc/config.toml` in the platform config dir)
//! 3. Environment variables (`PGDOC_DATABASE_URL` or `SUPABASE_DB_URL`,
//!    `PGDOC_POOL_MAX_SIZE`)

use crate::storage::dsn::redact_dsn;
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Primary database URL variable.
pub const DATABASE_URL_ENV: &str = "PGDOC_DATABASE_URL";

/// Fallback database URL variable, as used by Supabase deployments.
pub const SUPABASE_DB_URL_ENV: &str = "SUPABASE_DB_URL";

/// Pool size override variable.
pub const POOL_MAX_SIZE_ENV: &str = "PGDOC_POOL_MAX_SIZE";

/// Main configuration for pgdoc.
#[derive(Clone, PartialEq, Eq)]
pub struct PgdocConfig {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Maximum pooled connections.
    pub pool_max_size: usize,
    /// Pool wait/create/recycle timeout in seconds.
    pub pool_timeout_secs: u64,
    /// Limit applied by `to_list` callers that do not pick their own.
    pub default_find_limit: usize,
    /// Logging settings.
    pub log: LoggingSettings,
}

/// Logging section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `pgdoc=debug`.
    pub level: Option<String>,
    /// Optional log file path.
    pub file: Option<PathBuf>,
}

/// Raw TOML layout; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    database_url: Option<String>,
    pool_max_size: Option<usize>,
    pool_timeout_secs: Option<u64>,
    default_find_limit: Option<usize>,
    log: Option<LoggingSettings>,
}

impl fmt::Debug for PgdocConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgdocConfig")
            .field(
                "database_url",
                &self.database_url.as_deref().map(redact_dsn),
            )
            .field("pool_max_size", &self.pool_max_size)
            .field("pool_timeout_secs", &self.pool_timeout_secs)
            .field("default_find_limit", &self.default_find_limit)
            .field("log", &self.log)
            .finish()
    }
}

impl Default for PgdocConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            pool_max_size: 10,
            pool_timeout_secs: 5,
            default_find_limit: 100,
            log: LoggingSettings::default(),
        }
    }
}

impl PgdocConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or
    /// [`Error::Configuration`] if it is not valid TOML for this layout.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on invalid TOML or unknown keys.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid config file: {e}")))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location, then applies the
    /// environment.
    ///
    /// Returns defaults (plus environment) if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let mut config = Self::default_path()
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            })
            .unwrap_or_default();
        config.apply_env();
        config
    }

    /// Loads `path` if given (failing if it is unreadable), else the default
    /// location; the environment is applied on top either way.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `path` cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let mut config = Self::load_from_file(path)?;
                config.apply_env();
                Ok(config)
            },
            None => Ok(Self::load_default()),
        }
    }

    /// Platform config file path (`~/.config/pgdoc/config.toml` on Linux).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("pgdoc").join("config.toml"))
    }

    /// Applies environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(DATABASE_URL_ENV).or_else(|| non_empty(SUPABASE_DB_URL_ENV)) {
            self.database_url = Some(url);
        }
        if let Some(size) = non_empty(POOL_MAX_SIZE_ENV) {
            match size.trim().parse::<usize>() {
                Ok(size) => self.pool_max_size = size,
                Err(e) => tracing::warn!(
                    value = %size,
                    error = %e,
                    "Ignoring invalid {POOL_MAX_SIZE_ENV}"
                ),
            }
        }
    }

    /// Sets the database URL.
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Converts a `ConfigFile` to `PgdocConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if file.database_url.is_some() {
            config.database_url = file.database_url;
        }
        if let Some(size) = file.pool_max_size {
            config.pool_max_size = size;
        }
        if let Some(secs) = file.pool_timeout_secs {
            config.pool_timeout_secs = secs;
        }
        if let Some(limit) = file.default_find_limit {
            config.default_find_limit = limit;
        }
        if let Some(log) = file.log {
            config.log = log;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PgdocConfig::default();
        assert_eq!(config.database_url, None);
        assert_eq!(config.pool_max_size, 10);
        assert_eq!(config.pool_timeout_secs, 5);
        assert_eq!(config.default_find_limit, 100);
    }

    #[test]
    fn test_from_toml() {
        let config = PgdocConfig::from_toml(
            r#"
            database_url = "postgresql://u:p@localhost/db"
            pool_max_size = 4
            default_find_limit = 50

            [log]
            format = "json"
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgresql://u:p@localhost/db"));
        assert_eq!(config.pool_max_size, 4);
        assert_eq!(config.pool_timeout_secs, 5);
        assert_eq!(config.default_find_limit, 50);
        assert_eq!(config.log.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = PgdocConfig::from_toml("pool_size = 3").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool_timeout_secs = 9").unwrap();
        let config = PgdocConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.pool_timeout_secs, 9);
    }

    #[test]
    fn test_missing_file_is_operation_failed() {
        let dir = tempfile::tempdir().unwrap();
        let err = PgdocConfig::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::OperationFailed { operation, .. } if operation == "read_config_file"));
    }

    #[test]
    fn test_env_prefers_pgdoc_url() {
        let mut config = PgdocConfig::default();
        config.apply_env_with(env(&[
            (DATABASE_URL_ENV, "postgresql://a:b@primary/db"),
            (SUPABASE_DB_URL_ENV, "postgresql://a:b@fallback/db"),
        ]));
        assert_eq!(config.database_url.as_deref(), Some("postgresql://a:b@primary/db"));
    }

    #[test]
    fn test_env_falls_back_to_supabase_url() {
        let mut config = PgdocConfig::default().with_database_url("postgresql://file@host/db");
        config.apply_env_with(env(&[
            (DATABASE_URL_ENV, "  "),
            (SUPABASE_DB_URL_ENV, "postgresql://a:b@fallback/db"),
        ]));
        assert_eq!(config.database_url.as_deref(), Some("postgresql://a:b@fallback/db"));
    }

    #[test]
    fn test_env_pool_size() {
        let mut config = PgdocConfig::default();
        config.apply_env_with(env(&[(POOL_MAX_SIZE_ENV, "3")]));
        assert_eq!(config.pool_max_size, 3);

        config.apply_env_with(env(&[(POOL_MAX_SIZE_ENV, "lots")]));
        assert_eq!(config.pool_max_size, 3);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = PgdocConfig::default().with_database_url("postgresql://u:topsecret@h/db");
        let debug = format!("{config:?}");
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("u:***@h/db"));
    }
}
