//! Process configuration for the connection registry.
//!
//! Settings are read once, when the registry is initialised:
//!
//! | Variable           | Fallback          | Meaning                                   |
//! |--------------------|-------------------|-------------------------------------------|
//! | `CONNECTION_URL`   | `MONGO_URL`       | Database server connection string         |
//! | `DEFAULT_DATABASE` | `MONGO_DB`        | Database used when a handle has no override |
//! | `POOL_SIZE`        | `MONGO_POOL_SIZE` | Maximum pooled connections (default 100)  |
//! | `ERROR_LOG_PATH`   |                   | Error log file (default `logs/daba-error.log`) |

use std::{env, path::PathBuf};

use crate::{
    backend::PoolSettings,
    error::{DabaError, DabaResult},
};

/// Pool size used when `POOL_SIZE` is absent or empty.
pub const DEFAULT_POOL_SIZE: u32 = 100;

/// Relative path of the append-only error log.
pub const DEFAULT_ERROR_LOG_PATH: &str = "logs/daba-error.log";

const CONNECTION_URL: [&str; 2] = ["CONNECTION_URL", "MONGO_URL"];
const DEFAULT_DATABASE: [&str; 2] = ["DEFAULT_DATABASE", "MONGO_DB"];
const POOL_SIZE: [&str; 2] = ["POOL_SIZE", "MONGO_POOL_SIZE"];
const ERROR_LOG_PATH: [&str; 1] = ["ERROR_LOG_PATH"];

/// Configuration for a [`ClientRegistry`](crate::registry::ClientRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Connection string of the database server.
    pub connection_url: String,
    /// Database used by handles that do not name one.
    pub default_database: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// Location of the append-only error log.
    pub error_log_path: PathBuf,
}

impl Settings {
    /// Creates settings with the default pool size and error log path.
    pub fn new(connection_url: impl Into<String>, default_database: impl Into<String>) -> Self {
        Self {
            connection_url: connection_url.into(),
            default_database: default_database.into(),
            pool_size: DEFAULT_POOL_SIZE,
            error_log_path: PathBuf::from(DEFAULT_ERROR_LOG_PATH),
        }
    }

    /// Overrides the maximum pool size.
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Overrides the error log location.
    pub fn with_error_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log_path = path.into();
        self
    }

    /// Reads settings from the process environment, loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`DabaError::Configuration`] if the connection string or default
    /// database is missing, or if the pool size is not a positive integer.
    pub fn from_env() -> DabaResult<Self> {
        // A missing .env file is the normal case in deployed environments
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> DabaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |keys: &[&str]| {
            keys.iter()
                .filter_map(|&key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let connection_url = read(&CONNECTION_URL).ok_or_else(|| {
            DabaError::Configuration(format!("{} is not set", CONNECTION_URL[0]))
        })?;
        let default_database = read(&DEFAULT_DATABASE).ok_or_else(|| {
            DabaError::Configuration(format!("{} is not set", DEFAULT_DATABASE[0]))
        })?;

        let pool_size = match read(&POOL_SIZE) {
            None => DEFAULT_POOL_SIZE,
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(DabaError::Configuration(format!(
                        "{} must be a positive integer, got {raw:?}",
                        POOL_SIZE[0]
                    )));
                }
                Ok(size) => size,
            },
        };

        let error_log_path = read(&ERROR_LOG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_LOG_PATH));

        Ok(Self { connection_url, default_database, pool_size, error_log_path })
    }

    /// The pool settings for the configured connection string.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings::new(&self.connection_url, self.pool_size)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_primary_variables() {
        let settings = Settings::from_lookup(lookup(&[
            ("CONNECTION_URL", "mongodb://db-1:27017/"),
            ("DEFAULT_DATABASE", "app"),
            ("POOL_SIZE", "25"),
            ("ERROR_LOG_PATH", "var/errors.log"),
        ]))
        .unwrap();

        assert_eq!(settings.connection_url, "mongodb://db-1:27017/");
        assert_eq!(settings.default_database, "app");
        assert_eq!(settings.pool_size, 25);
        assert_eq!(settings.error_log_path, PathBuf::from("var/errors.log"));
    }

    #[test]
    fn pool_size_defaults_when_absent_or_empty() {
        let absent = Settings::from_lookup(lookup(&[
            ("CONNECTION_URL", "mongodb://db-1/"),
            ("DEFAULT_DATABASE", "app"),
        ]))
        .unwrap();
        let empty = Settings::from_lookup(lookup(&[
            ("CONNECTION_URL", "mongodb://db-1/"),
            ("DEFAULT_DATABASE", "app"),
            ("POOL_SIZE", ""),
        ]))
        .unwrap();

        assert_eq!(absent.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(empty.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(absent.error_log_path, PathBuf::from(DEFAULT_ERROR_LOG_PATH));
    }

    #[test]
    fn legacy_names_are_fallbacks() {
        let settings = Settings::from_lookup(lookup(&[
            ("MONGO_URL", "mongodb://legacy/"),
            ("MONGO_DB", "legacy_db"),
            ("MONGO_POOL_SIZE", "7"),
            ("DEFAULT_DATABASE", "preferred"),
        ]))
        .unwrap();

        assert_eq!(settings.connection_url, "mongodb://legacy/");
        assert_eq!(settings.default_database, "preferred");
        assert_eq!(settings.pool_size, 7);
    }

    #[test]
    fn missing_connection_url_is_a_configuration_error() {
        let err = Settings::from_lookup(lookup(&[("DEFAULT_DATABASE", "app")])).unwrap_err();

        assert_eq!(err, DabaError::Configuration("CONNECTION_URL is not set".into()));
    }

    #[test]
    fn rejects_invalid_pool_sizes() {
        for raw in ["zero", "0", "-3"] {
            let err = Settings::from_lookup(lookup(&[
                ("CONNECTION_URL", "mongodb://db-1/"),
                ("DEFAULT_DATABASE", "app"),
                ("POOL_SIZE", raw),
            ]))
            .unwrap_err();

            assert!(matches!(err, DabaError::Configuration(_)), "{raw}: {err:?}");
        }
    }
}
