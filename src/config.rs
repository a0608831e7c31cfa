//! Configuration handling for the database layer.
//!
//! Every setting is resolved from three layers, first hit wins:
//!
//! 1. the secrets file (`secrets.toml`), addressed as `section.key`
//! 2. the environment, as `PROJECT_DB_<SECTION>_<KEY>` upper-cased
//! 3. the built-in default
//!
//! ```toml
//! [primary]
//! host = "db.internal"
//! database = "ProjectManagerDB"
//! username = "app"
//! password = "..."
//!
//! [fallback]
//! path = "data/fallback.db"
//!
//! [pool]
//! min = 1
//! max = 5
//! ```

use crate::error::{DbError, DbResult};
use crate::models::{BackendId, ConnectionConfig, Dialect};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "PROJECT_DB_";

pub const DEFAULT_PRIMARY_DATABASE: &str = "ProjectManagerDB";
pub const DEFAULT_FALLBACK_PATH: &str = "data/fallback.db";

// Pool configuration defaults
pub const DEFAULT_POOL_MIN: u32 = 1;
pub const DEFAULT_POOL_MAX: u32 = 5;
pub const DEFAULT_POOL_OVERFLOW: u32 = 10;
pub const DEFAULT_POOL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POOL_RECYCLE_SECS: u64 = 3600;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;

// Retry defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

// Monitoring defaults
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: u64 = 1000;
pub const DEFAULT_RECENT_SAMPLES: usize = 1000;
pub const DEFAULT_SLOW_SAMPLES: usize = 100;

// Seed defaults
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";
pub const DEFAULT_BCRYPT_ROUNDS: u32 = 12;

/// Parsed secrets file. Empty when no file is configured.
#[derive(Debug, Clone, Default)]
pub struct SecretsSource {
    table: toml::Table,
}

impl SecretsSource {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a secrets file. A missing file yields an empty source.
    pub fn from_path(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Secrets file not found, using environment and defaults");
            return Ok(Self::empty());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            DbError::configuration(format!(
                "Failed to read secrets file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> DbResult<Self> {
        let table = content
            .parse::<toml::Table>()
            .map_err(|e| DbError::configuration(format!("Malformed secrets file: {}", e)))?;
        Ok(Self { table })
    }

    /// Look up `section.key` and render scalars as strings.
    fn get(&self, section: &str, key: &str) -> Option<String> {
        let value = self.table.get(section)?.as_table()?.get(key)?;
        match value {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Environment variable name for a `section.key` setting.
pub fn env_key(section: &str, key: &str) -> String {
    format!("{}{}_{}", ENV_PREFIX, section, key).to_ascii_uppercase()
}

/// Resolves settings through the secrets → environment → default chain.
struct Resolver<'a, E> {
    secrets: &'a SecretsSource,
    env: E,
}

impl<E> Resolver<'_, E>
where
    E: Fn(&str) -> Option<String>,
{
    fn raw(&self, section: &str, key: &str) -> Option<String> {
        self.secrets
            .get(section, key)
            .or_else(|| (self.env)(&env_key(section, key)))
            .filter(|v| !v.trim().is_empty())
    }

    fn string(&self, section: &str, key: &str, default: &str) -> String {
        self.raw(section, key)
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, section: &str, key: &str, default: T) -> DbResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(section, key) {
            Some(raw) => raw.trim().parse().map_err(|e| {
                DbError::configuration(format!(
                    "Invalid value for {}.{} ('{}'): {}",
                    section, key, raw, e
                ))
            }),
            None => Ok(default),
        }
    }
}

/// Pool sizing and timeouts shared by both backends.
#[derive(Debug, Clone, Copy)]
struct PoolSettings {
    min: u32,
    max: u32,
    overflow: u32,
    timeout: Duration,
    recycle_secs: u64,
    connect_timeout: Duration,
    query_timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

/// Administrator account and default rows written by `ensure_schema`.
#[derive(Clone)]
pub struct SeedSettings {
    pub admin_username: String,
    /// Contains sensitive data - never log
    pub admin_password: String,
    pub admin_email: String,
    pub bcrypt_rounds: u32,
}

impl std::fmt::Debug for SeedSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedSettings")
            .field("admin_username", &self.admin_username)
            .field("admin_email", &self.admin_email)
            .field("bcrypt_rounds", &self.bcrypt_rounds)
            .finish_non_exhaustive()
    }
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            bcrypt_rounds: DEFAULT_BCRYPT_ROUNDS,
        }
    }
}

/// Fully resolved configuration. Created once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` when no primary host is configured.
    pub primary: Option<ConnectionConfig>,
    pub fallback: ConnectionConfig,
    pub health_check_interval: Duration,
    /// Timeout of the direct primary probe used by auto-selection.
    pub probe_timeout: Duration,
    pub slow_query_threshold: Duration,
    pub recent_samples: usize,
    pub slow_samples: usize,
    pub seed: SeedSettings,
}

impl Settings {
    /// Resolve settings against the process environment.
    pub fn load(secrets: &SecretsSource) -> DbResult<Self> {
        Self::load_with(secrets, |key| std::env::var(key).ok())
    }

    /// Resolve settings with an explicit environment lookup.
    pub fn load_with<E>(secrets: &SecretsSource, env: E) -> DbResult<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let r = Resolver { secrets, env };

        let pool = PoolSettings {
            min: r.parse("pool", "min", DEFAULT_POOL_MIN)?,
            max: r.parse("pool", "max", DEFAULT_POOL_MAX)?,
            overflow: r.parse("pool", "overflow", DEFAULT_POOL_OVERFLOW)?,
            timeout: secs(r.parse("pool", "timeout", DEFAULT_POOL_TIMEOUT_SECS)?),
            recycle_secs: r.parse("pool", "recycle", DEFAULT_POOL_RECYCLE_SECS)?,
            connect_timeout: secs(r.parse(
                "pool",
                "connect_timeout",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            query_timeout: secs(r.parse("pool", "query_timeout", DEFAULT_QUERY_TIMEOUT_SECS)?),
            retry_attempts: r.parse("retry", "attempts", DEFAULT_RETRY_ATTEMPTS)?,
            retry_delay: Duration::from_millis(r.parse(
                "retry",
                "delay_ms",
                DEFAULT_RETRY_DELAY_MS,
            )?),
        };

        let primary = match r.raw("primary", "host") {
            Some(host) => {
                let dialect: Dialect = r.parse("primary", "dialect", Dialect::Server)?;
                let database_name = if dialect == Dialect::Embedded {
                    r.string("primary", "path", &host)
                } else {
                    r.string("primary", "database", DEFAULT_PRIMARY_DATABASE)
                };
                Some(ConnectionConfig {
                    backend_id: BackendId::Primary,
                    dialect,
                    port: r.parse("primary", "port", dialect.default_port().unwrap_or(0))?,
                    host,
                    database_name,
                    username: r.string("primary", "username", ""),
                    secret_ref: r.raw("primary", "password"),
                    ..pool.apply(BackendId::Primary, dialect)
                })
            }
            None => {
                debug!("No primary host configured, running on the fallback only");
                None
            }
        };

        let fallback_dialect: Dialect = r.parse("fallback", "dialect", Dialect::Embedded)?;
        let fallback = ConnectionConfig {
            host: r.string("fallback", "host", ""),
            port: r.parse(
                "fallback",
                "port",
                fallback_dialect.default_port().unwrap_or(0),
            )?,
            database_name: if fallback_dialect == Dialect::Embedded {
                r.string("fallback", "path", DEFAULT_FALLBACK_PATH)
            } else {
                r.string("fallback", "database", DEFAULT_PRIMARY_DATABASE)
            },
            username: r.string("fallback", "username", ""),
            secret_ref: r.raw("fallback", "password"),
            ..pool.apply(BackendId::Fallback, fallback_dialect)
        };

        let settings = Self {
            primary,
            fallback,
            health_check_interval: secs(r.parse(
                "monitoring",
                "health_check_interval",
                DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            )?),
            probe_timeout: secs(r.parse(
                "monitoring",
                "probe_timeout",
                DEFAULT_PROBE_TIMEOUT_SECS,
            )?),
            slow_query_threshold: Duration::from_millis(r.parse(
                "monitoring",
                "slow_query_threshold_ms",
                DEFAULT_SLOW_QUERY_THRESHOLD_MS,
            )?),
            recent_samples: r.parse("monitoring", "recent_samples", DEFAULT_RECENT_SAMPLES)?,
            slow_samples: r.parse("monitoring", "slow_samples", DEFAULT_SLOW_SAMPLES)?,
            seed: SeedSettings {
                admin_username: r.string("seed", "admin_username", DEFAULT_ADMIN_USERNAME),
                admin_password: r.string("seed", "admin_password", DEFAULT_ADMIN_PASSWORD),
                admin_email: r.string("seed", "admin_email", DEFAULT_ADMIN_EMAIL),
                bcrypt_rounds: r.parse("seed", "bcrypt_rounds", DEFAULT_BCRYPT_ROUNDS)?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Settings for a fallback-only deployment at `path`.
    pub fn embedded_only(path: impl Into<String>) -> Self {
        let defaults = PoolSettings::default();
        Self {
            primary: None,
            fallback: ConnectionConfig {
                host: String::new(),
                port: 0,
                database_name: path.into(),
                username: String::new(),
                secret_ref: None,
                ..defaults.apply(BackendId::Fallback, Dialect::Embedded)
            },
            health_check_interval: secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            probe_timeout: secs(DEFAULT_PROBE_TIMEOUT_SECS),
            slow_query_threshold: Duration::from_millis(DEFAULT_SLOW_QUERY_THRESHOLD_MS),
            recent_samples: DEFAULT_RECENT_SAMPLES,
            slow_samples: DEFAULT_SLOW_SAMPLES,
            seed: SeedSettings::default(),
        }
    }

    /// Connection config for a backend, if configured.
    pub fn backend(&self, id: BackendId) -> Option<&ConnectionConfig> {
        match id {
            BackendId::Primary => self.primary.as_ref(),
            BackendId::Fallback => Some(&self.fallback),
        }
    }

    /// Validate the resolved settings.
    pub fn validate(&self) -> DbResult<()> {
        for config in self.primary.iter().chain(std::iter::once(&self.fallback)) {
            let id = config.backend_id;
            if config.pool_max == 0 {
                return Err(DbError::configuration(format!(
                    "{}: pool max must be greater than 0",
                    id
                )));
            }
            if config.pool_min > config.pool_max {
                return Err(DbError::configuration(format!(
                    "{}: pool min ({}) cannot exceed pool max ({})",
                    id, config.pool_min, config.pool_max
                )));
            }
            if config.retry_attempts == 0 {
                return Err(DbError::configuration(format!(
                    "{}: retry attempts must be at least 1",
                    id
                )));
            }
            match config.dialect {
                Dialect::Server if config.host.trim().is_empty() => {
                    return Err(DbError::configuration(format!(
                        "{}: the server dialect requires a host",
                        id
                    )));
                }
                Dialect::Embedded if config.database_name.trim().is_empty() => {
                    return Err(DbError::configuration(format!(
                        "{}: the embedded dialect requires a file path",
                        id
                    )));
                }
                _ => {}
            }
        }
        if !(4..=31).contains(&self.seed.bcrypt_rounds) {
            return Err(DbError::configuration(format!(
                "seed.bcrypt_rounds must be between 4 and 31, got {}",
                self.seed.bcrypt_rounds
            )));
        }
        if self.seed.admin_password == DEFAULT_ADMIN_PASSWORD {
            warn!("Seeded administrator uses the default password; set seed.admin_password");
        }
        Ok(())
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min: DEFAULT_POOL_MIN,
            max: DEFAULT_POOL_MAX,
            overflow: DEFAULT_POOL_OVERFLOW,
            timeout: secs(DEFAULT_POOL_TIMEOUT_SECS),
            recycle_secs: DEFAULT_POOL_RECYCLE_SECS,
            connect_timeout: secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout: secs(DEFAULT_QUERY_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl PoolSettings {
    /// A connection config carrying these pool settings, with empty
    /// connection target fields.
    fn apply(&self, backend_id: BackendId, dialect: Dialect) -> ConnectionConfig {
        ConnectionConfig {
            backend_id,
            dialect,
            host: String::new(),
            port: 0,
            database_name: String::new(),
            username: String::new(),
            secret_ref: None,
            pool_min: self.min,
            pool_max: self.max,
            pool_overflow: self.overflow,
            pool_timeout: self.timeout,
            pool_recycle_seconds: self.recycle_secs,
            connect_timeout: self.connect_timeout,
            query_timeout: self.query_timeout,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("primary", "host"), "PROJECT_DB_PRIMARY_HOST");
        assert_eq!(env_key("retry", "delay_ms"), "PROJECT_DB_RETRY_DELAY_MS");
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::load_with(&SecretsSource::empty(), no_env).unwrap();
        assert!(settings.primary.is_none());
        assert_eq!(settings.fallback.dialect, Dialect::Embedded);
        assert_eq!(settings.fallback.database_name, DEFAULT_FALLBACK_PATH);
        assert_eq!(settings.fallback.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(settings.health_check_interval, Duration::from_secs(300));
        assert_eq!(settings.slow_query_threshold, Duration::from_secs(1));
    }

    #[test]
    fn test_secrets_override_env_and_env_overrides_default() {
        let secrets = SecretsSource::from_toml_str(
            r#"
            [primary]
            host = "db.internal"
            username = "app"
            password = "s3cret"

            [pool]
            max = 8
            "#,
        )
        .unwrap();
        let env = env_from(&[
            ("PROJECT_DB_PRIMARY_HOST", "ignored.example"),
            ("PROJECT_DB_PRIMARY_PORT", "3307"),
            ("PROJECT_DB_POOL_MAX", "20"),
        ]);
        let settings = Settings::load_with(&secrets, env).unwrap();
        let primary = settings.primary.unwrap();
        assert_eq!(primary.host, "db.internal");
        assert_eq!(primary.port, 3307);
        assert_eq!(primary.pool_max, 8);
        assert_eq!(primary.database_name, DEFAULT_PRIMARY_DATABASE);
        assert_eq!(primary.secret_ref.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_primary_from_env_only() {
        let env = env_from(&[
            ("PROJECT_DB_PRIMARY_HOST", "10.0.0.5"),
            ("PROJECT_DB_FALLBACK_PATH", "/tmp/fb.db"),
        ]);
        let settings = Settings::load_with(&SecretsSource::empty(), env).unwrap();
        assert_eq!(settings.primary.unwrap().port, 3306);
        assert_eq!(settings.fallback.database_name, "/tmp/fb.db");
    }

    #[test]
    fn test_integer_secrets_values() {
        let secrets = SecretsSource::from_toml_str(
            "[retry]\nattempts = 5\ndelay_ms = 250\n[monitoring]\nhealth_check_interval = 60\n",
        )
        .unwrap();
        let settings = Settings::load_with(&secrets, no_env).unwrap();
        assert_eq!(settings.fallback.retry_attempts, 5);
        assert_eq!(settings.fallback.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.health_check_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_number_is_configuration_error() {
        let env = env_from(&[("PROJECT_DB_POOL_MAX", "many")]);
        let err = Settings::load_with(&SecretsSource::empty(), env).unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(err.to_string().contains("pool.max"));
    }

    #[test]
    fn test_validate_pool_min_exceeds_max() {
        let env = env_from(&[("PROJECT_DB_POOL_MIN", "6"), ("PROJECT_DB_POOL_MAX", "2")]);
        let err = Settings::load_with(&SecretsSource::empty(), env).unwrap_err();
        assert!(err.to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_validate_zero_retry_attempts() {
        let env = env_from(&[("PROJECT_DB_RETRY_ATTEMPTS", "0")]);
        assert!(Settings::load_with(&SecretsSource::empty(), env).is_err());
    }

    #[test]
    fn test_validate_server_fallback_requires_host() {
        let env = env_from(&[("PROJECT_DB_FALLBACK_DIALECT", "server")]);
        let err = Settings::load_with(&SecretsSource::empty(), env).unwrap_err();
        assert!(err.to_string().contains("requires a host"));
    }

    #[test]
    fn test_malformed_secrets_file() {
        assert!(matches!(
            SecretsSource::from_toml_str("[primary\nhost ="),
            Err(DbError::Configuration { .. })
        ));
    }

    #[test]
    fn test_missing_secrets_file_is_empty() {
        let source = SecretsSource::from_path(Path::new("/nonexistent/secrets.toml")).unwrap();
        assert!(source.get("primary", "host").is_none());
    }

    #[test]
    fn test_embedded_only() {
        let settings = Settings::embedded_only("/tmp/x.db");
        assert!(settings.validate().is_ok());
        assert!(settings.backend(BackendId::Primary).is_none());
        assert_eq!(
            settings.backend(BackendId::Fallback).unwrap().database_name,
            "/tmp/x.db"
        );
    }

    #[test]
    fn test_seed_debug_hides_password() {
        let seed = SeedSettings::default();
        assert!(!format!("{:?}", seed).contains(DEFAULT_ADMIN_PASSWORD));
    }
}
