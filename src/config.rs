//! Configuration parsing and validation for toplog.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::event::TimeBasis;

/// Table names are interpolated into DDL and queries, so they are restricted
/// to plain identifiers.
static TABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").unwrap());

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin server stamped on events logged from this process.
    pub server_name: String,
    /// Known event types, listed by the `types` command.
    pub types: Vec<String>,
    pub mysql: MySqlConfig,
    pub sqlite: SqliteConfig,
    pub pool: PoolConfig,
    pub writer: WriterConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            types: Vec::new(),
            mysql: MySqlConfig::default(),
            sqlite: SqliteConfig::default(),
            pool: PoolConfig::default(),
            writer: WriterConfig::default(),
            storage: StorageConfig::default(),
            query: QueryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_server_name() -> String {
    "default-server".to_string()
}

/// Database password wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
#[derive(Clone)]
pub struct DbPassword(SecretString);

impl DbPassword {
    /// Access the raw password. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for DbPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for DbPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for DbPassword {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for DbPassword {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| DbPassword(SecretString::from(s)))
    }
}

impl From<String> for DbPassword {
    fn from(s: String) -> Self {
        DbPassword(SecretString::from(s))
    }
}

impl From<&str> for DbPassword {
    fn from(s: &str) -> Self {
        DbPassword(SecretString::from(s))
    }
}

/// Networked (MySQL) backend settings.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: DbPassword,
    pub use_ssl: bool,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mysql_host(),
            port: default_mysql_port(),
            database: default_mysql_database(),
            username: default_mysql_username(),
            password: DbPassword::from(""),
            use_ssl: false,
        }
    }
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_database() -> String {
    "toplog".to_string()
}

fn default_mysql_username() -> String {
    "root".to_string()
}

/// Embedded (SQLite) backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SqliteConfig {
    /// Path to SQLite database file
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./toplog.db")
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolConfig {
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Bounded wait for a free connection before failing with `PoolExhausted`
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Liveness probe run once at startup and whenever an idle connection is reused
    #[serde(default = "default_probe_query")]
    pub probe_query: String,
}

fn default_max_size() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_probe_query() -> String {
    "SELECT 1".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            probe_query: default_probe_query(),
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Background writer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WriterConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Table settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "toplog".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
        }
    }
}

/// Query boundary settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueryConfig {
    /// Time basis for CLI time input and record display
    #[serde(default)]
    pub time_zone: TimeBasis,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Backend selection resolved from `[mysql]` / `[sqlite]`.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Embedded {
        path: PathBuf,
    },
    Networked {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: DbPassword,
        use_tls: bool,
    },
}

impl StoreConfig {
    /// Short backend label used in log fields.
    pub fn backend(&self) -> &'static str {
        match self {
            StoreConfig::Embedded { .. } => "sqlite",
            StoreConfig::Networked { .. } => "mysql",
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Raw `[mysql]` section deserialized directly from TOML.
/// `username` and `password` may contain `${VAR}` references not yet expanded.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawMySqlConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_mysql_host")]
    host: String,
    #[serde(default = "default_mysql_port")]
    port: u16,
    #[serde(default = "default_mysql_database")]
    database: String,
    #[serde(default = "default_mysql_username")]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    use_ssl: bool,
}

impl Default for RawMySqlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mysql_host(),
            port: default_mysql_port(),
            database: default_mysql_database(),
            username: default_mysql_username(),
            password: String::new(),
            use_ssl: false,
        }
    }
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    #[serde(default = "default_server_name")]
    server_name: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    mysql: RawMySqlConfig,
    #[serde(default)]
    sqlite: SqliteConfig,
    #[serde(default)]
    pool: PoolConfig,
    #[serde(default)]
    writer: WriterConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    query: QueryConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string. Fails on first missing variable,
/// unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in value of '{}'", field),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Expand all `${VAR}` references in a string using real environment variables.
fn expand_env_vars(input: &str, field: &str) -> Result<String, ConfigError> {
    expand_env_vars_with(input, field, |name| std::env::var(name).ok())
}

impl Config {
    /// Load configuration from a TOML file, expanding `${VAR}` references.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert raw (deserialized) config to final config with env var expansion.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        // Credentials only matter for the networked store. A disabled [mysql]
        // block keeps its raw text so unset variables don't block startup.
        let (username, password) = if raw.mysql.enabled {
            (
                expand_env_vars(&raw.mysql.username, "mysql.username")?,
                expand_env_vars(&raw.mysql.password, "mysql.password")?,
            )
        } else {
            (raw.mysql.username, raw.mysql.password)
        };

        Ok(Config {
            server_name: raw.server_name,
            types: raw.types,
            mysql: MySqlConfig {
                enabled: raw.mysql.enabled,
                host: raw.mysql.host,
                port: raw.mysql.port,
                database: raw.mysql.database,
                username,
                password: DbPassword::from(password),
                use_ssl: raw.mysql.use_ssl,
            },
            sqlite: raw.sqlite,
            pool: raw.pool,
            writer: raw.writer,
            storage: raw.storage,
            query: raw.query,
            logging: raw.logging,
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_size == 0 {
            return Err(ConfigError::Validation(
                "pool.max-size must be at least 1".to_string(),
            ));
        }

        if self.writer.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "writer.queue-capacity must be at least 1".to_string(),
            ));
        }

        if self.pool.probe_query.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pool.probe-query must not be empty".to_string(),
            ));
        }

        if !TABLE_NAME_RE.is_match(&self.storage.table) {
            return Err(ConfigError::Validation(format!(
                "Invalid table name '{}': use letters, digits and '_' only",
                self.storage.table
            )));
        }

        if self.types.is_empty() {
            tracing::debug!("No event types configured - `types` will list nothing");
        }

        Ok(())
    }

    /// Resolve the backend selection into a single tagged variant.
    pub fn store(&self) -> StoreConfig {
        if self.mysql.enabled {
            StoreConfig::Networked {
                host: self.mysql.host.clone(),
                port: self.mysql.port,
                database: self.mysql.database.clone(),
                username: self.mysql.username.clone(),
                password: self.mysql.password.clone(),
                use_tls: self.mysql.use_ssl,
            }
        } else {
            StoreConfig::Embedded {
                path: self.sqlite.path.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = Config::parse_str("").unwrap();
        assert_eq!(config.server_name, "default-server");
        assert_eq!(config.pool.max_size, 10);
        assert_eq!(config.pool.probe_query, "SELECT 1");
        assert_eq!(config.storage.table, "toplog");
        assert_eq!(config.query.time_zone, TimeBasis::Local);
        assert!(!config.mysql.enabled);
        assert!(matches!(config.store(), StoreConfig::Embedded { .. }));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            server-name = "lobby-1"
            types = ["large-transfer", "ban"]

            [mysql]
            enabled = true
            host = "db.internal"
            port = 3307
            database = "events"
            username = "toplog"
            password = "hunter2"
            use-ssl = true

            [pool]
            max-size = 4
            acquire-timeout-secs = 2

            [writer]
            queue-capacity = 64

            [storage]
            table = "toplog_data"

            [query]
            time-zone = "utc"

            [logging]
            level = "debug"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server_name, "lobby-1");
        assert_eq!(config.types, vec!["large-transfer", "ban"]);
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(2));
        assert_eq!(config.writer.queue_capacity, 64);
        assert_eq!(config.query.time_zone, TimeBasis::Utc);
        assert_eq!(config.logging.level, "debug");

        match config.store() {
            StoreConfig::Networked {
                host,
                port,
                database,
                username,
                password,
                use_tls,
            } => {
                assert_eq!(host, "db.internal");
                assert_eq!(port, 3307);
                assert_eq!(database, "events");
                assert_eq!(username, "toplog");
                assert_eq!(password.expose_secret(), "hunter2");
                assert!(use_tls);
            }
            other => panic!("expected networked store, got {:?}", other),
        }
    }

    #[test]
    fn test_mysql_disabled_falls_back_to_sqlite() {
        let toml = r#"
            [mysql]
            enabled = false
            host = "db.internal"

            [sqlite]
            path = "/var/lib/toplog/events.db"
        "#;

        let config = Config::parse_str(toml).unwrap();
        match config.store() {
            StoreConfig::Embedded { path } => {
                assert_eq!(path, PathBuf::from("/var/lib/toplog/events.db"))
            }
            other => panic!("expected embedded store, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_mysql_skips_credential_expansion() {
        let toml = r#"
            [mysql]
            enabled = false
            username = "${TOPLOG_TEST_UNSET_USER}"
            password = "${TOPLOG_TEST_UNSET_PASSWORD}"

            [sqlite]
            path = "./events.db"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert!(matches!(config.store(), StoreConfig::Embedded { .. }));
    }

    #[test]
    fn test_enabled_mysql_requires_credential_variables() {
        let toml = r#"
            [mysql]
            enabled = true
            password = "${TOPLOG_TEST_UNSET_PASSWORD}"
        "#;

        let err = Config::parse_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("TOPLOG_TEST_UNSET_PASSWORD"));
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let toml = r#"
            [storage]
            table = "toplog; DROP TABLE users"
        "#;
        let err = Config::parse_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("Invalid table name"));
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let toml = r#"
            [pool]
            max-size = 0
        "#;
        let err = Config::parse_str(toml).unwrap_err();
        assert!(err.to_string().contains("pool.max-size"));
    }

    #[test]
    fn test_unknown_time_zone_rejected() {
        let toml = r#"
            [query]
            time-zone = "mars"
        "#;
        assert!(matches!(
            Config::parse_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_password_debug_redaction() {
        let password = DbPassword::from("super-secret-password");
        assert_eq!(format!("{:?}", password), "[REDACTED]");
        assert_eq!(format!("{}", password), "[REDACTED]");
    }

    #[test]
    fn test_password_serialize_redaction() {
        let password = DbPassword::from("real-secret-value");
        let json = serde_json::to_string(&password).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_store_debug_does_not_leak_password() {
        let toml = r#"
            [mysql]
            enabled = true
            password = "do-not-print-me"
        "#;
        let config = Config::parse_str(toml).unwrap();
        let debug = format!("{:?}", config.store());
        assert!(!debug.contains("do-not-print-me"));
        assert!(debug.contains("[REDACTED]"));
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_single_var() {
        let lookup = |name: &str| match name {
            "DB_PASS" => Some("s3cret".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${DB_PASS}", "mysql.password", lookup).unwrap();
        assert_eq!(result, "s3cret");
    }

    #[test]
    fn test_expand_mixed_literal_and_var() {
        let lookup = |name: &str| match name {
            "ENV" => Some("prod".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("toplog-${ENV}", "mysql.username", lookup).unwrap();
        assert_eq!(result, "toplog-prod");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("$plain", "mysql.password", lookup).unwrap();
        assert_eq!(result, "$plain");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let lookup = |_: &str| None;
        let err = expand_env_vars_with("${MISSING}", "mysql.password", lookup)
            .unwrap_err()
            .to_string();
        assert!(err.contains("MISSING"), "Error should name the variable");
        assert!(err.contains("mysql.password"), "Error should name the field");
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "mysql.password", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "mysql.password", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_password_expanded_from_environment() {
        // Unique name to avoid parallel test interference
        let var_name = "TOPLOG_TEST_CONFIG_PASSWORD_EXPAND";
        unsafe { std::env::set_var(var_name, "from-env") };

        let toml = format!(
            r#"
            [mysql]
            enabled = true
            password = "${{{}}}"
            "#,
            var_name
        );
        let config = Config::parse_str(&toml).unwrap();
        assert_eq!(config.mysql.password.expose_secret(), "from-env");

        unsafe { std::env::remove_var(var_name) };
    }
}
