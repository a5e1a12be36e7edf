//! Configuration management with TOML support
//!
//! Configuration is read from a TOML file, then overridden by environment
//! variables:
//!
//! | Variable              | Field                       |
//! |-----------------------|-----------------------------|
//! | `DATA_IMPLEMENTATION` | `backend.implementation`    |
//! | `DB_HOSTNAME`         | `database.host`             |
//! | `DB_PORT`             | `database.port`             |
//! | `DB_USERNAME`         | `database.username`         |
//! | `DB_PASSWORD`         | `database.password`         |
//! | `DB_DATABASE`         | `database.database`         |
//! | `RUST_LOG`            | `logging.level`             |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend selection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Telemetry store connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Query window handling
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which backend answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Fixed canned answers, no store required
    #[serde(alias = "dummy")]
    Stub,
    /// The relational telemetry store
    Postgres,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" | "dummy" => Ok(BackendKind::Stub),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            other => Err(format!("Unknown backend implementation: {}", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Stub => f.write_str("stub"),
            BackendKind::Postgres => f.write_str("postgres"),
        }
    }
}

/// Backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend implementation
    #[serde(default = "default_implementation")]
    pub implementation: BackendKind,
}

/// Telemetry store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server host
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Login role
    #[serde(default = "default_db_username")]
    pub username: String,

    /// Login password, empty for none (redacted in Debug output)
    #[serde(default)]
    pub password: SecretString,

    /// Database name
    #[serde(default = "default_db_database")]
    pub database: String,

    /// Cap on simultaneously open connections
    ///
    /// Kept below the server-side `max_connections` shared with other clients.
    #[serde(default = "default_max_open_connections")]
    pub max_open_connections: u32,

    /// Lifetime after which a pooled connection is closed and replaced
    #[serde(default = "default_max_connection_lifetime_secs")]
    pub max_connection_lifetime_secs: u64,

    /// Timeout for acquiring a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

/// Query window handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Settling delay applied to "now", in seconds (negative means in the past)
    #[serde(default = "default_hysteresis_secs")]
    pub hysteresis_secs: i64,

    /// Minimum window length in seconds
    #[serde(default = "default_min_window_secs")]
    pub min_window_secs: i64,

    /// Smallest accepted `window_len` for system power requests
    #[serde(default = "default_min_window_len_secs")]
    pub min_window_len_secs: i64,

    /// Largest accepted `window_len` for system power requests
    #[serde(default = "default_max_window_len_secs")]
    pub max_window_len_secs: i64,

    /// Per-request deadline in seconds, 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// =============================================================================
// SecretString - credential handling
// =============================================================================

/// A string that prints `[REDACTED]` in Debug and Display output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Access the secret value
    ///
    /// Only call this where the credential is actually handed to a driver.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// True when no secret is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Upper bound for every query duration setting (one day)
pub const MAX_QUERY_SPAN_SECS: u64 = 86_400;

// Default value functions
fn default_implementation() -> BackendKind { BackendKind::Postgres }
fn default_db_host() -> String { "craysma-postgres-cluster.sma.svc.cluster.local".to_string() }
fn default_db_port() -> u16 { 5432 }
fn default_db_username() -> String { "pmdbuser".to_string() }
fn default_db_database() -> String { "pmdb".to_string() }
fn default_max_open_connections() -> u32 { 70 }
fn default_max_connection_lifetime_secs() -> u64 { 60 }
fn default_acquire_timeout_secs() -> u64 { 5 }
fn default_hysteresis_secs() -> i64 { -15 }
fn default_min_window_secs() -> i64 { 15 }
fn default_min_window_len_secs() -> i64 { 2 }
fn default_max_window_len_secs() -> i64 { 3600 }
fn default_timeout_secs() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            implementation: default_implementation(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            username: default_db_username(),
            password: SecretString::default(),
            database: default_db_database(),
            max_open_connections: default_max_open_connections(),
            max_connection_lifetime_secs: default_max_connection_lifetime_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    /// Maximum connection lifetime as a `Duration`
    pub fn max_connection_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_connection_lifetime_secs)
    }

    /// Acquire timeout as a `Duration`
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Connection target with the password redacted
    pub fn display_target(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            hysteresis_secs: default_hysteresis_secs(),
            min_window_secs: default_min_window_secs(),
            min_window_len_secs: default_min_window_len_secs(),
            max_window_len_secs: default_max_window_len_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl QueryConfig {
    /// Request deadline, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, String> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored and the current value is kept.
    pub fn apply_env_overrides(&mut self) {
        // Backend
        if let Ok(kind) = std::env::var("DATA_IMPLEMENTATION") {
            match kind.parse() {
                Ok(k) => self.backend.implementation = k,
                Err(e) => tracing::warn!(error = %e, "Ignoring DATA_IMPLEMENTATION"),
            }
        }

        // Database
        if let Ok(host) = std::env::var("DB_HOSTNAME") {
            if !host.is_empty() {
                self.database.host = host;
            }
        }
        if let Ok(port) = std::env::var("DB_PORT") {
            if let Ok(p) = port.parse() {
                self.database.port = p;
            }
        }
        if let Ok(user) = std::env::var("DB_USERNAME") {
            if !user.is_empty() {
                self.database.username = user;
            }
        }
        if let Ok(password) = std::env::var("DB_PASSWORD") {
            self.database.password = password.into();
        }
        if let Ok(database) = std::env::var("DB_DATABASE") {
            if !database.is_empty() {
                self.database.database = database;
            }
        }

        // Logging
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.host.is_empty() {
            return Err("Database host cannot be empty".to_string());
        }
        if self.database.port == 0 {
            return Err("Database port cannot be 0".to_string());
        }
        if self.database.max_open_connections == 0 {
            return Err("Max open connections must be > 0".to_string());
        }
        if self.database.max_connection_lifetime_secs == 0 {
            return Err("Max connection lifetime must be > 0".to_string());
        }

        if self.query.min_window_secs < 0 {
            return Err("Minimum window cannot be negative".to_string());
        }
        if self.query.min_window_len_secs <= 0 {
            return Err("Minimum window_len must be > 0".to_string());
        }
        if self.query.max_window_len_secs < self.query.min_window_len_secs {
            return Err("Maximum window_len cannot be below the minimum".to_string());
        }
        if self.query.hysteresis_secs.unsigned_abs() > MAX_QUERY_SPAN_SECS {
            return Err(format!(
                "Hysteresis cannot exceed {} seconds in either direction",
                MAX_QUERY_SPAN_SECS
            ));
        }
        if self.query.min_window_secs.unsigned_abs() > MAX_QUERY_SPAN_SECS {
            return Err(format!(
                "Minimum window cannot exceed {} seconds",
                MAX_QUERY_SPAN_SECS
            ));
        }
        if self.query.max_window_len_secs.unsigned_abs() > MAX_QUERY_SPAN_SECS {
            return Err(format!(
                "Maximum window_len cannot exceed {} seconds",
                MAX_QUERY_SPAN_SECS
            ));
        }
        if self.query.timeout_secs > MAX_QUERY_SPAN_SECS {
            return Err(format!(
                "Query timeout cannot exceed {} seconds",
                MAX_QUERY_SPAN_SECS
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<(), String> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file {}: {}", path, e))
    }
}
