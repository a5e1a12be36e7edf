//! Pooled connection to the telemetry store
//!
//! Wraps a lazily-connecting `sqlx` pool with:
//! - A fixed cap on open connections, independent of load
//! - A maximum connection lifetime so that connections dropped by an idle
//!   timeout elsewhere in the stack are replaced
//! - Reachability checks (`SELECT 1`) with health status tracking
//! - Query metrics
//!
//! # Example
//!
//! ```rust,no_run
//! use pmdb_telemetry::config::DatabaseConfig;
//! use pmdb_telemetry::postgres::PgConnection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = PgConnection::connect_lazy(&DatabaseConfig::default())?;
//! conn.ping().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::DatabaseConfig;
use crate::engine::HealthStatus;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Ping latency above which the store is reported as degraded
const DEGRADED_LATENCY: Duration = Duration::from_secs(1);

/// Connection pool metrics
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Total number of statements executed
    pub queries_executed: AtomicU64,

    /// Total number of statement failures
    pub query_failures: AtomicU64,

    /// Total number of failed pings
    pub ping_failures: AtomicU64,

    /// Total statement latency in microseconds
    pub total_latency_us: AtomicU64,
}

impl PoolMetrics {
    /// Record a successful statement with latency
    pub fn record_query(&self, latency: Duration) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a statement failure
    pub fn record_query_failure(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed ping
    pub fn record_ping_failure(&self) {
        self.ping_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average statement latency in microseconds
    pub fn average_latency_us(&self) -> f64 {
        let total = self.total_latency_us.load(Ordering::Relaxed);
        let count = self.queries_executed.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Get a snapshot of the metrics
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            ping_failures: self.ping_failures.load(Ordering::Relaxed),
            average_latency_us: self.average_latency_us(),
        }
    }
}

/// Snapshot of pool metrics at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolMetricsSnapshot {
    /// Statements executed
    pub queries_executed: u64,
    /// Statement failures
    pub query_failures: u64,
    /// Failed pings
    pub ping_failures: u64,
    /// Average statement latency in microseconds
    pub average_latency_us: f64,
}

/// Health of a store that answered a ping after `elapsed`
fn status_for_latency(elapsed: Duration) -> HealthStatus {
    if elapsed > DEGRADED_LATENCY {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Pooled, lazily-established connection handle
///
/// Cloning shares the pool.
#[derive(Clone)]
pub struct PgConnection {
    pool: PgPool,
    target: String,
    metrics: Arc<PoolMetrics>,
    health_status: Arc<RwLock<HealthStatus>>,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("target", &self.target)
            .field("health", &self.health())
            .finish()
    }
}

impl PgConnection {
    /// Build the pool without opening a connection
    ///
    /// Connections are opened on first use, so an unreachable server only
    /// shows up at the first ping or query.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        if config.host.is_empty() {
            return Err(Error::Configuration("Database host cannot be empty".to_string()));
        }
        if config.max_open_connections == 0 {
            return Err(Error::Configuration(
                "Max open connections must be > 0".to_string(),
            ));
        }

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(&config.database)
            .ssl_mode(PgSslMode::Disable);
        if !config.password.is_empty() {
            options = options.password(config.password.expose_secret());
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_connections)
            .max_lifetime(config.max_connection_lifetime())
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(options);

        let target = config.display_target();
        info!(
            store = %target,
            max_connections = config.max_open_connections,
            max_lifetime_secs = config.max_connection_lifetime_secs,
            "Telemetry store pool configured"
        );

        Ok(Self {
            pool,
            target,
            metrics: Arc::new(PoolMetrics::default()),
            health_status: Arc::new(RwLock::new(HealthStatus::Unknown)),
        })
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connection target with credentials redacted
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Shared metrics
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Last observed health status
    pub fn health(&self) -> HealthStatus {
        *self.health_status.read()
    }

    /// Check that the store answers `SELECT 1`
    pub async fn ping(&self) -> Result<()> {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                let elapsed = start.elapsed();
                let status = status_for_latency(elapsed);
                *self.health_status.write() = status;
                debug!(store = %self.target, ?elapsed, "Telemetry store ping succeeded");
                Ok(())
            },
            Err(e) => {
                self.metrics.record_ping_failure();
                *self.health_status.write() = HealthStatus::Unhealthy;
                error!(store = %self.target, error = %e, "Telemetry store ping failed");
                Err(Error::Database(e))
            },
        }
    }

}
