//! PostgreSQL/TimescaleDB telemetry store integration
//!
//! The store exposes one view per hardware class plus a chassis view for
//! rectifier power:
//!
//! ```text
//! pmdb.nc_view      mountain node controllers   (energy counters, joules)
//! pmdb.river_view   river BMCs                  (instantaneous power, watts)
//! pmdb.cc_view      mountain chassis rectifiers (instantaneous power, watts)
//! ```
//!
//! Each view is keyed by location, timestamp and sensor/physical-context tags.
//!
//! # Example
//!
//! ```rust,no_run
//! use pmdb_telemetry::config::DatabaseConfig;
//! use pmdb_telemetry::engine::{QueryContext, TelemetryBackend};
//! use pmdb_telemetry::postgres::{PgConnection, PostgresBackend};
//! use pmdb_telemetry::types::TimeBoundRequest;
//! use chrono::{Duration, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = PgConnection::connect_lazy(&DatabaseConfig::default())?;
//! let backend = PostgresBackend::new(conn);
//!
//! let end = Utc::now() - Duration::seconds(15);
//! let window = TimeBoundRequest::new(end - Duration::minutes(5), end);
//! let power = backend.system_power(&QueryContext::new(), &window).await?;
//! println!("avg system power: {:?} W", power.avg);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod classifier;
pub mod connection;
pub mod executor;
pub mod sql;

// Re-export main types
pub use backend::{run_split, PostgresBackend, POSTGRES_IMPLEMENTATION};
pub use classifier::{classify, controller_location, LocationProbe, NodeSplit};
pub use connection::{PgConnection, PoolMetrics, PoolMetricsSnapshot};
