//! Pluggable telemetry backends
//!
//! Every backend implements [`TelemetryBackend`]. Two implementations exist:
//! the in-memory [`StubBackend`] and the store-backed
//! [`PostgresBackend`](crate::postgres::PostgresBackend). [`BackendSelector`]
//! picks one at startup.

pub mod builder;
pub mod context;
pub mod stubs;
pub mod traits;

pub use builder::{BackendSelector, DataImplementation};
pub use context::QueryContext;
pub use stubs::{StubBackend, STUB_IMPLEMENTATION};
pub use traits::{HealthReport, HealthStatus, TelemetryBackend};
