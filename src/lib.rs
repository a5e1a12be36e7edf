//! PMDB Telemetry - power and energy queries over a two-generation HPC cluster
//!
//! This library answers time-windowed power and energy queries against a
//! telemetry store that records two hardware generations in different
//! schemas:
//! - **Mountain** nodes report a monotonic per-node energy counter
//! - **River** nodes report instantaneous power per controller
//!
//! Node-scoped queries classify the requested nodes by generation, query
//! each generation concurrently with its own semantics, and merge the two
//! partial answers into one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Time window normalization and request validation
pub mod window;

/// Combining per-class partial results and errors
pub mod merge;

/// PostgreSQL/TimescaleDB telemetry store
pub mod postgres;

/// Validating, normalizing query facade
pub mod service;

// Re-export main types
pub use engine::{BackendSelector, DataImplementation, QueryContext, TelemetryBackend};
pub use error::{Error, ReasonCode, Result, TimeBoundRequestError};
pub use service::TelemetryService;
pub use types::{NodeLookup, TimeBoundNodeRequest, TimeBoundRequest};
