//! In-memory stub backend with fixed answers
//!
//! [`StubBackend`] answers every metric with the same deterministic values so
//! that callers can be exercised without a telemetry store:
//!
//! | Metric                  | Answer                                                   |
//! |-------------------------|----------------------------------------------------------|
//! | system power            | min 1, max 100, avg 50                                   |
//! | system power by cabinet | `x0` (avg 0.0, max 0, min 0), `x1` (avg 1.5, max 3, min 1) |
//! | node energy             | `x0c0s0b0n0`/0 = 100 J, `x0c0s0b0n1`/1 = 1000 J          |
//! | node energy stats       | total 1100, avg 550, stddev 450, max n1, min n0          |
//! | node energy counters    | n0 = 100, n1 = 1000, sampled at the window end           |
//!
//! Durations are always `end - start` of the requested window.
//!
//! # Warning
//!
//! **The stub does not validate its input and ignores the requested nodes.**
//! Validation happens in [`TelemetryService`](crate::service::TelemetryService)
//! before a backend is called.
//!
//! # Example
//!
//! ```rust
//! use pmdb_telemetry::engine::{QueryContext, StubBackend, TelemetryBackend};
//! use pmdb_telemetry::types::TimeBoundRequest;
//! use chrono::{Duration, Utc};
//!
//! # tokio_test_block_on(async {
//! let backend = StubBackend::new();
//! let end = Utc::now();
//! let window = TimeBoundRequest::new(end - Duration::minutes(1), end);
//! let power = backend.system_power(&QueryContext::new(), &window).await.unwrap();
//! assert_eq!(power.max, Some(100));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use super::context::QueryContext;
use super::traits::TelemetryBackend;
use crate::error::Result;
use crate::types::{
    CabinetPower, NodeEnergy, NodeEnergyCounter, NodeEnergyCounters, NodeEnergyLevel,
    NodeEnergyStats, NodeLookup, NodeWindow, SystemPower, SystemPowerByCabinet, TimeBoundRequest,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Name reported by the stub implementation
pub const STUB_IMPLEMENTATION: &str = "DUMMY";

/// Backend returning fixed, deterministic values
#[derive(Debug, Default)]
pub struct StubBackend {
    calls: AtomicU64,
}

impl StubBackend {
    /// Create a stub backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of metric calls answered so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn node_zero() -> NodeLookup {
        NodeLookup::new("x0c0s0b0n0", 0)
    }

    fn node_one() -> NodeLookup {
        NodeLookup::new("x0c0s0b0n1", 1)
    }
}

#[async_trait]
impl TelemetryBackend for StubBackend {
    fn implementation_name(&self) -> &'static str {
        STUB_IMPLEMENTATION
    }

    async fn system_power(
        &self,
        _ctx: &QueryContext,
        _window: &TimeBoundRequest,
    ) -> Result<SystemPower> {
        self.record_call();
        Ok(SystemPower {
            min: Some(1),
            max: Some(100),
            avg: Some(50),
        })
    }

    async fn system_power_by_cabinet(
        &self,
        _ctx: &QueryContext,
        _window: &TimeBoundRequest,
    ) -> Result<SystemPowerByCabinet> {
        self.record_call();
        Ok(SystemPowerByCabinet {
            cabinets: vec![
                CabinetPower {
                    avg: Some(0.0),
                    max: Some(0),
                    min: Some(0),
                    cabinet_id: "x0".to_string(),
                },
                CabinetPower {
                    avg: Some(1.5),
                    max: Some(3),
                    min: Some(1),
                    cabinet_id: "x1".to_string(),
                },
            ],
        })
    }

    async fn node_energy(&self, _ctx: &QueryContext, req: &NodeWindow) -> Result<NodeEnergy> {
        self.record_call();
        Ok(NodeEnergy {
            node_count: 2,
            duration: req.window.duration(),
            levels: vec![
                NodeEnergyLevel::new(Self::node_zero(), 100),
                NodeEnergyLevel::new(Self::node_one(), 1000),
            ],
        })
    }

    async fn node_energy_stats(
        &self,
        _ctx: &QueryContext,
        req: &NodeWindow,
    ) -> Result<NodeEnergyStats> {
        self.record_call();
        Ok(NodeEnergyStats {
            total: 1100,
            avg: 550.0,
            stddev: 450.0,
            max: NodeEnergyLevel::new(Self::node_one(), 1000),
            min: NodeEnergyLevel::new(Self::node_zero(), 100),
            duration: req.window.duration(),
            node_count: 2,
        })
    }

    async fn node_energy_counters(
        &self,
        _ctx: &QueryContext,
        req: &NodeWindow,
    ) -> Result<NodeEnergyCounters> {
        self.record_call();
        let sample_time = req.window.end;
        Ok(NodeEnergyCounters {
            node_count: 2,
            samples: vec![
                NodeEnergyCounter {
                    node: Self::node_zero(),
                    counter: Some(100),
                    sample_time,
                },
                NodeEnergyCounter {
                    node: Self::node_one(),
                    counter: Some(1000),
                    sample_time,
                },
            ],
        })
    }
}
