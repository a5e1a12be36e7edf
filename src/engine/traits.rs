//! Core trait definition for telemetry backends

use super::context::QueryContext;
use crate::error::Result;
use crate::types::{
    NodeEnergy, NodeEnergyCounters, NodeEnergyStats, NodeWindow, SystemPower,
    SystemPowerByCabinet, TimeBoundRequest,
};
use crate::postgres::PoolMetricsSnapshot;
use async_trait::async_trait;
use serde::Serialize;

/// Health status of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ping succeeded quickly
    Healthy,
    /// Ping succeeded but slowly
    Degraded,
    /// Ping failed
    Unhealthy,
    /// Not yet checked
    Unknown,
}

/// Result of a backend health check
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Backend implementation name
    pub implementation: &'static str,
    /// Status after the check
    pub status: HealthStatus,
    /// Store address with credentials redacted, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Ping failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Connection pool counters, when there is a pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PoolMetricsSnapshot>,
}

// =============================================================================
// Telemetry Backend Trait
// =============================================================================

/// One operation per metric, each answering for a single window
///
/// Windows arrive already normalized and validated. Node-scoped operations
/// receive the full node list of the request; splitting by hardware class is
/// the backend's concern. A window with no matching rows is reported as a
/// [`NoData`](crate::error::ReasonCode::NoData) request error.
#[async_trait]
pub trait TelemetryBackend: Send + Sync + 'static {
    /// Name reported for this implementation
    fn implementation_name(&self) -> &'static str;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Ping and report the outcome
    async fn health_check(&self) -> HealthReport {
        let (status, error) = match self.ping().await {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
        };
        HealthReport {
            implementation: self.implementation_name(),
            status,
            target: None,
            error,
            metrics: None,
        }
    }

    /// Minimum, maximum and mean system power over the window
    async fn system_power(
        &self,
        ctx: &QueryContext,
        window: &TimeBoundRequest,
    ) -> Result<SystemPower>;

    /// System power broken down per cabinet
    async fn system_power_by_cabinet(
        &self,
        ctx: &QueryContext,
        window: &TimeBoundRequest,
    ) -> Result<SystemPowerByCabinet>;

    /// Energy consumed by each node over the window
    async fn node_energy(&self, ctx: &QueryContext, req: &NodeWindow) -> Result<NodeEnergy>;

    /// Summary statistics of node energy over the window
    async fn node_energy_stats(
        &self,
        ctx: &QueryContext,
        req: &NodeWindow,
    ) -> Result<NodeEnergyStats>;

    /// Latest energy counter value per node within the window
    async fn node_energy_counters(
        &self,
        ctx: &QueryContext,
        req: &NodeWindow,
    ) -> Result<NodeEnergyCounters>;
}
