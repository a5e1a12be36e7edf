//! Store-backed telemetry backend
//!
//! Node-scoped metrics follow the same flow:
//!
//! ```text
//! classify ──► mountain executor ─┐
//!          └─► river executor ────┴─► aggregate errors / merge ──► answer
//! ```
//!
//! The two executors share the request's [`QueryContext`] and run
//! concurrently, so latency is bounded by the slower class.

use super::classifier::{classify, NodeSplit};
use super::connection::PgConnection;
use super::executor;
use crate::engine::{HealthReport, QueryContext, TelemetryBackend};
use crate::error::{Error, Result};
use crate::merge::{resolve_split, Merge};
use crate::types::{
    HardwareClass, NodeEnergy, NodeEnergyCounters, NodeEnergyStats, NodeWindow, SystemPower,
    SystemPowerByCabinet, TimeBoundRequest,
};
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

/// Name reported by the store-backed implementation
pub const POSTGRES_IMPLEMENTATION: &str = "Postgres";

/// Run one metric's class executors over a node split and resolve the outcome
///
/// Returns "no data" without querying when no node was classified.
pub async fn run_split<T, M, FM, R, FR>(
    ctx: &QueryContext,
    metric: &str,
    req: &NodeWindow,
    split: NodeSplit,
    mountain: M,
    river: R,
) -> Result<T>
where
    T: Merge,
    M: FnOnce(NodeWindow) -> FM,
    FM: Future<Output = Result<T>>,
    R: FnOnce(NodeWindow) -> FR,
    FR: Future<Output = Result<T>>,
{
    if split.is_empty() {
        warn!(
            metric,
            unknown = split.unknown.len(),
            "No nodes found in data tables for time window"
        );
        return Err(Error::no_data(req.window));
    }

    let mountain_req = req.scoped(split.mountain);
    let river_req = req.scoped(split.river);
    let mountain_op = format!("{} {}", HardwareClass::Mountain, metric);
    let river_op = format!("{} {}", HardwareClass::River, metric);

    let (m, r) = tokio::join!(
        ctx.run(&mountain_op, mountain(mountain_req)),
        ctx.run(&river_op, river(river_req)),
    );
    debug!(
        metric,
        mountain_ok = m.is_ok(),
        river_ok = r.is_ok(),
        "Class queries complete"
    );

    resolve_split(req.window, m, r)
}

/// Telemetry backend over the pmdb views
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    conn: PgConnection,
}

impl PostgresBackend {
    /// Wrap an existing connection
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }

    async fn split(&self, ctx: &QueryContext, req: &NodeWindow) -> Result<NodeSplit> {
        classify(&self.conn, ctx, req).await
    }
}

#[async_trait]
impl TelemetryBackend for PostgresBackend {
    fn implementation_name(&self) -> &'static str {
        POSTGRES_IMPLEMENTATION
    }

    async fn ping(&self) -> Result<()> {
        self.conn.ping().await
    }

    async fn health_check(&self) -> HealthReport {
        let error = self.conn.ping().await.err().map(|e| e.to_string());
        HealthReport {
            implementation: POSTGRES_IMPLEMENTATION,
            status: self.conn.health(),
            target: Some(self.conn.target().to_string()),
            error,
            metrics: Some(self.conn.metrics().snapshot()),
        }
    }

    async fn system_power(
        &self,
        ctx: &QueryContext,
        window: &TimeBoundRequest,
    ) -> Result<SystemPower> {
        ctx.run("system power", executor::system_power(&self.conn, window))
            .await
    }

    async fn system_power_by_cabinet(
        &self,
        ctx: &QueryContext,
        window: &TimeBoundRequest,
    ) -> Result<SystemPowerByCabinet> {
        ctx.run(
            "system power by cabinet",
            executor::system_power_by_cabinet(&self.conn, window),
        )
        .await
    }

    async fn node_energy(&self, ctx: &QueryContext, req: &NodeWindow) -> Result<NodeEnergy> {
        let split = self.split(ctx, req).await?;
        let conn = &self.conn;
        run_split(
            ctx,
            "node energy",
            req,
            split,
            |r| async move { executor::mountain_node_energy(conn, &r).await },
            |r| async move { executor::river_node_energy(conn, &r).await },
        )
        .await
    }

    async fn node_energy_stats(
        &self,
        ctx: &QueryContext,
        req: &NodeWindow,
    ) -> Result<NodeEnergyStats> {
        let split = self.split(ctx, req).await?;
        let conn = &self.conn;
        run_split(
            ctx,
            "node energy stats",
            req,
            split,
            |r| async move { executor::mountain_node_energy_stats(conn, &r).await },
            |r| async move { executor::river_node_energy_stats(conn, &r).await },
        )
        .await
    }

    async fn node_energy_counters(
        &self,
        ctx: &QueryContext,
        req: &NodeWindow,
    ) -> Result<NodeEnergyCounters> {
        let split = self.split(ctx, req).await?;
        let conn = &self.conn;
        run_split(
            ctx,
            "node energy counter",
            req,
            split,
            |r| async move { executor::mountain_node_energy_counters(conn, &r).await },
            |r| async move { executor::river_node_energy_counters(conn, &r).await },
        )
        .await
    }
}
