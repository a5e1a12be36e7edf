//! Telemetry query service
//!
//! [`TelemetryService`] is the object callers hold. It owns the selected
//! backend, a clock and the window settings, and runs each request through
//! the same steps:
//!
//! 1. Validate the request (nothing is queried for a malformed request)
//! 2. Normalize the window against "now"
//! 3. Ask the backend, under the request's deadline and cancellation token
//!
//! # Example
//!
//! ```rust
//! use pmdb_telemetry::engine::{QueryContext, StubBackend};
//! use pmdb_telemetry::service::TelemetryService;
//! use pmdb_telemetry::types::{NodeLookup, TimeBoundNodeRequest};
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let service = TelemetryService::new(Arc::new(StubBackend::new()));
//!
//! let end = Utc::now() - Duration::minutes(1);
//! let req = TimeBoundNodeRequest::new(
//!     end - Duration::minutes(10),
//!     end,
//!     vec![NodeLookup::new("x0c0s0b0n0", 0)],
//! );
//! let energy = service.node_energy(&QueryContext::new(), &req).await.unwrap();
//! assert_eq!(energy.node_count, 2);
//! # });
//! ```

use crate::config::Config;
use crate::engine::{HealthReport, QueryContext, TelemetryBackend};
use crate::error::{Error, Result};
use crate::types::{
    NodeEnergy, NodeEnergyCounters, NodeEnergyStats, NodeWindow, SystemPower,
    SystemPowerByCabinet, TimeBoundNodeRequest, TimeBoundRequest,
};
use crate::window::{prepare_node_request, resolve_sample_window, Clock, SystemClock, WindowSettings};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A system-level result together with the window it covers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowedReport<T> {
    /// Normalized window start
    pub start_time: DateTime<Utc>,
    /// Window length actually used, in seconds
    pub window_len_secs: i64,
    /// The metric
    #[serde(flatten)]
    pub data: T,
}

/// Validates, normalizes and dispatches telemetry queries
#[derive(Clone)]
pub struct TelemetryService {
    backend: Arc<dyn TelemetryBackend>,
    clock: Arc<dyn Clock>,
    settings: WindowSettings,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("backend", &self.backend.implementation_name())
            .field("settings", &self.settings)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl TelemetryService {
    /// Create a service with the wall clock and default window settings
    pub fn new(backend: Arc<dyn TelemetryBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            settings: WindowSettings::default(),
            default_timeout: None,
        }
    }

    /// Create a service using the query section of `config`
    ///
    /// Fails when a duration setting is out of range.
    pub fn from_config(backend: Arc<dyn TelemetryBackend>, config: &Config) -> Result<Self> {
        Ok(Self::new(backend)
            .with_settings(WindowSettings::try_from(&config.query)?)
            .with_default_timeout(config.query.timeout()))
    }

    /// Use a different clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use different window settings
    pub fn with_settings(mut self, settings: WindowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Deadline applied to contexts that carry none
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Ping the backend and report its health
    pub async fn health_check(&self) -> HealthReport {
        self.backend.health_check().await
    }

    /// Name of the backend implementation
    pub fn implementation_name(&self) -> &'static str {
        self.backend.implementation_name()
    }

    /// Window settings in use
    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    fn bounded(&self, ctx: &QueryContext) -> QueryContext {
        match (ctx.deadline(), self.default_timeout) {
            (None, Some(timeout)) => ctx.clone().with_timeout(timeout),
            _ => ctx.clone(),
        }
    }

    fn prepare(&self, req: &TimeBoundNodeRequest) -> Result<NodeWindow> {
        let scoped = prepare_node_request(req, self.clock.now(), &self.settings)?;
        debug!(
            start = %scoped.window.start,
            end = %scoped.window.end,
            nodes = scoped.nodes.len(),
            "Node request prepared"
        );
        Ok(scoped)
    }

    fn sample_window(
        &self,
        start: Option<DateTime<Utc>>,
        window_len_secs: Option<i64>,
    ) -> Result<(TimeBoundRequest, i64)> {
        let (window, interval) =
            resolve_sample_window(start, window_len_secs, self.clock.now(), &self.settings)?;
        debug!(start = %window.start, end = %window.end, "System window resolved");
        Ok((window, interval.num_seconds()))
    }

    /// System power over a sample window
    ///
    /// With no `start` the window ends now; `window_len_secs` defaults to the
    /// minimum window.
    pub async fn system_power(
        &self,
        ctx: &QueryContext,
        start: Option<DateTime<Utc>>,
        window_len_secs: Option<i64>,
    ) -> Result<WindowedReport<SystemPower>> {
        let (window, len) = self.sample_window(start, window_len_secs)?;
        let ctx = self.bounded(ctx);
        let power = ctx
            .run("system power", self.backend.system_power(&ctx, &window))
            .await?;
        if !power.is_complete() {
            return Err(Error::no_data(window));
        }
        Ok(WindowedReport {
            start_time: window.start,
            window_len_secs: len,
            data: power,
        })
    }

    /// System power per cabinet over a sample window
    pub async fn system_power_by_cabinet(
        &self,
        ctx: &QueryContext,
        start: Option<DateTime<Utc>>,
        window_len_secs: Option<i64>,
    ) -> Result<WindowedReport<SystemPowerByCabinet>> {
        let (window, len) = self.sample_window(start, window_len_secs)?;
        let ctx = self.bounded(ctx);
        let cabinets = ctx
            .run(
                "system power by cabinet",
                self.backend.system_power_by_cabinet(&ctx, &window),
            )
            .await?;
        Ok(WindowedReport {
            start_time: window.start,
            window_len_secs: len,
            data: cabinets,
        })
    }

    /// Energy per node
    pub async fn node_energy(
        &self,
        ctx: &QueryContext,
        req: &TimeBoundNodeRequest,
    ) -> Result<NodeEnergy> {
        let scoped = self.prepare(req)?;
        let ctx = self.bounded(ctx);
        ctx.run("node energy", self.backend.node_energy(&ctx, &scoped))
            .await
    }

    /// Energy statistics across nodes
    pub async fn node_energy_stats(
        &self,
        ctx: &QueryContext,
        req: &TimeBoundNodeRequest,
    ) -> Result<NodeEnergyStats> {
        let scoped = self.prepare(req)?;
        let ctx = self.bounded(ctx);
        ctx.run(
            "node energy stats",
            self.backend.node_energy_stats(&ctx, &scoped),
        )
        .await
    }

    /// Latest energy counter per node
    pub async fn node_energy_counters(
        &self,
        ctx: &QueryContext,
        req: &TimeBoundNodeRequest,
    ) -> Result<NodeEnergyCounters> {
        let scoped = self.prepare(req)?;
        let ctx = self.bounded(ctx);
        ctx.run(
            "node energy counter",
            self.backend.node_energy_counters(&ctx, &scoped),
        )
        .await
    }
}
