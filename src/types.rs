//! Core data types for power and energy telemetry
//!
//! All values here are constructed fresh for each request and owned by the
//! request's call stack.
//!
//! # Key Types
//!
//! - **`NodeLookup`**: a node named by its location identifier (xname) and its numeric id
//! - **`TimeBoundRequest`**: a `[start, end)` window
//! - **`TimeBoundNodeRequest`**: a window plus the nodes to report on, as received from a caller
//! - **`NodeWindow`**: a normalized, validated node-scoped window handed to backends
//! - Result types per metric: `SystemPower`, `SystemPowerByCabinet`, `NodeEnergy`,
//!   `NodeEnergyStats`, `NodeEnergyCounters`
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use pmdb_telemetry::types::{NodeLookup, TimeBoundRequest};
//!
//! let end = Utc::now();
//! let window = TimeBoundRequest::new(end - Duration::minutes(5), end);
//! assert_eq!(window.duration_secs(), 300.0);
//!
//! let node = NodeLookup::new("x1000c0s0b0n0", 1000);
//! assert_eq!(node.xname, "x1000c0s0b0n0");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A node identified both by location and numeric id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLookup {
    /// Location identifier used by the telemetry schema
    pub xname: String,
    /// Caller-supplied numeric id, opaque to the store
    pub nid: i64,
}

impl NodeLookup {
    /// Create a lookup entry
    pub fn new(xname: impl Into<String>, nid: i64) -> Self {
        Self {
            xname: xname.into(),
            nid,
        }
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBoundRequest {
    /// Window start
    pub start: DateTime<Utc>,
    /// Window end
    pub end: DateTime<Utc>,
}

impl TimeBoundRequest {
    /// Create a window
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window length, zero for inverted windows
    pub fn duration(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }

    /// Window length in fractional seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration().as_secs_f64()
    }
}

/// A node-scoped request as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBoundNodeRequest {
    /// Window start, `None` when the caller did not set it
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Window end, `None` when the caller did not set it
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Nodes to report on, in caller order
    #[serde(default)]
    pub nodes: Vec<NodeLookup>,
    /// Job correlation id, reserved for future filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Application correlation id, reserved for future filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apid: Option<String>,
}

impl TimeBoundNodeRequest {
    /// Create a request for the given window and nodes
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, nodes: Vec<NodeLookup>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            nodes,
            job_id: None,
            apid: None,
        }
    }

    /// Set the job correlation id
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Set the application correlation id
    pub fn with_apid(mut self, apid: impl Into<String>) -> Self {
        self.apid = Some(apid.into());
        self
    }

    /// The window, when both ends are set
    pub fn window(&self) -> Option<TimeBoundRequest> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(TimeBoundRequest::new(start, end)),
            _ => None,
        }
    }
}

/// A validated, normalized window restricted to a set of nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeWindow {
    /// Normalized window
    pub window: TimeBoundRequest,
    /// Nodes in scope
    pub nodes: Vec<NodeLookup>,
}

impl NodeWindow {
    /// Create a scoped window
    pub fn new(window: TimeBoundRequest, nodes: Vec<NodeLookup>) -> Self {
        Self { window, nodes }
    }

    /// Same window, different node subset
    pub fn scoped(&self, nodes: Vec<NodeLookup>) -> Self {
        Self {
            window: self.window,
            nodes,
        }
    }

    /// Location identifiers of the nodes in scope
    pub fn xnames(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.xname.clone()).collect()
    }
}

/// Physical hardware generation of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareClass {
    /// Liquid-cooled cabinets with a per-node energy counter
    Mountain,
    /// Air-cooled racks reporting only instantaneous power
    River,
}

impl fmt::Display for HardwareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareClass::Mountain => f.write_str("mountain"),
            HardwareClass::River => f.write_str("river"),
        }
    }
}

// ============================================================================
// Metric results
// ============================================================================

/// System-wide power in watts
///
/// All three fields are present together or the value counts as "no data".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPower {
    /// Lowest bucketed system power
    pub min: Option<i64>,
    /// Highest bucketed system power
    pub max: Option<i64>,
    /// Mean bucketed system power
    pub avg: Option<i64>,
}

impl SystemPower {
    /// True when every field is populated
    pub fn is_complete(&self) -> bool {
        self.min.is_some() && self.max.is_some() && self.avg.is_some()
    }
}

/// Power figures for one cabinet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinetPower {
    /// Mean bucketed cabinet power
    pub avg: Option<f64>,
    /// Highest bucketed cabinet power
    pub max: Option<i64>,
    /// Lowest bucketed cabinet power
    pub min: Option<i64>,
    /// Cabinet identifier, e.g. `x1000`
    pub cabinet_id: String,
}

/// Power broken down per cabinet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemPowerByCabinet {
    /// One entry per cabinet
    pub cabinets: Vec<CabinetPower>,
}

/// Energy consumed by one node over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEnergyLevel {
    /// The node
    pub node: NodeLookup,
    /// Energy in joules
    pub energy: i64,
}

impl NodeEnergyLevel {
    /// Create a level entry
    pub fn new(node: NodeLookup, energy: i64) -> Self {
        Self { node, energy }
    }
}

/// Per-node energy over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEnergy {
    /// Number of nodes reported
    pub node_count: usize,
    /// Window length
    pub duration: Duration,
    /// Per-node energy
    pub levels: Vec<NodeEnergyLevel>,
}

impl NodeEnergy {
    /// Build from per-node levels, `None` when empty
    pub fn from_levels(levels: Vec<NodeEnergyLevel>, duration: Duration) -> Option<Self> {
        if levels.is_empty() {
            return None;
        }
        Some(Self {
            node_count: levels.len(),
            duration,
            levels,
        })
    }
}

/// Summary statistics of node energy over a window
///
/// `max.energy >= min.energy` whenever `node_count > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEnergyStats {
    /// Sum of node energies
    pub total: i64,
    /// Mean node energy
    pub avg: f64,
    /// Sample standard deviation of node energy
    pub stddev: f64,
    /// Node with the highest energy
    pub max: NodeEnergyLevel,
    /// Node with the lowest energy
    pub min: NodeEnergyLevel,
    /// Window length
    pub duration: Duration,
    /// Number of nodes summarized
    pub node_count: usize,
}

impl NodeEnergyStats {
    /// Summarize per-node levels, `None` when empty
    ///
    /// Levels are ranked by descending energy with a stable sort: the first
    /// entry is the maximum and the last is the minimum.
    pub fn from_levels(levels: &[NodeEnergyLevel], duration: Duration) -> Option<Self> {
        let mut ranked: Vec<&NodeEnergyLevel> = levels.iter().collect();
        ranked.sort_by(|a, b| b.energy.cmp(&a.energy));
        let max = (*ranked.first()?).clone();
        let min = (*ranked.last()?).clone();

        let n = levels.len();
        let total: i64 = levels.iter().map(|l| l.energy).sum();
        let avg = total as f64 / n as f64;
        let stddev = if n < 2 {
            0.0
        } else {
            let sq: f64 = levels
                .iter()
                .map(|l| {
                    let d = l.energy as f64 - avg;
                    d * d
                })
                .sum();
            (sq / (n - 1) as f64).sqrt()
        };

        Some(Self {
            total,
            avg,
            stddev,
            max,
            min,
            duration,
            node_count: n,
        })
    }
}

/// Energy counter snapshot for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEnergyCounter {
    /// The node
    pub node: NodeLookup,
    /// Counter value in joules
    pub counter: Option<i64>,
    /// Time of the sample
    pub sample_time: DateTime<Utc>,
}

/// Energy counter snapshots over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEnergyCounters {
    /// Number of nodes reported
    pub node_count: usize,
    /// One snapshot per node
    pub samples: Vec<NodeEnergyCounter>,
}

impl NodeEnergyCounters {
    /// Build from samples, `None` when empty
    pub fn from_samples(samples: Vec<NodeEnergyCounter>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        Some(Self {
            node_count: samples.len(),
            samples,
        })
    }
}
