//! Per-class query executors
//!
//! Each executor answers one metric for one hardware class, restricted to
//! that class's node subset:
//!
//! - **Mountain** nodes carry a monotonic energy counter, so node energy is
//!   the counter delta across the window.
//! - **River** nodes report only instantaneous power. Node energy is the mean
//!   power multiplied by the window length. River telemetry is keyed by
//!   controller, so rows are mapped back to nodes through
//!   [`controller_location`].
//!
//! An executor given no nodes, or whose statement returns no rows, reports
//! "no data in window". Statement failures are logged together with the SQL
//! and bind parameters.

use super::classifier::{controller_location, controller_locations};
use super::connection::PgConnection;
use super::sql;
use crate::error::{Error, Result};
use crate::types::{
    CabinetPower, NodeEnergy, NodeEnergyCounter, NodeEnergyCounters, NodeEnergyLevel,
    NodeEnergyStats, NodeLookup, NodeWindow, SystemPower, SystemPowerByCabinet, TimeBoundRequest,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::FromRow;
use std::time::Instant;
use tracing::{error, info, trace, warn};

// =============================================================================
// Row types
// =============================================================================

#[derive(FromRow)]
struct LocationRow {
    location: String,
}

#[derive(Debug, FromRow)]
struct EnergyRow {
    location: String,
    energy: Option<i64>,
}

#[derive(Debug, FromRow)]
struct CounterRow {
    location: String,
    counter: Option<i64>,
    sample_time: DateTime<Utc>,
}

#[derive(FromRow)]
struct SystemPowerRow {
    min: Option<i64>,
    max: Option<i64>,
    avg: Option<i64>,
}

#[derive(FromRow)]
struct CabinetRow {
    min: Option<i64>,
    max: Option<i64>,
    avg: Option<f64>,
    cabinet_id: String,
}

// =============================================================================
// Statement execution
// =============================================================================

/// Bind parameters of one statement, kept for diagnostics
#[derive(Debug)]
struct Binds<'a> {
    window: &'a TimeBoundRequest,
    locations: Option<&'a [String]>,
    duration_secs: Option<f64>,
}

async fn fetch_all<R>(conn: &PgConnection, name: &str, stmt: &str, binds: Binds<'_>) -> Result<Vec<R>>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    trace!(
        statement = name,
        sql = stmt,
        start = %binds.window.start,
        end = %binds.window.end,
        locations = ?binds.locations,
        duration_secs = ?binds.duration_secs,
        "Executing statement"
    );

    let mut query = sqlx::query_as::<_, R>(stmt)
        .bind(binds.window.start)
        .bind(binds.window.end);
    if let Some(locations) = binds.locations {
        query = query.bind(locations);
    }
    if let Some(secs) = binds.duration_secs {
        query = query.bind(secs);
    }

    let started = Instant::now();
    match query.fetch_all(conn.pool()).await {
        Ok(rows) => {
            conn.metrics().record_query(started.elapsed());
            trace!(statement = name, rows = rows.len(), "Statement complete");
            Ok(rows)
        },
        Err(e) => {
            conn.metrics().record_query_failure();
            error!(
                statement = name,
                sql = stmt,
                start = %binds.window.start,
                end = %binds.window.end,
                locations = ?binds.locations,
                duration_secs = ?binds.duration_secs,
                error = %e,
                "Statement failed"
            );
            Err(Error::Database(e))
        },
    }
}

/// Run a `DISTINCT location` probe
pub(crate) async fn fetch_locations(
    conn: &PgConnection,
    name: &str,
    stmt: &str,
    window: &TimeBoundRequest,
    locations: &[String],
) -> Result<Vec<String>> {
    if locations.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<LocationRow> = fetch_all(
        conn,
        name,
        stmt,
        Binds {
            window,
            locations: Some(locations),
            duration_secs: None,
        },
    )
    .await?;
    Ok(rows.into_iter().map(|r| r.location).collect())
}

fn no_data(window: TimeBoundRequest, what: &str) -> Error {
    let err = Error::no_data(window);
    warn!(query = what, error = %err, "TSDB: no rows");
    err
}

// =============================================================================
// Row to node mapping
// =============================================================================

/// Map mountain rows to the requested node with the same xname
fn mountain_levels(rows: Vec<EnergyRow>, nodes: &[NodeLookup]) -> Vec<NodeEnergyLevel> {
    rows.into_iter()
        .filter_map(|row| {
            let energy = row.energy?;
            let node = nodes.iter().find(|n| n.xname == row.location)?;
            Some(NodeEnergyLevel::new(node.clone(), energy))
        })
        .collect()
}

/// Map river controller rows to the first requested node behind that controller
fn river_levels(rows: Vec<EnergyRow>, nodes: &[NodeLookup]) -> Vec<NodeEnergyLevel> {
    rows.into_iter()
        .filter_map(|row| {
            let energy = row.energy?;
            let node = nodes
                .iter()
                .find(|n| controller_location(&n.xname) == row.location)?;
            Some(NodeEnergyLevel::new(node.clone(), energy))
        })
        .collect()
}

fn mountain_counters(rows: Vec<CounterRow>, nodes: &[NodeLookup]) -> Vec<NodeEnergyCounter> {
    rows.into_iter()
        .filter_map(|row| {
            let node = nodes.iter().find(|n| n.xname == row.location)?;
            Some(NodeEnergyCounter {
                node: node.clone(),
                counter: row.counter,
                sample_time: row.sample_time,
            })
        })
        .collect()
}

// =============================================================================
// Mountain executors
// =============================================================================

/// Counter delta per mountain node
pub async fn mountain_node_energy(conn: &PgConnection, req: &NodeWindow) -> Result<NodeEnergy> {
    if req.nodes.is_empty() {
        return Err(Error::no_data(req.window));
    }
    let xnames = req.xnames();
    let rows: Vec<EnergyRow> = fetch_all(
        conn,
        "mountain node energy",
        sql::MOUNTAIN_NODE_ENERGY,
        Binds {
            window: &req.window,
            locations: Some(&xnames),
            duration_secs: None,
        },
    )
    .await?;

    NodeEnergy::from_levels(mountain_levels(rows, &req.nodes), req.window.duration())
        .ok_or_else(|| no_data(req.window, "mountain node energy"))
}

/// Energy statistics over mountain nodes
pub async fn mountain_node_energy_stats(
    conn: &PgConnection,
    req: &NodeWindow,
) -> Result<NodeEnergyStats> {
    let energy = mountain_node_energy(conn, req).await?;
    NodeEnergyStats::from_levels(&energy.levels, energy.duration)
        .ok_or_else(|| no_data(req.window, "mountain node energy stats"))
}

/// Latest counter value per mountain node
pub async fn mountain_node_energy_counters(
    conn: &PgConnection,
    req: &NodeWindow,
) -> Result<NodeEnergyCounters> {
    if req.nodes.is_empty() {
        return Err(Error::no_data(req.window));
    }
    let xnames = req.xnames();
    let rows: Vec<CounterRow> = fetch_all(
        conn,
        "mountain node energy counter",
        sql::MOUNTAIN_NODE_ENERGY_COUNTER,
        Binds {
            window: &req.window,
            locations: Some(&xnames),
            duration_secs: None,
        },
    )
    .await?;

    NodeEnergyCounters::from_samples(mountain_counters(rows, &req.nodes))
        .ok_or_else(|| no_data(req.window, "mountain node energy counter"))
}

// =============================================================================
// River executors
// =============================================================================

/// Integrated power per river node
pub async fn river_node_energy(conn: &PgConnection, req: &NodeWindow) -> Result<NodeEnergy> {
    if req.nodes.is_empty() {
        return Err(Error::no_data(req.window));
    }
    let controllers = controller_locations(&req.nodes);
    let rows: Vec<EnergyRow> = fetch_all(
        conn,
        "river node energy",
        sql::RIVER_NODE_ENERGY,
        Binds {
            window: &req.window,
            locations: Some(&controllers),
            duration_secs: Some(req.window.duration_secs()),
        },
    )
    .await?;

    NodeEnergy::from_levels(river_levels(rows, &req.nodes), req.window.duration())
        .ok_or_else(|| no_data(req.window, "river node energy"))
}

/// Energy statistics over river nodes
pub async fn river_node_energy_stats(
    conn: &PgConnection,
    req: &NodeWindow,
) -> Result<NodeEnergyStats> {
    let energy = river_node_energy(conn, req).await?;
    NodeEnergyStats::from_levels(&energy.levels, energy.duration)
        .ok_or_else(|| no_data(req.window, "river node energy stats"))
}

/// River hardware has no energy counter; always "no data"
pub async fn river_node_energy_counters(
    _conn: &PgConnection,
    req: &NodeWindow,
) -> Result<NodeEnergyCounters> {
    if !req.nodes.is_empty() {
        info!(nodes = req.nodes.len(), "River node energy counters are not available");
    }
    Err(Error::no_data(req.window))
}

// =============================================================================
// System executors
// =============================================================================

/// Bucketed system power across both classes
pub async fn system_power(conn: &PgConnection, window: &TimeBoundRequest) -> Result<SystemPower> {
    let rows: Vec<SystemPowerRow> = fetch_all(
        conn,
        "system power",
        sql::SYSTEM_POWER,
        Binds {
            window,
            locations: None,
            duration_secs: None,
        },
    )
    .await?;

    rows.into_iter()
        .next()
        .map(|row| SystemPower {
            min: row.min,
            max: row.max,
            avg: row.avg,
        })
        .filter(SystemPower::is_complete)
        .ok_or_else(|| no_data(*window, "system power"))
}

/// Bucketed power per cabinet across both classes
pub async fn system_power_by_cabinet(
    conn: &PgConnection,
    window: &TimeBoundRequest,
) -> Result<SystemPowerByCabinet> {
    let rows: Vec<CabinetRow> = fetch_all(
        conn,
        "system power by cabinet",
        sql::SYSTEM_POWER_BY_CABINET,
        Binds {
            window,
            locations: None,
            duration_secs: None,
        },
    )
    .await?;

    if rows.is_empty() {
        return Err(no_data(*window, "system power by cabinet"));
    }

    Ok(SystemPowerByCabinet {
        cabinets: rows
            .into_iter()
            .map(|row| CabinetPower {
                avg: row.avg,
                max: row.max,
                min: row.min,
                cabinet_id: row.cabinet_id,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use chrono::TimeZone;

    fn nodes() -> Vec<NodeLookup> {
        vec![
            NodeLookup::new("x1000c0s0b0n0", 10),
            NodeLookup::new("x3000c0s19b1n0", 20),
            NodeLookup::new("x3000c0s19b1n1", 21),
        ]
    }

    fn energy(location: &str, energy: Option<i64>) -> EnergyRow {
        EnergyRow {
            location: location.to_string(),
            energy,
        }
    }

    #[test]
    fn test_mountain_rows_map_by_exact_xname() {
        let levels = mountain_levels(
            vec![energy("x1000c0s0b0n0", Some(500)), energy("x1000c0s0b0", Some(1))],
            &nodes(),
        );
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].node.nid, 10);
        assert_eq!(levels[0].energy, 500);
    }

    #[test]
    fn test_river_rows_map_through_controller() {
        let levels = river_levels(
            vec![energy("x3000c0s19b1", Some(42)), energy("x3000c0s20b1", Some(7))],
            &nodes(),
        );
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].node.xname, "x3000c0s19b1n0");
        assert_eq!(levels[0].node.nid, 20);
    }

    #[test]
    fn test_null_energy_rows_are_skipped() {
        let levels = mountain_levels(vec![energy("x1000c0s0b0n0", None)], &nodes());
        assert!(levels.is_empty());
    }

    #[test]
    fn test_counter_rows_keep_sample_time() {
        let at = Utc.with_ymd_and_hms(2021, 3, 1, 13, 59, 30).unwrap();
        let samples = mountain_counters(
            vec![CounterRow {
                location: "x1000c0s0b0n0".to_string(),
                counter: Some(123_456),
                sample_time: at,
            }],
            &nodes(),
        );
        assert_eq!(samples[0].sample_time, at);
        assert_eq!(samples[0].counter, Some(123_456));
    }

    #[test]
    fn test_controllers_deduplicated_in_order() {
        assert_eq!(controller_locations(&nodes()), ["x1000c0s0b0", "x3000c0s19b1"]);
    }

    /// Pool pointing at a port nothing listens on; any statement would fail
    fn unreachable() -> PgConnection {
        let mut config = DatabaseConfig::default();
        config.host = "127.0.0.1".to_string();
        config.port = 1;
        config.acquire_timeout_secs = 1;
        PgConnection::connect_lazy(&config).unwrap()
    }

    fn window(nodes: Vec<NodeLookup>) -> NodeWindow {
        NodeWindow::new(
            TimeBoundRequest::new(
                Utc.with_ymd_and_hms(2021, 3, 1, 13, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 3, 1, 14, 0, 0).unwrap(),
            ),
            nodes,
        )
    }

    fn assert_untouched(conn: &PgConnection) {
        let snap = conn.metrics().snapshot();
        assert_eq!(snap.queries_executed, 0);
        assert_eq!(snap.query_failures, 0);
    }

    #[tokio::test]
    async fn test_empty_node_set_is_no_data_without_querying() {
        let conn = unreachable();
        let empty = window(vec![]);

        assert!(mountain_node_energy(&conn, &empty).await.unwrap_err().is_no_data());
        assert!(mountain_node_energy_stats(&conn, &empty)
            .await
            .unwrap_err()
            .is_no_data());
        assert!(mountain_node_energy_counters(&conn, &empty)
            .await
            .unwrap_err()
            .is_no_data());
        assert!(river_node_energy(&conn, &empty).await.unwrap_err().is_no_data());
        assert!(river_node_energy_stats(&conn, &empty)
            .await
            .unwrap_err()
            .is_no_data());
        assert!(river_node_energy_counters(&conn, &empty)
            .await
            .unwrap_err()
            .is_no_data());

        assert_untouched(&conn);
    }

    #[tokio::test]
    async fn test_river_counters_are_always_no_data() {
        let conn = unreachable();
        let err = river_node_energy_counters(&conn, &window(nodes()))
            .await
            .unwrap_err();
        assert!(err.is_no_data());
        assert_eq!(err.reason(), crate::error::ReasonCode::NoData);
        assert_untouched(&conn);
    }

    #[tokio::test]
    async fn test_statement_failure_is_not_no_data() {
        let conn = unreachable();
        let err = mountain_node_energy(&conn, &window(nodes())).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(conn.metrics().snapshot().query_failures, 1);
    }
}
