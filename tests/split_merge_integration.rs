//! Integration tests for node classification and per-class merging
//!
//! A scripted location probe stands in for the store, and the class
//! executors are closures, so the whole classify -> query -> merge path
//! runs without a database.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pmdb_telemetry::engine::QueryContext;
use pmdb_telemetry::merge::{aggregate_errors, resolve_split};
use pmdb_telemetry::postgres::{classify, run_split, LocationProbe};
use pmdb_telemetry::types::{
    NodeEnergy, NodeEnergyLevel, NodeEnergyStats, NodeLookup, NodeWindow, TimeBoundRequest,
};
use pmdb_telemetry::{Error, ReasonCode, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Probe answering from fixed location lists
struct FixedProbe {
    mountain: Vec<&'static str>,
    river: Vec<&'static str>,
}

#[async_trait]
impl LocationProbe for FixedProbe {
    async fn mountain_locations(
        &self,
        _window: &TimeBoundRequest,
        xnames: &[String],
    ) -> Result<Vec<String>> {
        Ok(xnames
            .iter()
            .filter(|x| self.mountain.contains(&x.as_str()))
            .cloned()
            .collect())
    }

    async fn river_locations(
        &self,
        _window: &TimeBoundRequest,
        controllers: &[String],
    ) -> Result<Vec<String>> {
        Ok(controllers
            .iter()
            .filter(|c| self.river.contains(&c.as_str()))
            .cloned()
            .collect())
    }
}

fn window() -> TimeBoundRequest {
    TimeBoundRequest::new(
        Utc.with_ymd_and_hms(2021, 3, 1, 13, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 3, 1, 14, 0, 0).unwrap(),
    )
}

fn request(xnames: &[&str]) -> NodeWindow {
    NodeWindow::new(
        window(),
        xnames
            .iter()
            .enumerate()
            .map(|(i, x)| NodeLookup::new(*x, i as i64))
            .collect(),
    )
}

/// Per-node energy from a lookup table; nodes missing from it have no rows
fn energy_from(req: &NodeWindow, table: &HashMap<&str, i64>) -> Result<NodeEnergy> {
    let levels = req
        .nodes
        .iter()
        .filter_map(|n| {
            table
                .get(n.xname.as_str())
                .map(|e| NodeEnergyLevel::new(n.clone(), *e))
        })
        .collect();
    NodeEnergy::from_levels(levels, req.window.duration()).ok_or(Error::no_data(req.window))
}

fn stats_from(req: &NodeWindow, table: &HashMap<&str, i64>) -> Result<NodeEnergyStats> {
    let energy = energy_from(req, table)?;
    NodeEnergyStats::from_levels(&energy.levels, energy.duration).ok_or(Error::no_data(req.window))
}

fn db_failure() -> Error {
    Error::Database(sqlx::Error::PoolTimedOut)
}

// ============================================================================
// Classify and Merge
// ============================================================================

#[tokio::test]
async fn test_mixed_request_merges_both_classes() {
    let probe = FixedProbe {
        mountain: vec!["x1000c0s0b0n0", "x1000c0s0b0n1"],
        river: vec!["x3000c0s19b1"],
    };
    let req = request(&[
        "x1000c0s0b0n0",
        "x1000c0s0b0n1",
        "x3000c0s19b1n0",
        "x9999c0s0b0n0",
    ]);
    let table: HashMap<_, _> = [
        ("x1000c0s0b0n0", 100),
        ("x1000c0s0b0n1", 300),
        ("x3000c0s19b1n0", 1000),
    ]
    .into_iter()
    .collect();

    let ctx = QueryContext::new();
    let split = classify(&probe, &ctx, &req).await.unwrap();
    assert_eq!(split.len(), 4);
    assert_eq!(split.unknown.len(), 1);

    let stats = run_split(
        &ctx,
        "node energy stats",
        &req,
        split,
        |r| {
            let table = table.clone();
            async move { stats_from(&r, &table) }
        },
        |r| {
            let table = table.clone();
            async move { stats_from(&r, &table) }
        },
    )
    .await
    .unwrap();

    assert_eq!(stats.total, 1400);
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.max.node.xname, "x3000c0s19b1n0");
    assert_eq!(stats.min.node.xname, "x1000c0s0b0n0");
    assert!(stats.max.energy >= stats.min.energy);
    // (200 * 2 + 1000 * 1) / 3
    assert!((stats.avg - 1400.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_nodes_only_is_no_data() {
    let probe = FixedProbe {
        mountain: vec![],
        river: vec![],
    };
    let req = request(&["x9999c0s0b0n0"]);
    let ctx = QueryContext::new();
    let split = classify(&probe, &ctx, &req).await.unwrap();

    let err = run_split(
        &ctx,
        "node energy",
        &req,
        split,
        |_| async { Err::<NodeEnergy, _>(db_failure()) },
        |_| async { Err::<NodeEnergy, _>(db_failure()) },
    )
    .await
    .unwrap_err();
    assert!(err.is_no_data());
    assert_eq!(err.reason(), ReasonCode::NoData);
}

#[tokio::test]
async fn test_class_without_rows_is_suppressed() {
    let probe = FixedProbe {
        mountain: vec!["x1000c0s0b0n0"],
        river: vec!["x3000c0s19b1"],
    };
    let req = request(&["x1000c0s0b0n0", "x3000c0s19b1n0"]);
    // River controller was seen but the energy query finds nothing
    let table: HashMap<_, _> = [("x1000c0s0b0n0", 100)].into_iter().collect();

    let ctx = QueryContext::new();
    let split = classify(&probe, &ctx, &req).await.unwrap();
    let energy = run_split(
        &ctx,
        "node energy",
        &req,
        split,
        |r| {
            let table = table.clone();
            async move { energy_from(&r, &table) }
        },
        |r| {
            let table = table.clone();
            async move { energy_from(&r, &table) }
        },
    )
    .await
    .unwrap();
    assert_eq!(energy.node_count, 1);
    assert_eq!(energy.levels[0].node.xname, "x1000c0s0b0n0");
}

#[tokio::test(start_paused = true)]
async fn test_shared_deadline_covers_both_classes() {
    let probe = FixedProbe {
        mountain: vec!["x1000c0s0b0n0"],
        river: vec!["x3000c0s19b1"],
    };
    let req = request(&["x1000c0s0b0n0", "x3000c0s19b1n0"]);
    let ctx = QueryContext::new().with_timeout(Duration::from_secs(1));
    let split = classify(&probe, &ctx, &req).await.unwrap();

    let err = run_split(
        &ctx,
        "node energy",
        &req,
        split,
        |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err::<NodeEnergy, _>(db_failure())
        },
        |_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err::<NodeEnergy, _>(db_failure())
        },
    )
    .await
    .unwrap_err();

    match err {
        Error::Combined { mountain, river } => {
            assert!(matches!(*mountain, Error::Timeout(_)));
            assert!(matches!(*river, Error::Timeout(_)));
        },
        other => panic!("expected combined error, got {:?}", other),
    }
}

// ============================================================================
// Error Aggregation
// ============================================================================

#[test]
fn test_failure_is_never_dropped() {
    let err = resolve_split::<NodeEnergy>(
        window(),
        Err(db_failure()),
        Err(Error::no_data(window())),
    )
    .unwrap_err();

    assert!(!err.is_no_data());
    let message = err.to_string();
    assert!(message.starts_with("TSDB errors- Mountain query: Database error:"));
    assert!(message.contains("River query: Error: No data in the time window"));
}

#[test]
fn test_single_failure_reported_as_is() {
    let ok = NodeEnergy::from_levels(
        vec![NodeEnergyLevel::new(NodeLookup::new("x1000c0s0b0n0", 0), 5)],
        Duration::from_secs(3600),
    )
    .unwrap();

    let err = resolve_split(window(), Ok(ok), Err(db_failure())).unwrap_err();
    assert!(matches!(err, Error::Database(_)));
}

#[test]
fn test_both_no_data_keeps_no_data() {
    let err = aggregate_errors(Some(Error::no_data(window())), Some(Error::no_data(window())))
        .unwrap();
    assert!(err.is_no_data());
    assert!(aggregate_errors(None, None).is_none());
    assert!(aggregate_errors(Some(Error::no_data(window())), None).is_none());
}
