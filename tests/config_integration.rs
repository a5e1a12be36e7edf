//! Integration tests for configuration files and backend selection

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pmdb_telemetry::config::{BackendKind, Config};
use pmdb_telemetry::engine::{HealthStatus, QueryContext};
use pmdb_telemetry::window::FixedClock;
use pmdb_telemetry::{BackendSelector, DataImplementation, TelemetryService};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write config");
    file
}

// ============================================================================
// Config Files
// ============================================================================

#[test]
fn test_partial_file_fills_defaults() {
    let file = write_config(
        r#"
[backend]
implementation = "dummy"

[database]
host = "pmdb.example"
password = "hunter2"

[query]
timeout_secs = 0
"#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.backend.implementation, BackendKind::Stub);
    assert_eq!(config.database.host, "pmdb.example");
    assert_eq!(config.database.port, 5432);
    assert_eq!(config.database.database, "pmdb");
    assert_eq!(config.database.password.expose_secret(), "hunter2");
    assert_eq!(config.query.timeout(), None);
    assert_eq!(config.query.hysteresis_secs, -15);
    assert!(config.validate().is_ok());

    // The password never shows up in debug output or the display target
    assert!(!format!("{:?}", config).contains("hunter2"));
    assert!(!config.database.display_target().contains("hunter2"));
}

#[test]
fn test_malformed_file_is_reported() {
    let file = write_config("[database\nhost = ");
    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.contains("Failed to parse config file"));

    let err = Config::from_file("/nonexistent/pmdb.toml").unwrap_err();
    assert!(err.contains("Failed to read config file"));
}

#[test]
fn test_saved_file_loads_back() {
    let mut config = Config::default();
    config.database.host = "db0".to_string();
    config.query.max_window_len_secs = 600;

    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    config.save_to_file(path).unwrap();

    let loaded = Config::from_file(path).unwrap();
    assert_eq!(loaded.database.host, "db0");
    assert_eq!(loaded.query.max_window_len_secs, 600);
    assert_eq!(loaded.backend.implementation, BackendKind::Postgres);
}

#[tokio::test]
async fn test_query_settings_reach_the_service() {
    let file = write_config(
        r#"
[backend]
implementation = "stub"

[query]
max_window_len_secs = 60
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    let selector = BackendSelector::new(config.clone());
    let backend = selector
        .configure(DataImplementation::from(config.backend.implementation))
        .await
        .unwrap();
    let service = TelemetryService::from_config(backend, &config)
        .unwrap()
        .with_clock(Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2021, 3, 1, 15, 0, 0).unwrap(),
        )));

    assert_eq!(service.implementation_name(), "DUMMY");
    assert!(service
        .system_power(&QueryContext::new(), None, Some(60))
        .await
        .is_ok());
    let err = service
        .system_power(&QueryContext::new(), None, Some(61))
        .await
        .unwrap_err();
    assert_eq!(err.reason().as_str(), "WINDOW_LEN_OUT_OF_RANGE");
}

#[tokio::test]
async fn test_out_of_range_query_settings_are_rejected() {
    let file = write_config(
        r#"
[backend]
implementation = "stub"

[query]
hysteresis_secs = 9223372036854775807
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert!(config.validate().is_err());

    let backend = BackendSelector::new(config.clone())
        .configure(DataImplementation::Stub)
        .await
        .unwrap();
    let err = TelemetryService::from_config(backend, &config).unwrap_err();
    assert_eq!(err.reason().as_str(), "INVALID_ARGUMENTS");
}

#[tokio::test]
async fn test_huge_timeout_does_not_break_queries() {
    let mut config = Config::default();
    config.backend.implementation = BackendKind::Stub;
    config.query.timeout_secs = u64::MAX;
    assert!(config.validate().is_err());

    let backend = BackendSelector::new(config.clone())
        .configure(DataImplementation::Stub)
        .await
        .unwrap();
    let service = TelemetryService::from_config(backend, &config).unwrap();
    let report = service
        .system_power(&QueryContext::new(), None, Some(60))
        .await
        .unwrap();
    assert_eq!(report.data.avg, Some(50));
}

// ============================================================================
// Backend Selection
// ============================================================================

#[tokio::test]
async fn test_unreachable_store_still_returns_handle() {
    let mut config = Config::default();
    config.database.host = "127.0.0.1".to_string();
    config.database.port = 1;
    config.database.acquire_timeout_secs = 1;

    let selector = BackendSelector::new(config);
    let backend = tokio::time::timeout(
        Duration::from_secs(30),
        selector.configure(DataImplementation::Postgres),
    )
    .await
    .expect("configure should not hang")
    .unwrap();

    assert_eq!(backend.implementation_name(), "Postgres");
    assert!(!selector.is_configured().await);
    assert!(selector.current().await.is_some());
    assert!(backend.ping().await.is_err());

    let report = backend.health_check().await;
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.error.is_some());
    assert_eq!(report.target.as_deref(), Some("postgres://pmdbuser@127.0.0.1:1/pmdb"));
    let metrics = report.metrics.as_ref().expect("store reports pool counters");
    assert!(metrics.ping_failures >= 2);
    assert_eq!(metrics.queries_executed, 0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "unhealthy");
}
