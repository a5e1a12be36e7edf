//! PMDB telemetry query tool
//!
//! Runs a single power or energy query against the configured backend and
//! prints the result as JSON.
//!
//! # CLI Commands
//!
//! - `system-power` - Minimum, maximum and mean system power
//! - `system-power-details` - System power per cabinet
//! - `node-energy` - Energy per node
//! - `node-energy-stats` - Energy statistics across nodes
//! - `node-energy-counter` - Latest energy counter per node
//! - `ping` - Check the backend and print its health and pool counters
//! - `check-config` - Validate configuration and print a summary
//!
//! # Configuration
//!
//! 1. `--config` or the `PMDB_CONFIG` environment variable (path to TOML file)
//! 2. `./pmdb.toml` in the current directory
//! 3. Default configuration
//!
//! followed by `DATA_IMPLEMENTATION`, `DB_*` and `RUST_LOG` overrides.

mod config;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use pmdb_telemetry::{
    engine::{BackendSelector, DataImplementation, HealthStatus, QueryContext},
    service::TelemetryService,
    types::{NodeLookup, TimeBoundNodeRequest},
    Error,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "pmdb-query")]
#[command(version)]
#[command(about = "Power and energy telemetry queries for mountain and river hardware", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "PMDB_CONFIG")]
    config: Option<PathBuf>,

    /// Backend override (stub, dummy, postgres)
    #[arg(short, long, global = true)]
    backend: Option<String>,
}

#[derive(Args)]
struct SystemWindowArgs {
    /// Window start (RFC 3339); the window ends now when omitted
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Window length in seconds
    #[arg(long)]
    window_len: Option<i64>,
}

#[derive(Args)]
struct NodeWindowArgs {
    /// Window start (RFC 3339)
    #[arg(long)]
    start: DateTime<Utc>,

    /// Window end (RFC 3339)
    #[arg(long)]
    end: DateTime<Utc>,

    /// Nodes as `xname` or `xname=nid`, repeatable
    #[arg(long = "node", required = true, value_parser = parse_node)]
    nodes: Vec<NodeLookup>,
}

#[derive(Subcommand)]
enum Commands {
    /// Minimum, maximum and mean system power
    SystemPower(SystemWindowArgs),

    /// System power per cabinet
    SystemPowerDetails(SystemWindowArgs),

    /// Energy per node
    NodeEnergy(NodeWindowArgs),

    /// Energy statistics across nodes
    NodeEnergyStats(NodeWindowArgs),

    /// Latest energy counter per node
    NodeEnergyCounter(NodeWindowArgs),

    /// Check the backend and print its health and pool counters
    Ping,

    /// Validate configuration and print a summary
    CheckConfig,
}

/// Parse `xname` or `xname=nid`
fn parse_node(s: &str) -> Result<NodeLookup, String> {
    match s.split_once('=') {
        Some((xname, nid)) => {
            let nid = nid
                .parse()
                .map_err(|e| format!("invalid nid in {:?}: {}", s, e))?;
            Ok(NodeLookup::new(xname, nid))
        },
        None => Ok(NodeLookup::new(s, -1)),
    }
}

impl NodeWindowArgs {
    fn request(&self) -> TimeBoundNodeRequest {
        TimeBoundNodeRequest::new(self.start, self.end, self.nodes.clone())
    }
}

/// JSON body printed when a query fails
#[derive(Serialize)]
struct ErrorReport {
    e: u16,
    err_msg: String,
    reason: &'static str,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_check_config(config: &pmdb_telemetry::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    println!("Configuration is valid!");
    println!();
    println!("Backend: {}", config.backend.implementation);
    println!();
    println!("Database Settings:");
    println!("  Target: {}", config.database.display_target());
    println!("  Max open connections: {}", config.database.max_open_connections);
    println!(
        "  Max connection lifetime: {}s",
        config.database.max_connection_lifetime_secs
    );
    println!();
    println!("Query Settings:");
    println!("  Hysteresis: {}s", config.query.hysteresis_secs);
    println!("  Minimum window: {}s", config.query.min_window_secs);
    println!(
        "  window_len range: {}..={}s",
        config.query.min_window_len_secs, config.query.max_window_len_secs
    );
    println!("  Log level: {}", config.logging.level);

    Ok(())
}

async fn run(service: &TelemetryService, command: &Commands) -> Result<(), Error> {
    let ctx = QueryContext::new();
    let printed = match command {
        Commands::SystemPower(args) => print_json(
            &service
                .system_power(&ctx, args.start, args.window_len)
                .await?,
        ),
        Commands::SystemPowerDetails(args) => print_json(
            &service
                .system_power_by_cabinet(&ctx, args.start, args.window_len)
                .await?,
        ),
        Commands::NodeEnergy(args) => {
            print_json(&service.node_energy(&ctx, &args.request()).await?)
        },
        Commands::NodeEnergyStats(args) => {
            print_json(&service.node_energy_stats(&ctx, &args.request()).await?)
        },
        Commands::NodeEnergyCounter(args) => {
            print_json(&service.node_energy_counters(&ctx, &args.request()).await?)
        },
        Commands::Ping | Commands::CheckConfig => Ok(()),
    };
    printed.map_err(|e| Error::Configuration(format!("Failed to print result: {}", e)))
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(backend) = &cli.backend {
        config.backend.implementation = backend.parse()?;
    }

    if let Commands::CheckConfig = cli.command {
        return cmd_check_config(&config);
    }
    config.validate()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("pmdb-query v{}", env!("CARGO_PKG_VERSION"));
    debug!(?config, "Configuration loaded");

    let selector = BackendSelector::new(config.clone());
    let backend = selector
        .configure(DataImplementation::from(config.backend.implementation))
        .await?;
    let service = TelemetryService::from_config(backend, &config)?;

    if let Commands::Ping = cli.command {
        let report = service.health_check().await;
        print_json(&report)?;
        if report.status == HealthStatus::Unhealthy {
            std::process::exit(1);
        }
        return Ok(());
    }

    if let Err(e) = run(&service, &cli.command).await {
        let report = ErrorReport {
            e: e.status_code(),
            err_msg: e.to_string(),
            reason: e.reason().as_str(),
        };
        print_json(&report)?;
        std::process::exit(1);
    }

    Ok(())
}
