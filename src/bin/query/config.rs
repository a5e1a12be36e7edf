//! Configuration loading for the query binary

use pmdb_telemetry::config::Config;
use std::path::Path;

/// Default configuration file in the working directory
const DEFAULT_CONFIG_FILE: &str = "pmdb.toml";

/// Load configuration
///
/// Looks in order at:
/// 1. `path` (from `--config` or `PMDB_CONFIG`)
/// 2. `./pmdb.toml`
/// 3. Built-in defaults
///
/// Environment overrides are applied in every case.
pub fn load_config(path: Option<&Path>) -> Result<Config, String> {
    if let Some(path) = path {
        let path = path.to_string_lossy();
        let config = Config::from_file_with_env(&path)?;
        eprintln!("[config] Loaded configuration from: {}", path);
        return Ok(config);
    }

    if Path::new(DEFAULT_CONFIG_FILE).exists() {
        match Config::from_file_with_env(DEFAULT_CONFIG_FILE) {
            Ok(config) => {
                eprintln!("[config] Loaded configuration from {}", DEFAULT_CONFIG_FILE);
                return Ok(config);
            },
            Err(e) => {
                eprintln!("[config] {}. Using defaults.", e);
            },
        }
    }

    Ok(Config::from_env())
}
