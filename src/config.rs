//! Configuration loader for the `aqi-sensorflow` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Keeping it here avoids scattering `env::var`
//! calls throughout the codebase.
//!
use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional environment variable into `$ty`, with a default value.
macro_rules! parse_env {
    ($get:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $get($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string variable, treating empty values as unset.
macro_rules! optional_env {
    ($get:expr, $var_name:expr) => {
        $get($var_name).filter(|v: &String| !v.trim().is_empty())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP server binds on all interfaces.
    pub http_port: u16,

    /// Buffer size of the subscriber broadcast channel.
    pub broadcast_capacity: usize,

    /// Seconds between recovery sweeps; `0` disables the sweep.
    pub sweep_interval_secs: u64,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (unset: in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `HTTP_PORT` – listen port (default: 8080)
/// - `BROADCAST_CAPACITY` – subscriber buffer (default: 1024)
/// - `SWEEP_INTERVAL_SECS` – recovery sweep period (default: 60, 0 = off)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    load_with(|key| env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_with<F>(get: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let db_url = optional_env!(get, "DATABASE_URL");
    let db_pool_max = parse_env!(get, "DB_POOL_MAX", u32, 5);
    let http_port = parse_env!(get, "HTTP_PORT", u16, 8080);
    let broadcast_capacity = parse_env!(get, "BROADCAST_CAPACITY", usize, 1024);
    let sweep_interval_secs = parse_env!(get, "SWEEP_INTERVAL_SECS", u64, 60);

    if broadcast_capacity == 0 {
        return Err(anyhow!("Invalid BROADCAST_CAPACITY: must be greater than 0"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        http_port,
        broadcast_capacity,
        sweep_interval_secs,
    })
}

/// Replace the password component of a connection URL with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // Only a password if the colon comes after the scheme separator
            if db_url[..colon_pos].contains("//") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all other values.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "<unset, using in-memory store>".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL        : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        tracing::info!("  HTTP_PORT           : {}", self.http_port);
        tracing::info!("  BROADCAST_CAPACITY  : {}", self.broadcast_capacity);
        tracing::info!("  SWEEP_INTERVAL_SECS : {}", self.sweep_interval_secs);
    }
}
