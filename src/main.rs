//! Application entry point for the `aqi-sensorflow` service.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Selecting the store: PostgreSQL when `DATABASE_URL` is set (schema is
//!   created if missing), otherwise the in-memory store
//! - Starting the recovery sweep
//! - Mounting all API routes via the `routes` gateway and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (optional) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `HTTP_PORT` (optional) – listen port (default: 8080)
//! - `AQI_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AQI_SPAN_EVENTS` (optional) – `full` to log span enter/exit
use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use aqi_sensorflow::{
    config, routes, schema, sweep, IngestionPipeline, MemoryStore, Notifier, PgStore, Store,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store: Arc<dyn Store> = match &cfg.db_url {
        Some(db_url) => {
            tracing::info!("Attempting to connect to database");

            let pool = PgPoolOptions::new()
                .max_connections(cfg.db_pool_max)
                .connect(db_url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

            tracing::info!("Successfully connected to database");
            schema::create_schema(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier = Arc::new(Notifier::new(cfg.broadcast_capacity));
    let pipeline = Arc::new(IngestionPipeline::new(store, notifier));

    if cfg.sweep_interval_secs > 0 {
        tokio::spawn(sweep::run(
            pipeline.clone(),
            Duration::from_secs(cfg.sweep_interval_secs),
        ));
    }

    let app: Router = routes::router(pipeline);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the global `tracing` subscriber.
///
/// Level comes from `RUST_LOG`, else `AQI_LOG_LEVEL` (default `debug`, with
/// `sqlx` statement logging held at `warn`). `FORCE_COLOR` overrides TTY
/// colour detection and `AQI_SPAN_EVENTS=full` adds span enter/exit timing.
fn init_tracing() {
    // ---
    let span_events = match env::var("AQI_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1" | "true" | "yes") => true,
        Ok("0" | "false" | "no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = env::var("AQI_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        EnvFilter::try_new(format!("{level},sqlx::query=warn"))
            .unwrap_or_else(|_| EnvFilter::new("debug,sqlx::query=warn"))
    });

    tracing_subscriber::fmt()
        .with_target(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
