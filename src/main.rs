mod api;
mod config;
mod error;
mod resolver;
mod state;
mod types;
mod valuation;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::UpstreamLatency;
use crate::api::routes::{cors_layer, router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::resolver::build_resolver;
use crate::state::VinCache;

/// How often expired decoded-VIN entries are swept (seconds).
const CACHE_PURGE_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal outside local development.
        if !e.not_found() {
            eprintln!(".env error: {e}");
        }
    }

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Upstream VIN decoder ---
    let resolver = build_resolver(&cfg)?;
    info!("Using {} VIN provider", cfg.provider);

    // --- Decoded VIN cache ---
    let cache = VinCache::new(Duration::from_secs(cfg.vin_cache_ttl_secs));
    if cache.is_enabled() {
        info!("VIN cache enabled (ttl={}s)", cfg.vin_cache_ttl_secs);
        let purge_cache = Arc::clone(&cache);
        tokio::spawn(async move { purge_loop(purge_cache).await });
    } else {
        warn!("VIN_CACHE_TTL_SECS=0 — every lookup goes to the upstream provider");
    }

    // --- HTTP API server ---
    let cors = cors_layer(&cfg.cors_allowed_origins);
    if cfg.cors_allowed_origins.is_empty() {
        info!("CORS: any origin allowed");
    } else {
        info!("CORS: allowed origins {}", cfg.cors_allowed_origins.join(", "));
    }

    let api_state = ApiState {
        resolver,
        cache,
        health: Arc::new(HealthState::new()),
        latency: Arc::new(UpstreamLatency::new()),
        current_year: valuation::current_year,
    };
    let app = router(api_state, cors);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Background sweep of expired cache entries.
async fn purge_loop(cache: Arc<VinCache>) {
    let mut interval = tokio::time::interval(Duration::from_secs(CACHE_PURGE_INTERVAL_SECS));
    interval.tick().await; // consume immediate first tick

    loop {
        interval.tick().await;
        let removed = cache.purge_expired();
        if removed > 0 {
            debug!("VIN cache purged {removed} expired entries ({} remain)", cache.len());
        }
    }
}
