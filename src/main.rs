mod api;
mod config;
mod db;
mod error;
mod manager;
mod providers;
mod ratelimit;
mod scorer;
mod sse_manager;
mod state;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::router;
use crate::config::Config;
use crate::db::PersistentStore;
use crate::error::Result;
use crate::manager::Manager;
use crate::providers::{HttpProviders, ListingsClient, MetricsClient, SseClient};
use crate::ratelimit::RateLimiter;
use crate::sse_manager::SseManager;
use crate::state::TokenStore;
use crate::types::AlertTiers;

#[tokio::main]
async fn main() {
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
    let default_tiers = AlertTiers {
        tier1: cfg.default_tier1,
        tier2: cfg.default_tier2,
        tier3: cfg.default_tier3,
    };

    // --- Persistent store: embedded SQLite by default, fatal if it can't open ---
    if cfg.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but this build only wires the embedded SQLite backend; ignoring it");
    }
    let persistent = Arc::new(PersistentStore::connect(cfg.db_path.clone()).await?);
    persistent.ensure_alert_tiers(default_tiers).await?;
    info!("persistent store ready at {}", cfg.db_path);

    // --- Providers: listings + metrics (rate-limited REST), SSE (streaming) ---
    let listings_limiter = Arc::new(RateLimiter::new(cfg.listings_rate_capacity, cfg.listings_rate_refill_per_sec));
    let metrics_limiter = Arc::new(RateLimiter::new(cfg.metrics_rate_capacity, cfg.metrics_rate_refill_per_sec));

    let providers: Arc<dyn crate::providers::Providers> = Arc::new(HttpProviders {
        listings: ListingsClient::new(cfg.listings_api_url.clone(), cfg.target_chain.clone(), listings_limiter),
        metrics: MetricsClient::new(cfg.metrics_api_url.clone(), crate::config::BATCH_FAN_OUT, metrics_limiter),
        sse: SseClient::new(cfg.sse_base_url.clone()),
    });

    // --- In-memory token map, SSE connection manager ---
    let store = TokenStore::new();
    let sse = SseManager::new(Arc::clone(&providers), cfg.sse_max_connections, cfg.sse_connect_stagger_ms);

    // --- Load every persisted token; the eviction loop prunes stale degen
    // entries on its first pass. Holder tokens are exempt from TTL (§3.1) and
    // would be silently dropped forever by a cutoff-filtered restore. ---
    match persistent.get_tokens_since(0).await {
        Ok(tokens) => {
            info!(count = tokens.len(), "restored tokens from persistent store");
            for token in tokens {
                store.upsert(token);
            }
        }
        Err(e) => error!("failed to restore tokens on startup: {e}"),
    }

    let alert_tiers = persistent.get_alert_tiers(default_tiers).await;

    // --- Token Manager orchestrator: owns every loop ---
    let manager = Manager::new(store, Arc::clone(&persistent), providers, sse, cfg.clone(), alert_tiers);
    manager.spawn_loops();

    // --- HTTP API server ---
    let app = router(Arc::clone(&manager));
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let shutdown_manager = Arc::clone(&manager);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, draining loops");
            shutdown_manager.shutdown().await;
        })
        .await?;

    Ok(())
}
