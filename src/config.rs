use crate::error::{AppError, Result};

pub const DEFAULT_LISTINGS_API_URL: &str = "https://api.dexprovider.example/listings";
pub const DEFAULT_METRICS_API_URL: &str = "https://api.dexprovider.example/metrics";
pub const DEFAULT_SSE_BASE_URL: &str = "https://stream.dexprovider.example/sse";

/// Channel capacity for internal message routing.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Discovery loop cadence.
pub const DISCOVERY_INTERVAL_SECS: u64 = 1;

/// SSE-leader reconciliation cadence.
pub const SSE_RECONCILE_INTERVAL_SECS: u64 = 5;

/// Background REST refresh cadence.
pub const BACKGROUND_INTERVAL_SECS: u64 = 15;

/// Freshness gate for `tx_metrics` (5m window), seconds.
pub const METRICS_FRESHNESS_SECS: u64 = 30;

/// Per-token DB write debounce, seconds.
pub const DB_WRITE_DEBOUNCE_SECS: u64 = 5;

/// Non-holder token TTL, seconds.
pub const TOKEN_TTL_SECS: u64 = 2 * 60 * 60;

/// Discovery failed-address retry cool-off, seconds.
pub const DISCOVERY_RETRY_COOLOFF_SECS: u64 = 5 * 60;

/// Batch metrics fan-out: max addresses per logical batch.
pub const BATCH_MAX_ADDRESSES: usize = 30;

/// Batch metrics parallelism within a batch.
pub const BATCH_FAN_OUT: usize = 10;

/// Rolling momentum buffer length (number of snapshots kept per token).
pub const MOMENTUM_BUFFER_LEN: usize = 12;

/// Sanity-reject multiplier: `volume_24h > SANITY_VOLUME_MC_RATIO * market_cap` is garbage.
pub const SANITY_VOLUME_MC_RATIO: f64 = 1000.0;

/// Scoring weight table, keyed by view mode. `(buy, net, txns, price, sse)`.
pub mod weights {
    pub const FIVE_MIN: (f64, f64, f64, f64, f64) = (0.25, 0.15, 0.15, 0.25, 0.20);
    pub const THIRTY_MIN: (f64, f64, f64, f64, f64) = (0.30, 0.20, 0.15, 0.20, 0.15);
    pub const ONE_HOUR: (f64, f64, f64, f64, f64) = (0.35, 0.20, 0.15, 0.20, 0.10);
    pub const FOUR_HOUR: (f64, f64, f64, f64, f64) = (0.40, 0.25, 0.15, 0.15, 0.05);
    pub const ALL_TIME: (f64, f64, f64, f64, f64) = (0.45, 0.30, 0.10, 0.10, 0.05);
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listings_api_url: String,
    pub metrics_api_url: String,
    pub sse_base_url: String,
    pub target_chain: String,
    pub log_level: String,
    pub database_url: Option<String>,
    pub db_path: String,
    pub api_port: u16,
    pub alert_webhook_key: Option<String>,

    /// Max concurrent SSE connections (`K`).
    pub sse_max_connections: usize,
    /// Inter-connect stagger between newly queued SSE connections, milliseconds.
    pub sse_connect_stagger_ms: u64,

    /// Token-bucket capacity (burst size) for the listings provider.
    pub listings_rate_capacity: f64,
    /// Token-bucket refill rate (tokens/sec) for the listings provider.
    pub listings_rate_refill_per_sec: f64,
    /// Token-bucket capacity (burst size) for the metrics provider.
    pub metrics_rate_capacity: f64,
    /// Token-bucket refill rate (tokens/sec) for the metrics provider.
    pub metrics_rate_refill_per_sec: f64,

    /// Default alert-tier thresholds, used only if the store has no persisted row yet.
    pub default_tier1: f64,
    pub default_tier2: f64,
    pub default_tier3: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            listings_api_url: std::env::var("LISTINGS_API_URL")
                .unwrap_or_else(|_| DEFAULT_LISTINGS_API_URL.to_string()),
            metrics_api_url: std::env::var("METRICS_API_URL")
                .unwrap_or_else(|_| DEFAULT_METRICS_API_URL.to_string()),
            sse_base_url: std::env::var("SSE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SSE_BASE_URL.to_string()),
            target_chain: std::env::var("TARGET_CHAIN").unwrap_or_else(|_| "solana".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "discovery.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            alert_webhook_key: std::env::var("ALERT_WEBHOOK_KEY").ok(),

            sse_max_connections: std::env::var("SSE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<usize>()
                .unwrap_or(10),
            sse_connect_stagger_ms: std::env::var("SSE_CONNECT_STAGGER_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse::<u64>()
                .unwrap_or(500),

            listings_rate_capacity: std::env::var("LISTINGS_RATE_CAPACITY")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<f64>()
                .unwrap_or(5.0),
            listings_rate_refill_per_sec: std::env::var("LISTINGS_RATE_REFILL_PER_SEC")
                .unwrap_or_else(|_| "1".to_string())
                .parse::<f64>()
                .unwrap_or(1.0),
            metrics_rate_capacity: std::env::var("METRICS_RATE_CAPACITY")
                .unwrap_or_else(|_| "20".to_string())
                .parse::<f64>()
                .unwrap_or(20.0),
            metrics_rate_refill_per_sec: std::env::var("METRICS_RATE_REFILL_PER_SEC")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<f64>()
                .unwrap_or(10.0),

            default_tier1: std::env::var("ALERT_TIER1")
                .unwrap_or_else(|_| "1.1".to_string())
                .parse::<f64>()
                .unwrap_or(1.1),
            default_tier2: std::env::var("ALERT_TIER2")
                .unwrap_or_else(|_| "1.2".to_string())
                .parse::<f64>()
                .unwrap_or(1.2),
            default_tier3: std::env::var("ALERT_TIER3")
                .unwrap_or_else(|_| "1.3".to_string())
                .parse::<f64>()
                .unwrap_or(1.3),
        })
    }
}
