use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Where a tracked token came from. Controls which baseline fields are meaningful
/// and whether TTL eviction applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Degen,
    Holder,
    ExHolder,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Degen => "degen",
            Source::Holder => "holder",
            Source::ExHolder => "ex-holder",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "holder" => Source::Holder,
            "ex-holder" => Source::ExHolder,
            _ => Source::Degen,
        }
    }

    pub fn is_holder_like(&self) -> bool {
        matches!(self, Source::Holder | Source::ExHolder)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Leaderboard time-window filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    #[serde(rename = "5m")]
    FiveMin,
    #[serde(rename = "30m")]
    ThirtyMin,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHour,
    #[serde(rename = "all-time")]
    AllTime,
}

impl ViewMode {
    pub fn from_str(s: &str) -> Self {
        match s {
            "5m" => ViewMode::FiveMin,
            "30m" => ViewMode::ThirtyMin,
            "1h" => ViewMode::OneHour,
            "4h" => ViewMode::FourHour,
            _ => ViewMode::AllTime,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::FiveMin => "5m",
            ViewMode::ThirtyMin => "30m",
            ViewMode::OneHour => "1h",
            ViewMode::FourHour => "4h",
            ViewMode::AllTime => "all-time",
        }
    }

    /// Window length in milliseconds, or `None` for all-time (no window filter).
    pub fn window_ms(&self) -> Option<u64> {
        match self {
            ViewMode::FiveMin => Some(5 * 60_000),
            ViewMode::ThirtyMin => Some(30 * 60_000),
            ViewMode::OneHour => Some(60 * 60_000),
            ViewMode::FourHour => Some(4 * 60 * 60_000),
            ViewMode::AllTime => None,
        }
    }
}

/// Degen vs. holder display/tracking mode for the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Degen,
    Holder,
}

impl Mode {
    pub fn from_str(s: &str) -> Self {
        match s {
            "holder" => Mode::Holder,
            _ => Mode::Degen,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Degen => "degen",
            Mode::Holder => "holder",
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction metrics
// ---------------------------------------------------------------------------

/// Transaction metrics for a single rolling window (5m/15m/30m/1h/6h/24h).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxWindowMetrics {
    pub buys: u64,
    pub sells: u64,
    pub buy_usd: f64,
    pub sell_usd: f64,
    pub price_change_pct: f64,
}

/// The full set of windows returned by the batch metrics endpoint. Only the 5m
/// window feeds the scorer; the rest are carried for completeness of the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxMetrics {
    pub m5: TxWindowMetrics,
    pub m15: TxWindowMetrics,
    pub m30: TxWindowMetrics,
    pub h1: TxWindowMetrics,
    pub h6: TxWindowMetrics,
    pub h24: TxWindowMetrics,
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A tracked token. Numeric fields that have never been observed are `None`, not
/// zero — a zero would be indistinguishable from a genuine zero-value observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub chain_short: String,
    pub logo_url: Option<String>,

    pub spotted_at: u64,
    pub spotted_mc: f64,
    pub current_mc: f64,
    pub previous_mc: Option<f64>,
    pub peak_mc: f64,
    pub peak_multiplier: f64,

    pub volume_24h: f64,
    pub previous_volume_24h: Option<f64>,

    pub price_usd: Option<f64>,
    pub total_supply: Option<f64>,

    pub tx_metrics: Option<TxMetrics>,
    pub last_metrics_update: Option<u64>,

    pub mc_10s_ago: Option<f64>,
    pub vol_10s_ago: Option<f64>,
    pub snap_10s_at: Option<u64>,

    pub mc_10m_ago: Option<f64>,
    pub snap_10m_at: Option<u64>,

    pub source: Source,
    pub holder_rank: Option<u32>,
    pub holder_spotted_at: Option<u64>,
    pub holder_spotted_mc: Option<f64>,
    pub holder_peak_mc: Option<f64>,
    pub holder_peak_multiplier: Option<f64>,

    pub last_updated: u64,
    pub last_db_save: Option<u64>,

    pub announced: bool,
    pub needs_data_fetch: bool,
}

impl Token {
    /// Construct a fresh degen-mode token at the moment of discovery.
    pub fn new_degen(
        contract_address: String,
        name: String,
        symbol: String,
        chain_short: String,
        logo_url: Option<String>,
        spotted_mc: f64,
        now_ms: u64,
    ) -> Self {
        Self {
            id: contract_address.clone(),
            contract_address,
            name,
            symbol,
            chain_short,
            logo_url,
            spotted_at: now_ms,
            spotted_mc,
            current_mc: spotted_mc,
            previous_mc: None,
            peak_mc: spotted_mc,
            peak_multiplier: 1.0,
            volume_24h: 0.0,
            previous_volume_24h: None,
            price_usd: None,
            total_supply: None,
            tx_metrics: None,
            last_metrics_update: None,
            mc_10s_ago: Some(spotted_mc),
            vol_10s_ago: Some(0.0),
            snap_10s_at: Some(now_ms),
            mc_10m_ago: None,
            snap_10m_at: None,
            source: Source::Degen,
            holder_rank: None,
            holder_spotted_at: None,
            holder_spotted_mc: None,
            holder_peak_mc: None,
            holder_peak_multiplier: None,
            last_updated: now_ms,
            last_db_save: None,
            announced: false,
            needs_data_fetch: false,
        }
    }

    /// Construct a holder-adopted token with no market data yet available.
    pub fn new_holder_pending(contract_address: String, rank: u32, now_ms: u64) -> Self {
        Self {
            id: contract_address.clone(),
            contract_address,
            name: String::new(),
            symbol: String::new(),
            chain_short: String::new(),
            logo_url: None,
            spotted_at: now_ms,
            spotted_mc: 0.0,
            current_mc: 0.0,
            previous_mc: None,
            peak_mc: 0.0,
            peak_multiplier: 1.0,
            volume_24h: 0.0,
            previous_volume_24h: None,
            price_usd: None,
            total_supply: None,
            tx_metrics: None,
            last_metrics_update: None,
            mc_10s_ago: None,
            vol_10s_ago: None,
            snap_10s_at: None,
            mc_10m_ago: None,
            snap_10m_at: None,
            source: Source::Holder,
            holder_rank: Some(rank),
            holder_spotted_at: Some(now_ms),
            holder_spotted_mc: None,
            holder_peak_mc: None,
            holder_peak_multiplier: None,
            last_updated: now_ms,
            last_db_save: None,
            announced: false,
            needs_data_fetch: true,
        }
    }

    pub fn multiplier(&self) -> f64 {
        if self.spotted_mc > 0.0 {
            self.current_mc / self.spotted_mc
        } else {
            1.0
        }
    }

    pub fn holder_multiplier(&self) -> f64 {
        match self.holder_spotted_mc {
            Some(base) if base > 0.0 => self.current_mc / base,
            _ => 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SSE / provider DTOs
// ---------------------------------------------------------------------------

/// A decoded SSE price frame, as fanned out by the SSE connection manager.
#[derive(Debug, Clone)]
pub struct PriceFrame {
    pub address: String,
    pub price: f64,
    pub price_timestamp_ms: u64,
}

/// Raw wire shape of an SSE `data:` line: `{a,c,p,t,t_p}`.
#[derive(Debug, Deserialize)]
pub struct RawSseFrame {
    pub a: String,
    #[allow(dead_code)]
    pub c: Option<String>,
    pub p: f64,
    #[allow(dead_code)]
    pub t: Option<u64>,
    pub t_p: Option<u64>,
}

/// A single listings-feed entry prior to enrichment.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingEntry {
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub chain: String,
    pub logo_url: Option<String>,
}

/// Result of one batch-metrics fetch for a single address.
#[derive(Debug, Clone)]
pub struct BatchMetricsResult {
    pub price_usd: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub total_supply: f64,
    pub tx_metrics: TxMetrics,
    pub name: String,
    pub symbol: String,
    pub logo_url: Option<String>,
}

/// Emitted when a degen token's `peak_multiplier` crosses tier3 for the first time.
#[derive(Debug, Clone)]
pub struct TierCrossingEvent {
    pub contract_address: String,
    pub name: String,
    pub peak_multiplier: f64,
}

/// Configurable multiplier thresholds for the three alert tiers (§3.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertTiers {
    pub tier1: f64,
    pub tier2: f64,
    pub tier3: f64,
}

/// Reason discovery rejected or failed to initialise a candidate address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    NoPair,
    ZeroMarketCap,
    SanityReject,
}

impl DiscoveryFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryFailure::NoPair => "no_pair",
            DiscoveryFailure::ZeroMarketCap => "zero_mc",
            DiscoveryFailure::SanityReject => "sanity_reject",
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
