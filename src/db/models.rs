use serde::Serialize;

/// Database row types for the `tokens`, `price_history`, `alert_tiers` and
/// `blacklist` tables (schema columns per the token/blacklist data model).
/// Used by `sqlx::query_as` for typed reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRow {
    pub id: String,
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub chain_short: String,
    pub logo_url: Option<String>,

    pub spotted_at: i64,
    pub spotted_mc: f64,
    pub current_mc: f64,
    pub previous_mc: Option<f64>,
    pub peak_mc: f64,
    pub peak_multiplier: f64,

    pub volume_24h: f64,
    pub previous_volume_24h: Option<f64>,

    pub price_usd: Option<f64>,
    pub total_supply: Option<f64>,

    pub tx_metrics_json: Option<String>,
    pub last_metrics_update: Option<i64>,

    pub mc_10s_ago: Option<f64>,
    pub vol_10s_ago: Option<f64>,
    pub snap_10s_at: Option<i64>,
    pub mc_10m_ago: Option<f64>,
    pub snap_10m_at: Option<i64>,

    pub source: String,
    pub holder_rank: Option<i64>,
    pub holder_spotted_at: Option<i64>,
    pub holder_spotted_mc: Option<f64>,
    pub holder_peak_mc: Option<f64>,
    pub holder_peak_multiplier: Option<f64>,

    pub last_updated: i64,
    pub last_db_save: Option<i64>,

    pub announced: i64,
    pub needs_data_fetch: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlacklistRow {
    pub contract_address: String,
    pub name: String,
    pub blacklisted_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertTierRow {
    pub tier1: f64,
    pub tier2: f64,
    pub tier3: f64,
    pub updated_at: i64,
}
