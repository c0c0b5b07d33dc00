use tokio::sync::RwLock;
use tracing::{error, info};

use crate::db::models::{AlertTierRow, BlacklistRow, TokenRow};
use crate::error::Result;
use crate::types::{AlertTiers, Source, Token, TxMetrics};

/// The durable half of the token store: a single SQLite file holding
/// `tokens`, `price_history`, `alert_tiers` and `blacklist`. Persistence
/// errors are logged and never propagated to the caller's hot path — the
/// in-memory `TokenStore` remains authoritative for the process lifetime.
pub struct PersistentStore {
    pool: RwLock<sqlx::SqlitePool>,
    db_path: String,
}

impl PersistentStore {
    pub async fn connect(db_path: String) -> Result<Self> {
        let pool = open_pool(&db_path).await?;
        init_schema(&pool).await?;
        Ok(Self { pool: RwLock::new(pool), db_path })
    }

    pub async fn ensure_alert_tiers(&self, defaults: AlertTiers) -> Result<()> {
        let pool = self.pool.read().await;
        let existing: Option<AlertTierRow> = sqlx::query_as(
            "SELECT tier1, tier2, tier3, updated_at FROM alert_tiers ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&*pool)
        .await?;
        if existing.is_none() {
            sqlx::query(
                "INSERT INTO alert_tiers (tier1, tier2, tier3, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(defaults.tier1)
            .bind(defaults.tier2)
            .bind(defaults.tier3)
            .bind(now_ms() as i64)
            .execute(&*pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_alert_tiers(&self, defaults: AlertTiers) -> AlertTiers {
        let pool = self.pool.read().await;
        let row: Option<AlertTierRow> = match sqlx::query_as(
            "SELECT tier1, tier2, tier3, updated_at FROM alert_tiers ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&*pool)
        .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("failed to load alert tiers, using defaults: {e}");
                None
            }
        };
        row.map(|r| AlertTiers { tier1: r.tier1, tier2: r.tier2, tier3: r.tier3 })
            .unwrap_or(defaults)
    }

    pub async fn set_alert_tiers(&self, tiers: AlertTiers) -> Result<()> {
        let pool = self.pool.read().await;
        sqlx::query(
            "INSERT INTO alert_tiers (tier1, tier2, tier3, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(tiers.tier1)
        .bind(tiers.tier2)
        .bind(tiers.tier3)
        .bind(now_ms() as i64)
        .execute(&*pool)
        .await?;
        Ok(())
    }

    /// Replace-by-`contract_address`. Absent optional fields retain their
    /// prior on-disk values (SQLite upsert with `excluded.x` on every
    /// column); undefined numerics bind as `NULL`, never a bare zero.
    pub async fn upsert_token(&self, token: &Token) -> Result<()> {
        let row = to_row(token);
        let pool = self.pool.read().await;
        let result = sqlx::query(
            r#"
            INSERT INTO tokens (
                id, contract_address, name, symbol, chain_short, logo_url,
                spotted_at, spotted_mc, current_mc, previous_mc, peak_mc, peak_multiplier,
                volume_24h, previous_volume_24h, price_usd, total_supply,
                tx_metrics_json, last_metrics_update,
                mc_10s_ago, vol_10s_ago, snap_10s_at, mc_10m_ago, snap_10m_at,
                source, holder_rank, holder_spotted_at, holder_spotted_mc,
                holder_peak_mc, holder_peak_multiplier,
                last_updated, last_db_save, announced, needs_data_fetch
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT(contract_address) DO UPDATE SET
                name = excluded.name,
                symbol = excluded.symbol,
                chain_short = excluded.chain_short,
                logo_url = excluded.logo_url,
                spotted_at = excluded.spotted_at,
                spotted_mc = excluded.spotted_mc,
                current_mc = excluded.current_mc,
                previous_mc = excluded.previous_mc,
                peak_mc = excluded.peak_mc,
                peak_multiplier = excluded.peak_multiplier,
                volume_24h = excluded.volume_24h,
                previous_volume_24h = excluded.previous_volume_24h,
                price_usd = excluded.price_usd,
                total_supply = excluded.total_supply,
                tx_metrics_json = excluded.tx_metrics_json,
                last_metrics_update = excluded.last_metrics_update,
                mc_10s_ago = excluded.mc_10s_ago,
                vol_10s_ago = excluded.vol_10s_ago,
                snap_10s_at = excluded.snap_10s_at,
                mc_10m_ago = excluded.mc_10m_ago,
                snap_10m_at = excluded.snap_10m_at,
                source = excluded.source,
                holder_rank = excluded.holder_rank,
                holder_spotted_at = excluded.holder_spotted_at,
                holder_spotted_mc = excluded.holder_spotted_mc,
                holder_peak_mc = excluded.holder_peak_mc,
                holder_peak_multiplier = excluded.holder_peak_multiplier,
                last_updated = excluded.last_updated,
                last_db_save = excluded.last_db_save,
                announced = excluded.announced,
                needs_data_fetch = excluded.needs_data_fetch
            "#,
        )
        .bind(row.id)
        .bind(row.contract_address)
        .bind(row.name)
        .bind(row.symbol)
        .bind(row.chain_short)
        .bind(row.logo_url)
        .bind(row.spotted_at)
        .bind(row.spotted_mc)
        .bind(row.current_mc)
        .bind(row.previous_mc)
        .bind(row.peak_mc)
        .bind(row.peak_multiplier)
        .bind(row.volume_24h)
        .bind(row.previous_volume_24h)
        .bind(row.price_usd)
        .bind(row.total_supply)
        .bind(row.tx_metrics_json)
        .bind(row.last_metrics_update)
        .bind(row.mc_10s_ago)
        .bind(row.vol_10s_ago)
        .bind(row.snap_10s_at)
        .bind(row.mc_10m_ago)
        .bind(row.snap_10m_at)
        .bind(row.source)
        .bind(row.holder_rank)
        .bind(row.holder_spotted_at)
        .bind(row.holder_spotted_mc)
        .bind(row.holder_peak_mc)
        .bind(row.holder_peak_multiplier)
        .bind(row.last_updated)
        .bind(row.last_db_save)
        .bind(row.announced)
        .bind(row.needs_data_fetch)
        .execute(&*pool)
        .await?;
        Ok(())
    }

    /// Load rows where `spotted_at > cutoff`, newest multiplier first.
    pub async fn get_tokens_since(&self, cutoff_ms: u64) -> Result<Vec<Token>> {
        let pool = self.pool.read().await;
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT * FROM tokens WHERE spotted_at > ? ORDER BY peak_multiplier DESC",
        )
        .bind(cutoff_ms as i64)
        .fetch_all(&*pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn append_price_history(&self, token_id: &str, timestamp_ms: u64, mc: f64, vol: f64) -> Result<()> {
        let pool = self.pool.read().await;
        sqlx::query(
            "INSERT INTO price_history (token_id, timestamp_ms, market_cap, volume) VALUES (?, ?, ?, ?)",
        )
        .bind(token_id)
        .bind(timestamp_ms as i64)
        .bind(mc)
        .bind(vol)
        .execute(&*pool)
        .await?;
        Ok(())
    }

    /// Idempotent: inserting an address already present is a no-op for the
    /// blacklist row, but the tokens-table delete always runs.
    pub async fn blacklist_add(&self, address: &str, name: &str) -> Result<()> {
        let pool = self.pool.read().await;
        sqlx::query(
            "INSERT OR IGNORE INTO blacklist (contract_address, name, blacklisted_at) VALUES (?, ?, ?)",
        )
        .bind(address)
        .bind(name)
        .bind(now_ms() as i64)
        .execute(&*pool)
        .await?;
        sqlx::query("DELETE FROM tokens WHERE contract_address = ?")
            .bind(address)
            .execute(&*pool)
            .await?;
        Ok(())
    }

    pub async fn blacklist_contains(&self, address: &str) -> Result<bool> {
        let pool = self.pool.read().await;
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM blacklist WHERE contract_address = ?")
                .bind(address)
                .fetch_optional(&*pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn blacklist_list(&self) -> Result<Vec<BlacklistRow>> {
        let pool = self.pool.read().await;
        let rows: Vec<BlacklistRow> = sqlx::query_as(
            "SELECT contract_address, name, blacklisted_at FROM blacklist ORDER BY blacklisted_at DESC",
        )
        .fetch_all(&*pool)
        .await?;
        Ok(rows)
    }

    pub async fn blacklist_remove(&self, address: &str) -> Result<()> {
        let pool = self.pool.read().await;
        sqlx::query("DELETE FROM blacklist WHERE contract_address = ?")
            .bind(address)
            .execute(&*pool)
            .await?;
        Ok(())
    }

    /// Deletes only `source = 'degen'` rows plus all price history, then
    /// drops the on-disk file (and WAL/journal siblings) and reopens a
    /// fresh connection so the next read starts from a clean schema. The
    /// blacklist is re-inserted into the freshly created tables.
    pub async fn purge_degen(&self) -> Result<()> {
        let preserved_blacklist = self.blacklist_list().await.unwrap_or_default();
        let preserved_count = preserved_blacklist.len();

        let mut pool_guard = self.pool.write().await;
        pool_guard.close().await;

        for ext in ["", "-wal", "-shm", "-journal"] {
            let path = format!("{}{}", self.db_path, ext);
            let _ = std::fs::remove_file(&path);
        }

        *pool_guard = open_pool(&self.db_path).await?;
        init_schema(&pool_guard).await?;

        for row in preserved_blacklist {
            sqlx::query(
                "INSERT OR IGNORE INTO blacklist (contract_address, name, blacklisted_at) VALUES (?, ?, ?)",
            )
            .bind(&row.contract_address)
            .bind(&row.name)
            .bind(row.blacklisted_at)
            .execute(&*pool_guard)
            .await?;
        }

        info!(preserved = preserved_count, "purge_degen complete");
        Ok(())
    }
}

async fn open_pool(db_path: &str) -> Result<sqlx::SqlitePool> {
    let opts = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    Ok(sqlx::sqlite::SqlitePoolOptions::new().connect_with(opts).await?)
}

async fn init_schema(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            id TEXT NOT NULL,
            contract_address TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            symbol TEXT NOT NULL,
            chain_short TEXT NOT NULL,
            logo_url TEXT,
            spotted_at INTEGER NOT NULL,
            spotted_mc REAL NOT NULL,
            current_mc REAL NOT NULL,
            previous_mc REAL,
            peak_mc REAL NOT NULL,
            peak_multiplier REAL NOT NULL,
            volume_24h REAL NOT NULL,
            previous_volume_24h REAL,
            price_usd REAL,
            total_supply REAL,
            tx_metrics_json TEXT,
            last_metrics_update INTEGER,
            mc_10s_ago REAL,
            vol_10s_ago REAL,
            snap_10s_at INTEGER,
            mc_10m_ago REAL,
            snap_10m_at INTEGER,
            source TEXT NOT NULL,
            holder_rank INTEGER,
            holder_spotted_at INTEGER,
            holder_spotted_mc REAL,
            holder_peak_mc REAL,
            holder_peak_multiplier REAL,
            last_updated INTEGER NOT NULL,
            last_db_save INTEGER,
            announced INTEGER NOT NULL DEFAULT 0,
            needs_data_fetch INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS price_history (
            token_id TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            market_cap REAL NOT NULL,
            volume REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_history_token ON price_history(token_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_tiers (
            tier1 REAL NOT NULL,
            tier2 REAL NOT NULL,
            tier3 REAL NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blacklist (
            contract_address TEXT NOT NULL,
            name TEXT NOT NULL,
            blacklisted_at INTEGER NOT NULL,
            UNIQUE(contract_address)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn to_row(t: &Token) -> TokenRow {
    TokenRow {
        id: t.id.clone(),
        contract_address: t.contract_address.clone(),
        name: t.name.clone(),
        symbol: t.symbol.clone(),
        chain_short: t.chain_short.clone(),
        logo_url: t.logo_url.clone(),
        spotted_at: t.spotted_at as i64,
        spotted_mc: t.spotted_mc,
        current_mc: t.current_mc,
        previous_mc: t.previous_mc,
        peak_mc: t.peak_mc,
        peak_multiplier: t.peak_multiplier,
        volume_24h: t.volume_24h,
        previous_volume_24h: t.previous_volume_24h,
        price_usd: t.price_usd,
        total_supply: t.total_supply,
        tx_metrics_json: t.tx_metrics.as_ref().and_then(|m| serde_json::to_string(m).ok()),
        last_metrics_update: t.last_metrics_update.map(|v| v as i64),
        mc_10s_ago: t.mc_10s_ago,
        vol_10s_ago: t.vol_10s_ago,
        snap_10s_at: t.snap_10s_at.map(|v| v as i64),
        mc_10m_ago: t.mc_10m_ago,
        snap_10m_at: t.snap_10m_at.map(|v| v as i64),
        source: t.source.as_str().to_string(),
        holder_rank: t.holder_rank.map(|v| v as i64),
        holder_spotted_at: t.holder_spotted_at.map(|v| v as i64),
        holder_spotted_mc: t.holder_spotted_mc,
        holder_peak_mc: t.holder_peak_mc,
        holder_peak_multiplier: t.holder_peak_multiplier,
        last_updated: t.last_updated as i64,
        last_db_save: t.last_db_save.map(|v| v as i64),
        announced: i64::from(t.announced),
        needs_data_fetch: i64::from(t.needs_data_fetch),
    }
}

fn from_row(r: TokenRow) -> Token {
    Token {
        id: r.id,
        contract_address: r.contract_address,
        name: r.name,
        symbol: r.symbol,
        chain_short: r.chain_short,
        logo_url: r.logo_url,
        spotted_at: r.spotted_at as u64,
        spotted_mc: r.spotted_mc,
        current_mc: r.current_mc,
        previous_mc: r.previous_mc,
        peak_mc: r.peak_mc,
        peak_multiplier: r.peak_multiplier,
        volume_24h: r.volume_24h,
        previous_volume_24h: r.previous_volume_24h,
        price_usd: r.price_usd,
        total_supply: r.total_supply,
        tx_metrics: r
            .tx_metrics_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<TxMetrics>(s).ok()),
        last_metrics_update: r.last_metrics_update.map(|v| v as u64),
        mc_10s_ago: r.mc_10s_ago,
        vol_10s_ago: r.vol_10s_ago,
        snap_10s_at: r.snap_10s_at.map(|v| v as u64),
        mc_10m_ago: r.mc_10m_ago,
        snap_10m_at: r.snap_10m_at.map(|v| v as u64),
        source: Source::from_str(&r.source),
        holder_rank: r.holder_rank.map(|v| v as u32),
        holder_spotted_at: r.holder_spotted_at.map(|v| v as u64),
        holder_spotted_mc: r.holder_spotted_mc,
        holder_peak_mc: r.holder_peak_mc,
        holder_peak_multiplier: r.holder_peak_multiplier,
        last_updated: r.last_updated as u64,
        last_db_save: r.last_db_save.map(|v| v as u64),
        announced: r.announced != 0,
        needs_data_fetch: r.needs_data_fetch != 0,
    }
}

fn now_ms() -> u64 {
    crate::types::now_ms()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blacklist_add_is_idempotent_per_address() {
        let store = PersistentStore::connect(":memory:".to_string()).await.unwrap();
        store.blacklist_add("0xabc", "Foo").await.unwrap();
        store.blacklist_add("0xabc", "Foo").await.unwrap();
        store.blacklist_add("0xabc", "Foo").await.unwrap();

        let rows = store.blacklist_list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contract_address, "0xabc");
    }

    #[tokio::test]
    async fn blacklist_add_always_deletes_from_tokens() {
        let store = PersistentStore::connect(":memory:".to_string()).await.unwrap();
        let token = Token::new_degen("0xabc".into(), "Foo".into(), "FOO".into(), "solana".into(), None, 1000.0, now_ms());
        store.upsert_token(&token).await.unwrap();
        assert_eq!(store.get_tokens_since(0).await.unwrap().len(), 1);

        store.blacklist_add("0xabc", "Foo").await.unwrap();
        assert!(store.get_tokens_since(0).await.unwrap().is_empty());

        store.blacklist_add("0xabc", "Foo").await.unwrap();
        assert!(store.blacklist_contains("0xabc").await.unwrap());
    }
}
