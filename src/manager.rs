use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::PersistentStore;
use crate::error::Result;
use crate::providers::Providers;
use crate::scorer::{self, MomentumScorer};
use crate::sse_manager::SseManager;
use crate::state::TokenStore;
use crate::types::{
    now_ms, AlertTiers, DiscoveryFailure, Mode, PriceFrame, Source, Token, TierCrossingEvent,
    ViewMode,
};

const ONE_HOUR_MS: u64 = 60 * 60 * 1000;
const TEN_SEC_MS: u64 = 10_000;
const TEN_MIN_MS: u64 = 10 * 60_000;

fn view_mode_to_u8(v: ViewMode) -> u8 {
    match v {
        ViewMode::FiveMin => 0,
        ViewMode::ThirtyMin => 1,
        ViewMode::OneHour => 2,
        ViewMode::FourHour => 3,
        ViewMode::AllTime => 4,
    }
}

fn u8_to_view_mode(v: u8) -> ViewMode {
    match v {
        0 => ViewMode::FiveMin,
        1 => ViewMode::ThirtyMin,
        2 => ViewMode::OneHour,
        3 => ViewMode::FourHour,
        _ => ViewMode::AllTime,
    }
}

/// Per-process loop-tick bookkeeping, surfaced by `GET /health`.
#[derive(Default)]
pub struct HealthState {
    pub last_discovery_tick_ms: AtomicU64,
    pub last_sse_reconcile_tick_ms: AtomicU64,
    pub last_background_tick_ms: AtomicU64,
}

/// Snapshot of discovery counters since the last purge, exposed at `/tokens/counts`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Owns the token map and drives every loop. The only shared mutable state
/// in the process; reads either snapshot the `DashMap` or the mode/view-mode
/// atomics, writes funnel through `TokenStore::mutate` (§5).
pub struct Manager {
    store: Arc<TokenStore>,
    persistent: Arc<PersistentStore>,
    providers: Arc<dyn Providers>,
    sse: Arc<SseManager>,
    scorer: AsyncMutex<MomentumScorer>,
    config: Config,

    view_mode: AtomicU8,
    mode: AtomicU8,
    alert_tiers: RwLock<AlertTiers>,

    last_top10: AsyncMutex<Vec<String>>,
    failed_retry: dashmap::DashMap<String, u64>,
    last_db_save: dashmap::DashMap<String, u64>,
    discovery_stats: AsyncMutex<DiscoveryStats>,

    pub health: HealthState,
    http: reqwest::Client,
    running: std::sync::atomic::AtomicBool,
}

impl Manager {
    pub fn new(
        store: Arc<TokenStore>,
        persistent: Arc<PersistentStore>,
        providers: Arc<dyn Providers>,
        sse: Arc<SseManager>,
        config: Config,
        default_tiers: AlertTiers,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            persistent,
            providers,
            sse,
            scorer: AsyncMutex::new(MomentumScorer::new()),
            config,
            view_mode: AtomicU8::new(view_mode_to_u8(ViewMode::OneHour)),
            mode: AtomicU8::new(0),
            alert_tiers: RwLock::new(default_tiers),
            last_top10: AsyncMutex::new(Vec::new()),
            failed_retry: dashmap::DashMap::new(),
            last_db_save: dashmap::DashMap::new(),
            discovery_stats: AsyncMutex::new(DiscoveryStats::default()),
            health: HealthState::default(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build alert-sink HTTP client"),
            running: std::sync::atomic::AtomicBool::new(true),
        })
    }

    /// Spawns the discovery, SSE-reconciliation, background-REST and SSE
    /// frame-handler loops as independent tasks (§9 message-passing redesign).
    pub fn spawn_loops(self: &Arc<Self>) {
        let (frame_tx, frame_rx) = mpsc::channel::<PriceFrame>(self.config_channel_capacity());

        let this = Arc::clone(self);
        tokio::spawn(async move { this.discovery_loop().await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.sse_reconcile_loop().await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.background_loop().await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.frame_handler_loop(frame_rx).await });

        let tx = frame_tx.clone();
        let sse = Arc::clone(&self.sse);
        tokio::spawn(async move {
            sse.on_price_update(move |frame| {
                let _ = tx.try_send(frame);
            })
            .await;
        });
    }

    fn config_channel_capacity(&self) -> usize {
        crate::config::CHANNEL_CAPACITY
    }

    // -----------------------------------------------------------------
    // 4.6.1 Discovery loop
    // -----------------------------------------------------------------

    async fn discovery_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(crate::config::DISCOVERY_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::Relaxed) {
                continue;
            }
            self.health.last_discovery_tick_ms.store(now_ms(), Ordering::Relaxed);
            if let Err(e) = self.discovery_tick().await {
                warn!("discovery tick failed: {e}");
            }
        }
    }

    async fn discovery_tick(self: &Arc<Self>) -> Result<()> {
        let listings = match self.providers.listings().await {
            Ok(l) => l,
            Err(e) => {
                warn!("listings fetch failed: {e}");
                return Ok(());
            }
        };

        let now = now_ms();
        let mut candidates = Vec::new();
        for entry in listings {
            if self.store.contains(&entry.contract_address) {
                continue;
            }
            if self.persistent.blacklist_contains(&entry.contract_address).await.unwrap_or(false) {
                continue;
            }
            if let Some(retry_after) = self.failed_retry.get(&entry.contract_address) {
                if now < *retry_after {
                    continue;
                }
            }
            candidates.push(entry);
        }

        for chunk in candidates.chunks(crate::config::BATCH_MAX_ADDRESSES) {
            let addresses: Vec<String> = chunk.iter().map(|e| e.contract_address.clone()).collect();
            let results = self.providers.batch_metrics(&addresses).await;

            let (mut attempted, mut succeeded, mut failed) = (0u64, 0u64, 0u64);
            for (entry, result) in chunk.iter().zip(results.into_iter()) {
                attempted += 1;
                match result {
                    None => {
                        self.mark_failed(&entry.contract_address, DiscoveryFailure::NoPair);
                        failed += 1;
                    }
                    Some(m) if m.market_cap <= 0.0 => {
                        self.mark_failed(&entry.contract_address, DiscoveryFailure::ZeroMarketCap);
                        failed += 1;
                    }
                    Some(m) => {
                        let mut token = Token::new_degen(
                            entry.contract_address.clone(),
                            if entry.name.is_empty() { m.name.clone() } else { entry.name.clone() },
                            if entry.symbol.is_empty() { m.symbol.clone() } else { entry.symbol.clone() },
                            entry.chain.clone(),
                            entry.logo_url.clone().or(m.logo_url.clone()),
                            m.market_cap,
                            now,
                        );
                        token.price_usd = Some(m.price_usd);
                        token.volume_24h = m.volume_24h;
                        token.total_supply = Some(m.total_supply);
                        token.tx_metrics = Some(m.tx_metrics);
                        token.last_metrics_update = Some(now);

                        self.store.upsert(token.clone());
                        self.record_snapshot(&token).await;
                        self.persist(&token).await;
                        succeeded += 1;
                    }
                }
            }

            let mut stats = self.discovery_stats.lock().await;
            stats.attempted += attempted;
            stats.succeeded += succeeded;
            stats.failed += failed;
        }

        Ok(())
    }

    fn mark_failed(&self, address: &str, reason: DiscoveryFailure) {
        let retry_after = now_ms() + crate::config::DISCOVERY_RETRY_COOLOFF_SECS * 1000;
        self.failed_retry.insert(address.to_string(), retry_after);
        warn!(address, reason = reason.as_str(), "discovery candidate rejected");
    }

    // -----------------------------------------------------------------
    // 4.6.2 SSE reconciliation loop
    // -----------------------------------------------------------------

    async fn sse_reconcile_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(crate::config::SSE_RECONCILE_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::Relaxed) {
                continue;
            }
            self.health.last_sse_reconcile_tick_ms.store(now_ms(), Ordering::Relaxed);
            self.sse_reconcile_tick().await;
        }
    }

    async fn sse_reconcile_tick(self: &Arc<Self>) {
        let view_mode = self.view_mode();
        let top10 = self.top10(view_mode);
        let desired: Vec<String> = top10.iter().map(|t| t.contract_address.clone()).collect();

        let mut last = self.last_top10.lock().await;
        if *last != desired {
            self.sse.update_leaders(desired.clone()).await;
            *last = desired;
        }
    }

    // -----------------------------------------------------------------
    // 4.6.3 SSE frame handler
    // -----------------------------------------------------------------

    async fn frame_handler_loop(self: Arc<Self>, mut rx: mpsc::Receiver<PriceFrame>) {
        while let Some(frame) = rx.recv().await {
            self.handle_price_frame(frame).await;
        }
    }

    async fn handle_price_frame(self: &Arc<Self>, frame: PriceFrame) {
        let now = now_ms();

        let crossing = self.store.mutate(&frame.address, |t| {
            t.price_usd = Some(frame.price);
            t.last_updated = now;

            if t.snap_10s_at.map(|ts| now.saturating_sub(ts) >= TEN_SEC_MS).unwrap_or(true) {
                t.mc_10s_ago = Some(t.current_mc);
                t.vol_10s_ago = Some(t.volume_24h);
                t.snap_10s_at = Some(now);
            }

            let mut crossed = None;
            if let Some(supply) = t.total_supply.filter(|s| *s > 0.0) {
                let new_mc = frame.price * supply;
                t.previous_mc = Some(t.current_mc);
                t.current_mc = new_mc;
                crossed = apply_peak_and_tier_crossing(t, *self.alert_tiers.read().unwrap());
            }
            crossed
        });

        if let Some(Some(event)) = crossing {
            self.handle_tier_crossing(event).await;
        }

        if let Some(token) = self.store.get(&frame.address) {
            self.record_snapshot(&token).await;
            self.persist_debounced(&token).await;
        }
    }

    async fn handle_tier_crossing(self: &Arc<Self>, event: TierCrossingEvent) {
        info!(address = %event.contract_address, multiplier = event.peak_multiplier, "tier-3 crossing");
        if let Some(key) = &self.config.alert_webhook_key {
            let url = format!("https://alerts.dexprovider.example/notify?key={key}");
            let body = serde_json::json!({
                "address": event.contract_address,
                "name": event.name,
                "multiplier": event.peak_multiplier,
            });
            if let Err(e) = self.http.post(&url).json(&body).send().await {
                warn!("alert sink call failed: {e}");
            }
        }
    }

    // -----------------------------------------------------------------
    // 4.6.4 Background REST loop
    // -----------------------------------------------------------------

    async fn background_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(crate::config::BACKGROUND_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::Relaxed) {
                continue;
            }
            self.health.last_background_tick_ms.store(now_ms(), Ordering::Relaxed);
            self.background_tick().await;
            self.evict().await;
        }
    }

    async fn background_tick(self: &Arc<Self>) {
        let now = now_ms();
        let leaders: std::collections::HashSet<String> = self.last_top10.lock().await.iter().cloned().collect();

        let targets: Vec<String> = self
            .store
            .all()
            .into_iter()
            .filter(|t| !leaders.contains(&t.contract_address))
            .filter(|t| now.saturating_sub(t.spotted_at) <= ONE_HOUR_MS || t.source.is_holder_like())
            .map(|t| t.contract_address)
            .collect();

        for chunk in targets.chunks(crate::config::BATCH_MAX_ADDRESSES) {
            let results = self.providers.batch_metrics(chunk).await;
            for (address, result) in chunk.iter().zip(results.into_iter()) {
                let Some(m) = result else { continue };

                if m.volume_24h > crate::config::SANITY_VOLUME_MC_RATIO * m.market_cap && m.market_cap > 0.0 {
                    warn!(address, "background refresh sanity-rejected");
                    continue;
                }

                let tiers = *self.alert_tiers.read().unwrap();
                let crossing = self.store.mutate(address, |t| apply_background_refresh(t, &m, now, tiers));

                if let Some(Some(event)) = crossing {
                    self.handle_tier_crossing(event).await;
                }
                if let Some(token) = self.store.get(address) {
                    self.record_snapshot(&token).await;
                    self.persist(&token).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // 4.6.6 Holder adoption
    // -----------------------------------------------------------------

    pub async fn add_holder_token(self: &Arc<Self>, address: &str, rank: u32) {
        let now = now_ms();
        let mutated = self.store.mutate(address, |t| {
            t.source = Source::Holder;
            t.holder_rank = Some(rank);
            if t.holder_spotted_at.is_none() {
                t.holder_spotted_at = Some(now);
            }
            if t.holder_spotted_mc.is_none() && t.current_mc > 0.0 {
                t.holder_spotted_mc = Some(t.current_mc);
                t.holder_peak_mc = Some(t.current_mc);
                t.holder_peak_multiplier = Some(1.0);
            }
        });

        if mutated.is_none() {
            let token = Token::new_holder_pending(address.to_string(), rank, now);
            self.store.upsert(token.clone());
            self.persist(&token).await;
            return;
        }
        if let Some(token) = self.store.get(address) {
            self.persist(&token).await;
        }
    }

    // -----------------------------------------------------------------
    // 4.6.7 Eviction
    // -----------------------------------------------------------------

    async fn evict(self: &Arc<Self>) {
        let now = now_ms();
        let evicted = self.store.evict_expired(now, crate::config::TOKEN_TTL_SECS * 1000);
        if !evicted.is_empty() {
            let mut scorer = self.scorer.lock().await;
            for addr in &evicted {
                scorer.drop_token(addr);
            }
            info!(count = evicted.len(), "evicted expired tokens");
        }
    }

    // -----------------------------------------------------------------
    // 4.6.8 Purge
    // -----------------------------------------------------------------

    pub async fn purge(self: &Arc<Self>) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);

        let removed = self.store.purge_degen();
        {
            let mut scorer = self.scorer.lock().await;
            for addr in &removed {
                scorer.drop_token(addr);
            }
        }
        *self.discovery_stats.lock().await = DiscoveryStats::default();
        self.failed_retry.clear();
        self.last_db_save.clear();

        self.persistent.purge_degen().await?;
        self.persistent.set_alert_tiers(self.alert_tiers()).await?;

        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Scoring / persistence helpers
    // -----------------------------------------------------------------

    async fn record_snapshot(&self, token: &Token) {
        let now = now_ms();
        {
            let mut scorer = self.scorer.lock().await;
            scorer.record_snapshot(&token.contract_address, now, token.current_mc, token.volume_24h);
        }
        if let Err(e) = self
            .persistent
            .append_price_history(&token.contract_address, now, token.current_mc, token.volume_24h)
            .await
        {
            error!(address = %token.contract_address, "price history append failed: {e}");
        }
    }

    async fn persist(&self, token: &Token) {
        self.last_db_save.insert(token.contract_address.clone(), now_ms());
        if let Err(e) = self.persistent.upsert_token(token).await {
            error!(address = %token.contract_address, "persistence failure: {e}");
        }
    }

    async fn persist_debounced(&self, token: &Token) {
        let now = now_ms();
        let due = self
            .last_db_save
            .get(&token.contract_address)
            .map(|ts| now.saturating_sub(*ts) >= crate::config::DB_WRITE_DEBOUNCE_SECS * 1000)
            .unwrap_or(true);
        if due {
            self.persist(token).await;
        }
    }

    // -----------------------------------------------------------------
    // 4.7 Read API projections
    // -----------------------------------------------------------------

    pub fn view_mode(&self) -> ViewMode {
        u8_to_view_mode(self.view_mode.load(Ordering::Relaxed))
    }

    pub fn set_view_mode(&self, view_mode: ViewMode) {
        self.view_mode.store(view_mode_to_u8(view_mode), Ordering::Relaxed);
    }

    pub fn mode(&self) -> Mode {
        if self.mode.load(Ordering::Relaxed) == 1 { Mode::Holder } else { Mode::Degen }
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(if mode == Mode::Holder { 1 } else { 0 }, Ordering::Relaxed);
    }

    pub fn alert_tiers(&self) -> AlertTiers {
        *self.alert_tiers.read().unwrap()
    }

    pub async fn set_alert_tiers(&self, tiers: AlertTiers) -> Result<()> {
        *self.alert_tiers.write().unwrap() = tiers;
        self.persistent.set_alert_tiers(tiers).await
    }

    pub fn top10(&self, view_mode: ViewMode) -> Vec<Token> {
        let now = now_ms();
        let tier1 = self.alert_tiers().tier1;
        let window_ms = view_mode.window_ms();

        let mut tokens: Vec<Token> = self
            .store
            .all()
            .into_iter()
            .filter(|t| t.peak_multiplier >= tier1)
            .filter(|t| match window_ms {
                Some(w) => now.saturating_sub(t.spotted_at) <= w,
                None => true,
            })
            .collect();
        tokens.sort_by(|a, b| b.peak_multiplier.partial_cmp(&a.peak_multiplier).unwrap());
        tokens.truncate(10);
        tokens
    }

    pub fn holder_list(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .store
            .all()
            .into_iter()
            .filter(|t| t.source == Source::Holder)
            .collect();
        tokens.sort_by_key(|t| t.holder_rank.unwrap_or(u32::MAX));
        tokens
    }

    pub fn all(&self) -> Vec<Token> {
        let mut tokens = self.store.all();
        tokens.sort_by(|a, b| b.peak_multiplier.partial_cmp(&a.peak_multiplier).unwrap());
        tokens
    }

    pub async fn counts(&self) -> (usize, usize, usize) {
        let all = self.store.all();
        let degen = all.iter().filter(|t| t.source == Source::Degen).count();
        let holder = all.iter().filter(|t| t.source.is_holder_like()).count();
        let blacklisted = self.persistent.blacklist_list().await.map(|l| l.len()).unwrap_or(0);
        (degen, holder, blacklisted)
    }

    pub async fn mvp(&self) -> Option<(Token, f64, Option<u64>)> {
        let view_mode = self.view_mode();
        let candidates = self.top10(view_mode);
        if candidates.is_empty() {
            return None;
        }
        let mut scorer = self.scorer.lock().await;
        let (addr, score) = scorer.select_mvp(&candidates, view_mode, now_ms())?;
        let token = candidates.into_iter().find(|t| t.contract_address == addr)?;
        Some((token, score.value, scorer.mvp_since()))
    }

    pub fn holder_mvp(&self) -> Option<(Token, f64)> {
        let candidates = self.holder_list();
        let (addr, score) = scorer::holder_mvp(&candidates)?;
        let token = candidates.into_iter().find(|t| t.contract_address == addr)?;
        Some((token, score))
    }

    // -----------------------------------------------------------------
    // 4.8 Control surface
    // -----------------------------------------------------------------

    pub async fn blacklist_add(&self, address: &str, name: &str) -> Result<()> {
        self.store.remove(address);
        self.persistent.blacklist_add(address, name).await
    }

    pub async fn blacklist_remove(&self, address: &str) -> Result<()> {
        self.persistent.blacklist_remove(address).await
    }

    pub async fn blacklist_list(&self) -> Result<Vec<crate::db::models::BlacklistRow>> {
        self.persistent.blacklist_list().await
    }

    /// One-shot on-demand metrics fetch for a single address, bypassing discovery.
    pub async fn mc_check(&self, address: &str) -> Vec<Option<crate::types::BatchMetricsResult>> {
        self.providers.batch_metrics(&[address.to_string()]).await
    }

    pub async fn discovery_stats(&self) -> DiscoveryStats {
        *self.discovery_stats.lock().await
    }

    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.sse.disconnect_all().await;
    }
}

/// §4.6.5: observe the previous-and-new `peak_multiplier` pair atomically,
/// flag `announced` exactly once when the tier-3 threshold is first crossed.
fn apply_peak_and_tier_crossing(t: &mut Token, tiers: AlertTiers) -> Option<TierCrossingEvent> {
    if t.spotted_mc <= 0.0 {
        return None;
    }
    let mult = t.current_mc / t.spotted_mc;
    let prev_peak = t.peak_multiplier;
    if mult > t.peak_multiplier {
        t.peak_multiplier = mult;
        t.peak_mc = t.current_mc;
    }

    if prev_peak < tiers.tier3 && t.peak_multiplier >= tiers.tier3 && t.source == Source::Degen && !t.announced {
        t.announced = true;
        return Some(TierCrossingEvent {
            contract_address: t.contract_address.clone(),
            name: t.name.clone(),
            peak_multiplier: t.peak_multiplier,
        });
    }
    None
}

/// §4.6.4 background REST refresh for a single token, plus the §4.6.6/§3.1
/// atomic baseline initialisation for a holder-adopted token's first non-zero
/// observation. Every baseline (`spotted_mc`, `peak_mc`, `holder_spotted_mc`,
/// `holder_peak_mc`, `mc_10s_ago`, `mc_10m_ago`) must land on the *new* value
/// in that same update rather than the stale pre-update zero.
fn apply_background_refresh(
    t: &mut Token,
    m: &crate::types::BatchMetricsResult,
    now: u64,
    tiers: AlertTiers,
) -> Option<TierCrossingEvent> {
    let is_holder_like = t.source.is_holder_like();
    let is_first_observation = is_holder_like && t.spotted_mc == 0.0 && m.market_cap > 0.0;

    if !is_first_observation && t.snap_10s_at.map(|ts| now.saturating_sub(ts) >= TEN_SEC_MS).unwrap_or(true) {
        t.mc_10s_ago = Some(t.current_mc);
        t.vol_10s_ago = Some(t.volume_24h);
        t.snap_10s_at = Some(now);
    }
    if !is_first_observation
        && is_holder_like
        && t.snap_10m_at.map(|ts| now.saturating_sub(ts) >= TEN_MIN_MS).unwrap_or(true)
    {
        t.mc_10m_ago = Some(t.current_mc);
        t.snap_10m_at = Some(now);
    }

    t.previous_mc = Some(t.current_mc);
    t.previous_volume_24h = Some(t.volume_24h);
    t.current_mc = m.market_cap;
    t.volume_24h = m.volume_24h;
    t.price_usd = Some(m.price_usd);
    t.total_supply = Some(m.total_supply);
    t.tx_metrics = Some(m.tx_metrics.clone());
    t.last_metrics_update = Some(now);
    if t.name.is_empty() {
        t.name = m.name.clone();
    }
    if t.symbol.is_empty() {
        t.symbol = m.symbol.clone();
    }
    if t.logo_url.is_none() {
        t.logo_url = m.logo_url.clone();
    }
    t.needs_data_fetch = false;

    if is_first_observation {
        t.spotted_mc = m.market_cap;
        t.peak_mc = m.market_cap;
        t.peak_multiplier = 1.0;
        t.holder_spotted_mc = Some(m.market_cap);
        t.holder_peak_mc = Some(m.market_cap);
        t.holder_peak_multiplier = Some(1.0);
        t.mc_10s_ago = Some(m.market_cap);
        t.vol_10s_ago = Some(m.volume_24h);
        t.snap_10s_at = Some(now);
        t.mc_10m_ago = Some(m.market_cap);
        t.snap_10m_at = Some(now);
    } else if is_holder_like && t.holder_spotted_mc.is_none() && m.market_cap > 0.0 {
        t.holder_spotted_mc = Some(m.market_cap);
        t.holder_peak_mc = Some(m.market_cap);
        t.holder_peak_multiplier = Some(1.0);
    }

    let degen_crossing = apply_peak_and_tier_crossing(t, tiers);

    if let Some(base) = t.holder_spotted_mc.filter(|b| *b > 0.0) {
        let holder_mult = t.current_mc / base;
        if holder_mult > t.holder_peak_multiplier.unwrap_or(1.0) {
            t.holder_peak_multiplier = Some(holder_mult);
            t.holder_peak_mc = Some(t.current_mc);
        }
    }

    degen_crossing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(spotted_mc: f64, current_mc: f64, peak_multiplier: f64, announced: bool) -> Token {
        let mut t = Token::new_degen("a".into(), "A".into(), "A".into(), "solana".into(), None, spotted_mc, 0);
        t.current_mc = current_mc;
        t.peak_multiplier = peak_multiplier;
        t.announced = announced;
        t
    }

    #[test]
    fn peak_multiplier_never_decreases() {
        let mut t = token_with(1000.0, 1500.0, 1.0, false);
        let tiers = AlertTiers { tier1: 1.1, tier2: 1.2, tier3: 1.3 };
        apply_peak_and_tier_crossing(&mut t, tiers);
        assert_eq!(t.peak_multiplier, 1.5);

        t.current_mc = 1100.0;
        apply_peak_and_tier_crossing(&mut t, tiers);
        assert_eq!(t.peak_multiplier, 1.5); // unchanged: 1.1 < 1.5
    }

    #[test]
    fn tier3_crossing_flags_announced_exactly_once() {
        let mut t = token_with(1000.0, 1400.0, 1.0, false);
        let tiers = AlertTiers { tier1: 1.1, tier2: 1.2, tier3: 1.3 };
        let event = apply_peak_and_tier_crossing(&mut t, tiers);
        assert!(event.is_some());
        assert!(t.announced);

        t.current_mc = 1600.0;
        let event2 = apply_peak_and_tier_crossing(&mut t, tiers);
        assert!(event2.is_none()); // already announced
    }

    #[test]
    fn holder_tokens_never_announce() {
        let mut t = token_with(1000.0, 1400.0, 1.0, false);
        t.source = Source::Holder;
        let tiers = AlertTiers { tier1: 1.1, tier2: 1.2, tier3: 1.3 };
        let event = apply_peak_and_tier_crossing(&mut t, tiers);
        assert!(event.is_none());
        assert!(!t.announced);
    }

    fn sample_metrics(market_cap: f64) -> crate::types::BatchMetricsResult {
        crate::types::BatchMetricsResult {
            price_usd: 0.01,
            market_cap,
            volume_24h: 500.0,
            liquidity: 1_000.0,
            total_supply: 1_000_000.0,
            tx_metrics: crate::types::TxMetrics::default(),
            name: "Holder Token".into(),
            symbol: "HLD".into(),
            logo_url: None,
        }
    }

    /// Scenario 6: a holder token adopted without data gets every baseline
    /// initialised to the same value on its first non-zero observation.
    #[test]
    fn holder_first_observation_initialises_every_baseline_atomically() {
        let mut t = Token::new_holder_pending("xyz".into(), 2, 0);
        assert_eq!(t.spotted_mc, 0.0);
        assert!(t.needs_data_fetch);

        let tiers = AlertTiers { tier1: 1.1, tier2: 1.2, tier3: 1.3 };
        let m = sample_metrics(4_200.0);
        let event = apply_background_refresh(&mut t, &m, 10_000, tiers);

        assert!(event.is_none()); // holder tokens never announce
        assert_eq!(t.spotted_mc, 4_200.0);
        assert_eq!(t.peak_mc, 4_200.0);
        assert_eq!(t.peak_multiplier, 1.0);
        assert_eq!(t.holder_spotted_mc, Some(4_200.0));
        assert_eq!(t.holder_peak_mc, Some(4_200.0));
        assert_eq!(t.holder_peak_multiplier, Some(1.0));
        assert_eq!(t.mc_10s_ago, Some(4_200.0));
        assert_eq!(t.mc_10m_ago, Some(4_200.0));
        assert!(!t.needs_data_fetch);
    }

    #[test]
    fn background_refresh_on_subsequent_tick_uses_prior_value_as_baseline() {
        let mut t = Token::new_holder_pending("xyz".into(), 2, 0);
        let tiers = AlertTiers { tier1: 1.1, tier2: 1.2, tier3: 1.3 };
        apply_background_refresh(&mut t, &sample_metrics(4_200.0), 10_000, tiers);

        // Second tick, comfortably past the 10s window, market cap rises.
        apply_background_refresh(&mut t, &sample_metrics(4_600.0), 25_000, tiers);
        assert_eq!(t.mc_10s_ago, Some(4_200.0)); // the prior observation, not re-initialised
        assert_eq!(t.current_mc, 4_600.0);
        assert_eq!(t.holder_peak_mc, Some(4_600.0)); // holder peak tracks the rise
    }
}
