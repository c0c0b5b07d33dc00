use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::providers::Providers;
use crate::types::{now_ms, PriceFrame};

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceState {
    pub last_price: f64,
    pub last_update_ms: u64,
    pub price_timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct FailureState {
    failures: u32,
    backoff_until: Option<Instant>,
}

struct Connection {
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SseStats {
    pub active_connections: usize,
    pub max_connections: usize,
}

type PriceCallback = Arc<dyn Fn(PriceFrame) + Send + Sync>;

/// Bounded to `K` concurrent connections; one independent reconnect-capable
/// task per address rather than one multiplexed socket (§4.4).
pub struct SseManager {
    providers: Arc<dyn Providers>,
    prices: DashMap<String, PriceState>,
    failures: DashMap<String, FailureState>,
    connections: tokio::sync::Mutex<HashMap<String, Connection>>,
    callback: tokio::sync::RwLock<Option<PriceCallback>>,
    max_connections: usize,
    connect_stagger_ms: u64,
}

impl SseManager {
    pub fn new(providers: Arc<dyn Providers>, max_connections: usize, connect_stagger_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            providers,
            prices: DashMap::new(),
            failures: DashMap::new(),
            connections: tokio::sync::Mutex::new(HashMap::new()),
            callback: tokio::sync::RwLock::new(None),
            max_connections,
            connect_stagger_ms,
        })
    }

    pub async fn on_price_update(&self, cb: impl Fn(PriceFrame) + Send + Sync + 'static) {
        *self.callback.write().await = Some(Arc::new(cb));
    }

    pub fn get_price(&self, addr: &str) -> Option<PriceState> {
        self.prices.get(addr).map(|e| *e.value())
    }

    pub fn get_all_prices(&self) -> HashMap<String, PriceState> {
        self.prices.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }

    pub fn get_stats(&self) -> SseStats {
        SseStats {
            active_connections: self.prices.len().min(self.max_connections),
            max_connections: self.max_connections,
        }
    }

    /// Diffs `desired` (already truncated to `K` by the caller, or truncated
    /// here) against the live connection set: aborts tasks no longer wanted,
    /// spawns tasks for new addresses with the inter-connect stagger.
    pub async fn update_leaders(self: &Arc<Self>, desired: Vec<String>) {
        let desired: Vec<String> = desired.into_iter().take(self.max_connections).collect();
        let desired_set: std::collections::HashSet<&String> = desired.iter().collect();

        let mut connections = self.connections.lock().await;

        let to_remove: Vec<String> = connections
            .keys()
            .filter(|addr| !desired_set.contains(addr))
            .cloned()
            .collect();
        for addr in &to_remove {
            if let Some(conn) = connections.remove(addr) {
                conn.handle.abort();
            }
            self.prices.remove(addr);
            self.failures.remove(addr);
        }

        let mut stagger_delay = Duration::ZERO;
        for addr in &desired {
            if connections.contains_key(addr) {
                continue;
            }
            if self.in_backoff(addr) {
                debug!(address = %addr, "sse connect skipped, in backoff");
                continue;
            }
            let this = Arc::clone(self);
            let addr_owned = addr.clone();
            let delay = stagger_delay;
            let handle = tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                this.run_connection(addr_owned).await;
            });
            connections.insert(addr.clone(), Connection { handle });
            stagger_delay += Duration::from_millis(self.connect_stagger_ms);
        }
    }

    pub async fn disconnect(&self, addr: &str) {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.remove(addr) {
            conn.handle.abort();
        }
        self.prices.remove(addr);
        self.failures.remove(addr);
    }

    pub async fn disconnect_all(&self) {
        let mut connections = self.connections.lock().await;
        for (_, conn) in connections.drain() {
            conn.handle.abort();
        }
        self.prices.clear();
        self.failures.clear();
    }

    fn in_backoff(&self, addr: &str) -> bool {
        self.failures
            .get(addr)
            .and_then(|e| e.backoff_until)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    fn record_failure(&self, addr: &str) {
        let mut entry = self.failures.entry(addr.to_string()).or_default();
        entry.failures += 1;
        let backoff_secs = (2u64.saturating_pow(entry.failures)).min(60);
        entry.backoff_until = Some(Instant::now() + Duration::from_secs(backoff_secs));
    }

    fn clear_failure(&self, addr: &str) {
        self.failures.remove(addr);
    }

    /// One streaming connection's lifetime: open, forward frames until the
    /// provider's stream ends, record a failure, return (the task is gone —
    /// a fresh one is spawned on the next `update_leaders` pass if still desired).
    async fn run_connection(self: Arc<Self>, addr: String) {
        let mut rx = match self.providers.open_sse(&addr).await {
            Ok(rx) => rx,
            Err(e) => {
                debug!(address = %addr, "sse connect failed: {e}");
                self.record_failure(&addr);
                return;
            }
        };

        let mut saw_any = false;
        while let Some(frame) = rx.recv().await {
            saw_any = true;
            self.clear_failure(&addr);
            self.prices.insert(
                addr.clone(),
                PriceState {
                    last_price: frame.price,
                    last_update_ms: now_ms(),
                    price_timestamp_ms: frame.price_timestamp_ms,
                },
            );
            if let Some(cb) = self.callback.read().await.clone() {
                cb(frame);
            }
        }

        if !saw_any {
            self.record_failure(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::{BatchMetricsResult, ListingEntry};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FakeProviders;

    #[async_trait]
    impl Providers for FakeProviders {
        async fn listings(&self) -> Result<Vec<ListingEntry>> {
            Ok(vec![])
        }
        async fn batch_metrics(&self, _addresses: &[String]) -> Vec<Option<BatchMetricsResult>> {
            vec![]
        }
        async fn open_sse(&self, _address: &str) -> Result<mpsc::Receiver<PriceFrame>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn update_leaders_truncates_to_max_connections() {
        let mgr = SseManager::new(Arc::new(FakeProviders), 2, 0);
        mgr.update_leaders(vec!["a".into(), "b".into(), "c".into()]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let connections = mgr.connections.lock().await;
        assert_eq!(connections.len(), 2);
    }

    #[tokio::test]
    async fn update_leaders_is_idempotent_for_same_list() {
        let mgr = SseManager::new(Arc::new(FakeProviders), 10, 0);
        mgr.update_leaders(vec!["a".into(), "b".into()]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle_before = {
            let connections = mgr.connections.lock().await;
            connections.get("a").unwrap().handle.id()
        };
        mgr.update_leaders(vec!["a".into(), "b".into()]).await;
        let handle_after = {
            let connections = mgr.connections.lock().await;
            connections.get("a").unwrap().handle.id()
        };
        assert_eq!(handle_before, handle_after);
    }
}
