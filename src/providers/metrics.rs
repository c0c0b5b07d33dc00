use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::warn;

use crate::config::SANITY_VOLUME_MC_RATIO;
use crate::ratelimit::RateLimiter;
use crate::types::{BatchMetricsResult, TxMetrics, TxWindowMetrics};

/// Per-address metrics fetch, parallelised under a configurable fan-out. The
/// upstream has no real batch endpoint, so "batch" here means "N single
/// requests driven concurrently", same shape the spec calls for.
pub struct MetricsClient {
    http: reqwest::Client,
    base_url: String,
    fan_out: usize,
    limiter: Arc<RateLimiter>,
}

impl MetricsClient {
    pub fn new(base_url: String, fan_out: usize, limiter: Arc<RateLimiter>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build metrics HTTP client");
        Self { http, base_url, fan_out, limiter }
    }

    /// Fetch metrics for every address, preserving input order. A `None` slot
    /// means the upstream had nothing, or the result failed the sanity check.
    pub async fn batch_metrics(&self, addresses: &[String]) -> Vec<Option<BatchMetricsResult>> {
        let results: Vec<Option<BatchMetricsResult>> = stream::iter(addresses.iter().cloned())
            .map(|addr| async move { self.fetch_one(&addr).await })
            .buffer_unordered(self.fan_out.max(1))
            .collect()
            .await;
        results
    }

    async fn fetch_one(&self, address: &str) -> Option<BatchMetricsResult> {
        self.limiter.acquire().await;

        let url = format!("{}/{}", self.base_url, address);
        let resp = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(address, "metrics fetch transport error: {e}");
                return None;
            }
        };

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(address, "metrics fetch rate-limited by upstream");
            return None;
        }
        if !resp.status().is_success() {
            warn!(address, "metrics fetch returned {}", resp.status());
            return None;
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(address, "metrics JSON parse error: {e}");
                return None;
            }
        };

        parse_metrics_body(&body)
    }
}

fn parse_metrics_body(v: &serde_json::Value) -> Option<BatchMetricsResult> {
    let summary = v.get("summary")?;

    let price_usd = summary.get("price_usd").and_then(|x| x.as_f64()).unwrap_or(0.0);
    let (liquidity, market_cap) = best_pair(summary);

    let window_5m = parse_window(summary.get("5m"));
    let volume_24h = summary
        .get("24h")
        .and_then(|w| w.get("volume_usd"))
        .and_then(|x| x.as_f64())
        .unwrap_or(0.0);

    if volume_24h > SANITY_VOLUME_MC_RATIO * market_cap && market_cap > 0.0 {
        warn!(market_cap, volume_24h, "rejecting metrics: volume/mc sanity check failed");
        return None;
    }

    let tx_metrics = TxMetrics {
        m5: window_5m,
        m15: parse_window(summary.get("15m")),
        m30: parse_window(summary.get("30m")),
        h1: parse_window(summary.get("1h")),
        h6: parse_window(summary.get("6h")),
        h24: parse_window(summary.get("24h")),
    };

    Some(BatchMetricsResult {
        price_usd,
        market_cap,
        volume_24h,
        liquidity,
        total_supply: v.get("total_supply").and_then(|x| x.as_f64()).unwrap_or(0.0),
        tx_metrics,
        name: v.get("name").and_then(|n| n.as_str()).unwrap_or("").to_string(),
        symbol: v.get("symbol").and_then(|s| s.as_str()).unwrap_or("").to_string(),
        logo_url: v.get("imageUrl").and_then(|i| i.as_str()).map(|s| s.to_string()),
    })
}

/// §4.6.1 step 4: when `summary.pools` lists more than one liquidity pool for
/// the address, pick the "best pair" by `(liquidity>0, liquidity, mc>0, mc)`
/// descending. Falls back to the summary's own top-level fields when `pools`
/// is absent or empty (single implicit pair).
fn best_pair(summary: &serde_json::Value) -> (f64, f64) {
    let fallback = (
        summary.get("liquidity_usd").and_then(|x| x.as_f64()).unwrap_or(0.0),
        summary.get("fdv").and_then(|x| x.as_f64()).unwrap_or(0.0),
    );

    let Some(pools) = summary.get("pools").and_then(|p| p.as_array()) else {
        return fallback;
    };

    let candidates: Vec<(f64, f64)> = pools
        .iter()
        .map(|p| {
            let liquidity = p
                .get("liquidity_usd")
                .or_else(|| p.get("liquidity"))
                .and_then(|x| x.as_f64())
                .unwrap_or(0.0);
            let mc = p
                .get("fdv")
                .or_else(|| p.get("market_cap"))
                .and_then(|x| x.as_f64())
                .unwrap_or(0.0);
            (liquidity, mc)
        })
        .collect();

    candidates.into_iter().max_by(|a, b| cmp_pairs(*a, *b)).unwrap_or(fallback)
}

fn cmp_pairs(a: (f64, f64), b: (f64, f64)) -> std::cmp::Ordering {
    let (al, am) = a;
    let (bl, bm) = b;
    (al > 0.0)
        .cmp(&(bl > 0.0))
        .then_with(|| al.partial_cmp(&bl).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| (am > 0.0).cmp(&(bm > 0.0)))
        .then_with(|| am.partial_cmp(&bm).unwrap_or(std::cmp::Ordering::Equal))
}

fn parse_window(v: Option<&serde_json::Value>) -> TxWindowMetrics {
    let Some(v) = v else { return TxWindowMetrics::default() };
    TxWindowMetrics {
        buys: v.get("buys").and_then(|x| x.as_u64()).unwrap_or(0),
        sells: v.get("sells").and_then(|x| x.as_u64()).unwrap_or(0),
        buy_usd: v.get("buy_usd").and_then(|x| x.as_f64()).unwrap_or(0.0),
        sell_usd: v.get("sell_usd").and_then(|x| x.as_f64()).unwrap_or(0.0),
        price_change_pct: v
            .get("last_price_usd_change")
            .and_then(|x| x.as_f64())
            .unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_volume() {
        let v = serde_json::json!({
            "summary": {
                "price_usd": 1.0,
                "fdv": 50_000.0,
                "liquidity_usd": 10_000.0,
                "24h": {"volume_usd": 80_000_000.0, "buys": 10, "sells": 5},
            },
            "total_supply": 1_000_000.0,
        });
        assert!(parse_metrics_body(&v).is_none());
    }

    #[test]
    fn accepts_sane_result() {
        let v = serde_json::json!({
            "name": "Foo",
            "symbol": "FOO",
            "summary": {
                "price_usd": 0.01,
                "fdv": 1_000_000.0,
                "liquidity_usd": 20_000.0,
                "5m": {"buys": 10, "sells": 4, "buy_usd": 500.0, "sell_usd": 100.0, "last_price_usd_change": 3.5},
                "24h": {"volume_usd": 200_000.0},
            },
            "total_supply": 1_000_000_000.0,
        });
        let parsed = parse_metrics_body(&v).expect("should parse");
        assert_eq!(parsed.market_cap, 1_000_000.0);
        assert_eq!(parsed.tx_metrics.m5.buys, 10);
    }

    #[test]
    fn picks_best_pair_among_multiple_pools() {
        let v = serde_json::json!({
            "summary": {
                "price_usd": 0.01,
                "fdv": 10.0,
                "liquidity_usd": 10.0,
                "pools": [
                    {"liquidity_usd": 5_000.0, "fdv": 200_000.0},
                    {"liquidity_usd": 50_000.0, "fdv": 900_000.0},
                    {"liquidity_usd": 0.0, "fdv": 5_000_000.0},
                ],
            },
        });
        let parsed = parse_metrics_body(&v).expect("should parse");
        assert_eq!(parsed.liquidity, 50_000.0);
        assert_eq!(parsed.market_cap, 900_000.0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let v = serde_json::json!({ "summary": {} });
        let parsed = parse_metrics_body(&v).expect("should parse");
        assert_eq!(parsed.market_cap, 0.0);
        assert_eq!(parsed.price_usd, 0.0);
    }
}
