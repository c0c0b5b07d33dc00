use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::types::ListingEntry;

/// Periodic JSON poll of the public listings feed, filtered to the target chain.
/// Missing/empty responses are non-fatal — callers get back an empty list rather
/// than an error, matching the feed's "nothing new" behaviour.
pub struct ListingsClient {
    http: reqwest::Client,
    base_url: String,
    target_chain: String,
    limiter: Arc<RateLimiter>,
}

impl ListingsClient {
    pub fn new(base_url: String, target_chain: String, limiter: Arc<RateLimiter>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build listings HTTP client");
        Self { http, base_url, target_chain, limiter }
    }

    pub async fn latest(&self) -> Result<Vec<ListingEntry>> {
        self.limiter.acquire().await;

        let resp = match self.http.get(&self.base_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("listings fetch failed: {e}");
                return Ok(Vec::new());
            }
        };

        if !resp.status().is_success() {
            warn!("listings feed returned {}", resp.status());
            return Ok(Vec::new());
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("listings feed JSON parse error: {e}");
                return Ok(Vec::new());
            }
        };

        let items = body
            .as_array()
            .cloned()
            .or_else(|| body.get("tokens").and_then(|t| t.as_array()).cloned())
            .unwrap_or_default();

        let entries = items
            .iter()
            .filter_map(|v| parse_listing(v, &self.target_chain))
            .collect();
        Ok(entries)
    }
}

fn parse_listing(v: &serde_json::Value, target_chain: &str) -> Option<ListingEntry> {
    let contract_address = v
        .get("tokenAddress")
        .or_else(|| v.get("address"))
        .and_then(|a| a.as_str())?
        .to_string();

    let chain = v
        .get("chainId")
        .or_else(|| v.get("chain"))
        .and_then(|c| c.as_str())
        .unwrap_or("");
    if chain != target_chain {
        return None;
    }

    let name = v.get("name").and_then(|n| n.as_str()).unwrap_or("").to_string();
    let symbol = v.get("symbol").and_then(|s| s.as_str()).unwrap_or("").to_string();
    let logo_url = v
        .get("imageUrl")
        .or_else(|| v.get("icon"))
        .and_then(|i| i.as_str())
        .map(|s| s.to_string());

    Some(ListingEntry {
        contract_address,
        name,
        symbol,
        chain: chain.to_string(),
        logo_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_to_target_chain() {
        let v = serde_json::json!({
            "tokenAddress": "0xabc",
            "name": "Foo",
            "symbol": "FOO",
            "chainId": "ethereum",
        });
        assert!(parse_listing(&v, "solana").is_none());
        assert!(parse_listing(&v, "ethereum").is_some());
    }

    #[test]
    fn accepts_address_and_chain_aliases() {
        let v = serde_json::json!({
            "address": "0xdef",
            "name": "Bar",
            "symbol": "BAR",
            "chain": "solana",
            "icon": "https://example/icon.png",
        });
        let entry = parse_listing(&v, "solana").expect("should parse");
        assert_eq!(entry.contract_address, "0xdef");
        assert_eq!(entry.logo_url.as_deref(), Some("https://example/icon.png"));
    }
}
