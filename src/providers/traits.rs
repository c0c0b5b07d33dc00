use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BatchMetricsResult, ListingEntry, PriceFrame};

/// Duck-typed provider boundary: discovery, enrichment and streaming behind one
/// object so tests and the web/embedded split can swap concrete implementations
/// without the orchestrator knowing the difference.
#[async_trait]
pub trait Providers: Send + Sync {
    /// Fetch the current listings feed, already filtered to the target chain.
    async fn listings(&self) -> Result<Vec<ListingEntry>>;

    /// Fetch market/volume/tx metrics for up to `addresses.len()` contracts.
    /// The returned vec is positional: `None` where the upstream had nothing or
    /// the sanity check rejected the result.
    async fn batch_metrics(&self, addresses: &[String]) -> Vec<Option<BatchMetricsResult>>;

    /// Open a streaming SSE connection for a single address. The returned
    /// receiver yields one `PriceFrame` per decoded `data:` line; it closes
    /// when the connection drops.
    async fn open_sse(&self, address: &str) -> Result<tokio::sync::mpsc::Receiver<PriceFrame>>;
}
