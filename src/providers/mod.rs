pub mod listings;
pub mod metrics;
pub mod sse;
pub mod traits;

use async_trait::async_trait;

pub use listings::ListingsClient;
pub use metrics::MetricsClient;
pub use sse::SseClient;
pub use traits::Providers;

use crate::error::Result;
use crate::types::{BatchMetricsResult, ListingEntry, PriceFrame};

/// Concrete `Providers` built from the three real HTTP adapters. Constructed
/// once in `main` and handed to the Token Manager as a trait object, so tests
/// can swap in a fake without touching the orchestrator.
pub struct HttpProviders {
    pub listings: ListingsClient,
    pub metrics: MetricsClient,
    pub sse: SseClient,
}

#[async_trait]
impl Providers for HttpProviders {
    async fn listings(&self) -> Result<Vec<ListingEntry>> {
        self.listings.latest().await
    }

    async fn batch_metrics(&self, addresses: &[String]) -> Vec<Option<BatchMetricsResult>> {
        self.metrics.batch_metrics(addresses).await
    }

    async fn open_sse(&self, address: &str) -> Result<tokio::sync::mpsc::Receiver<PriceFrame>> {
        self.sse.open_sse(address).await
    }
}
