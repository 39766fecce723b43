//! Per-provider request metrics.
//!
//! Innermost middleware, so counters and latency reflect each underlying
//! attempt rather than each caller-visible call. The registry snapshot is
//! exposed through the façade for scraping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use wh_domain::error::{Error, Result};
use wh_domain::model::ModelInfo;
use wh_domain::request::{
    AudioRequest, EmbeddingsRequest, ImageRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse, Usage,
};
use wh_domain::stream::ChunkStream;
use wh_domain::CapabilitySet;
use wh_providers::Provider;

/// Upper bounds (ms) of the latency histogram buckets; the last bucket is
/// unbounded.
pub const LATENCY_BUCKETS_MS: [u64; 9] = [10, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

#[derive(Debug, Default, Clone, Serialize)]
pub struct ProviderMetrics {
    pub requests: u64,
    pub errors: HashMap<String, u64>,
    /// Counts per latency bucket; index i covers `<= LATENCY_BUCKETS_MS[i]`,
    /// the final slot is overflow.
    pub latency_buckets: Vec<u64>,
    pub total_latency_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ProviderMetrics {
    fn new() -> Self {
        Self {
            latency_buckets: vec![0; LATENCY_BUCKETS_MS.len() + 1],
            ..Default::default()
        }
    }

    fn observe(&mut self, latency_ms: u64, error_code: Option<&str>) {
        self.requests += 1;
        self.total_latency_ms += latency_ms;
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| latency_ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.latency_buckets[bucket] += 1;
        if let Some(code) = error_code {
            *self.errors.entry(code.to_string()).or_default() += 1;
        }
    }

    fn observe_usage(&mut self, usage: &Usage) {
        self.prompt_tokens += usage.prompt_tokens as u64;
        self.completion_tokens += usage.completion_tokens as u64;
    }
}

/// Snapshot of every provider's metrics, for scraping.
pub type MetricsSnapshot = HashMap<String, ProviderMetrics>;

#[derive(Default)]
pub struct MetricsRegistry {
    providers: Mutex<HashMap<String, ProviderMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, provider: &str, latency_ms: u64, error: Option<&Error>) {
        let mut providers = self.providers.lock();
        providers
            .entry(provider.to_string())
            .or_insert_with(ProviderMetrics::new)
            .observe(latency_ms, error.map(|e| e.code.as_str()));
    }

    fn record_usage(&self, provider: &str, usage: &Usage) {
        let mut providers = self.providers.lock();
        providers
            .entry(provider.to_string())
            .or_insert_with(ProviderMetrics::new)
            .observe_usage(usage);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.providers.lock().clone()
    }
}

pub struct MetricsProvider {
    inner: Arc<dyn Provider>,
    registry: Arc<MetricsRegistry>,
}

impl MetricsProvider {
    pub fn new(inner: Arc<dyn Provider>, registry: Arc<MetricsRegistry>) -> Self {
        Self { inner, registry }
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let outcome = op().await;
        self.registry.record(
            self.inner.name(),
            start.elapsed().as_millis() as u64,
            outcome.as_ref().err(),
        );
        outcome
    }
}

#[async_trait::async_trait]
impl Provider for MetricsProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        let resp = self.run(|| self.inner.text(req)).await?;
        if let Some(usage) = &resp.usage {
            self.registry.record_usage(self.inner.name(), usage);
        }
        Ok(resp)
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        self.run(|| self.inner.stream(req)).await
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        let resp = self.run(|| self.inner.structured(req)).await?;
        if let Some(usage) = &resp.usage {
            self.registry.record_usage(self.inner.name(), usage);
        }
        Ok(resp)
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.run(|| self.inner.embeddings(req)).await
    }

    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        self.run(|| self.inner.audio(req)).await
    }

    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        self.run(|| self.inner.image(req)).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.run(|| self.inner.list_models()).await
    }
}
