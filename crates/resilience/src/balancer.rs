//! Endpoint load balancer.
//!
//! Selects one endpoint from a healthy pool per call. Policies:
//! round-robin (atomic cursor), random (secure RNG), adaptive (latency EWMA
//! weighted by success rate). An endpoint is excluded after the configured
//! consecutive failures and re-admitted for a single trial once the probe
//! interval elapses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use wh_domain::config::{BalancePolicy, BalancerConfig};
use wh_domain::error::{Error, Result};
use wh_domain::model::ModelInfo;
use wh_domain::request::{
    AudioRequest, EmbeddingsRequest, ImageRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse,
};
use wh_domain::rng;
use wh_domain::stream::ChunkStream;
use wh_domain::CapabilitySet;
use wh_providers::Provider;

/// EWMA smoothing factor for observed latency.
const LATENCY_ALPHA: f64 = 0.3;

#[derive(Debug)]
struct EndpointStats {
    consecutive_failures: u32,
    excluded_since: Option<Instant>,
    ewma_latency_ms: f64,
    successes: u64,
    failures: u64,
}

impl Default for EndpointStats {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            excluded_since: None,
            ewma_latency_ms: 0.0,
            successes: 0,
            failures: 0,
        }
    }
}

impl EndpointStats {
    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            return 1.0;
        }
        self.successes as f64 / total as f64
    }

    /// Higher is better: success rate over observed latency.
    fn score(&self) -> f64 {
        self.success_rate() / (self.ewma_latency_ms + 1.0)
    }
}

struct Endpoint {
    provider: Arc<dyn Provider>,
    stats: Mutex<EndpointStats>,
}

pub struct BalancedProvider {
    name: String,
    endpoints: Vec<Endpoint>,
    config: BalancerConfig,
    cursor: AtomicUsize,
}

impl BalancedProvider {
    pub fn new(
        name: impl Into<String>,
        providers: Vec<Arc<dyn Provider>>,
        config: BalancerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            endpoints: providers
                .into_iter()
                .map(|provider| Endpoint {
                    provider,
                    stats: Mutex::new(EndpointStats::default()),
                })
                .collect(),
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Whether the endpoint may serve a request right now. An excluded
    /// endpoint becomes eligible again (as a trial) once the probe interval
    /// elapses.
    fn is_eligible(&self, endpoint: &Endpoint) -> bool {
        let stats = endpoint.stats.lock();
        match stats.excluded_since {
            None => true,
            Some(since) => since.elapsed() >= Duration::from_millis(self.config.probe_interval_ms),
        }
    }

    fn pick(&self) -> Result<usize> {
        let eligible: Vec<usize> = (0..self.endpoints.len())
            .filter(|&i| self.is_eligible(&self.endpoints[i]))
            .collect();
        if eligible.is_empty() {
            return Err(Error::middleware(format!(
                "no healthy endpoints in pool '{}'",
                self.name
            ))
            .with_retryable(true));
        }

        let chosen = match self.config.policy {
            BalancePolicy::RoundRobin => {
                eligible[self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len()]
            }
            BalancePolicy::Random => eligible[rng::secure_index(eligible.len())],
            BalancePolicy::Adaptive => *eligible
                .iter()
                .max_by(|&&a, &&b| {
                    let sa = self.endpoints[a].stats.lock().score();
                    let sb = self.endpoints[b].stats.lock().score();
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(&eligible[0]),
        };
        Ok(chosen)
    }

    fn record(&self, index: usize, latency: Duration, success: bool) {
        let mut stats = self.endpoints[index].stats.lock();
        let latency_ms = latency.as_millis() as f64;
        stats.ewma_latency_ms = if stats.ewma_latency_ms == 0.0 {
            latency_ms
        } else {
            LATENCY_ALPHA * latency_ms + (1.0 - LATENCY_ALPHA) * stats.ewma_latency_ms
        };

        if success {
            stats.successes += 1;
            stats.consecutive_failures = 0;
            stats.excluded_since = None;
        } else {
            stats.failures += 1;
            stats.consecutive_failures += 1;
            if stats.consecutive_failures >= self.config.failure_threshold {
                // Keep the original exclusion time only while still failing
                // within one probe window; a failed trial restarts it.
                stats.excluded_since = Some(Instant::now());
            }
        }
    }

    async fn run<'a, T, F, Fut>(&'a self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + 'a,
    {
        let index = self.pick()?;
        let provider = self.endpoints[index].provider.clone();
        let start = Instant::now();
        let outcome = op(provider).await;
        self.record(index, start.elapsed(), outcome.is_ok());
        outcome
    }
}

#[async_trait::async_trait]
impl Provider for BalancedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        // The pool advertises what every member can serve.
        self.endpoints
            .iter()
            .map(|e| e.provider.capabilities())
            .reduce(|a, b| a.iter().filter(|c| b.contains(*c)).collect())
            .unwrap_or_default()
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        self.run(|p| {
            let req = req.clone();
            async move { p.text(req).await }
        })
        .await
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        self.run(|p| {
            let req = req.clone();
            async move { p.stream(req).await }
        })
        .await
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        self.run(|p| {
            let req = req.clone();
            async move { p.structured(req).await }
        })
        .await
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.run(|p| {
            let req = req.clone();
            async move { p.embeddings(req).await }
        })
        .await
    }

    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        self.run(|p| {
            let req = req.clone();
            async move { p.audio(req).await }
        })
        .await
    }

    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        self.run(|p| {
            let req = req.clone();
            async move { p.image(req).await }
        })
        .await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.run(|p| async move { p.list_models().await }).await
    }
}
