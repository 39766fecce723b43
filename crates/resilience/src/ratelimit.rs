//! Per-provider token-bucket rate limiter.
//!
//! Outermost middleware: a request blocks until a token is available, so no
//! downstream work (circuit state, retries, network) is spent while over
//! the limit. Dropping the caller's future cancels the wait.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use wh_domain::config::RateLimitConfig;
use wh_domain::error::Result;
use wh_domain::model::ModelInfo;
use wh_domain::request::{
    AudioRequest, EmbeddingsRequest, ImageRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse,
};
use wh_domain::stream::ChunkStream;
use wh_domain::trace::TraceEvent;
use wh_domain::CapabilitySet;
use wh_providers::Provider;

/// Classic token bucket: `capacity` burst, `refill_per_sec` sustained.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            capacity: config.capacity as f64,
            refill_per_sec: config.refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: config.capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token or compute how long until one is available.
    fn try_take(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock();
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }

    /// Block until a token is available. Cancellation (dropping the future)
    /// pre-empts the wait; no token is consumed in that case.
    pub async fn acquire(&self) -> Duration {
        let start = Instant::now();
        loop {
            match self.try_take() {
                Ok(()) => return start.elapsed(),
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

pub struct RateLimitedProvider {
    inner: Arc<dyn Provider>,
    bucket: TokenBucket,
}

impl RateLimitedProvider {
    pub fn new(inner: Arc<dyn Provider>, config: RateLimitConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config),
            inner,
        }
    }

    async fn wait(&self) {
        let waited = self.bucket.acquire().await;
        if waited > Duration::from_millis(1) {
            TraceEvent::RateLimited {
                provider: self.inner.name().to_string(),
                waited_ms: waited.as_millis() as u64,
            }
            .emit();
        }
    }
}

#[async_trait::async_trait]
impl Provider for RateLimitedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        self.wait().await;
        self.inner.text(req).await
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        self.wait().await;
        self.inner.stream(req).await
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        self.wait().await;
        self.inner.structured(req).await
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.wait().await;
        self.inner.embeddings(req).await
    }

    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        self.wait().await;
        self.inner.audio(req).await
    }

    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        self.wait().await;
        self.inner.image(req).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.wait().await;
        self.inner.list_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_up_to_capacity_is_immediate() {
        let bucket = TokenBucket::new(RateLimitConfig {
            capacity: 3,
            refill_per_sec: 1.0,
        });
        for _ in 0..3 {
            assert!(bucket.try_take().is_ok());
        }
        assert!(bucket.try_take().is_err());
    }

    #[tokio::test]
    async fn acquire_blocks_until_refill() {
        let bucket = TokenBucket::new(RateLimitConfig {
            capacity: 1,
            refill_per_sec: 20.0, // one token every 50ms
        });
        assert!(bucket.try_take().is_ok());

        let start = Instant::now();
        let waited = bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40), "did not block");
        assert!(waited >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn refill_does_not_exceed_capacity() {
        let bucket = TokenBucket::new(RateLimitConfig {
            capacity: 2,
            refill_per_sec: 1000.0,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Far more than 2 tokens' worth of refill elapsed; capacity caps.
        assert!(bucket.try_take().is_ok());
        assert!(bucket.try_take().is_ok());
        assert!(bucket.try_take().is_err());
    }
}
