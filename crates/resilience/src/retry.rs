//! Application-level retry middleware.
//!
//! Transport retries (wh-providers) already cover HTTP statuses; this
//! decorator re-invokes the *entire* provider call for application-level
//! retryable errors (circuit probes, stream-open failures, provider errors
//! surfaced after body parsing). Delay policy is identical to the
//! transport engine: exponential backoff, cap, ±20% jitter.

use std::sync::Arc;
use std::time::Duration;

use wh_domain::config::RetryConfig;
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
use wh_domain::trace::TraceEvent;
use wh_domain::CapabilitySet;
use wh_providers::retry::compute_delay;
use wh_providers::Provider;

pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = compute_delay(&self.config, attempt);
        if !self.config.jitter {
            return base;
        }
        let jittered = rng::jitter(base.as_millis() as f64, 0.2)
            .min(self.config.max_delay_ms as f64)
            .max(0.0);
        Duration::from_millis(jittered as u64)
    }

    /// Re-invoke `op` until success, a non-retryable error, or exhaustion.
    /// Attempts are strictly serial; dropping the future pre-empts the
    /// pending delay.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if self.config.max_retries == 0 {
            return op().await;
        }

        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable && attempt < self.config.max_retries => {
                    let delay = self.delay_for(attempt);
                    TraceEvent::RetryAttempt {
                        provider: self.inner.name().to_string(),
                        attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                        code: e.code.to_string(),
                    }
                    .emit();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.retryable => {
                    return Err(Error::max_retries_exceeded(attempt + 1, e));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.inner.capabilities()
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        self.run(|| self.inner.text(req.clone())).await
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        // Only the stream *opening* is retried; once chunks flow, errors
        // surface in-stream.
        self.run(|| self.inner.stream(req.clone())).await
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        self.run(|| self.inner.structured(req.clone())).await
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.run(|| self.inner.embeddings(req.clone())).await
    }

    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        self.run(|| self.inner.audio(req.clone())).await
    }

    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        self.run(|| self.inner.image(req.clone())).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.run(|| self.inner.list_models()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Fails `failures` times with the given error factory, then succeeds.
    struct Flaky {
        remaining: Mutex<u32>,
        make_error: fn() -> Error,
    }

    #[async_trait::async_trait]
    impl Provider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }
        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::empty()
        }
        async fn text(&self, _req: TextRequest) -> Result<TextResponse> {
            let mut remaining = self.remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err((self.make_error)());
            }
            Ok(TextResponse::empty("m"))
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn recovers_from_retryable_errors() {
        let inner = Arc::new(Flaky {
            remaining: Mutex::new(2),
            make_error: || Error::provider("upstream 503"),
        });
        let retry = RetryProvider::new(inner, fast_config(3));
        let resp = retry.text(TextRequest::default()).await.unwrap();
        assert_eq!(resp.model, "m");
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let inner = Arc::new(Flaky {
            remaining: Mutex::new(5),
            make_error: || Error::auth("bad key"),
        });
        let retry = RetryProvider::new(inner.clone(), fast_config(3));
        let err = retry.text(TextRequest::default()).await.unwrap_err();
        assert_eq!(err.code, wh_domain::ErrorCode::Auth);
        // Only one attempt was spent.
        assert_eq!(*inner.remaining.lock(), 4);
    }

    #[tokio::test]
    async fn exhaustion_wraps_with_max_retries() {
        let inner = Arc::new(Flaky {
            remaining: Mutex::new(10),
            make_error: || Error::provider("always down"),
        });
        let retry = RetryProvider::new(inner, fast_config(2));
        let err = retry.text(TextRequest::default()).await.unwrap_err();
        assert!(err.message.contains("max retries exceeded"));
        assert_eq!(err.root().message, "always down");
    }

    #[tokio::test]
    async fn zero_retries_is_single_attempt() {
        let inner = Arc::new(Flaky {
            remaining: Mutex::new(1),
            make_error: || Error::provider("one failure"),
        });
        let retry = RetryProvider::new(inner.clone(), fast_config(0));
        assert!(retry.text(TextRequest::default()).await.is_err());
        assert_eq!(*inner.remaining.lock(), 0);
    }
}
