//! Sequential provider failover.
//!
//! Attempts the configured primary; on a retryable failure tries each
//! fallback provider in order until one succeeds or all fail. Errors the
//! caller can fix (Auth, Request, Model, Validation) short-circuit: no
//! fallback would change the outcome. Fallbacks are never tried
//! concurrently.

use std::sync::Arc;

use wh_domain::error::{Error, Result};
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

pub struct FailoverProvider {
    primary: Arc<dyn Provider>,
    fallbacks: Vec<Arc<dyn Provider>>,
}

impl FailoverProvider {
    pub fn new(primary: Arc<dyn Provider>, fallbacks: Vec<Arc<dyn Provider>>) -> Self {
        Self { primary, fallbacks }
    }

    async fn run<'a, T, F, Fut>(&'a self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + 'a,
    {
        let mut last_error: Option<Error> = None;

        for (index, provider) in std::iter::once(&self.primary)
            .chain(self.fallbacks.iter())
            .enumerate()
        {
            if index > 0 {
                TraceEvent::Failover {
                    from_provider: self.primary.name().to_string(),
                    to_provider: provider.name().to_string(),
                    reason: last_error
                        .as_ref()
                        .map(|e| e.message.clone())
                        .unwrap_or_default(),
                }
                .emit();
            }

            match op(provider.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable => {
                    tracing::warn!(
                        provider = %provider.name(),
                        error = %e,
                        "provider failed, trying next fallback"
                    );
                    last_error = Some(e);
                }
                // Auth/Request/Model/Validation: fallback cannot help.
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::middleware("failover configured with no providers")
        }))
    }
}

#[async_trait::async_trait]
impl Provider for FailoverProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.primary.capabilities()
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
