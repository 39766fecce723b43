use wh_domain::error::{Error, Result};
use wh_domain::model::ModelInfo;
use wh_domain::request::{
    AudioRequest, EmbeddingsRequest, ImageRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse,
};
use wh_domain::stream::ChunkStream;
use wh_domain::CapabilitySet;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every backend adapter implements.
///
/// Operations are optional per capability: an adapter overrides the ones its
/// backend supports and leaves the rest on the default implementations,
/// which fail fast with a `Validation` error before any network I/O.
/// Callers dispatch by [`CapabilitySet`], never by concrete adapter type.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// The registry name of this provider instance.
    fn name(&self) -> &str;

    /// The advertised capabilities of this adapter.
    fn capabilities(&self) -> CapabilitySet;

    /// Send a chat completion request and wait for the full response.
    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        let _ = req;
        Err(self.unsupported("text generation"))
    }

    /// Send a chat completion request and return a stream of chunks.
    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        let _ = req;
        Err(self.unsupported("streaming"))
    }

    /// Request schema-conforming output.
    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        let _ = req;
        Err(self.unsupported("structured output"))
    }

    /// Generate text embeddings.
    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let _ = req;
        Err(self.unsupported("embeddings"))
    }

    /// Text-to-speech or speech-to-text.
    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        let _ = req;
        Err(self.unsupported("audio"))
    }

    /// Generate images.
    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        let _ = req;
        Err(self.unsupported("image generation"))
    }

    /// List the models this provider currently serves.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Err(self.unsupported("model listing"))
    }

    /// The fail-fast error for operations outside this adapter's
    /// capabilities.
    fn unsupported(&self, what: &str) -> Error {
        Error::validation(format!("provider '{}' does not support {}", self.name(), what))
            .with_provider(self.name())
    }
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
