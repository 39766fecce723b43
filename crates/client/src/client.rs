//! The client façade: provider registry, capability dispatch, middleware
//! assembly, and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use wh_discovery::ModelDiscovery;
use wh_domain::config::{
    CacheConfig, EnvDefaults, ProviderConfig, ResilienceConfig, RetryConfig,
};
use wh_domain::error::{Error, Result};
use wh_domain::redact::{sanitize_error, SanitizeLevel};
use wh_domain::request::{
    AudioRequest, EmbeddingsRequest, ImageRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, EmbeddingsResponse, ImageResponse, StructuredResponse, TextResponse,
};
use wh_domain::stream::ChunkStream;
use wh_domain::{Capability, ModelInfo};
use wh_providers::{Provider, ProviderRegistry};
use wh_resilience::{compose, MetricsRegistry, MetricsSnapshot};

use crate::builder::{
    AudioBuilder, EmbeddingsBuilder, ImageBuilder, StructuredBuilder, TextBuilder,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ClientBuilder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fluent builder for [`Client`].
pub struct ClientBuilder {
    configs: Vec<ProviderConfig>,
    custom: Vec<(String, Arc<dyn Provider>)>,
    default_provider: Option<String>,
    resilience: ResilienceConfig,
    transport_retry: Option<RetryConfig>,
    cache: Option<CacheConfig>,
    sanitize: SanitizeLevel,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            custom: Vec::new(),
            default_provider: None,
            resilience: ResilienceConfig::default(),
            transport_retry: None,
            cache: None,
            sanitize: SanitizeLevel::Basic,
        }
    }

    /// Register a provider from config. The first registered provider
    /// becomes the default unless [`Self::default_provider`] overrides it.
    pub fn provider(mut self, config: ProviderConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Register an already-constructed adapter (custom backends, tests).
    pub fn register(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.custom.push((name.into(), provider));
        self
    }

    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Configure the middleware stack (retry, breaker, rate limit,
    /// failover, balancer, metrics).
    pub fn resilience(mut self, config: ResilienceConfig) -> Self {
        self.resilience = config;
        self
    }

    /// Override the transport-level retry policy (defaults honor the
    /// `WORMHOLE_*` environment variables).
    pub fn transport_retry(mut self, config: RetryConfig) -> Self {
        self.transport_retry = Some(config);
        self
    }

    /// Enable the model-discovery cache.
    pub fn discovery(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// How aggressively outward error messages are scrubbed.
    pub fn sanitize(mut self, level: SanitizeLevel) -> Self {
        self.sanitize = level;
        self
    }

    pub fn build(self) -> Result<Client> {
        let env = EnvDefaults::from_env();
        let transport_retry = self
            .transport_retry
            .unwrap_or_else(|| RetryConfig::from_env_defaults(&env));

        let default_provider = self
            .default_provider
            .or_else(|| self.configs.first().map(|c| c.name.clone()))
            .or_else(|| self.custom.first().map(|(name, _)| name.clone()))
            .ok_or_else(|| Error::validation("no providers registered"))?;

        let registry = Arc::new(ProviderRegistry::from_configs(
            &self.configs,
            transport_retry,
        ));
        for (name, provider) in self.custom {
            registry.register(name, provider);
        }
        if registry.is_empty() {
            return Err(Error::validation(
                "no providers initialized; check credentials and configs",
            ));
        }

        let metrics = self
            .resilience
            .metrics
            .then(|| Arc::new(MetricsRegistry::new()));

        // Compose the middleware stack once per provider; chains are
        // immutable after build and shared by all concurrent requests.
        let mut stacks: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for name in registry.names() {
            let adapter = registry.resolve(&name)?;
            let fallbacks: Vec<Arc<dyn Provider>> = self
                .resilience
                .fallbacks
                .iter()
                .filter(|f| f.as_str() != name)
                .filter_map(|f| registry.get(f))
                .collect();
            stacks.insert(
                name.clone(),
                compose(adapter, fallbacks, None, &self.resilience, metrics.clone()),
            );
        }

        let discovery = self
            .cache
            .map(|config| ModelDiscovery::start(registry.clone(), config));

        Ok(Client {
            registry,
            stacks: RwLock::new(stacks),
            default_provider,
            metrics,
            discovery,
            sanitize: self.sanitize,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The provider-agnostic LLM client.
pub struct Client {
    registry: Arc<ProviderRegistry>,
    stacks: RwLock<HashMap<String, Arc<dyn Provider>>>,
    default_provider: String,
    metrics: Option<Arc<MetricsRegistry>>,
    discovery: Option<Arc<ModelDiscovery>>,
    sanitize: SanitizeLevel,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("default_provider", &self.default_provider)
            .field("sanitize", &self.sanitize)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve the middleware-wrapped provider and validate the requested
    /// capability before any network I/O.
    fn dispatch(&self, using: Option<&str>, capability: Capability) -> Result<Arc<dyn Provider>> {
        let name = using.unwrap_or(&self.default_provider);
        let provider = self
            .stacks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::validation(format!("unknown provider '{name}'")))?;
        if !provider.capabilities().contains(capability) {
            return Err(Error::validation(format!(
                "provider '{name}' does not support {capability:?}"
            ))
            .with_provider(name));
        }
        tracing::debug!(provider = %name, capability = ?capability, "dispatching request");
        Ok(provider)
    }

    fn scrub(&self, e: Error) -> Error {
        sanitize_error(e, self.sanitize)
    }

    // ── Request builders ───────────────────────────────────────────

    pub fn text(&self) -> TextBuilder<'_> {
        TextBuilder::new(self)
    }

    pub fn structured(&self) -> StructuredBuilder<'_> {
        StructuredBuilder::new(self)
    }

    pub fn embeddings(&self) -> EmbeddingsBuilder<'_> {
        EmbeddingsBuilder::new(self)
    }

    pub fn audio(&self) -> AudioBuilder<'_> {
        AudioBuilder::new(self)
    }

    pub fn image(&self) -> ImageBuilder<'_> {
        ImageBuilder::new(self)
    }

    // ── Direct operations ──────────────────────────────────────────

    pub async fn send_text(&self, using: Option<&str>, req: TextRequest) -> Result<TextResponse> {
        req.validate().map_err(|e| self.scrub(e))?;
        let provider = self.dispatch(using, Capability::Text)?;
        provider.text(req).await.map_err(|e| self.scrub(e))
    }

    pub async fn send_stream(&self, using: Option<&str>, req: TextRequest) -> Result<ChunkStream> {
        req.validate().map_err(|e| self.scrub(e))?;
        let provider = self.dispatch(using, Capability::Text)?;
        provider.stream(req).await.map_err(|e| self.scrub(e))
    }

    pub async fn send_structured(
        &self,
        using: Option<&str>,
        req: StructuredRequest,
    ) -> Result<StructuredResponse> {
        let provider = self.dispatch(using, Capability::Structured)?;
        provider.structured(req).await.map_err(|e| self.scrub(e))
    }

    pub async fn send_embeddings(
        &self,
        using: Option<&str>,
        req: EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse> {
        let provider = self.dispatch(using, Capability::Embeddings)?;
        provider.embeddings(req).await.map_err(|e| self.scrub(e))
    }

    pub async fn send_audio(&self, using: Option<&str>, req: AudioRequest) -> Result<AudioResponse> {
        let provider = self.dispatch(using, Capability::Audio)?;
        provider.audio(req).await.map_err(|e| self.scrub(e))
    }

    pub async fn send_image(&self, using: Option<&str>, req: ImageRequest) -> Result<ImageResponse> {
        let provider = self.dispatch(using, Capability::Images)?;
        provider.image(req).await.map_err(|e| self.scrub(e))
    }

    /// Model listing: through the discovery cache when enabled, otherwise
    /// straight from the adapter.
    pub async fn models(&self, using: Option<&str>) -> Result<Vec<ModelInfo>> {
        let name = using.unwrap_or(&self.default_provider);
        match &self.discovery {
            Some(discovery) => {
                let (models, _fresh) = discovery.models(name).await.map_err(|e| self.scrub(e))?;
                Ok(models)
            }
            None => {
                let provider = self.registry.resolve(name)?;
                provider.list_models().await.map_err(|e| self.scrub(e))
            }
        }
    }

    /// Current metrics snapshot, when the metrics middleware is enabled.
    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(|m| m.snapshot())
    }

    /// Shut down background services (discovery tickers). Idempotent.
    pub async fn close(&self) {
        if let Some(discovery) = &self.discovery {
            discovery.close().await;
        }
    }
}
