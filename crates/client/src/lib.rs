//! Wormhole: one client surface over many LLM inference providers.
//!
//! A provider-agnostic request/response model, per-provider adapters
//! (OpenAI-compatible, Anthropic, Google Gemini, Ollama), and the
//! operational layers a production caller needs: cached TLS transports,
//! jittered retries, circuit breaking, rate limiting, failover, load
//! balancing, metrics, and a persistent model-discovery cache.
//!
//! ```rust,no_run
//! # use wormhole::{Client, ProviderConfig, ProviderKind};
//! # async fn demo() -> wormhole::Result<()> {
//! let client = Client::builder()
//!     .provider(
//!         ProviderConfig::new("openai", ProviderKind::Openai)
//!             .with_key_env("OPENAI_API_KEY"),
//!     )
//!     .build()?;
//!
//! let resp = client
//!     .text()
//!     .model("gpt-4o")
//!     .system("You are terse.")
//!     .user("Why is the sky blue?")
//!     .send()
//!     .await?;
//! println!("{}", resp.text);
//! # client.close().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;

pub use builder::{
    AudioBuilder, EmbeddingsBuilder, ImageBuilder, StructuredBuilder, TextBuilder,
};
pub use client::{Client, ClientBuilder};

// The canonical model is the public vocabulary of this crate.
pub use wh_domain::config::{
    AuthConfig, AuthMode, BalancePolicy, BalancerConfig, BreakerConfig, CacheConfig, HttpConfig,
    ProviderConfig, ProviderKind, RateLimitConfig, ResilienceConfig, RetryConfig, TlsPreset,
};
pub use wh_domain::redact::SanitizeLevel;
pub use wh_domain::{
    merge_chunks, AudioJob, AudioRequest, AudioResponse, BaseRequest, BoxStream, Capability,
    CapabilitySet, Chunk, ChunkStream, Embedding, EmbeddingsRequest, EmbeddingsResponse, Error,
    ErrorCode, FinishReason, GeneratedImage, ImageRequest, ImageResponse, Message, MessageContent,
    ModelInfo, Result, Role, StructuredMode, StructuredRequest, StructuredResponse, TextRequest,
    TextResponse, ToolCall, ToolCallDelta, ToolChoice, ToolDefinition, Usage,
};
pub use wh_providers::{Provider, ProviderRegistry};
pub use wh_resilience::MetricsSnapshot;
