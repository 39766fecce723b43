//! Canonical, provider-agnostic data model shared by all wormhole crates.
//!
//! Everything a provider adapter consumes or produces crosses this crate's
//! types: messages, tools, the request/response kinds, streaming chunks, the
//! canonical error taxonomy, capability tags, and configuration. Adapters
//! translate between these shapes and each provider's wire format; nothing
//! provider-specific lives here.

pub mod capability;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod redact;
pub mod request;
pub mod response;
pub mod rng;
pub mod stream;
pub mod tool;
pub mod trace;

pub use capability::{Capability, CapabilitySet};
pub use error::{Error, ErrorCode, Result};
pub use message::{ContentPart, Message, MessageContent, Role};
pub use model::ModelInfo;
pub use request::{
    AudioJob, AudioRequest, BaseRequest, EmbeddingsRequest, ImageRequest, StructuredMode,
    StructuredRequest, TextRequest,
};
pub use response::{
    AudioResponse, Chunk, Embedding, EmbeddingsResponse, FinishReason, GeneratedImage,
    ImageResponse, StructuredResponse, TextResponse, ToolCallDelta, Usage,
};
pub use stream::{merge_chunks, BoxStream, ChunkStream};
pub use tool::{ToolCall, ToolChoice, ToolDefinition};
