use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{validate_messages, Message};
use crate::tool::{ToolChoice, ToolDefinition};

/// Fields common to every request kind.
///
/// Requests are immutable once handed to the pipeline; the fluent builders
/// in the façade crate accumulate into these shapes and freeze them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Provider-specific escape hatch; merged verbatim into the wire body.
    /// Opaque to the core.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub provider_options: HashMap<String, serde_json::Value>,
}

/// A chat/text completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
}

impl TextRequest {
    /// Validate the request before any network I/O.
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(crate::error::Error::validation("messages must not be empty"));
        }
        validate_messages(&self.messages)
    }
}

/// How structured output is obtained from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredMode {
    /// The provider's native JSON response-format flag.
    #[default]
    Json,
    /// Synthesize a tool carrying the schema and force the model to call it.
    Tools,
}

/// A request for schema-conforming output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub messages: Vec<Message>,
    /// Free-form JSON Schema the response must conform to.
    pub schema: serde_json::Value,
    /// Name given to the synthesized tool in `Tools` mode.
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    #[serde(default)]
    pub mode: StructuredMode,
}

fn default_schema_name() -> String {
    "structured_output".to_string()
}

/// A request for text embeddings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub input: Vec<String>,
    /// Requested vector dimensionality, where the provider supports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

/// The two audio job kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioJob {
    /// Text-to-speech.
    Speech {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    /// Speech-to-text. `data` is the raw audio payload; `filename` drives
    /// multipart content-type inference.
    Transcribe {
        #[serde(skip)]
        data: Vec<u8>,
        filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub job: AudioJob,
}

/// An image-generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Number of images to generate (provider default when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u8>,
}
