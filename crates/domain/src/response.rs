use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete (non-streaming) text response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResponse {
    pub id: String,
    pub model: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created: DateTime<Utc>,
}

impl TextResponse {
    /// An empty response with `finish_reason = stop`, used when a provider
    /// returns no content blocks.
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: model.into(),
            text: String::new(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: None,
            created: Utc::now(),
        }
    }
}

/// An incremental tool-call fragment carried by a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub id: String,
    pub name: String,
    /// Raw argument fragment (concatenated by the merger).
    pub arguments: String,
}

/// A single increment emitted by a streaming call.
///
/// The terminal chunk either carries a `finish_reason` or the stream closes
/// cleanly. Provider-sent error events set `error` (non-fatal for merging);
/// transport and transformer failures are `Err` items on the stream itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Chunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.model.is_none()
            && self.delta.is_none()
            && self.tool_call.is_none()
            && self.finish_reason.is_none()
            && self.usage.is_none()
            && self.error.is_none()
    }
}

/// Structured-output response: the parsed data plus the usage of the
/// underlying completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub id: String,
    pub model: String,
    pub data: serde_json::Value,
    /// The raw text the data was parsed from (tool arguments or JSON body).
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StructuredResponse {
    /// Deserialize the parsed data into a caller type.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            crate::error::Error::validation(format!("structured data does not match type: {e}"))
                .with_cause(e)
        })
    }
}

/// One embedding vector, ordered by input index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub index: usize,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    pub model: String,
    pub embeddings: Vec<Embedding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Audio response: TTS fills `audio`, STT fills `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResponse {
    pub model: String,
    #[serde(skip)]
    pub audio: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub model: String,
    pub images: Vec<GeneratedImage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_totals_prompt_plus_completion() {
        let usage = Usage::new(10, 32);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn empty_response_finishes_with_stop() {
        let resp = TextResponse::empty("gpt-4o");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert!(resp.text.is_empty());
    }

    #[test]
    fn default_chunk_is_empty() {
        assert!(Chunk::default().is_empty());
        assert!(!Chunk::text("hi").is_empty());
    }

    #[test]
    fn structured_response_parses_into_type() {
        #[derive(serde::Deserialize)]
        struct Person {
            name: String,
            age: u32,
        }
        let resp = StructuredResponse {
            id: "r1".into(),
            model: "m".into(),
            data: serde_json::json!({"name": "John Doe", "age": 30}),
            raw: String::new(),
            usage: None,
        };
        let person: Person = resp.parse().unwrap();
        assert_eq!(person.name, "John Doe");
        assert_eq!(person.age, 30);
    }

    #[test]
    fn structured_response_parse_mismatch_is_validation() {
        let resp = StructuredResponse {
            id: "r1".into(),
            model: "m".into(),
            data: serde_json::json!({"name": 7}),
            raw: String::new(),
            usage: None,
        };
        let err = resp.parse::<Vec<String>>().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Validation);
    }
}
