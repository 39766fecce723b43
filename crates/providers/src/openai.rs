//! OpenAI-compatible adapter.
//!
//! Covers the full capability surface: chat, streaming, structured output
//! (JSON mode or synthesized tool), embeddings, audio (TTS + STT), image
//! generation, and model listing. The wire helpers are shared with the
//! Ollama adapter, which speaks the same chat-completions contract.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use wh_domain::config::{ProviderConfig, RetryConfig};
use wh_domain::error::{Error, Result};
use wh_domain::message::{ContentPart, Message, MessageContent, Role};
use wh_domain::request::{
    AudioJob, AudioRequest, BaseRequest, EmbeddingsRequest, ImageRequest, StructuredMode,
    StructuredRequest, TextRequest,
};
use wh_domain::response::{
    AudioResponse, Chunk, Embedding, EmbeddingsResponse, FinishReason, GeneratedImage,
    ImageResponse, StructuredResponse, TextResponse, ToolCallDelta, Usage,
};
use wh_domain::stream::ChunkStream;
use wh_domain::tool::{ToolCall, ToolChoice, ToolDefinition};
use wh_domain::{Capability, CapabilitySet, ModelInfo};

use crate::base::RequestExecutor;
use crate::multipart::transcription_form;
use crate::sse::chunk_pipeline;
use crate::structured::{parse_json_output, parse_tool_arguments};
use crate::traits::Provider;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct OpenAiProvider {
    exec: RequestExecutor,
    default_model: String,
    capabilities: CapabilitySet,
}

impl OpenAiProvider {
    pub fn from_config(config: &ProviderConfig, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            exec: RequestExecutor::new(config, DEFAULT_BASE_URL, retry)?,
            default_model: config
                .default_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.into()),
            capabilities: CapabilitySet::new(&[
                Capability::Text,
                Capability::Chat,
                Capability::Functions,
                Capability::Structured,
                Capability::Embeddings,
                Capability::Vision,
                Capability::Images,
                Capability::Audio,
            ]),
        })
    }

    fn model_of(&self, base: &BaseRequest) -> String {
        if base.model.is_empty() {
            self.default_model.clone()
        } else {
            base.model.clone()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request building (shared with the Ollama adapter)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn content_to_openai(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(t) => Value::String(t.clone()),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Image { data, .. } => {
                        json!({"type": "image_url", "image_url": {"url": data}})
                    }
                    ContentPart::Audio { data, media_type } => json!({
                        "type": "input_audio",
                        "input_audio": {
                            "data": data,
                            "format": media_type.as_deref().unwrap_or("wav"),
                        }
                    }),
                    ContentPart::Document { data, .. } => {
                        json!({"type": "text", "text": data})
                    }
                })
                .collect(),
        ),
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.content.extract_all_text(),
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let text = msg.content.extract_all_text();
            json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                "tool_calls": calls,
            })
        }
        _ => json!({
            "role": role_to_str(msg.role),
            "content": content_to_openai(&msg.content),
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::None => json!("none"),
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::Specific(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

/// Apply the base-request knobs plus the provider-options escape hatch.
pub(crate) fn apply_base_options(body: &mut Value, base: &BaseRequest) {
    if let Some(t) = base.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = base.top_p {
        body["top_p"] = json!(p);
    }
    if let Some(m) = base.max_tokens {
        body["max_tokens"] = json!(m);
    }
    if !base.stop.is_empty() {
        body["stop"] = json!(base.stop);
    }
    if let Some(seed) = base.seed {
        body["seed"] = json!(seed);
    }
    for (k, v) in &base.provider_options {
        body[k.as_str()] = v.clone();
    }
}

pub(crate) fn build_chat_body(req: &TextRequest, model: &str, stream: bool) -> Value {
    let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": stream,
    });
    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_openai).collect());
        body["tool_choice"] = tool_choice_to_openai(&req.tool_choice);
    }
    if stream {
        body["stream_options"] = json!({"include_usage": true});
    }
    apply_base_options(&mut body, &req.base);
    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing (shared with the Ollama adapter)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn map_finish_reason(raw: &str) -> FinishReason {
    match raw {
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

pub(crate) fn parse_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("prompt_tokens")?.as_u64()? as u32;
    let completion = v
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    Some(Usage::new(prompt, completion))
}

fn parse_tool_calls(v: &Value) -> Vec<ToolCall> {
    v.as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|c| ToolCall {
                    id: c["id"].as_str().unwrap_or_default().to_string(),
                    name: c["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments: parse_tool_arguments(&c["function"]["arguments"]),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_chat_response(v: &Value) -> Result<TextResponse> {
    let choice = v["choices"]
        .get(0)
        .ok_or_else(|| Error::provider("response carries no choices"))?;
    let message = &choice["message"];

    let created = v["created"]
        .as_i64()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let tool_calls = parse_tool_calls(&message["tool_calls"]);
    let finish_reason = match choice["finish_reason"].as_str() {
        Some(raw) => map_finish_reason(raw),
        None if !tool_calls.is_empty() => FinishReason::ToolCalls,
        None => FinishReason::Stop,
    };

    Ok(TextResponse {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        model: v["model"].as_str().unwrap_or_default().to_string(),
        text: message["content"].as_str().unwrap_or_default().to_string(),
        tool_calls,
        finish_reason,
        usage: parse_usage(&v["usage"]),
        created,
    })
}

/// Stream-chunk transformer: one SSE `data` payload → zero or one chunks.
///
/// OpenAI sends a tool call's id only on its first fragment; the index→id
/// map carries continuity across fragments.
pub(crate) fn stream_transformer() -> impl FnMut(&str) -> Result<Option<Chunk>> + Send + 'static {
    let mut call_ids: HashMap<u64, (String, String)> = HashMap::new();

    move |data: &str| {
        let v: Value = serde_json::from_str(data)?;
        let mut chunk = Chunk {
            id: v["id"].as_str().map(str::to_string),
            model: v["model"].as_str().map(str::to_string),
            usage: parse_usage(&v["usage"]),
            ..Default::default()
        };

        let Some(choice) = v["choices"].get(0) else {
            // Usage-only trailer (stream_options) or keep-alive.
            return Ok((!chunk.is_empty()).then_some(chunk));
        };

        let delta = &choice["delta"];
        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                chunk.delta = Some(text.to_string());
            }
        }
        if let Some(calls) = delta["tool_calls"].as_array() {
            if let Some(c) = calls.first() {
                let index = c["index"].as_u64().unwrap_or(0);
                let entry = call_ids.entry(index).or_default();
                if let Some(id) = c["id"].as_str() {
                    entry.0 = id.to_string();
                }
                if let Some(name) = c["function"]["name"].as_str() {
                    entry.1 = name.to_string();
                }
                chunk.tool_call = Some(ToolCallDelta {
                    id: entry.0.clone(),
                    name: entry.1.clone(),
                    arguments: c["function"]["arguments"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
        if let Some(reason) = choice["finish_reason"].as_str() {
            chunk.finish_reason = Some(map_finish_reason(reason));
        }

        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        self.exec.provider()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        req.validate()?;
        let body = build_chat_body(&req, &self.model_of(&req.base), false);
        tracing::debug!(provider = %self.name(), model = %body["model"], "chat request");
        let v = self.exec.post_json("/v1/chat/completions", &body).await?;
        parse_chat_response(&v).map_err(|e| e.with_provider(self.name()))
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        req.validate()?;
        let body = build_chat_body(&req, &self.model_of(&req.base), true);
        tracing::debug!(provider = %self.name(), model = %body["model"], "stream request");
        let response = self.exec.post_stream("/v1/chat/completions", &body).await?;
        Ok(chunk_pipeline(response, self.name(), stream_transformer()))
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        let model = self.model_of(&req.base);
        match req.mode {
            StructuredMode::Json => {
                let mut messages = req.messages.clone();
                messages.insert(
                    0,
                    Message::system(format!(
                        "Respond with a single JSON object conforming to this JSON schema:\n{}",
                        req.schema
                    )),
                );
                let text_req = TextRequest {
                    base: req.base.clone(),
                    messages,
                    tools: Vec::new(),
                    tool_choice: ToolChoice::None,
                };
                let mut body = build_chat_body(&text_req, &model, false);
                body["response_format"] = json!({"type": "json_object"});
                let v = self.exec.post_json("/v1/chat/completions", &body).await?;
                let resp = parse_chat_response(&v)?;
                let data =
                    parse_json_output(&resp.text).map_err(|e| e.with_provider(self.name()))?;
                Ok(StructuredResponse {
                    id: resp.id,
                    model: resp.model,
                    data,
                    raw: resp.text,
                    usage: resp.usage,
                })
            }
            StructuredMode::Tools => {
                let text_req = TextRequest {
                    base: req.base.clone(),
                    messages: req.messages.clone(),
                    tools: vec![synthesized_tool(&req)],
                    tool_choice: ToolChoice::Specific(req.schema_name.clone()),
                };
                let body = build_chat_body(&text_req, &model, false);
                let v = self.exec.post_json("/v1/chat/completions", &body).await?;
                let resp = parse_chat_response(&v)?;
                structured_from_tool_call(resp, &req.schema_name)
                    .map_err(|e| e.with_provider(self.name()))
            }
        }
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let mut body = json!({
            "model": self.model_of(&req.base),
            "input": req.input,
        });
        if let Some(dims) = req.dimensions {
            body["dimensions"] = json!(dims);
        }
        let v = self.exec.post_json("/v1/embeddings", &body).await?;

        let embeddings = v["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| Embedding {
                        index: row["index"].as_u64().unwrap_or(0) as usize,
                        vector: row["embedding"]
                            .as_array()
                            .map(|xs| {
                                xs.iter()
                                    .filter_map(Value::as_f64)
                                    .map(|x| x as f32)
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(EmbeddingsResponse {
            model: v["model"].as_str().unwrap_or_default().to_string(),
            embeddings,
            usage: parse_usage(&v["usage"]),
        })
    }

    async fn audio(&self, req: AudioRequest) -> Result<AudioResponse> {
        let model = self.model_of(&req.base);
        match &req.job {
            AudioJob::Speech { text, voice, format } => {
                let body = json!({
                    "model": model,
                    "input": text,
                    "voice": voice.as_deref().unwrap_or("alloy"),
                    "response_format": format.as_deref().unwrap_or("mp3"),
                });
                let bytes = self.exec.post_binary("/v1/audio/speech", &body).await?;
                Ok(AudioResponse {
                    model,
                    audio: Some(bytes),
                    text: None,
                    format: format.clone().or_else(|| Some("mp3".into())),
                })
            }
            AudioJob::Transcribe {
                data,
                filename,
                language,
            } => {
                let v = self
                    .exec
                    .post_multipart("/v1/audio/transcriptions", || {
                        transcription_form(data.clone(), filename, &model, language.as_deref())
                            .unwrap_or_else(|_| reqwest::multipart::Form::new())
                    })
                    .await?;
                Ok(AudioResponse {
                    model,
                    audio: None,
                    text: v["text"].as_str().map(str::to_string),
                    format: None,
                })
            }
        }
    }

    async fn image(&self, req: ImageRequest) -> Result<ImageResponse> {
        let model = self.model_of(&req.base);
        let mut body = json!({
            "model": model,
            "prompt": req.prompt,
        });
        if let Some(size) = &req.size {
            body["size"] = json!(size);
        }
        if let Some(quality) = &req.quality {
            body["quality"] = json!(quality);
        }
        if let Some(count) = req.count {
            body["n"] = json!(count);
        }
        let v = self.exec.post_json("/v1/images/generations", &body).await?;

        let images = v["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| GeneratedImage {
                        url: row["url"].as_str().map(str::to_string),
                        b64: row["b64_json"].as_str().map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ImageResponse { model, images })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let v = self.exec.get_json("/v1/models").await?;
        let models = v["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row["id"].as_str())
                    .map(|id| {
                        ModelInfo::new(id, self.name())
                            .with_capabilities(infer_capabilities(id))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}

/// Capability heuristics for model listings that carry no capability
/// metadata of their own.
fn infer_capabilities(id: &str) -> CapabilitySet {
    if id.contains("embed") {
        return CapabilitySet::new(&[Capability::Embeddings]);
    }
    if id.contains("whisper") || id.contains("tts") {
        return CapabilitySet::new(&[Capability::Audio]);
    }
    if id.contains("dall-e") || id.contains("image") {
        return CapabilitySet::new(&[Capability::Images]);
    }
    CapabilitySet::new(&[
        Capability::Text,
        Capability::Chat,
        Capability::Functions,
        Capability::Structured,
    ])
}

pub(crate) fn synthesized_tool(req: &StructuredRequest) -> ToolDefinition {
    ToolDefinition {
        name: req.schema_name.clone(),
        description: "Return the structured output.".into(),
        parameters: req.schema.clone(),
    }
}

pub(crate) fn structured_from_tool_call(
    resp: TextResponse,
    schema_name: &str,
) -> Result<StructuredResponse> {
    let call = resp
        .tool_calls
        .iter()
        .find(|c| c.name == schema_name)
        .or_else(|| resp.tool_calls.first())
        .ok_or_else(|| Error::provider("response carries no tool call with structured output"))?;
    Ok(StructuredResponse {
        raw: call.arguments.to_string(),
        data: call.arguments.clone(),
        id: resp.id.clone(),
        model: resp.model.clone(),
        usage: resp.usage,
    })
}
