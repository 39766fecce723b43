//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API: system prompts travel in a
//! separate top-level `system` field, tool results become `user` messages
//! with `tool_result` content blocks, and streaming dispatches on the
//! provider's event types (`message_start`, `content_block_delta`, …).
//! Structured output is synthesized through a forced tool call, since the
//! API has no JSON mode.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};

use wh_domain::config::{ProviderConfig, RetryConfig};
use wh_domain::error::Result;
use wh_domain::message::{ContentPart, Message, MessageContent, Role};
use wh_domain::request::{BaseRequest, StructuredRequest, TextRequest};
use wh_domain::response::{
    Chunk, FinishReason, StructuredResponse, TextResponse, ToolCallDelta, Usage,
};
use wh_domain::stream::ChunkStream;
use wh_domain::tool::{ToolCall, ToolChoice, ToolDefinition};
use wh_domain::{Capability, CapabilitySet, ModelInfo};

use crate::base::RequestExecutor;
use crate::openai::{structured_from_tool_call, synthesized_tool};
use crate::sse::chunk_pipeline;
use crate::traits::Provider;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct AnthropicProvider {
    exec: RequestExecutor,
    default_model: String,
    capabilities: CapabilitySet,
}

impl AnthropicProvider {
    pub fn from_config(config: &ProviderConfig, retry: RetryConfig) -> Result<Self> {
        let mut config = config.clone();
        // The Messages API authenticates with `x-api-key`, no prefix.
        if config.auth.header.is_none() {
            config.auth.header = Some("x-api-key".into());
            config.auth.prefix = Some(String::new());
        }
        Ok(Self {
            exec: RequestExecutor::new(&config, DEFAULT_BASE_URL, retry)?
                .with_header("anthropic-version", ANTHROPIC_VERSION),
            default_model: config
                .default_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.into()),
            capabilities: CapabilitySet::new(&[
                Capability::Text,
                Capability::Chat,
                Capability::Functions,
                Capability::Structured,
                Capability::Vision,
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
// Request building
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn user_content_to_anthropic(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(t) => Value::String(t.clone()),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(json!({"type": "text", "text": text})),
                    ContentPart::Image { data, media_type } => Some(json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type.as_deref().unwrap_or("image/png"),
                            "data": data,
                        }
                    })),
                    ContentPart::Document { data, media_type } => Some(json!({
                        "type": "document",
                        "source": {
                            "type": "base64",
                            "media_type": media_type.as_deref().unwrap_or("application/pdf"),
                            "data": data,
                        }
                    })),
                    ContentPart::Audio { .. } => None,
                })
                .collect(),
        ),
    }
}

fn assistant_to_anthropic(msg: &Message) -> Value {
    let mut blocks: Vec<Value> = Vec::new();
    let text = msg.content.extract_all_text();
    if !text.is_empty() {
        blocks.push(json!({"type": "text", "text": text}));
    }
    for call in &msg.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments,
        }));
    }
    json!({"role": "assistant", "content": blocks})
}

fn tool_result_to_anthropic(msg: &Message) -> Value {
    // Tool results are user messages with tool_result content blocks.
    json!({
        "role": "user",
        "content": [{
            "type": "tool_result",
            "tool_use_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.content.extract_all_text(),
        }]
    })
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::None => None,
        ToolChoice::Auto => Some(json!({"type": "auto"})),
        ToolChoice::Any => Some(json!({"type": "any"})),
        ToolChoice::Specific(name) => Some(json!({"type": "tool", "name": name})),
    }
}

fn build_messages_body(req: &TextRequest, model: &str, stream: bool) -> Value {
    let mut system_parts: Vec<String> = Vec::new();
    let mut api_messages: Vec<Value> = Vec::new();

    for msg in &req.messages {
        match msg.role {
            // System prompts go into the separate top-level field.
            Role::System => system_parts.push(msg.content.extract_all_text()),
            Role::User => api_messages.push(json!({
                "role": "user",
                "content": user_content_to_anthropic(&msg.content),
            })),
            Role::Assistant => api_messages.push(assistant_to_anthropic(msg)),
            Role::Tool => api_messages.push(tool_result_to_anthropic(msg)),
        }
    }

    let mut body = json!({
        "model": model,
        "messages": api_messages,
        "max_tokens": req.base.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": stream,
    });
    if !system_parts.is_empty() {
        body["system"] = Value::String(system_parts.join("\n\n"));
    }
    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_anthropic).collect());
        if let Some(choice) = tool_choice_to_anthropic(&req.tool_choice) {
            body["tool_choice"] = choice;
        }
    }
    if let Some(t) = req.base.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = req.base.top_p {
        body["top_p"] = json!(p);
    }
    if !req.base.stop.is_empty() {
        body["stop_sequences"] = json!(req.base.stop);
    }
    for (k, v) in &req.base.provider_options {
        body[k.as_str()] = v.clone();
    }
    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn map_stop_reason(raw: &str) -> FinishReason {
    match raw {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
    Some(Usage::new(input, output))
}

fn parse_messages_response(v: &Value) -> Result<TextResponse> {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in v["content"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
        match block["type"].as_str().unwrap_or_default() {
            "text" => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_string());
                }
            }
            "tool_use" => tool_calls.push(ToolCall {
                id: block["id"].as_str().unwrap_or_default().to_string(),
                name: block["name"].as_str().unwrap_or_default().to_string(),
                arguments: block
                    .get("input")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default())),
            }),
            _ => {}
        }
    }

    Ok(TextResponse {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        model: v["model"].as_str().unwrap_or_default().to_string(),
        text: text_parts.concat(),
        tool_calls,
        finish_reason: v["stop_reason"]
            .as_str()
            .map(map_stop_reason)
            .unwrap_or(FinishReason::Stop),
        usage: parse_usage(&v["usage"]),
        created: Utc::now(),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State for assembling tool calls across streaming content blocks.
#[derive(Default)]
struct StreamState {
    /// block index → (call id, tool name).
    active_tools: HashMap<u64, (String, String)>,
    prompt_tokens: u32,
}

/// Event-type dispatch: one `data` payload → zero or one chunks.
///
/// `message_stop`, `ping`, and `content_block_stop` are benign skips
/// (`Ok(None)`); a `message_delta` carrying `stop_reason` produces the
/// finish chunk, so the later `message_stop` is redundant by then.
fn stream_transformer() -> impl FnMut(&str) -> Result<Option<Chunk>> + Send + 'static {
    let mut state = StreamState::default();

    move |data: &str| {
        let v: Value = serde_json::from_str(data)?;
        match v["type"].as_str().unwrap_or_default() {
            "message_start" => {
                let message = &v["message"];
                state.prompt_tokens = message["usage"]["input_tokens"]
                    .as_u64()
                    .unwrap_or(0) as u32;
                Ok(Some(Chunk {
                    id: message["id"].as_str().map(str::to_string),
                    model: message["model"].as_str().map(str::to_string),
                    ..Default::default()
                }))
            }
            "content_block_start" => {
                let index = v["index"].as_u64().unwrap_or(0);
                let block = &v["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    state.active_tools.insert(index, (id.clone(), name.clone()));
                    Ok(Some(Chunk {
                        tool_call: Some(ToolCallDelta {
                            id,
                            name,
                            arguments: String::new(),
                        }),
                        ..Default::default()
                    }))
                } else {
                    Ok(None)
                }
            }
            "content_block_delta" => {
                let index = v["index"].as_u64().unwrap_or(0);
                let delta = &v["delta"];
                match delta["type"].as_str().unwrap_or_default() {
                    "text_delta" => Ok(delta["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(Chunk::text)),
                    "input_json_delta" => {
                        let partial = delta["partial_json"].as_str().unwrap_or_default();
                        let Some((id, name)) = state.active_tools.get(&index) else {
                            return Ok(None);
                        };
                        Ok(Some(Chunk {
                            tool_call: Some(ToolCallDelta {
                                id: id.clone(),
                                name: name.clone(),
                                arguments: partial.to_string(),
                            }),
                            ..Default::default()
                        }))
                    }
                    _ => Ok(None),
                }
            }
            "message_delta" => {
                let output = v["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;
                let stop_reason = v["delta"]["stop_reason"].as_str().map(map_stop_reason);
                Ok(Some(Chunk {
                    finish_reason: stop_reason,
                    usage: Some(Usage::new(state.prompt_tokens, output)),
                    ..Default::default()
                }))
            }
            "error" => {
                let message = v["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error");
                Ok(Some(Chunk {
                    error: Some(message.to_string()),
                    ..Default::default()
                }))
            }
            // message_stop, content_block_stop, ping, unknown events.
            _ => Ok(None),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        self.exec.provider()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        req.validate()?;
        let body = build_messages_body(&req, &self.model_of(&req.base), false);
        tracing::debug!(provider = %self.name(), model = %body["model"], "messages request");
        let v = self.exec.post_json("/v1/messages", &body).await?;
        parse_messages_response(&v).map_err(|e| e.with_provider(self.name()))
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        req.validate()?;
        let body = build_messages_body(&req, &self.model_of(&req.base), true);
        tracing::debug!(provider = %self.name(), model = %body["model"], "stream request");
        let response = self.exec.post_stream("/v1/messages", &body).await?;
        Ok(chunk_pipeline(response, self.name(), stream_transformer()))
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        // No JSON mode: always synthesize a tool carrying the schema and
        // force the model to call it.
        let text_req = TextRequest {
            base: req.base.clone(),
            messages: req.messages.clone(),
            tools: vec![synthesized_tool(&req)],
            tool_choice: ToolChoice::Specific(req.schema_name.clone()),
        };
        let body = build_messages_body(&text_req, &self.model_of(&req.base), false);
        let v = self.exec.post_json("/v1/messages", &body).await?;
        let resp = parse_messages_response(&v)?;
        structured_from_tool_call(resp, &req.schema_name).map_err(|e| e.with_provider(self.name()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let v = self.exec.get_json("/v1/models").await?;
        let models = v["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let id = row["id"].as_str()?;
                        let mut info = ModelInfo::new(id, self.name())
                            .with_capabilities(self.capabilities);
                        if let Some(name) = row["display_name"].as_str() {
                            info.display_name = name.to_string();
                        }
                        Some(info)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_move_to_top_level_field() {
        let req = TextRequest {
            messages: vec![Message::system("be terse"), Message::user("hi")],
            ..Default::default()
        };
        let body = build_messages_body(&req, "claude-sonnet-4-20250514", false);
        assert_eq!(body["system"], "be terse");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn tool_results_become_user_tool_result_blocks() {
        let req = TextRequest {
            messages: vec![
                Message::user("q"),
                Message::assistant_tool_calls(
                    "",
                    vec![ToolCall {
                        id: "toolu_1".into(),
                        name: "lookup".into(),
                        arguments: json!({}),
                    }],
                ),
                Message::tool_result("toolu_1", "42"),
            ],
            ..Default::default()
        };
        let body = build_messages_body(&req, "m", false);
        let messages = body["messages"].as_array().unwrap();
        let tool_msg = &messages[2];
        assert_eq!(tool_msg["role"], "user");
        assert_eq!(tool_msg["content"][0]["type"], "tool_result");
        assert_eq!(tool_msg["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn max_tokens_defaults_when_absent() {
        let req = TextRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = build_messages_body(&req, "m", false);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn stop_sequences_are_renamed() {
        let req = TextRequest {
            base: BaseRequest {
                stop: vec!["END".into()],
                ..Default::default()
            },
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = build_messages_body(&req, "m", false);
        assert_eq!(body["stop_sequences"][0], "END");
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn parse_response_extracts_text_and_tool_use() {
        let v = json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "I'll extract the user info."},
                {"type": "tool_use", "id": "toolu_1", "name": "extract_user_info",
                 "input": {"name": "John Doe", "age": 30, "city": "New York"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 30}
        });
        let resp = parse_messages_response(&v).unwrap();
        assert_eq!(resp.text, "I'll extract the user info.");
        assert_eq!(resp.finish_reason, FinishReason::ToolCalls);
        assert_eq!(resp.tool_calls[0].name, "extract_user_info");
        assert_eq!(resp.tool_calls[0].arguments["city"], "New York");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[test]
    fn empty_content_array_is_empty_stop_response() {
        let v = json!({"id": "m", "model": "m", "content": []});
        let resp = parse_messages_response(&v).unwrap();
        assert!(resp.text.is_empty());
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn stream_dispatch_text_path() {
        let mut transform = stream_transformer();

        let opening = transform(
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4-20250514","usage":{"input_tokens":9}}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(opening.id.as_deref(), Some("msg_1"));

        let text = transform(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(text.delta.as_deref(), Some("Hello"));

        let finish = transform(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(finish.finish_reason, Some(FinishReason::Stop));
        assert_eq!(finish.usage.unwrap().total_tokens, 12);

        // message_stop after the finish chunk is a benign skip.
        assert!(transform(r#"{"type":"message_stop"}"#).unwrap().is_none());
        assert!(transform(r#"{"type":"ping"}"#).unwrap().is_none());
    }

    #[test]
    fn stream_dispatch_tool_path() {
        let mut transform = stream_transformer();
        let started = transform(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"extract"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(started.tool_call.as_ref().unwrap().name, "extract");

        let fragment = transform(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"a\":1}"}}"#,
        )
        .unwrap()
        .unwrap();
        let tc = fragment.tool_call.unwrap();
        assert_eq!(tc.id, "toolu_1");
        assert_eq!(tc.arguments, "{\"a\":1}");

        assert!(transform(r#"{"type":"content_block_stop","index":1}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn stream_error_event_becomes_error_chunk() {
        let mut transform = stream_transformer();
        let chunk = transform(r#"{"type":"error","error":{"message":"overloaded"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.error.as_deref(), Some("overloaded"));
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(map_stop_reason("end_turn"), FinishReason::Stop);
        assert_eq!(map_stop_reason("max_tokens"), FinishReason::Length);
        assert_eq!(map_stop_reason("tool_use"), FinishReason::ToolCalls);
        assert_eq!(map_stop_reason("refusal"), FinishReason::ContentFilter);
    }
}
