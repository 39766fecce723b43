//! Google Gemini adapter.
//!
//! Auth is an API key in the query string (`key={api_key}`); the executor
//! appends and masks it. Roles remap to `user`/`model`, tool declarations
//! group under `functionDeclarations`, and structured output uses the
//! native JSON response MIME type plus a response schema.

use chrono::Utc;
use serde_json::{json, Value};

use wh_domain::config::{AuthMode, ProviderConfig, RetryConfig};
use wh_domain::error::{Error, Result};
use wh_domain::message::{ContentPart, Message, MessageContent, Role};
use wh_domain::request::{
    BaseRequest, EmbeddingsRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    Chunk, Embedding, EmbeddingsResponse, FinishReason, StructuredResponse, TextResponse,
    ToolCallDelta, Usage,
};
use wh_domain::stream::ChunkStream;
use wh_domain::tool::{ToolCall, ToolChoice, ToolDefinition};
use wh_domain::{Capability, CapabilitySet, ModelInfo};

use crate::base::RequestExecutor;
use crate::sse::chunk_pipeline;
use crate::structured::parse_json_output;
use crate::traits::Provider;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct GoogleProvider {
    exec: RequestExecutor,
    default_model: String,
    capabilities: CapabilitySet,
}

impl GoogleProvider {
    pub fn from_config(config: &ProviderConfig, retry: RetryConfig) -> Result<Self> {
        let mut config = config.clone();
        config.auth.mode = AuthMode::QueryParam;
        Ok(Self {
            exec: RequestExecutor::new(&config, DEFAULT_BASE_URL, retry)?,
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

fn parts_of(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(t) => vec![json!({"text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(json!({"text": text})),
                ContentPart::Image { data, media_type }
                | ContentPart::Audio { data, media_type }
                | ContentPart::Document { data, media_type } => Some(json!({
                    "inline_data": {
                        "mime_type": media_type.as_deref().unwrap_or("application/octet-stream"),
                        "data": data,
                    }
                })),
            })
            .collect(),
    }
}

fn message_to_content(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant => {
            let mut parts = parts_of(&msg.content);
            for call in &msg.tool_calls {
                parts.push(json!({
                    "functionCall": {"name": call.name, "args": call.arguments}
                }));
            }
            json!({"role": "model", "parts": parts})
        }
        // Tool results remap to user messages carrying a functionResponse.
        Role::Tool => json!({
            "role": "user",
            "parts": [{
                "functionResponse": {
                    "name": msg.tool_call_id.as_deref().unwrap_or_default(),
                    "response": {"content": msg.content.extract_all_text()},
                }
            }]
        }),
        _ => json!({"role": "user", "parts": parts_of(&msg.content)}),
    }
}

fn tools_to_google(tools: &[ToolDefinition]) -> Value {
    json!([{
        "functionDeclarations": tools
            .iter()
            .map(|t| json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            }))
            .collect::<Vec<Value>>()
    }])
}

fn tool_choice_to_google(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::None => json!({"functionCallingConfig": {"mode": "NONE"}}),
        ToolChoice::Auto => json!({"functionCallingConfig": {"mode": "AUTO"}}),
        ToolChoice::Any => json!({"functionCallingConfig": {"mode": "ANY"}}),
        ToolChoice::Specific(name) => json!({
            "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]}
        }),
    }
}

fn generation_config(base: &BaseRequest) -> Value {
    let mut config = json!({});
    if let Some(t) = base.temperature {
        config["temperature"] = json!(t);
    }
    if let Some(p) = base.top_p {
        config["topP"] = json!(p);
    }
    if let Some(m) = base.max_tokens {
        config["maxOutputTokens"] = json!(m);
    }
    if !base.stop.is_empty() {
        config["stopSequences"] = json!(base.stop);
    }
    if let Some(seed) = base.seed {
        config["seed"] = json!(seed);
    }
    config
}

fn build_generate_body(req: &TextRequest) -> Value {
    let mut system_parts: Vec<String> = Vec::new();
    let mut contents: Vec<Value> = Vec::new();
    for msg in &req.messages {
        if msg.role == Role::System {
            system_parts.push(msg.content.extract_all_text());
        } else {
            contents.push(message_to_content(msg));
        }
    }

    let mut body = json!({"contents": contents});
    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": system_parts.join("\n\n")}]});
    }
    if !req.tools.is_empty() {
        body["tools"] = tools_to_google(&req.tools);
        body["toolConfig"] = tool_choice_to_google(&req.tool_choice);
    }
    let config = generation_config(&req.base);
    if config.as_object().is_some_and(|m| !m.is_empty()) {
        body["generationConfig"] = config;
    }
    for (k, v) in &req.base.provider_options {
        body[k.as_str()] = v.clone();
    }
    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn map_finish_reason(raw: &str, has_tool_calls: bool) -> FinishReason {
    match raw {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" => FinishReason::ContentFilter,
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("promptTokenCount")?.as_u64()? as u32;
    let completion = v
        .get("candidatesTokenCount")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    Some(Usage::new(prompt, completion))
}

fn parse_generate_response(v: &Value, model: &str) -> Result<TextResponse> {
    let candidate = v["candidates"]
        .get(0)
        .ok_or_else(|| Error::provider("response carries no candidates"))?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    for part in candidate["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
    {
        if let Some(t) = part["text"].as_str() {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            tool_calls.push(ToolCall {
                // Gemini does not mint call ids; the function name doubles
                // as the correlation key.
                id: call["name"].as_str().unwrap_or_default().to_string(),
                name: call["name"].as_str().unwrap_or_default().to_string(),
                arguments: call.get("args").cloned().unwrap_or(json!({})),
            });
        }
    }

    let finish_reason = map_finish_reason(
        candidate["finishReason"].as_str().unwrap_or_default(),
        !tool_calls.is_empty(),
    );

    Ok(TextResponse {
        id: v["responseId"].as_str().unwrap_or_default().to_string(),
        model: v["modelVersion"].as_str().unwrap_or(model).to_string(),
        text,
        tool_calls,
        finish_reason,
        usage: parse_usage(&v["usageMetadata"]),
        created: Utc::now(),
    })
}

/// Stream payloads are whole `GenerateContentResponse` objects; each maps
/// to one chunk carrying the candidate's text delta.
fn stream_transformer(model: String) -> impl FnMut(&str) -> Result<Option<Chunk>> + Send + 'static {
    let mut sent_opening = false;

    move |data: &str| {
        let v: Value = serde_json::from_str(data)?;
        let resp = parse_generate_response(&v, &model)?;

        let mut chunk = Chunk {
            delta: (!resp.text.is_empty()).then(|| resp.text.clone()),
            usage: resp.usage,
            ..Default::default()
        };
        if !sent_opening {
            sent_opening = true;
            chunk.id = Some(resp.id.clone());
            chunk.model = Some(resp.model.clone());
        }
        if let Some(call) = resp.tool_calls.first() {
            chunk.tool_call = Some(ToolCallDelta {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            });
        }
        if v["candidates"][0]["finishReason"].as_str().is_some() {
            chunk.finish_reason = Some(resp.finish_reason);
        }
        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        self.exec.provider()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn text(&self, req: TextRequest) -> Result<TextResponse> {
        req.validate()?;
        let model = self.model_of(&req.base);
        let body = build_generate_body(&req);
        tracing::debug!(provider = %self.name(), model = %model, "generateContent request");
        let path = format!("/v1beta/models/{model}:generateContent");
        let v = self.exec.post_json(&path, &body).await?;
        parse_generate_response(&v, &model).map_err(|e| e.with_provider(self.name()))
    }

    async fn stream(&self, req: TextRequest) -> Result<ChunkStream> {
        req.validate()?;
        let model = self.model_of(&req.base);
        let body = build_generate_body(&req);
        tracing::debug!(provider = %self.name(), model = %model, "stream request");
        let path = format!("/v1beta/models/{model}:streamGenerateContent?alt=sse");
        let response = self.exec.post_stream(&path, &body).await?;
        Ok(chunk_pipeline(response, self.name(), stream_transformer(model)))
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        let model = self.model_of(&req.base);
        let text_req = TextRequest {
            base: req.base.clone(),
            messages: req.messages.clone(),
            tools: Vec::new(),
            tool_choice: ToolChoice::None,
        };
        let mut body = build_generate_body(&text_req);
        body["generationConfig"]["responseMimeType"] = json!("application/json");
        body["generationConfig"]["responseSchema"] = req.schema.clone();

        let path = format!("/v1beta/models/{model}:generateContent");
        let v = self.exec.post_json(&path, &body).await?;
        let resp = parse_generate_response(&v, &model)?;
        let data = parse_json_output(&resp.text).map_err(|e| e.with_provider(self.name()))?;
        Ok(StructuredResponse {
            id: resp.id,
            model: resp.model,
            data,
            raw: resp.text,
            usage: resp.usage,
        })
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let model = if req.base.model.is_empty() {
            DEFAULT_EMBED_MODEL.to_string()
        } else {
            req.base.model.clone()
        };

        let requests: Vec<Value> = req
            .input
            .iter()
            .map(|text| {
                let mut r = json!({
                    "model": format!("models/{model}"),
                    "content": {"parts": [{"text": text}]},
                });
                if let Some(dims) = req.dimensions {
                    r["outputDimensionality"] = json!(dims);
                }
                r
            })
            .collect();

        let path = format!("/v1beta/models/{model}:batchEmbedContents");
        let v = self
            .exec
            .post_json(&path, &json!({"requests": requests}))
            .await?;

        let embeddings = v["embeddings"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .map(|(index, row)| Embedding {
                        index,
                        vector: row["values"]
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
            model,
            embeddings,
            usage: None,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let v = self.exec.get_json("/v1beta/models").await?;
        let models = v["models"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let name = row["name"].as_str()?;
                        let id = name.strip_prefix("models/").unwrap_or(name);
                        let mut info = ModelInfo::new(id, self.name())
                            .with_capabilities(self.capabilities);
                        if let Some(display) = row["displayName"].as_str() {
                            info.display_name = display.to_string();
                        }
                        if let Some(limit) = row["inputTokenLimit"].as_u64() {
                            info.max_context_tokens = Some(limit as u32);
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
    fn roles_remap_to_user_and_model() {
        let req = TextRequest {
            messages: vec![
                Message::system("rules"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            ..Default::default()
        };
        let body = build_generate_body(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "rules");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn tool_results_become_function_responses() {
        let msg = Message::tool_result("lookup", "42");
        let content = message_to_content(&msg);
        assert_eq!(content["role"], "user");
        assert_eq!(content["parts"][0]["functionResponse"]["name"], "lookup");
    }

    #[test]
    fn generation_config_renames_knobs() {
        let req = TextRequest {
            base: BaseRequest {
                temperature: Some(0.1),
                top_p: Some(0.9),
                max_tokens: Some(64),
                stop: vec!["STOP".into()],
                ..Default::default()
            },
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = build_generate_body(&req);
        let config = &body["generationConfig"];
        assert_eq!(config["temperature"], 0.1);
        assert_eq!(config["topP"], 0.9);
        assert_eq!(config["maxOutputTokens"], 64);
        assert_eq!(config["stopSequences"][0], "STOP");
    }

    #[test]
    fn parse_response_with_function_call() {
        let v = json!({
            "responseId": "r1",
            "modelVersion": "gemini-2.0-flash",
            "candidates": [{
                "content": {"parts": [
                    {"text": "Looking that up."},
                    {"functionCall": {"name": "lookup", "args": {"q": "rust"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 12}
        });
        let resp = parse_generate_response(&v, "gemini-2.0-flash").unwrap();
        assert_eq!(resp.text, "Looking that up.");
        assert_eq!(resp.finish_reason, FinishReason::ToolCalls);
        assert_eq!(resp.tool_calls[0].arguments["q"], "rust");
        assert_eq!(resp.usage.unwrap().total_tokens, 20);
    }

    #[test]
    fn safety_maps_to_content_filter() {
        assert_eq!(map_finish_reason("SAFETY", false), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("MAX_TOKENS", false), FinishReason::Length);
        assert_eq!(map_finish_reason("STOP", false), FinishReason::Stop);
    }

    #[test]
    fn stream_transformer_sends_identity_once() {
        let mut transform = stream_transformer("gemini-2.0-flash".into());
        let payload = r#"{"responseId":"r1","candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#;
        let first = transform(payload).unwrap().unwrap();
        assert_eq!(first.id.as_deref(), Some("r1"));
        let second = transform(payload).unwrap().unwrap();
        assert!(second.id.is_none());
        assert_eq!(second.delta.as_deref(), Some("Hel"));
    }
}
