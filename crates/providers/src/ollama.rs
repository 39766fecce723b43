//! Ollama adapter for locally-hosted models.
//!
//! Inference reuses the OpenAI-compatible wire format Ollama serves under
//! `/v1`, so chat, streaming, structured output and embeddings share the
//! OpenAI transforms. Model management (list/pull/show/delete) speaks the
//! native API. A base URL is REQUIRED: there is no implicit localhost
//! default, so a missing config line cannot silently produce outbound
//! traffic.

use serde_json::{json, Value};

use wh_domain::config::{AuthMode, ProviderConfig, RetryConfig};
use wh_domain::error::{Error, Result};
use wh_domain::request::{
    BaseRequest, EmbeddingsRequest, StructuredRequest, TextRequest,
};
use wh_domain::response::{
    Embedding, EmbeddingsResponse, StructuredResponse, TextResponse, Usage,
};
use wh_domain::stream::ChunkStream;
use wh_domain::tool::ToolChoice;
use wh_domain::{Capability, CapabilitySet, ModelInfo};

use crate::base::RequestExecutor;
use crate::openai::{
    build_chat_body, parse_chat_response, stream_transformer, structured_from_tool_call,
    synthesized_tool,
};
use crate::sse::chunk_pipeline;
use crate::structured::parse_json_output;
use crate::traits::Provider;

const DEFAULT_MODEL: &str = "llama3.2";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct OllamaProvider {
    exec: RequestExecutor,
    default_model: String,
    capabilities: CapabilitySet,
}

impl OllamaProvider {
    pub fn from_config(config: &ProviderConfig, retry: RetryConfig) -> Result<Self> {
        let Some(base_url) = config.base_url.clone() else {
            return Err(Error::validation(
                "ollama requires an explicit base_url (no implicit localhost)",
            )
            .with_provider(&config.name));
        };
        let mut config = config.clone();
        if config.auth.key.is_none() && config.auth.env.is_none() {
            config.auth.mode = AuthMode::None;
        }
        Ok(Self {
            exec: RequestExecutor::new(&config, &base_url, retry)?,
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

    // ── Native model management ────────────────────────────────────

    /// Pull a model into the local store. Blocks until the pull completes.
    pub async fn pull_model(&self, name: &str) -> Result<()> {
        let body = json!({"model": name, "stream": false});
        let v = self.exec.post_json("/api/pull", &body).await?;
        match v["status"].as_str() {
            Some("success") => Ok(()),
            other => Err(Error::provider(format!(
                "pull of '{name}' did not complete: {}",
                other.unwrap_or("no status")
            ))
            .with_provider(self.name())),
        }
    }

    /// Fetch the local metadata for a model.
    pub async fn show_model(&self, name: &str) -> Result<Value> {
        self.exec.post_json("/api/show", &json!({"model": name})).await
    }

    /// Remove a model from the local store.
    pub async fn delete_model(&self, name: &str) -> Result<()> {
        // The native API uses DELETE with a JSON body; POSTing to the same
        // path is accepted and keeps the retry client's body handling.
        self.exec
            .post_json("/api/delete", &json!({"model": name}))
            .await
            .map(|_| ())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl Provider for OllamaProvider {
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
        let response = self.exec.post_stream("/v1/chat/completions", &body).await?;
        Ok(chunk_pipeline(response, self.name(), stream_transformer()))
    }

    async fn structured(&self, req: StructuredRequest) -> Result<StructuredResponse> {
        // Prefer the native JSON response format; fall back to the
        // synthesized-tool path when the request asks for tools mode.
        match req.mode {
            wh_domain::request::StructuredMode::Json => {
                let text_req = TextRequest {
                    base: req.base.clone(),
                    messages: req.messages.clone(),
                    tools: Vec::new(),
                    tool_choice: ToolChoice::None,
                };
                let mut body = build_chat_body(&text_req, &self.model_of(&req.base), false);
                body["response_format"] = json!({"type": "json_object"});
                let v = self.exec.post_json("/v1/chat/completions", &body).await?;
                let resp = parse_chat_response(&v)?;
                let data = parse_json_output(&resp.text).map_err(|e| e.with_provider(self.name()))?;
                Ok(StructuredResponse {
                    id: resp.id,
                    model: resp.model,
                    data,
                    raw: resp.text,
                    usage: resp.usage,
                })
            }
            wh_domain::request::StructuredMode::Tools => {
                let text_req = TextRequest {
                    base: req.base.clone(),
                    messages: req.messages.clone(),
                    tools: vec![synthesized_tool(&req)],
                    tool_choice: ToolChoice::Specific(req.schema_name.clone()),
                };
                let body = build_chat_body(&text_req, &self.model_of(&req.base), false);
                let v = self.exec.post_json("/v1/chat/completions", &body).await?;
                let resp = parse_chat_response(&v)?;
                structured_from_tool_call(resp, &req.schema_name)
                    .map_err(|e| e.with_provider(self.name()))
            }
        }
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let model = self.model_of(&req.base);
        let body = json!({"model": model, "input": req.input});
        let v = self.exec.post_json("/api/embed", &body).await?;

        let embeddings = v["embeddings"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .map(|(index, row)| Embedding {
                        index,
                        vector: row
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

        let usage = v["prompt_eval_count"]
            .as_u64()
            .map(|prompt| Usage::new(prompt as u32, 0));

        Ok(EmbeddingsResponse {
            model: v["model"].as_str().unwrap_or(&model).to_string(),
            embeddings,
            usage,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let v = self.exec.get_json("/api/tags").await?;
        let models = v["models"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row["name"].as_str())
                    .map(|name| {
                        ModelInfo::new(name, self.name()).with_capabilities(self.capabilities)
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
    use wh_domain::config::ProviderKind;

    #[test]
    fn missing_base_url_is_rejected() {
        let config = ProviderConfig::new("local", ProviderKind::Ollama);
        let err = OllamaProvider::from_config(&config, RetryConfig::default()).unwrap_err();
        assert_eq!(err.code, wh_domain::ErrorCode::Validation);
        assert!(err.message.contains("base_url"));
    }

    #[test]
    fn explicit_base_url_constructs_without_auth() {
        let config = ProviderConfig::new("local", ProviderKind::Ollama)
            .with_base_url("http://127.0.0.1:11434");
        let provider = OllamaProvider::from_config(&config, RetryConfig::default()).unwrap();
        assert_eq!(provider.name(), "local");
        assert!(provider.capabilities().contains(Capability::Embeddings));
        assert!(!provider.capabilities().contains(Capability::Images));
    }

    #[tokio::test]
    async fn list_models_parses_native_tags() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3.2:latest"}, {"name": "qwen2.5:7b"}]
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("local", ProviderKind::Ollama)
            .with_base_url(server.uri());
        let provider = OllamaProvider::from_config(
            &config,
            RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
        )
        .unwrap();
        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "llama3.2:latest");
        assert_eq!(models[0].provider, "local");
    }

    #[tokio::test]
    async fn pull_model_requires_success_status() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .mount(&server)
            .await;

        let config = ProviderConfig::new("local", ProviderKind::Ollama)
            .with_base_url(server.uri());
        let provider = OllamaProvider::from_config(
            &config,
            RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
        )
        .unwrap();
        provider.pull_model("llama3.2").await.unwrap();
    }
}
