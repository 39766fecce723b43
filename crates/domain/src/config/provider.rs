use serde::{Deserialize, Serialize};

use super::http::HttpConfig;

/// One configured provider (data-driven: adding a provider = adding config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry name, also used in `using("…")` and in error `provider`
    /// fields.
    pub name: String,
    pub kind: ProviderKind,
    /// Endpoint base URL. Optional for hosted providers (each adapter has a
    /// default); REQUIRED for local backends (no implicit localhost).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Transport overrides; the shared defaults apply when absent.
    #[serde(default)]
    pub http: Option<HttpConfig>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: None,
            auth: AuthConfig::default(),
            default_model: None,
            http: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.auth.key = Some(key.into());
        self
    }

    pub fn with_key_env(mut self, var: impl Into<String>) -> Self {
        self.auth.env = Some(var.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI and any endpoint following its chat-completions contract.
    Openai,
    Anthropic,
    Google,
    /// Locally-hosted Ollama; requires an explicit base URL.
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env).
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Key in a header: `{header}: {prefix}{key}`.
    #[default]
    ApiKey,
    /// Key appended to the URL query string (Google-style `key=`).
    QueryParam,
    /// No authentication (local backends).
    None,
}
