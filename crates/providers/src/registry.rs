//! Provider registry.
//!
//! Constructs and holds all configured provider adapters. Construction
//! resolves authentication eagerly (env vars are read at this point) and
//! does not abort on a single bad provider: failures are masked, logged,
//! and recorded for later inspection via [`ProviderRegistry::init_errors`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use wh_domain::config::{ProviderConfig, ProviderKind, RetryConfig};
use wh_domain::error::{Error, Result};
use wh_domain::redact::{sanitize_message, SanitizeLevel};
use wh_domain::ErrorCode;

use crate::anthropic::AnthropicProvider;
use crate::google::GoogleProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::traits::Provider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Holds all instantiated provider adapters, by registry name.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    init_errors: Vec<ProviderInitError>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            init_errors: Vec::new(),
        }
    }

    /// Build the registry from provider configs.
    ///
    /// Each entry is instantiated with the adapter matching its `kind`.
    /// Providers that fail to initialize are logged and skipped rather than
    /// aborting construction.
    pub fn from_configs(configs: &[ProviderConfig], retry: RetryConfig) -> Self {
        let mut registry = Self::new();

        for config in configs {
            match build_adapter(config, retry) {
                Ok(provider) => {
                    tracing::info!(
                        provider = %config.name,
                        kind = ?config.kind,
                        "registered provider"
                    );
                    registry
                        .providers
                        .write()
                        .insert(config.name.clone(), provider);
                }
                Err(e) => {
                    // Mask potential API keys before the error is stored or
                    // logged anywhere.
                    let safe_error =
                        sanitize_message(&e.to_string(), SanitizeLevel::Basic, ErrorCode::Auth);
                    tracing::warn!(
                        provider = %config.name,
                        kind = ?config.kind,
                        error = %safe_error,
                        "failed to initialize provider, skipping"
                    );
                    registry.init_errors.push(ProviderInitError {
                        provider: config.name.clone(),
                        kind: format!("{:?}", config.kind),
                        error: safe_error,
                    });
                }
            }
        }

        registry
    }

    /// Register an already-constructed adapter (programmatic setups and
    /// tests).
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.write().insert(name.into(), provider);
    }

    /// Look up a provider by its registry name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(name).cloned()
    }

    /// Look up a provider, raising the façade-level validation error for
    /// unknown names.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.get(name)
            .ok_or_else(|| Error::validation(format!("unknown provider '{name}'")))
    }

    /// All registered providers (name, adapter), unordered.
    pub fn all(&self) -> Vec<(String, Arc<dyn Provider>)> {
        self.providers
            .read()
            .iter()
            .map(|(name, provider)| (name.clone(), provider.clone()))
            .collect()
    }

    /// All registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Provider initialization errors (empty if all succeeded). Secrets are
    /// masked, so these are safe to surface to operators.
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_adapter(config: &ProviderConfig, retry: RetryConfig) -> Result<Arc<dyn Provider>> {
    Ok(match config.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::from_config(config, retry)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(config, retry)?),
        ProviderKind::Google => Arc::new(GoogleProvider::from_config(config, retry)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(config, retry)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_provider_is_skipped_and_recorded() {
        // Ollama without base_url fails init; openai with a key succeeds.
        let configs = vec![
            ProviderConfig::new("local", ProviderKind::Ollama),
            ProviderConfig::new("openai", ProviderKind::Openai).with_api_key("sk-test-key-000001"),
        ];
        let registry = ProviderRegistry::from_configs(&configs, RetryConfig::default());

        assert_eq!(registry.len(), 1);
        assert!(registry.get("openai").is_some());
        assert!(registry.get("local").is_none());

        let errors = registry.init_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].provider, "local");
    }

    #[test]
    fn init_errors_mask_secrets() {
        // A missing env var mentions the variable name, never a key; a
        // plaintext sk- key in a message would be masked by the sanitizer.
        let masked = sanitize_message(
            "auth: key sk-abcd1234efgh5678ijkl rejected",
            SanitizeLevel::Basic,
            ErrorCode::Auth,
        );
        assert!(!masked.contains("sk-abcd1234efgh5678ijkl"));
    }

    #[test]
    fn resolve_unknown_is_validation_error() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn names_are_sorted() {
        let configs = vec![
            ProviderConfig::new("zeta", ProviderKind::Openai).with_api_key("sk-k1-0000000001"),
            ProviderConfig::new("alpha", ProviderKind::Openai).with_api_key("sk-k2-0000000002"),
        ];
        let registry = ProviderRegistry::from_configs(&configs, RetryConfig::default());
        assert_eq!(registry.names(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
