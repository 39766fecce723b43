//! Hard-coded fallback model lists, the offline-mode last resort.
//!
//! Deliberately small and conservative: only models a provider has served
//! for a long time, enough for a caller to function with no network and no
//! cache file.

use wh_domain::{Capability, CapabilitySet, ModelInfo};

/// Fallback models for a known provider kind, keyed by registry name.
/// Unknown names yield `None`.
pub fn fallback_models(provider: &str) -> Option<Vec<ModelInfo>> {
    let chat = CapabilitySet::new(&[
        Capability::Text,
        Capability::Chat,
        Capability::Functions,
        Capability::Structured,
    ]);
    let ids: &[&str] = match provider {
        "openai" => &["gpt-4o", "gpt-4o-mini", "text-embedding-3-small"],
        "anthropic" => &["claude-sonnet-4-20250514", "claude-3-5-haiku-20241022"],
        "google" => &["gemini-2.0-flash", "text-embedding-004"],
        "ollama" => &["llama3.2"],
        _ => return None,
    };
    Some(
        ids.iter()
            .map(|id| {
                let caps = if id.contains("embedding") {
                    CapabilitySet::new(&[Capability::Embeddings])
                } else {
                    chat
                };
                ModelInfo::new(*id, provider).with_capabilities(caps)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_have_fallbacks() {
        for provider in ["openai", "anthropic", "google", "ollama"] {
            let models = fallback_models(provider).unwrap();
            assert!(!models.is_empty());
            assert!(models.iter().all(|m| m.provider == provider));
        }
    }

    #[test]
    fn unknown_provider_has_none() {
        assert!(fallback_models("mystery").is_none());
    }

    #[test]
    fn embedding_models_are_tagged() {
        let models = fallback_models("openai").unwrap();
        let embed = models.iter().find(|m| m.id.contains("embedding")).unwrap();
        assert!(embed.capabilities.contains(Capability::Embeddings));
    }
}
