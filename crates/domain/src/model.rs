use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;

/// Metadata describing a model advertised by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub provider: String,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    /// Maximum context window in tokens, when known.
    #[serde(default)]
    pub max_context_tokens: Option<u32>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            provider: provider.into(),
            capabilities: CapabilitySet::empty(),
            max_context_tokens: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;

    #[test]
    fn display_name_defaults_to_id() {
        let info = ModelInfo::new("gpt-4o", "openai");
        assert_eq!(info.display_name, "gpt-4o");
    }

    #[test]
    fn serde_roundtrip() {
        let info = ModelInfo::new("claude-sonnet-4", "anthropic")
            .with_capabilities(CapabilitySet::new(&[Capability::Text, Capability::Vision]))
            .with_context_window(200_000);
        let json = serde_json::to_string(&info).unwrap();
        let back: ModelInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "claude-sonnet-4");
        assert!(back.capabilities.contains(Capability::Vision));
        assert_eq!(back.max_context_tokens, Some(200_000));
    }
}
