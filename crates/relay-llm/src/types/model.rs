use std::fmt;

use serde::{Deserialize, Serialize};

/// Parsed `provider:model` selector
///
/// Local model ids contain colons themselves (`qwen3:8b`), so the part before
/// the first colon only counts as a provider when it names a configured one.
/// An empty `model` means "the provider's default model".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSelector {
    /// Provider name
    pub provider: String,
    /// Model id, possibly empty
    pub model: String,
}

impl ModelSelector {
    /// Parse a selector, resolving the provider against `is_provider`
    pub fn parse(raw: &str, default_provider: &str, is_provider: impl Fn(&str) -> bool) -> Self {
        let raw = raw.trim();

        if is_provider(raw) {
            return Self {
                provider: raw.to_owned(),
                model: String::new(),
            };
        }

        if let Some((provider, model)) = raw.split_once(':')
            && is_provider(provider)
        {
            return Self {
                provider: provider.to_owned(),
                model: model.to_owned(),
            };
        }

        Self {
            provider: default_provider.to_owned(),
            model: raw.to_owned(),
        }
    }

    /// Capability lookup key
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.model.is_empty() {
            f.write_str(&self.provider)
        } else {
            write!(f, "{}:{}", self.provider, self.model)
        }
    }
}

/// Model advertised by a provider's listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model id as accepted by the provider
    pub id: String,
    /// Provider name
    pub provider: String,
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Context window in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Vision support as reported by the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision: Option<bool>,
    /// Tool support as reported by the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<bool>,
    /// Reasoning support as reported by the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
}

impl ModelInfo {
    /// Bare entry with only an id
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            display_name: None,
            context_window: None,
            vision: None,
            tools: None,
            reasoning: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str) -> bool {
        matches!(name, "ollama" | "lmstudio" | "gemini")
    }

    #[test]
    fn splits_on_known_provider() {
        let selector = ModelSelector::parse("ollama:qwen3:8b", "gemini", known);
        assert_eq!(selector.provider, "ollama");
        assert_eq!(selector.model, "qwen3:8b");
        assert_eq!(selector.to_string(), "ollama:qwen3:8b");
    }

    #[test]
    fn unknown_prefix_is_part_of_model_id() {
        let selector = ModelSelector::parse("qwen3:8b", "gemini", known);
        assert_eq!(selector.provider, "gemini");
        assert_eq!(selector.model, "qwen3:8b");
    }

    #[test]
    fn bare_provider_has_empty_model() {
        let selector = ModelSelector::parse("lmstudio", "gemini", known);
        assert_eq!(selector.provider, "lmstudio");
        assert!(selector.model.is_empty());
        assert_eq!(selector.key(), "lmstudio");
    }

    #[test]
    fn bare_model_goes_to_default_provider() {
        let selector = ModelSelector::parse("gemini-2.5-flash", "gemini", known);
        assert_eq!(selector.key(), "gemini:gemini-2.5-flash");
    }
}
