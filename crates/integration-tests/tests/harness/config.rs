//! Programmatic configuration builder for integration tests

use std::time::Duration;

use relay_config::{
    CapabilityConfig, LlmConfig, ProviderConfig, ProviderType, ReasoningEntry, ReasoningType, TimeoutConfig,
};
use relay_llm::Router;
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: LlmConfig,
}

impl ConfigBuilder {
    /// Empty configuration with short probe and connect timeouts
    pub fn new() -> Self {
        Self {
            config: LlmConfig {
                timeouts: TimeoutConfig {
                    probe: Duration::from_secs(1),
                    connect: Duration::from_secs(1),
                    generate: Duration::from_secs(10),
                    stream: None,
                },
                ..LlmConfig::default()
            },
        }
    }

    /// Add a provider; the first one added becomes the default
    pub fn with_provider(mut self, name: &str, provider_type: ProviderType, base_url: &str) -> Self {
        if self.config.providers.is_empty() {
            name.clone_into(&mut self.config.default_provider);
        }
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig {
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                ..ProviderConfig::new(provider_type)
            },
        );
        self
    }

    /// Set the model a provider uses when a selector names none
    pub fn with_default_model(mut self, provider: &str, model: &str) -> Self {
        let entry = self.config.providers.get_mut(provider).expect("provider added first");
        entry.model = Some(model.to_owned());
        self
    }

    pub fn with_default_provider(mut self, name: &str) -> Self {
        name.clone_into(&mut self.config.default_provider);
        self
    }

    /// Replace the configured fallback chain
    pub fn with_fallback_chain(mut self, chain: &[&str]) -> Self {
        self.config.fallback.chain = chain.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.config.fallback.enabled = false;
        self
    }

    pub fn with_capability(mut self, entry: CapabilityConfig) -> Self {
        self.config.capabilities.push(entry);
        self
    }

    pub fn with_health_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.health_ttl = ttl;
        self
    }

    pub fn build(self) -> LlmConfig {
        self.config
    }

    pub fn router(self) -> Router {
        Router::from_config(&self.config).expect("router builds from test config")
    }
}

/// Capability entry separating `<think>` spans from content
pub fn think_tags(model: &str) -> CapabilityConfig {
    CapabilityConfig {
        model: model.to_owned(),
        text: true,
        vision: false,
        tools: true,
        reasoning: ReasoningEntry {
            kind: ReasoningType::Pattern,
            native_param: None,
            patterns: vec!["<think>(.*?)</think>".to_owned()],
            default_level: None,
        },
    }
}

/// Plain text-only capability entry
pub fn text_only(model: &str) -> CapabilityConfig {
    CapabilityConfig {
        model: model.to_owned(),
        text: true,
        vision: false,
        tools: false,
        reasoning: ReasoningEntry::default(),
    }
}
