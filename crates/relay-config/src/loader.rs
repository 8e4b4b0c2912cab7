use std::path::Path;

use crate::{Config, LlmConfig, ProviderConfig, ProviderType, ReasoningType};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, fills unset
    /// provider fields from `{PROVIDER}_*` variables, then validates.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let mut config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        for (name, provider) in &mut config.llm.providers {
            provider.apply_env_overrides(name);
        }

        config.validate()?;

        Ok(config)
    }

    /// Build configuration purely from the environment
    ///
    /// Registers every built-in provider under its canonical name. The
    /// default provider can be changed with `RELAY_DEFAULT_PROVIDER`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration fails validation
    pub fn from_env() -> anyhow::Result<Self> {
        let mut llm = LlmConfig::default();

        for provider_type in ProviderType::ALL {
            let mut provider = ProviderConfig::new(provider_type);
            provider.apply_env_overrides(provider_type.as_str());
            llm.providers.insert(provider_type.as_str().to_owned(), provider);
        }

        if let Ok(default) = std::env::var("RELAY_DEFAULT_PROVIDER")
            && !default.is_empty()
        {
            llm.default_provider = default;
        }

        let config = Self { llm, telemetry: None };
        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error naming the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_fallback()?;
        self.validate_capabilities()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        let llm = &self.llm;

        if llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        if !llm.providers.contains_key(&llm.default_provider) {
            anyhow::bail!("default provider '{}' is not configured", llm.default_provider);
        }

        for (name, provider) in &llm.providers {
            if name.is_empty() || name.contains(':') {
                anyhow::bail!("provider name '{name}' must be non-empty and must not contain ':'");
            }

            if let Some(url) = &provider.base_url
                && !matches!(url.scheme(), "http" | "https")
            {
                anyhow::bail!("provider '{name}' base_url must use http or https, got '{}'", url.scheme());
            }
        }

        Ok(())
    }

    fn validate_fallback(&self) -> anyhow::Result<()> {
        let llm = &self.llm;
        let named = llm
            .fallback
            .chain
            .iter()
            .chain(llm.fallback.secondary_local.iter())
            .chain(llm.fallback.cloud_default.iter());

        for selector in named {
            let provider = selector.split_once(':').map_or(selector.as_str(), |(p, _)| p);
            if !llm.providers.contains_key(provider) {
                anyhow::bail!("fallback entry '{selector}' references unknown provider '{provider}'");
            }
        }

        Ok(())
    }

    fn validate_capabilities(&self) -> anyhow::Result<()> {
        for entry in &self.llm.capabilities {
            let Some((provider, model)) = entry.model.split_once(':') else {
                anyhow::bail!("capability key '{}' must have the form provider:model", entry.model);
            };
            if provider.is_empty() || model.is_empty() {
                anyhow::bail!("capability key '{}' must have the form provider:model", entry.model);
            }
            if model.trim_end_matches('*').contains('*') {
                anyhow::bail!("capability key '{}' may only use a trailing '*'", entry.model);
            }

            for pattern in &entry.reasoning.patterns {
                regex::Regex::new(pattern)
                    .map_err(|e| anyhow::anyhow!("invalid reasoning pattern for '{}': {e}", entry.model))?;
            }

            if entry.reasoning.kind == ReasoningType::Pattern && entry.reasoning.patterns.is_empty() {
                anyhow::bail!("capability '{}' uses pattern reasoning but lists no patterns", entry.model);
            }
        }

        Ok(())
    }

    fn validate_telemetry(&self) -> anyhow::Result<()> {
        if let Some(telemetry) = &self.telemetry
            && !(0.0..=1.0).contains(&telemetry.sampling_rate)
        {
            anyhow::bail!("telemetry sampling_rate must be between 0.0 and 1.0");
        }
        Ok(())
    }
}
