//! Per-model capability registry
//!
//! A static table (built-in entries overlaid with configured ones) answers
//! lookups by exact `provider:model` key, then by the longest matching
//! trailing-`*` wildcard, then with a text-only default. Live provider probes
//! may enrich an entry; enriched records are cached with a TTL and replaced
//! wholesale, never mutated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mini_moka::sync::Cache;
use relay_config::{CapabilityConfig, ReasoningType};
pub use relay_config::ReasoningLevel;

use crate::cache::SingleFlight;
use crate::error::RelayError;
use crate::provider::Provider;
use crate::thinking::ReasoningPattern;

/// Marker pattern assumed when a probe reports reasoning without a marker
const THINK_TAGS: &str = "<think>(.*?)</think>";

/// How a model exposes reasoning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReasoningKind {
    /// No reasoning channel
    #[default]
    None,
    /// Backend separates reasoning at the wire level
    Native,
    /// Reasoning is embedded in content and found by pattern
    Pattern,
}

impl From<ReasoningType> for ReasoningKind {
    fn from(value: ReasoningType) -> Self {
        match value {
            ReasoningType::None => Self::None,
            ReasoningType::Native => Self::Native,
            ReasoningType::Pattern => Self::Pattern,
        }
    }
}

/// Reasoning strategy of a model
#[derive(Debug, Clone, Default)]
pub struct ReasoningConfig {
    /// Strategy
    pub kind: ReasoningKind,
    /// Request parameter carrying the level, when the backend takes one
    pub native_param: Option<String>,
    /// Ordered marker patterns for [`ReasoningKind::Pattern`]
    pub patterns: Vec<ReasoningPattern>,
    /// Level used when the request names none
    pub default_level: Option<ReasoningLevel>,
}

impl ReasoningConfig {
    fn pattern(patterns: &[&str]) -> Self {
        Self {
            kind: ReasoningKind::Pattern,
            patterns: patterns
                .iter()
                .filter_map(|p| ReasoningPattern::new(p).ok())
                .collect(),
            ..Self::default()
        }
    }

    fn native(native_param: Option<&str>, default_level: Option<ReasoningLevel>) -> Self {
        Self {
            kind: ReasoningKind::Native,
            native_param: native_param.map(ToOwned::to_owned),
            patterns: Vec::new(),
            default_level,
        }
    }
}

/// Capabilities of one model or wildcard family
#[derive(Debug, Clone)]
pub struct ModelCapability {
    /// `provider:model` key or `provider:prefix*` pattern
    pub model_pattern: String,
    /// Accepts text
    pub supports_text: bool,
    /// Accepts images
    pub supports_vision: bool,
    /// Accepts tool schemas
    pub supports_tools: bool,
    /// Reasoning strategy
    pub reasoning: ReasoningConfig,
    /// Context window, when known
    pub context_window: Option<u32>,
}

impl ModelCapability {
    /// Text-only record without reasoning
    pub fn text_only(model_pattern: impl Into<String>) -> Self {
        Self {
            model_pattern: model_pattern.into(),
            supports_text: true,
            supports_vision: false,
            supports_tools: false,
            reasoning: ReasoningConfig::default(),
            context_window: None,
        }
    }

    /// Compile a configured entry
    pub fn from_config(entry: &CapabilityConfig) -> Result<Self, regex::Error> {
        let patterns = entry
            .reasoning
            .patterns
            .iter()
            .map(|p| ReasoningPattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            model_pattern: entry.model.clone(),
            supports_text: entry.text,
            supports_vision: entry.vision,
            supports_tools: entry.tools,
            reasoning: ReasoningConfig {
                kind: entry.reasoning.kind.into(),
                native_param: entry.reasoning.native_param.clone(),
                patterns,
                default_level: entry.reasoning.default_level,
            },
            context_window: None,
        })
    }

    fn entry(model_pattern: &str, vision: bool, tools: bool, reasoning: ReasoningConfig) -> Self {
        Self {
            supports_vision: vision,
            supports_tools: tools,
            reasoning,
            ..Self::text_only(model_pattern)
        }
    }

    /// Whether the pattern ends in `*`
    pub fn is_wildcard(&self) -> bool {
        self.model_pattern.ends_with('*')
    }

    /// Record for `key` with probe results applied
    ///
    /// Vision and tool support follow the probe. Reasoning may only be
    /// upgraded from none; a curated native or pattern strategy stays.
    fn merged(&self, key: &str, hint: &CapabilityHint) -> Self {
        let mut merged = self.clone();
        merged.model_pattern = key.to_owned();

        if let Some(vision) = hint.vision {
            merged.supports_vision = vision;
        }
        if let Some(tools) = hint.tools {
            merged.supports_tools = tools;
        }
        if hint.context_window.is_some() {
            merged.context_window = hint.context_window;
        }

        if self.reasoning.kind == ReasoningKind::None {
            match hint.reasoning {
                Some(ReasoningKind::Native) => merged.reasoning.kind = ReasoningKind::Native,
                Some(ReasoningKind::Pattern) => merged.reasoning = ReasoningConfig::pattern(&[THINK_TAGS]),
                Some(ReasoningKind::None) | None => {}
            }
        }

        merged
    }
}

/// Lower-confidence capability data inferred from a live provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityHint {
    /// Inferred vision support
    pub vision: Option<bool>,
    /// Inferred tool support
    pub tools: Option<bool>,
    /// Inferred reasoning strategy
    pub reasoning: Option<ReasoningKind>,
    /// Reported context window
    pub context_window: Option<u32>,
}

/// Curated entries shipped with the engine
pub fn builtin_capabilities() -> Vec<ModelCapability> {
    use ModelCapability as C;
    use ReasoningLevel::Medium;

    vec![
        C::entry("gemini:gemini-2.5*", true, true, ReasoningConfig::native(None, Some(Medium))),
        C::entry("gemini:*", true, true, ReasoningConfig::default()),
        C::entry("openai:o*", true, true, ReasoningConfig::native(Some("reasoning_effort"), None)),
        C::entry("openai:gpt-5*", true, true, ReasoningConfig::native(Some("reasoning_effort"), None)),
        C::entry("openai:gpt-4o*", true, true, ReasoningConfig::default()),
        C::entry("openai:*", false, true, ReasoningConfig::default()),
        C::entry("ollama:deepseek-r1*", false, false, ReasoningConfig::pattern(&[THINK_TAGS])),
        C::entry("ollama:qwen3*", false, true, ReasoningConfig::pattern(&[THINK_TAGS])),
        C::entry("ollama:gpt-oss*", false, true, ReasoningConfig::native(Some("reasoning_effort"), None)),
        C::entry("ollama:llama3.2-vision*", true, false, ReasoningConfig::default()),
        C::entry("ollama:llava*", true, false, ReasoningConfig::default()),
        C::entry("ollama:gemma3*", true, false, ReasoningConfig::default()),
        C::entry("ollama:llama3*", false, true, ReasoningConfig::default()),
        C::entry("lmstudio:*", false, true, ReasoningConfig::pattern(&[THINK_TAGS])),
    ]
}

/// Capability lookup with a TTL cache of probed records
pub struct CapabilityRegistry {
    exact: HashMap<String, Arc<ModelCapability>>,
    /// `(prefix, record)`, longest prefix first
    wildcards: Vec<(String, Arc<ModelCapability>)>,
    dynamic: Cache<String, Arc<ModelCapability>>,
    inflight: SingleFlight<String, Arc<ModelCapability>>,
}

impl CapabilityRegistry {
    /// Registry over `entries`; later entries replace earlier ones with the same pattern
    pub fn new(entries: impl IntoIterator<Item = ModelCapability>, ttl: Duration) -> Self {
        let mut exact = HashMap::new();
        let mut wildcard_map = HashMap::new();

        for entry in entries {
            if let Some(prefix) = entry.model_pattern.strip_suffix('*') {
                wildcard_map.insert(prefix.to_owned(), Arc::new(entry));
            } else {
                exact.insert(entry.model_pattern.clone(), Arc::new(entry));
            }
        }

        let mut wildcards: Vec<_> = wildcard_map.into_iter().collect();
        wildcards.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            exact,
            wildcards,
            dynamic: Cache::builder().time_to_live(ttl).build(),
            inflight: SingleFlight::new(),
        }
    }

    /// Built-in table overlaid with configured entries
    pub fn with_builtin_defaults(overrides: &[CapabilityConfig], ttl: Duration) -> Result<Self, RelayError> {
        let configured = overrides
            .iter()
            .map(|entry| {
                ModelCapability::from_config(entry)
                    .map_err(|e| anyhow::anyhow!("invalid reasoning pattern for '{}': {e}", entry.model))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(builtin_capabilities().into_iter().chain(configured), ttl))
    }

    /// Capability of `provider:model`
    ///
    /// A cached probe result wins over the static table.
    pub fn get(&self, provider: &str, model: &str) -> Arc<ModelCapability> {
        let key = format!("{provider}:{model}");
        self.dynamic.get(&key).unwrap_or_else(|| self.static_lookup(&key))
    }

    /// Static table lookup: exact, then longest wildcard, then default
    pub fn static_lookup(&self, key: &str) -> Arc<ModelCapability> {
        if let Some(entry) = self.exact.get(key) {
            return Arc::clone(entry);
        }

        self.wildcards
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map_or_else(|| Arc::new(ModelCapability::text_only(key)), |(_, entry)| Arc::clone(entry))
    }

    /// Capability of `model` on `provider`, probing the provider on a cache miss
    ///
    /// Concurrent refreshes of one key share a single probe. A failed probe
    /// falls back to the static record and is not cached.
    pub async fn refresh(&self, provider: &Arc<dyn Provider>, model: &str) -> Arc<ModelCapability> {
        let key = format!("{}:{model}", provider.name());
        if let Some(cached) = self.dynamic.get(&key) {
            tracing::debug!(model = %key, "capability cache hit");
            return cached;
        }

        let base = self.static_lookup(&key);
        let provider = Arc::clone(provider);
        let cache = self.dynamic.clone();
        let model = model.to_owned();
        let cache_key = key.clone();

        let lookup_key = key.clone();
        self.inflight
            .run_unless(
                key,
                || self.dynamic.get(&lookup_key),
                move || async move {
                    let record = match provider.probe_capability(&model).await {
                        Ok(Some(hint)) => Arc::new(base.merged(&cache_key, &hint)),
                        Ok(None) => base,
                        Err(e) => {
                            tracing::debug!(model = %cache_key, error = %e, "capability probe failed, using static entry");
                            return base;
                        }
                    };
                    cache.insert(cache_key, Arc::clone(&record));
                    record
                },
            )
            .await
    }

    /// Drop every probed record
    pub fn clear(&self) {
        self.dynamic.invalidate_all();
        self.inflight.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use relay_config::ReasoningEntry;

    use super::*;
    use crate::provider::fake::FakeProvider;

    const HOUR: Duration = Duration::from_secs(3600);

    fn configured(model: &str, reasoning: ReasoningType) -> CapabilityConfig {
        CapabilityConfig {
            model: model.to_owned(),
            text: true,
            vision: false,
            tools: true,
            reasoning: ReasoningEntry {
                kind: reasoning,
                native_param: None,
                patterns: vec!["<think>(.*?)</think>".to_owned()],
                default_level: None,
            },
        }
    }

    #[test]
    fn wildcard_entry_matches_model_family() {
        let entry = ModelCapability::from_config(&configured("ollama:custom-*", ReasoningType::Pattern)).unwrap();
        let registry = CapabilityRegistry::new([entry], HOUR);

        let capability = registry.get("ollama", "custom-model-v2");
        assert_eq!(capability.model_pattern, "ollama:custom-*");
        assert_eq!(capability.reasoning.kind, ReasoningKind::Pattern);
        assert!(capability.supports_tools);

        let other = registry.get("ollama", "llama3.2");
        assert_eq!(other.reasoning.kind, ReasoningKind::None);
        assert!(!other.supports_tools);
    }

    #[test]
    fn exact_beats_wildcard_and_longest_wildcard_wins() {
        let registry = CapabilityRegistry::new(
            [
                ModelCapability::entry("ollama:*", false, false, ReasoningConfig::default()),
                ModelCapability::entry("ollama:qwen*", false, true, ReasoningConfig::default()),
                ModelCapability::entry("ollama:qwen3:8b", true, true, ReasoningConfig::default()),
            ],
            HOUR,
        );

        assert_eq!(registry.get("ollama", "qwen3:8b").model_pattern, "ollama:qwen3:8b");
        assert_eq!(registry.get("ollama", "qwen2.5").model_pattern, "ollama:qwen*");
        assert_eq!(registry.get("ollama", "phi4").model_pattern, "ollama:*");
    }

    #[test]
    fn configured_entries_replace_builtins() {
        let registry = CapabilityRegistry::with_builtin_defaults(
            &[configured("ollama:deepseek-r1*", ReasoningType::None)],
            HOUR,
        )
        .unwrap();

        let capability = registry.get("ollama", "deepseek-r1:14b");
        assert_eq!(capability.reasoning.kind, ReasoningKind::None);
        assert!(capability.supports_tools);
    }

    #[test]
    fn builtin_gemini_reasons_natively() {
        let registry = CapabilityRegistry::with_builtin_defaults(&[], HOUR).unwrap();
        let capability = registry.get("gemini", "gemini-2.5-flash");
        assert_eq!(capability.reasoning.kind, ReasoningKind::Native);
        assert!(capability.supports_vision);
        assert_eq!(registry.get("gemini", "gemini-2.0-flash").reasoning.kind, ReasoningKind::None);
    }

    #[test]
    fn probe_never_downgrades_native_reasoning() {
        let base = ModelCapability::entry("ollama:gpt-oss*", false, true, ReasoningConfig::native(None, None));
        let hint = CapabilityHint {
            vision: Some(true),
            tools: Some(false),
            reasoning: Some(ReasoningKind::None),
            context_window: Some(131_072),
        };

        let merged = base.merged("ollama:gpt-oss:20b", &hint);
        assert_eq!(merged.reasoning.kind, ReasoningKind::Native);
        assert!(merged.supports_vision);
        assert!(!merged.supports_tools);
        assert_eq!(merged.context_window, Some(131_072));
        assert_eq!(merged.model_pattern, "ollama:gpt-oss:20b");
    }

    #[test]
    fn probe_can_upgrade_missing_reasoning() {
        let base = ModelCapability::text_only("ollama:mystery");
        let hint = CapabilityHint {
            reasoning: Some(ReasoningKind::Pattern),
            ..CapabilityHint::default()
        };

        let merged = base.merged("ollama:mystery", &hint);
        assert_eq!(merged.reasoning.kind, ReasoningKind::Pattern);
        assert_eq!(merged.reasoning.patterns[0].opening(), "<think>");
    }

    #[tokio::test]
    async fn refresh_probes_once_and_caches() {
        let fake = FakeProvider::new("ollama").with_hint(CapabilityHint {
            vision: Some(true),
            ..CapabilityHint::default()
        });
        let probes = fake.probe_counter();
        let provider: Arc<dyn Provider> = Arc::new(fake);
        let registry = Arc::new(CapabilityRegistry::new([], HOUR));

        let (a, b) = tokio::join!(registry.refresh(&provider, "llava"), registry.refresh(&provider, "llava"));
        assert!(a.supports_vision && b.supports_vision);
        assert!(registry.get("ollama", "llava").supports_vision);
        assert_eq!(probes.load(Ordering::SeqCst), 1);

        registry.clear();
        assert!(!registry.get("ollama", "llava").supports_vision);
        registry.refresh(&provider, "llava").await;
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_probe_is_not_cached() {
        let provider: Arc<dyn Provider> = Arc::new(FakeProvider::new("ollama").unreachable());
        let registry = CapabilityRegistry::new([], HOUR);

        let capability = registry.refresh(&provider, "qwen3").await;
        assert_eq!(capability.reasoning.kind, ReasoningKind::None);
        assert!(registry.dynamic.get(&"ollama:qwen3".to_owned()).is_none());
    }
}
