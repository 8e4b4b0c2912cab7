use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Provider used when a selector names no provider
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Top-level LLM configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider used for selectors without a `provider:` prefix
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Provider configurations keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Fallback chain policy
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Capability entries layered over the built-in table
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,
    /// Cache lifetimes
    #[serde(default)]
    pub cache: CacheConfig,
    /// Network timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: IndexMap::new(),
            fallback: FallbackConfig::default(),
            capabilities: Vec::new(),
            cache: CacheConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_owned()
}

/// Configuration for a single provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Backend kind
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when this provider is reached without an explicit model
    #[serde(default)]
    pub model: Option<String>,
}

impl ProviderConfig {
    /// Bare configuration for a provider type with every field unset
    pub const fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: None,
            model: None,
        }
    }

    /// Fill unset fields from `{PREFIX}_HOST`, `{PREFIX}_API_KEY` and `{PREFIX}_MODEL`
    ///
    /// Two prefixes are tried in order: the provider's name upper-cased with
    /// non-alphanumerics as `_` (`ollama-gpu` reads `OLLAMA_GPU_HOST`), then
    /// the prefix of its type (`OLLAMA_HOST`). Values already present in the
    /// file win over the environment.
    pub fn apply_env_overrides(&mut self, name: &str) {
        let named = env_prefix_for(name);
        let typed = self.provider_type.env_prefix();
        let lookup = |suffix: &str| {
            [named.as_str(), typed]
                .into_iter()
                .find_map(|prefix| std::env::var(format!("{prefix}_{suffix}")).ok().filter(|v| !v.is_empty()))
        };

        if self.base_url.is_none()
            && let Some(host) = lookup("HOST")
        {
            match parse_host(&host) {
                Ok(url) => self.base_url = Some(url),
                Err(e) => tracing::warn!(provider = name, host = %host, error = %e, "ignoring invalid host override"),
            }
        }

        if self.api_key.is_none()
            && let Some(key) = lookup("API_KEY")
        {
            self.api_key = Some(SecretString::from(key));
        }

        if self.model.is_none()
            && let Some(model) = lookup("MODEL")
        {
            self.model = Some(model);
        }
    }
}

/// Environment prefix derived from a provider name
fn env_prefix_for(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Parse a host override, accepting bare `host:port` as plain HTTP
fn parse_host(host: &str) -> Result<Url, url::ParseError> {
    if host.contains("://") {
        Url::parse(host)
    } else {
        Url::parse(&format!("http://{host}"))
    }
}

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Native cloud API (`generateContent` dialect)
    Gemini,
    /// Generic OpenAI-compatible endpoint
    Openai,
    /// Ollama local runtime
    Ollama,
    /// LM Studio local server
    Lmstudio,
}

impl ProviderType {
    /// Every built-in provider type, in default registration order
    pub const ALL: [Self; 4] = [Self::Gemini, Self::Openai, Self::Ollama, Self::Lmstudio];

    /// Canonical provider name used in selectors
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Openai => "openai",
            Self::Ollama => "ollama",
            Self::Lmstudio => "lmstudio",
        }
    }

    /// Environment variable prefix
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI",
            Self::Openai => "OPENAI",
            Self::Ollama => "OLLAMA",
            Self::Lmstudio => "LMSTUDIO",
        }
    }

    /// Whether the backend runs on the local machine
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Ollama | Self::Lmstudio)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider type: {s}"))
    }
}

/// Fallback chain policy
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackConfig {
    /// Whether connection failures walk the chain at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit chain appended after the requested selector
    ///
    /// When empty, the chain is `[secondary_local, cloud_default]`.
    #[serde(default)]
    pub chain: Vec<String>,
    /// Local runtime tried second (defaults to the other local runtime)
    #[serde(default)]
    pub secondary_local: Option<String>,
    /// Cloud selector tried last (defaults to the default provider)
    #[serde(default)]
    pub cloud_default: Option<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: Vec::new(),
            secondary_local: None,
            cloud_default: None,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Capability entry, keyed by `provider:model` (a trailing `*` makes it a wildcard)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityConfig {
    /// `provider:model` key or `provider:prefix*` pattern
    pub model: String,
    /// Accepts text input
    #[serde(default = "default_true")]
    pub text: bool,
    /// Accepts image parts
    #[serde(default)]
    pub vision: bool,
    /// Accepts tool schemas
    #[serde(default)]
    pub tools: bool,
    /// Reasoning strategy
    #[serde(default)]
    pub reasoning: ReasoningEntry,
}

/// Reasoning strategy of a capability entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasoningEntry {
    /// How reasoning content is separated
    #[serde(rename = "type", default)]
    pub kind: ReasoningType,
    /// Request parameter carrying the reasoning level
    #[serde(default)]
    pub native_param: Option<String>,
    /// Ordered regexes for pattern detection
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Level applied when the request names none
    #[serde(default)]
    pub default_level: Option<ReasoningLevel>,
}

/// How a model exposes reasoning content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningType {
    /// No reasoning channel
    #[default]
    None,
    /// Provider separates reasoning at the wire level
    Native,
    /// Reasoning is embedded in content and detected by pattern
    Pattern,
}

/// Requested reasoning effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningLevel {
    /// Reasoning disabled
    Off,
    /// Minimal effort
    Low,
    /// Balanced effort
    Medium,
    /// Maximum effort
    High,
}

impl ReasoningLevel {
    /// Lowercase name as sent in `reasoning_effort`-style parameters
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for ReasoningLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown reasoning level: {other}")),
        }
    }
}

impl fmt::Display for ReasoningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache lifetimes
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Lifetime of refreshed capability records
    #[serde(default = "default_capability_ttl", deserialize_with = "crate::duration::deserialize")]
    pub capability_ttl: Duration,
    /// Lifetime of provider health results
    #[serde(default = "default_health_ttl", deserialize_with = "crate::duration::deserialize")]
    pub health_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capability_ttl: default_capability_ttl(),
            health_ttl: default_health_ttl(),
        }
    }
}

const fn default_capability_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

const fn default_health_ttl() -> Duration {
    Duration::from_secs(30)
}

/// Network timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Availability probes and model listing
    #[serde(default = "default_probe_timeout", deserialize_with = "crate::duration::deserialize")]
    pub probe: Duration,
    /// TCP connect timeout for every request
    #[serde(default = "default_connect_timeout", deserialize_with = "crate::duration::deserialize")]
    pub connect: Duration,
    /// Non-streaming generation
    #[serde(default = "default_generate_timeout", deserialize_with = "crate::duration::deserialize")]
    pub generate: Duration,
    /// Streaming generation (unlimited when unset)
    #[serde(default, deserialize_with = "crate::duration::deserialize_option")]
    pub stream: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe: default_probe_timeout(),
            connect: default_connect_timeout(),
            generate: default_generate_timeout(),
            stream: None,
        }
    }
}

const fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_generate_timeout() -> Duration {
    Duration::from_secs(120)
}
