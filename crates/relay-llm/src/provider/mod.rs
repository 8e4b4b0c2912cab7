//! Provider trait and adapters for each backend
//!
//! Every backend is one row of a static descriptor table plus a small
//! adapter. OpenAI-compatible runtimes share [`OpenAiCompatProvider`] and
//! differ only in their [`CompatFlavor`].

mod lmstudio;
mod native;
mod ollama;
mod openai;

#[cfg(test)]
pub(crate) mod fake;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use relay_config::{ProviderConfig, ProviderType, ReasoningLevel, TimeoutConfig};
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

pub use self::lmstudio::{LmStudioFlavor, LmStudioProvider};
pub use self::native::NativeProvider;
pub use self::ollama::{OllamaFlavor, OllamaProvider};
pub use self::openai::{CompatFlavor, GenericFlavor, OpenAiCompatProvider, OpenAiProvider};
use crate::capability::CapabilityHint;
use crate::convert::Dialect;
use crate::error::{ProviderError, ProviderErrorCause, RelayError, TransformError};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo, StreamChunk};

/// Raw decoded chunks of one streaming call
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Reasoning level to inject into a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningSettings {
    /// Requested effort
    pub level: ReasoningLevel,
    /// Request parameter carrying the level, when the model names one
    pub param_name: Option<String>,
}

/// Per-call options decided by the router
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Reasoning level, only set for reasoning-capable models
    pub reasoning: Option<ReasoningSettings>,
    /// Transport timeout replacing the configured default
    pub timeout: Option<Duration>,
}

/// Trait implemented by each LLM backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Backend kind
    fn kind(&self) -> ProviderKind;

    /// Model used when a selector names only the provider
    fn default_model(&self) -> Option<&str> {
        None
    }

    /// Lightweight reachability probe bounded by the probe timeout
    async fn is_available(&self) -> bool {
        self.list_models().await.is_ok()
    }

    /// Models the backend currently offers
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Send a non-streaming request
    async fn generate(&self, request: &CompletionRequest, options: &CallOptions)
    -> Result<CompletionResponse, RelayError>;

    /// Send a streaming request and return the decoded chunks
    async fn generate_stream(&self, request: &CompletionRequest, options: &CallOptions)
    -> Result<ChunkStream, RelayError>;

    /// Ask the backend what it knows about a model
    async fn probe_capability(&self, _model: &str) -> Result<Option<CapabilityHint>, ProviderError> {
        Ok(None)
    }
}

/// Backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Native cloud API
    Gemini,
    /// Generic OpenAI-compatible endpoint
    OpenAi,
    /// Ollama local runtime
    Ollama,
    /// LM Studio local server
    LmStudio,
}

struct Descriptor {
    name: &'static str,
    env_prefix: &'static str,
    default_base_url: &'static str,
    dialect: Dialect,
    local: bool,
    hint: &'static str,
    default_model: Option<&'static str>,
}

const DESCRIPTORS: [Descriptor; 4] = [
    Descriptor {
        name: "gemini",
        env_prefix: "GEMINI",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        dialect: Dialect::Native,
        local: false,
        hint: "set GEMINI_API_KEY, or GEMINI_HOST for a proxy",
        default_model: Some("gemini-2.5-flash"),
    },
    Descriptor {
        name: "openai",
        env_prefix: "OPENAI",
        default_base_url: "https://api.openai.com/v1",
        dialect: Dialect::OpenAiChat,
        local: false,
        hint: "set OPENAI_API_KEY, or OPENAI_HOST for a compatible server",
        default_model: Some("gpt-4o-mini"),
    },
    Descriptor {
        name: "ollama",
        env_prefix: "OLLAMA",
        default_base_url: "http://localhost:11434",
        dialect: Dialect::OpenAiChat,
        local: true,
        hint: "start Ollama with `ollama serve` or set OLLAMA_HOST",
        default_model: Some("llama3.2"),
    },
    Descriptor {
        name: "lmstudio",
        env_prefix: "LMSTUDIO",
        default_base_url: "http://localhost:1234",
        dialect: Dialect::OpenAiChat,
        local: true,
        hint: "start the LM Studio server with `lms server start` or set LMSTUDIO_HOST",
        default_model: None,
    },
];

impl ProviderKind {
    const fn descriptor(self) -> &'static Descriptor {
        match self {
            Self::Gemini => &DESCRIPTORS[0],
            Self::OpenAi => &DESCRIPTORS[1],
            Self::Ollama => &DESCRIPTORS[2],
            Self::LmStudio => &DESCRIPTORS[3],
        }
    }

    /// Canonical name
    pub const fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Environment variable prefix
    pub const fn env_prefix(self) -> &'static str {
        self.descriptor().env_prefix
    }

    /// Base URL used when none is configured
    pub const fn default_base_url(self) -> &'static str {
        self.descriptor().default_base_url
    }

    /// Wire dialect
    pub const fn dialect(self) -> Dialect {
        self.descriptor().dialect
    }

    /// Whether the backend runs on the local machine
    pub const fn is_local(self) -> bool {
        self.descriptor().local
    }

    /// Remediation shown when the backend is unreachable
    pub const fn hint(self) -> &'static str {
        self.descriptor().hint
    }

    /// Model used when neither the selector nor the config names one
    pub const fn default_model(self) -> Option<&'static str> {
        self.descriptor().default_model
    }
}

impl From<ProviderType> for ProviderKind {
    fn from(value: ProviderType) -> Self {
        match value {
            ProviderType::Gemini => Self::Gemini,
            ProviderType::Openai => Self::OpenAi,
            ProviderType::Ollama => Self::Ollama,
            ProviderType::Lmstudio => Self::LmStudio,
        }
    }
}

/// Build the adapter for a configured provider
///
/// # Errors
///
/// Returns `RelayError::Internal` if the HTTP client cannot be built.
pub fn build(name: &str, config: &ProviderConfig, timeouts: &TimeoutConfig) -> Result<Arc<dyn Provider>, RelayError> {
    let kind = ProviderKind::from(config.provider_type);
    let endpoint = Endpoint::new(name, kind, config, timeouts)?;

    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::Gemini => Arc::new(NativeProvider::new(endpoint)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(endpoint, GenericFlavor)),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(endpoint, OllamaFlavor)),
        ProviderKind::LmStudio => Arc::new(LmStudioProvider::new(endpoint, LmStudioFlavor)),
    };

    tracing::debug!(provider = %name, kind = kind.name(), "provider configured");
    Ok(provider)
}

/// HTTP transport shared by every adapter
pub struct Endpoint {
    name: String,
    kind: ProviderKind,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: Option<String>,
    timeouts: TimeoutConfig,
}

impl Endpoint {
    /// Transport for a configured provider
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Internal` if the HTTP client cannot be built.
    pub fn new(name: &str, kind: ProviderKind, config: &ProviderConfig, timeouts: &TimeoutConfig) -> Result<Self, RelayError> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(kind.default_base_url())
                .map_err(|e| anyhow::anyhow!("invalid default base URL for {}: {e}", kind.name()))?,
        };

        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client for {name}: {e}"))?;

        Ok(Self {
            name: name.to_owned(),
            kind,
            client,
            base_url,
            api_key: config.api_key.clone(),
            default_model: config.model.clone().or_else(|| kind.default_model().map(ToOwned::to_owned)),
            timeouts: timeouts.clone(),
        })
    }

    /// Configured base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL without a trailing slash
    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Model to call: the request's, else the configured default
    fn model_for(&self, request: &CompletionRequest) -> Result<String, TransformError> {
        if !request.model.is_empty() {
            return Ok(request.model.clone());
        }
        self.default_model.clone().ok_or_else(|| TransformError::MissingModel {
            provider: self.name.clone(),
        })
    }

    fn generate_timeout(&self, options: &CallOptions) -> Duration {
        options.timeout.unwrap_or(self.timeouts.generate)
    }

    fn stream_timeout(&self, options: &CallOptions) -> Option<Duration> {
        options.timeout.or(self.timeouts.stream)
    }

    /// Request with the dialect's authentication applied
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match (&self.api_key, self.kind.dialect()) {
            (Some(key), Dialect::Native) => builder.header("x-goog-api-key", key.expose_secret()),
            (Some(key), Dialect::OpenAiChat) => builder.bearer_auth(key.expose_secret()),
            (None, _) => builder,
        }
    }

    /// `GET` bounded by the probe timeout
    fn probe(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url).timeout(self.timeouts.probe)
    }

    /// Send a request, turning transport failures and non-2xx replies into errors
    async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "upstream request failed");
            ProviderError::from_reqwest(&self.name, &e)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.name, status = %status, "upstream returned error");
            return Err(ProviderError::status(&self.name, status, body));
        }

        Ok(response)
    }

    /// Send a request and decode its JSON body
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = self.send(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, &e))?;

        serde_json::from_slice(&body)
            .map_err(|e| ProviderError::new(&self.name, ProviderErrorCause::Decode(e.to_string())))
    }
}

/// Decode a server-sent event body into chunks
///
/// `[DONE]` markers and keep-alives are dropped; unparseable events are
/// skipped so one odd frame does not end the stream.
fn sse_chunks<T, F>(provider: &str, response: Response, mut decode: F) -> ChunkStream
where
    T: DeserializeOwned,
    F: FnMut(&T) -> Vec<StreamChunk> + Send + 'static,
{
    let provider = provider.to_owned();

    let chunks = response
        .bytes_stream()
        .eventsource()
        .map(move |result| match result {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    return Vec::new();
                }

                match serde_json::from_str::<T>(data) {
                    Ok(chunk) => decode(&chunk).into_iter().map(Ok).collect(),
                    Err(e) => {
                        tracing::debug!(provider = %provider, error = %e, data = %data, "skipping unparseable SSE chunk");
                        Vec::new()
                    }
                }
            }
            Err(e) => vec![Err(ProviderError::new(&provider, ProviderErrorCause::Stream(e.to_string())))],
        })
        .flat_map(futures_util::stream::iter);

    Box::pin(chunks)
}

/// Log transform warnings the adapter is about to attach to a response
fn log_warnings(provider: &str, warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(provider = %provider, warning = %warning, "request adjusted for backend");
    }
}
