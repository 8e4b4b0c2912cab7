//! OpenAI-compatible chat completions provider
//!
//! One adapter serves the hosted API and every local runtime that speaks the
//! same dialect. A [`CompatFlavor`] supplies the few behaviours that differ.

use async_trait::async_trait;
use relay_config::ReasoningLevel;
use reqwest::Method;
use url::Url;

use super::{CallOptions, ChunkStream, Endpoint, Provider, ProviderKind, ReasoningSettings};
use crate::capability::CapabilityHint;
use crate::convert::Transformed;
use crate::convert::openai::{from_openai, openai_chunk_to_stream, to_openai};
use crate::error::{ProviderError, RelayError};
use crate::protocol::openai::{OpenAiModelList, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};

/// Parameter carrying the level when a model names none
const REASONING_EFFORT: &str = "reasoning_effort";

/// Backend-specific behaviour of an OpenAI-compatible endpoint
#[async_trait]
pub trait CompatFlavor: Send + Sync + 'static {
    /// Backend kind
    fn kind(&self) -> ProviderKind;

    /// Root of the OpenAI-compatible routes for a configured base URL
    fn api_base(&self, base_url: &Url) -> String {
        base_url.as_str().trim_end_matches('/').to_owned()
    }

    /// Add the reasoning level to the request body
    ///
    /// Defaults to `reasoning_effort`, omitted entirely when reasoning is off.
    fn inject_reasoning(&self, request: &mut OpenAiRequest, settings: &ReasoningSettings) {
        if settings.level == ReasoningLevel::Off {
            return;
        }
        let param = settings.param_name.as_deref().unwrap_or(REASONING_EFFORT);
        request.extra.insert(param.to_owned(), settings.level.as_str().into());
    }

    /// List models; defaults to `GET {api_base}/models`
    async fn list_models(&self, endpoint: &Endpoint, api_base: &str) -> Result<Vec<ModelInfo>, ProviderError> {
        let list: OpenAiModelList = endpoint.fetch(endpoint.probe(&format!("{api_base}/models"))).await?;
        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo::new(&endpoint.name, m.id))
            .collect())
    }

    /// Capability metadata for one model, when the backend exposes any
    async fn probe(&self, _endpoint: &Endpoint, _model: &str) -> Result<Option<CapabilityHint>, ProviderError> {
        Ok(None)
    }
}

/// Hosted OpenAI API or any compatible server
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFlavor;

impl CompatFlavor for GenericFlavor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }
}

/// Generic OpenAI-compatible provider
pub type OpenAiProvider = OpenAiCompatProvider<GenericFlavor>;

/// Adapter for the OpenAI-compatible dialect
pub struct OpenAiCompatProvider<F> {
    endpoint: Endpoint,
    api_base: String,
    flavor: F,
}

impl<F: CompatFlavor> OpenAiCompatProvider<F> {
    /// Adapter over a configured endpoint
    pub fn new(endpoint: Endpoint, flavor: F) -> Self {
        let api_base = flavor.api_base(endpoint.base_url());
        Self {
            endpoint,
            api_base,
            flavor,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Whether the endpoint is the hosted API rather than a compatible server
    fn is_canonical_openai(&self) -> bool {
        self.endpoint.base_url().host_str() == Some("api.openai.com")
    }

    fn wire_request(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<Transformed<OpenAiRequest>, RelayError> {
        request.validate()?;
        let model = self.endpoint.model_for(request)?;

        let mut transformed = to_openai(request);
        transformed.wire.model = model;
        if let Some(settings) = &options.reasoning {
            self.flavor.inject_reasoning(&mut transformed.wire, settings);
        }

        super::log_warnings(&self.endpoint.name, &transformed.warnings);
        Ok(transformed)
    }
}

#[async_trait]
impl<F: CompatFlavor> Provider for OpenAiCompatProvider<F> {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn kind(&self) -> ProviderKind {
        self.flavor.kind()
    }

    fn default_model(&self) -> Option<&str> {
        self.endpoint.default_model.as_deref()
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        self.flavor.list_models(&self.endpoint, &self.api_base).await
    }

    async fn generate(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<CompletionResponse, RelayError> {
        let Transformed { wire, warnings } = self.wire_request(request, options)?;

        let builder = self
            .endpoint
            .request(Method::POST, &self.completions_url())
            .timeout(self.endpoint.generate_timeout(options))
            .json(&wire);
        let wire_response: OpenAiResponse = self.endpoint.fetch(builder).await?;

        let mut response = from_openai(wire_response)?;
        if response.model.is_empty() {
            response.model = wire.model;
        }
        response.warnings.extend(warnings);
        Ok(response)
    }

    async fn generate_stream(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<ChunkStream, RelayError> {
        let Transformed { mut wire, .. } = self.wire_request(request, options)?;
        wire.stream = Some(true);

        // Many compatible servers reject the unknown parameter
        wire.stream_options = self
            .is_canonical_openai()
            .then_some(OpenAiStreamOptions { include_usage: true });

        let mut builder = self
            .endpoint
            .request(Method::POST, &self.completions_url())
            .json(&wire);
        if let Some(timeout) = self.endpoint.stream_timeout(options) {
            builder = builder.timeout(timeout);
        }

        let response = self.endpoint.send(builder).await?;
        Ok(super::sse_chunks(&self.endpoint.name, response, |chunk: &OpenAiStreamChunk| {
            openai_chunk_to_stream(chunk)
        }))
    }

    async fn probe_capability(&self, model: &str) -> Result<Option<CapabilityHint>, ProviderError> {
        self.flavor.probe(&self.endpoint, model).await
    }
}

/// Append `/v1` unless the configured URL already ends with it
pub(super) fn v1_base(base_url: &Url) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_owned()
    } else {
        format!("{base}/v1")
    }
}
