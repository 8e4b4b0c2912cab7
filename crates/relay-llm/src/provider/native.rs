//! Native cloud (`generateContent`) provider

use async_trait::async_trait;
use relay_config::ReasoningLevel;
use reqwest::Method;

use super::{CallOptions, ChunkStream, Endpoint, Provider, ProviderKind, ReasoningSettings};
use crate::convert::Transformed;
use crate::convert::native::{from_native, native_chunk_to_stream, to_native};
use crate::error::{ProviderError, RelayError};
use crate::protocol::native::{NativeModelList, NativeRequest, NativeResponse, ThinkingConfig};
use crate::types::{CompletionRequest, CompletionResponse, ModelInfo};

/// Provider speaking the native `generateContent` dialect
pub struct NativeProvider {
    endpoint: Endpoint,
}

impl NativeProvider {
    /// Adapter over a configured endpoint
    pub const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        format!("{}/models/{model}:{action}", self.endpoint.base())
    }

    fn wire_request(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<(String, Transformed<NativeRequest>), RelayError> {
        request.validate()?;
        let model = self.endpoint.model_for(request)?;

        let mut transformed = to_native(request);
        if let Some(settings) = &options.reasoning {
            transformed
                .wire
                .generation_config
                .get_or_insert_with(Default::default)
                .thinking_config = Some(thinking_config(settings));
        }

        super::log_warnings(&self.endpoint.name, &transformed.warnings);
        Ok((model, transformed))
    }
}

/// Thinking budget for a reasoning level
fn thinking_config(settings: &ReasoningSettings) -> ThinkingConfig {
    let budget = match settings.level {
        ReasoningLevel::Off => 0,
        ReasoningLevel::Low => 1024,
        ReasoningLevel::Medium => -1,
        ReasoningLevel::High => 24_576,
    };

    ThinkingConfig {
        include_thoughts: settings.level != ReasoningLevel::Off,
        thinking_budget: Some(budget),
    }
}

#[async_trait]
impl Provider for NativeProvider {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> Option<&str> {
        self.endpoint.default_model.as_deref()
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/models?pageSize=1000", self.endpoint.base());
        let list: NativeModelList = self.endpoint.fetch(self.endpoint.probe(&url)).await?;

        Ok(list
            .models
            .iter()
            .filter(|m| m.supports_generation())
            .map(|m| ModelInfo {
                display_name: m.display_name.clone(),
                context_window: m.input_token_limit,
                reasoning: m.thinking,
                ..ModelInfo::new(&self.endpoint.name, m.id())
            })
            .collect())
    }

    async fn generate(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<CompletionResponse, RelayError> {
        let (model, Transformed { wire, warnings }) = self.wire_request(request, options)?;

        let builder = self
            .endpoint
            .request(Method::POST, &self.model_url(&model, "generateContent"))
            .timeout(self.endpoint.generate_timeout(options))
            .json(&wire);
        let wire_response: NativeResponse = self.endpoint.fetch(builder).await?;

        let mut response = from_native(wire_response)?;
        if response.model.is_empty() {
            response.model = model;
        }
        response.warnings.extend(warnings);
        Ok(response)
    }

    async fn generate_stream(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<ChunkStream, RelayError> {
        let (model, Transformed { wire, .. }) = self.wire_request(request, options)?;

        let url = format!("{}?alt=sse", self.model_url(&model, "streamGenerateContent"));
        let mut builder = self.endpoint.request(Method::POST, &url).json(&wire);
        if let Some(timeout) = self.endpoint.stream_timeout(options) {
            builder = builder.timeout(timeout);
        }

        let response = self.endpoint.send(builder).await?;
        let mut next_call = 0;
        Ok(super::sse_chunks(&self.endpoint.name, response, move |chunk: &NativeResponse| {
            native_chunk_to_stream(chunk, &mut next_call)
        }))
    }
}
