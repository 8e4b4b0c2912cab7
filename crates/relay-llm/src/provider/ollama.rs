//! Ollama flavor of the OpenAI-compatible provider
//!
//! Chat goes through `/v1`; listing and capability probes use the native
//! `/api/tags` and `/api/show` routes, which carry richer metadata.

use async_trait::async_trait;
use relay_config::ReasoningLevel;
use reqwest::Method;
use url::Url;

use super::openai::{CompatFlavor, OpenAiCompatProvider, v1_base};
use super::{Endpoint, ProviderKind, ReasoningSettings};
use crate::capability::{CapabilityHint, ReasoningKind};
use crate::error::ProviderError;
use crate::protocol::ollama::{OllamaModelDetails, OllamaShowRequest, OllamaShowResponse, OllamaTags};
use crate::protocol::openai::OpenAiRequest;
use crate::types::ModelInfo;

/// Boolean switch accepted by thinking models
const THINK: &str = "think";

/// Projector families that mark a multimodal model
const VISION_FAMILIES: [&str; 2] = ["clip", "mllama"];

/// Ollama provider
pub type OllamaProvider = OpenAiCompatProvider<OllamaFlavor>;

/// Ollama-specific behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaFlavor;

fn has_vision_family(details: Option<&OllamaModelDetails>) -> Option<bool> {
    let families = details?.families.as_ref()?;
    Some(families.iter().any(|f| VISION_FAMILIES.contains(&f.as_str())))
}

/// Host root with any `/v1` suffix removed
fn native_base(base_url: &Url) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    base.strip_suffix("/v1").unwrap_or(base).to_owned()
}

#[async_trait]
impl CompatFlavor for OllamaFlavor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn api_base(&self, base_url: &Url) -> String {
        v1_base(base_url)
    }

    /// `think` takes a boolean; any other parameter takes the level name
    fn inject_reasoning(&self, request: &mut OpenAiRequest, settings: &ReasoningSettings) {
        match settings.param_name.as_deref().unwrap_or(THINK) {
            THINK => {
                request
                    .extra
                    .insert(THINK.to_owned(), (settings.level != ReasoningLevel::Off).into());
            }
            param if settings.level != ReasoningLevel::Off => {
                request.extra.insert(param.to_owned(), settings.level.as_str().into());
            }
            _ => {}
        }
    }

    async fn list_models(&self, endpoint: &Endpoint, _api_base: &str) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/api/tags", native_base(endpoint.base_url()));
        let tags: OllamaTags = endpoint.fetch(endpoint.probe(&url)).await?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                vision: has_vision_family(m.details.as_ref()),
                ..ModelInfo::new(&endpoint.name, m.name)
            })
            .collect())
    }

    async fn probe(&self, endpoint: &Endpoint, model: &str) -> Result<Option<CapabilityHint>, ProviderError> {
        let url = format!("{}/api/show", native_base(endpoint.base_url()));
        let request = endpoint
            .request(Method::POST, &url)
            .timeout(endpoint.timeouts.probe)
            .json(&OllamaShowRequest { model: model.to_owned() });
        let show: OllamaShowResponse = endpoint.fetch(request).await?;

        // Releases before capability reporting return an empty list
        if show.capabilities.is_empty() {
            return Ok(Some(CapabilityHint {
                vision: has_vision_family(show.details.as_ref()),
                context_window: show.context_length(),
                ..CapabilityHint::default()
            }));
        }

        Ok(Some(CapabilityHint {
            vision: Some(show.has_capability("vision")),
            tools: Some(show.has_capability("tools")),
            reasoning: show.has_capability("thinking").then_some(ReasoningKind::Pattern),
            context_window: show.context_length(),
        }))
    }
}
