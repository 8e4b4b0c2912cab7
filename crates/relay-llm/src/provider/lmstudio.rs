//! LM Studio flavor of the OpenAI-compatible provider

use async_trait::async_trait;
use url::Url;

use super::openai::{CompatFlavor, OpenAiCompatProvider, v1_base};
use super::{Endpoint, ProviderKind};
use crate::capability::CapabilityHint;
use crate::error::ProviderError;
use crate::protocol::lmstudio::{LmStudioModel, LmStudioModelList};
use crate::types::ModelInfo;

/// LM Studio provider
pub type LmStudioProvider = OpenAiCompatProvider<LmStudioFlavor>;

/// LM Studio-specific behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct LmStudioFlavor;

fn rest_base(base_url: &Url) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{}/api/v0", base.strip_suffix("/v1").unwrap_or(base))
}

fn hint(model: &LmStudioModel) -> CapabilityHint {
    CapabilityHint {
        vision: Some(model.is_vision()),
        tools: Some(model.supports_tools()),
        reasoning: None,
        context_window: model.max_context_length,
    }
}

#[async_trait]
impl CompatFlavor for LmStudioFlavor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LmStudio
    }

    fn api_base(&self, base_url: &Url) -> String {
        v1_base(base_url)
    }

    /// Chat-capable models from the REST listing; embedding models are skipped
    async fn list_models(&self, endpoint: &Endpoint, _api_base: &str) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/models", rest_base(endpoint.base_url()));
        let list: LmStudioModelList = endpoint.fetch(endpoint.probe(&url)).await?;

        Ok(list
            .data
            .into_iter()
            .filter(|m| !m.is_embedding())
            .map(|m| ModelInfo {
                vision: Some(m.is_vision()),
                tools: Some(m.supports_tools()),
                context_window: m.max_context_length,
                ..ModelInfo::new(&endpoint.name, m.id)
            })
            .collect())
    }

    async fn probe(&self, endpoint: &Endpoint, model: &str) -> Result<Option<CapabilityHint>, ProviderError> {
        let url = format!("{}/models/{model}", rest_base(endpoint.base_url()));
        let entry: LmStudioModel = endpoint.fetch(endpoint.probe(&url)).await?;
        Ok(Some(hint(&entry)))
    }
}
