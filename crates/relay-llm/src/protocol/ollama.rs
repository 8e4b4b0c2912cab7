//! Ollama native listing and model-detail endpoints

use serde::{Deserialize, Serialize};

/// `GET /api/tags` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaTags {
    /// Locally installed models
    #[serde(default)]
    pub models: Vec<OllamaModel>,
}

/// Installed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    /// Tag name (`qwen3:8b`)
    pub name: String,
    /// Size on disk in bytes
    #[serde(default)]
    pub size: u64,
    /// Family and quantisation details
    #[serde(default)]
    pub details: Option<OllamaModelDetails>,
}

/// Model metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaModelDetails {
    /// Primary family (`qwen3`, `llama`)
    #[serde(default)]
    pub family: Option<String>,
    /// All families (multimodal models list a projector family such as `clip`)
    #[serde(default)]
    pub families: Option<Vec<String>>,
    /// Parameter count (`8.2B`)
    #[serde(default)]
    pub parameter_size: Option<String>,
    /// Quantisation (`Q4_K_M`)
    #[serde(default)]
    pub quantization_level: Option<String>,
}

/// `POST /api/show` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaShowRequest {
    /// Model tag
    pub model: String,
}

/// `POST /api/show` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaShowResponse {
    /// `completion`, `vision`, `tools`, `thinking`, ...
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// GGUF metadata keyed `<arch>.<field>`
    #[serde(default)]
    pub model_info: serde_json::Map<String, serde_json::Value>,
    /// Model metadata
    #[serde(default)]
    pub details: Option<OllamaModelDetails>,
}

impl OllamaShowResponse {
    /// Whether the capability list names `capability`
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Context window from `<arch>.context_length`
    pub fn context_length(&self) -> Option<u32> {
        self.model_info
            .iter()
            .find(|(key, _)| key.ends_with(".context_length"))
            .and_then(|(_, value)| value.as_u64())
            .and_then(|n| u32::try_from(n).ok())
    }
}
