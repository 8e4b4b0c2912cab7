//! LM Studio REST listing endpoint (`/api/v0/models`)

use serde::{Deserialize, Serialize};

/// `GET /api/v0/models` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LmStudioModelList {
    /// Downloaded models
    #[serde(default)]
    pub data: Vec<LmStudioModel>,
}

/// Downloaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmStudioModel {
    /// Model key
    pub id: String,
    /// `llm`, `vlm` or `embeddings`
    #[serde(rename = "type", default)]
    pub model_type: String,
    /// Architecture (`qwen3`, `gemma3`)
    #[serde(default)]
    pub arch: Option<String>,
    /// `loaded` or `not-loaded`
    #[serde(default)]
    pub state: Option<String>,
    /// Maximum context the model supports
    #[serde(default)]
    pub max_context_length: Option<u32>,
    /// Extra capabilities (`tool_use`)
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl LmStudioModel {
    /// Vision-language model
    pub fn is_vision(&self) -> bool {
        self.model_type == "vlm"
    }

    /// Embedding-only model, unusable for chat
    pub fn is_embedding(&self) -> bool {
        self.model_type == "embeddings"
    }

    /// Trained for tool use
    pub fn supports_tools(&self) -> bool {
        self.capabilities.iter().any(|c| c == "tool_use")
    }

    /// Currently loaded in memory
    pub fn is_loaded(&self) -> bool {
        self.state.as_deref() == Some("loaded")
    }
}
