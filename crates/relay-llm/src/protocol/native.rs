//! Native cloud `generateContent` wire format

use serde::{Deserialize, Serialize};

// -- Request types --

/// `generateContent` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeRequest {
    /// Conversation turns
    pub contents: Vec<NativeContent>,
    /// System instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<NativeContent>,
    /// Generation configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// Tool declarations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<NativeTool>>,
}

/// Role plus ordered parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeContent {
    /// `user` or `model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(default)]
    pub parts: Vec<NativePart>,
}

/// One part of a content object; exactly one payload field is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePart {
    /// Text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Marks `text` as a thought summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Inline binary payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Function call emitted by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<NativeFunctionCall>,
    /// Function result sent by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<NativeFunctionResponse>,
}

impl NativePart {
    /// Plain text part
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether this part is a thought summary
    pub fn is_thought(&self) -> bool {
        self.thought == Some(true)
    }
}

/// Base64 payload with its MIME type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// MIME type (e.g. `image/png`)
    pub mime_type: String,
    /// Base64 data
    pub data: String,
}

/// Function call emitted by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeFunctionCall {
    /// Function name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Function result sent back to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeFunctionResponse {
    /// Name of the function that was called
    pub name: String,
    /// Result object
    pub response: serde_json::Value,
}

/// Generation parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Output token ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Reasoning controls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Reasoning controls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Return thought summaries as `thought` parts
    pub include_thoughts: bool,
    /// Token budget (`0` disables, `-1` lets the model decide)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
}

/// Tool declaration wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTool {
    /// Function declarations
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Function declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// -- Response types --

/// `generateContent` response; streaming sends one per SSE event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    /// Model version that served the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// Generated candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content (absent when blocked)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NativeContent>,
    /// `STOP`, `MAX_TOKENS`, `SAFETY`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Candidate index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Visible output tokens
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Reasoning tokens
    #[serde(default)]
    pub thoughts_token_count: u32,
    /// Sum of all of the above
    #[serde(default)]
    pub total_token_count: u32,
}

// -- Model listing --

/// `GET /models` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeModelList {
    /// Models on this page
    #[serde(default)]
    pub models: Vec<NativeModel>,
    /// Pagination token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Entry of the model listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeModel {
    /// Resource name (`models/<id>`)
    pub name: String,
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Context window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_limit: Option<u32>,
    /// Output ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_token_limit: Option<u32>,
    /// Supported RPC names (`generateContent`, `embedContent`, ...)
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
    /// Whether the model reasons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<bool>,
}

impl NativeModel {
    /// Model id without the `models/` prefix
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    /// Whether the model can be used for chat
    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods.iter().any(|m| m == "generateContent")
    }
}
