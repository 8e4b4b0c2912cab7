use serde::{Deserialize, Serialize};

use super::message::Message;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the output token limit
    MaxTokens,
    /// Model requested a tool call
    ToolCall,
    /// Anything else the backend reported
    Other,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
}

impl Usage {
    /// Prompt plus completion tokens
    pub const fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Canonical completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Model that produced the response
    pub model: String,
    /// Assistant message
    pub message: Message,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Token usage
    #[serde(default)]
    pub usage: Usage,
    /// Separated reasoning text, never part of `message`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Non-fatal adjustments made while transforming the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
