use std::collections::HashSet;
use std::time::Duration;

use relay_config::ReasoningLevel;
use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::tool::ToolSchema;
use crate::error::TransformError;

/// Parameters controlling text generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Canonical completion request
///
/// `model` is a `provider:model` selector when handed to the router. The
/// router rewrites it to the bare model id before calling an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model selector or bare model id
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Tools available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    /// Generation parameters
    #[serde(default)]
    pub params: CompletionParams,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Requested reasoning effort
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningLevel>,
    /// Fallback selectors replacing the configured chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<String>>,
    /// Per-call transport timeout
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    /// Request with default parameters
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            params: CompletionParams::default(),
            stream: false,
            reasoning: None,
            fallback: None,
            timeout: None,
        }
    }

    /// Whether any message carries an image part
    pub fn has_images(&self) -> bool {
        self.messages.iter().any(|m| m.content.has_images())
    }

    /// Whether tool schemas are attached
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    /// Check conversation and tool invariants
    ///
    /// The conversation must be non-empty, tool names must be unique, and
    /// every tool message must answer a call emitted by an earlier assistant
    /// message.
    pub fn validate(&self) -> Result<(), TransformError> {
        if self.messages.is_empty() {
            return Err(TransformError::EmptyConversation);
        }

        let mut names = HashSet::new();
        for tool in self.tools.iter().flatten() {
            if !names.insert(tool.name.as_str()) {
                return Err(TransformError::DuplicateTool { name: tool.name.clone() });
            }
        }

        let mut emitted = HashSet::new();
        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Assistant => {
                    emitted.extend(message.tool_calls.iter().flatten().map(|call| call.id.as_str()));
                }
                Role::Tool => {
                    let Some(id) = message.tool_call_id.as_deref() else {
                        return Err(TransformError::MissingToolCallId { index });
                    };
                    if !emitted.contains(id) {
                        return Err(TransformError::UnknownToolCall {
                            index,
                            id: id.to_owned(),
                        });
                    }
                }
                Role::System | Role::User => {}
            }
        }

        Ok(())
    }
}
