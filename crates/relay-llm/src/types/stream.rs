use serde::{Deserialize, Serialize};

use super::message::ToolCall;
use super::response::{FinishReason, Usage};

/// Decoded chunk produced by a provider stream
///
/// Adapters tag text as reasoning only when the backend separates it at the
/// wire level; everything else arrives as `Content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// User-facing text fragment
    Content(String),
    /// Reasoning fragment separated by the backend
    Reasoning(String),
    /// Partial tool call, merged by `index`
    ToolCallDelta {
        /// Position of the call in the response
        index: u32,
        /// Call id (first fragment only)
        id: Option<String>,
        /// Function name (first fragment only)
        name: Option<String>,
        /// Arguments JSON fragment
        arguments: Option<String>,
    },
    /// Generation finished
    Finish(FinishReason),
    /// Usage totals
    Usage(Usage),
}

/// Which channel a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Intermediate deliberation
    Reasoning,
    /// User-facing answer
    Content,
}

/// Text fragment emitted by the thinking processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingToken {
    /// Channel
    pub kind: TokenKind,
    /// Fragment text
    pub text: String,
    /// Short display line for reasoning spans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl ThinkingToken {
    /// Content fragment
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Content,
            text: text.into(),
            subject: None,
        }
    }

    /// Reasoning fragment with an optional subject line
    pub fn reasoning(text: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            kind: TokenKind::Reasoning,
            text: text.into(),
            subject,
        }
    }

    /// Whether this is a reasoning fragment
    pub fn is_reasoning(&self) -> bool {
        self.kind == TokenKind::Reasoning
    }
}

/// Event delivered to callers of a streaming route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Reasoning or content fragment
    Token(ThinkingToken),
    /// Fully assembled tool call
    ToolCall(ToolCall),
    /// Stream completed
    Finished {
        /// Why generation stopped
        finish_reason: FinishReason,
        /// Usage totals, when the backend reported them
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}
