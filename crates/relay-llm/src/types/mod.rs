//! Canonical request and response types
//!
//! Every provider adapter converts to and from these shapes. Wire-level
//! details live in [`crate::protocol`].

pub mod message;
pub mod model;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Role, ToolCall};
pub use model::{ModelInfo, ModelSelector};
pub use request::{CompletionParams, CompletionRequest};
pub use response::{CompletionResponse, FinishReason, Usage};
pub use stream::{StreamChunk, StreamEvent, ThinkingToken, TokenKind};
pub use tool::ToolSchema;
