//! Transformers between canonical types and each wire dialect
//!
//! Both directions are pure. Out-of-range numeric parameters are clamped and
//! reported as warnings rather than errors.

pub mod native;
pub mod openai;

use std::fmt;

use crate::error::TransformError;
use crate::protocol::native::{NativeRequest, NativeResponse};
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse};
use crate::types::{CompletionRequest, CompletionResponse, Message, Role};

/// Accepted temperature range for both dialects
const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// Output ceiling of the native dialect
pub const NATIVE_MAX_OUTPUT_TOKENS: u32 = 65_536;

/// Wire dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `generateContent`-shaped cloud API
    Native,
    /// OpenAI-compatible chat completions
    OpenAiChat,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::OpenAiChat => "openai-chat",
        })
    }
}

/// Request body in a specific dialect
#[derive(Debug, Clone)]
pub enum WireRequest {
    /// Native dialect body
    Native(NativeRequest),
    /// OpenAI-compatible body
    OpenAi(OpenAiRequest),
}

/// Response body in a specific dialect
#[derive(Debug, Clone)]
pub enum WireResponse {
    /// Native dialect body
    Native(NativeResponse),
    /// OpenAI-compatible body
    OpenAi(OpenAiResponse),
}

/// Transformer output plus the adjustments it made
#[derive(Debug, Clone)]
pub struct Transformed<T> {
    /// Wire value
    pub wire: T,
    /// Human-readable notes about clamped values
    pub warnings: Vec<String>,
}

/// Convert a canonical request to `dialect`
pub fn to_wire(dialect: Dialect, request: &CompletionRequest) -> Result<Transformed<WireRequest>, TransformError> {
    request.validate()?;

    Ok(match dialect {
        Dialect::Native => {
            let Transformed { wire, warnings } = native::to_native(request);
            Transformed {
                wire: WireRequest::Native(wire),
                warnings,
            }
        }
        Dialect::OpenAiChat => {
            let Transformed { wire, warnings } = openai::to_openai(request);
            Transformed {
                wire: WireRequest::OpenAi(wire),
                warnings,
            }
        }
    })
}

/// Convert a wire response of `dialect` to canonical form
pub fn from_wire(dialect: Dialect, response: WireResponse) -> Result<CompletionResponse, TransformError> {
    match (dialect, response) {
        (Dialect::Native, WireResponse::Native(response)) => native::from_native(response),
        (Dialect::OpenAiChat, WireResponse::OpenAi(response)) => openai::from_openai(response),
        (expected, _) => Err(TransformError::DialectMismatch { expected }),
    }
}

pub(crate) fn clamp_temperature(value: f64, warnings: &mut Vec<String>) -> f64 {
    let (min, max) = TEMPERATURE_RANGE;
    let clamped = value.clamp(min, max);
    if (clamped - value).abs() > f64::EPSILON {
        warnings.push(format!("temperature {value} clamped to {clamped}"));
    }
    clamped
}

pub(crate) fn clamp_max_tokens(value: u32, ceiling: Option<u32>, warnings: &mut Vec<String>) -> u32 {
    let clamped = ceiling.map_or(value, |max| value.min(max)).max(1);
    if clamped != value {
        warnings.push(format!("max_tokens {value} clamped to {clamped}"));
    }
    clamped
}

/// Whether a message would be empty once sent
///
/// Tool results and assistant tool-call turns are kept even without text.
pub(crate) fn is_droppable(message: &Message) -> bool {
    match message.role {
        Role::Tool => false,
        Role::Assistant if message.has_tool_calls() => false,
        _ => message.content.is_blank(),
    }
}
