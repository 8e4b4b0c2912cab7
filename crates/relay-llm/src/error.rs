use http::StatusCode;
use thiserror::Error;

use crate::convert::Dialect;
use crate::router::FallbackAttempt;

/// Malformed canonical input or undecodable wire output
///
/// Never retried and never a fallback trigger.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Request has no messages
    #[error("conversation is empty")]
    EmptyConversation,

    /// Tool message without a `tool_call_id`
    #[error("tool message at position {index} has no tool_call_id")]
    MissingToolCallId { index: usize },

    /// Tool message answering a call no earlier assistant message made
    #[error("tool message at position {index} references unknown tool call '{id}'")]
    UnknownToolCall { index: usize, id: String },

    /// Two tool schemas share a name
    #[error("duplicate tool name: {name}")]
    DuplicateTool { name: String },

    /// Selector resolved to no model and the provider has no default
    #[error("no model given for provider '{provider}' and it has no default model")]
    MissingModel { provider: String },

    /// Response carried no choice or candidate
    #[error("response contained no choices")]
    EmptyResponse,

    /// Wire value of the wrong dialect
    #[error("expected {expected} wire data")]
    DialectMismatch { expected: Dialect },
}

/// Underlying reason for a provider failure
#[derive(Debug, Error)]
pub enum ProviderErrorCause {
    /// Host unreachable, connection refused or DNS failure
    #[error("connection failed: {0}")]
    Connect(String),

    /// Transport timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// Non-2xx response
    #[error("provider returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Response body did not match the dialect
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Stream broke after it started
    #[error("stream error: {0}")]
    Stream(String),
}

/// Network or HTTP failure raised by a provider adapter
#[derive(Debug, Error)]
#[error("{provider}: {cause}")]
pub struct ProviderError {
    /// Provider name
    pub provider: String,
    /// What went wrong
    pub cause: ProviderErrorCause,
    /// Whether retrying later may succeed
    pub retriable: bool,
}

impl ProviderError {
    /// Build an error, deriving `retriable` from the cause
    pub fn new(provider: impl Into<String>, cause: ProviderErrorCause) -> Self {
        let retriable = match &cause {
            ProviderErrorCause::Connect(_) | ProviderErrorCause::Timeout | ProviderErrorCause::Stream(_) => true,
            ProviderErrorCause::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderErrorCause::Decode(_) => false,
        };

        Self {
            provider: provider.into(),
            cause,
            retriable,
        }
    }

    /// Non-2xx response
    pub fn status(provider: impl Into<String>, status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorCause::Status {
            status,
            body: body.into(),
        })
    }

    /// Classify a transport error
    pub fn from_reqwest(provider: impl Into<String>, error: &reqwest::Error) -> Self {
        let cause = if error.is_connect() {
            ProviderErrorCause::Connect(error.to_string())
        } else if error.is_timeout() {
            ProviderErrorCause::Timeout
        } else if error.is_decode() {
            ProviderErrorCause::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            ProviderErrorCause::Status {
                status,
                body: String::new(),
            }
        } else {
            ProviderErrorCause::Stream(error.to_string())
        };

        Self::new(provider, cause)
    }

    /// Whether this failure should walk the fallback chain
    ///
    /// Only unreachable hosts and `503 Service Unavailable` qualify; every
    /// other failure is surfaced so it stays debuggable.
    pub fn is_connection_class(&self) -> bool {
        match &self.cause {
            ProviderErrorCause::Connect(_) => true,
            ProviderErrorCause::Status { status, .. } => *status == StatusCode::SERVICE_UNAVAILABLE,
            _ => false,
        }
    }
}

/// Errors surfaced by the routing engine
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed request
    #[error("invalid request: {0}")]
    Transform(#[from] TransformError),

    /// Provider failure that was not handled by fallback
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Resolved model lacks a feature the request needs
    #[error("{provider}:{model} does not support {feature}")]
    CapabilityMismatch {
        provider: String,
        model: String,
        feature: &'static str,
    },

    /// Selector names a provider that is not configured
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Every entry of the fallback chain failed
    #[error("all providers failed: {}", format_attempts(.attempts))]
    AllProvidersFailed { attempts: Vec<FallbackAttempt> },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.retriable,
            Self::AllProvidersFailed { .. } | Self::Internal(_) => true,
            Self::Transform(_) | Self::CapabilityMismatch { .. } | Self::ProviderNotFound { .. } | Self::Cancelled => {
                false
            }
        }
    }

    /// Whether the caller cancelled
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn format_attempts(attempts: &[FallbackAttempt]) -> String {
    attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
