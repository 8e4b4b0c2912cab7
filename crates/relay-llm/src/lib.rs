//! Multi-provider routing and streaming normalization
//!
//! One canonical request shape over a native cloud API and several
//! OpenAI-compatible runtimes, with reasoning separated from content,
//! capability and health caches, and a fallback chain for unreachable
//! providers.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod cache;
pub mod capability;
pub mod convert;
pub mod error;
pub mod health;
pub mod protocol;
pub mod provider;
pub mod router;
pub mod stream;
pub mod thinking;
pub mod types;

pub use capability::{CapabilityHint, CapabilityRegistry, ModelCapability, ReasoningConfig, ReasoningKind, ReasoningLevel};
pub use error::{ProviderError, ProviderErrorCause, RelayError, TransformError};
pub use health::{HealthMonitor, ProviderStatus};
pub use provider::{CallOptions, ChunkStream, Provider, ProviderKind, ReasoningSettings};
pub use router::{FallbackAttempt, RouteOutcome, RoutedResponse, RoutedStream, Router};
pub use stream::EventStream;
pub use thinking::ThinkingProcessor;
pub use types::{CompletionRequest, CompletionResponse, Message, StreamEvent, ThinkingToken};
