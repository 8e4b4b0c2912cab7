//! In-memory provider for unit tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use http::StatusCode;

use super::{CallOptions, ChunkStream, Provider, ProviderKind};
use crate::capability::CapabilityHint;
use crate::error::{ProviderError, ProviderErrorCause, RelayError};
use crate::types::{CompletionRequest, CompletionResponse, FinishReason, Message, ModelInfo, StreamChunk, Usage};

#[derive(Debug, Clone, Copy)]
enum Failure {
    Unreachable,
    Status(StatusCode),
}

/// Scripted provider counting every call
pub(crate) struct FakeProvider {
    name: String,
    kind: ProviderKind,
    failure: Option<Failure>,
    hint: Option<CapabilityHint>,
    models: Vec<String>,
    reply: String,
    chunks: Vec<StreamChunk>,
    hang: bool,
    list_delay: Duration,
    lists: Arc<AtomicU32>,
    probes: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
    seen: Arc<Mutex<Vec<(String, CallOptions)>>>,
}

impl FakeProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: ProviderKind::Ollama,
            failure: None,
            hint: None,
            models: vec!["fake-model".to_owned()],
            reply: format!("hello from {name}"),
            chunks: Vec::new(),
            hang: false,
            list_delay: Duration::ZERO,
            lists: Arc::default(),
            probes: Arc::default(),
            calls: Arc::default(),
            seen: Arc::default(),
        }
    }

    pub(crate) fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Every call fails as a refused connection
    pub(crate) fn unreachable(mut self) -> Self {
        self.failure = Some(Failure::Unreachable);
        self
    }

    /// Every call fails with `status`
    pub(crate) fn failing_with(mut self, status: StatusCode) -> Self {
        self.failure = Some(Failure::Status(status));
        self
    }

    pub(crate) fn with_hint(mut self, hint: CapabilityHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub(crate) fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_owned();
        self
    }

    pub(crate) fn with_chunks(mut self, chunks: Vec<StreamChunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Stream never ends after its chunks
    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub(crate) fn list_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.lists)
    }

    pub(crate) fn probe_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.probes)
    }

    pub(crate) fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    /// Model and options of every generation call
    pub(crate) fn seen(&self) -> Arc<Mutex<Vec<(String, CallOptions)>>> {
        Arc::clone(&self.seen)
    }

    fn error(&self) -> Option<ProviderError> {
        self.failure.map(|failure| match failure {
            Failure::Unreachable => {
                ProviderError::new(&self.name, ProviderErrorCause::Connect("connection refused".to_owned()))
            }
            Failure::Status(status) => ProviderError::status(&self.name, status, "scripted failure"),
        })
    }

    fn record(&self, request: &CompletionRequest, options: &CallOptions) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((request.model.clone(), options.clone()));
        }
        self.error().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn default_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if let Some(e) = self.error() {
            return Err(e);
        }
        Ok(self.models.iter().map(|m| ModelInfo::new(&self.name, m)).collect())
    }

    async fn generate(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<CompletionResponse, RelayError> {
        self.record(request, options)?;
        Ok(CompletionResponse {
            model: request.model.clone(),
            message: Message::assistant(self.reply.clone()),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            reasoning: None,
            warnings: Vec::new(),
        })
    }

    async fn generate_stream(
        &self,
        request: &CompletionRequest,
        options: &CallOptions,
    ) -> Result<ChunkStream, RelayError> {
        self.record(request, options)?;
        let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok));
        if self.hang {
            Ok(Box::pin(chunks.chain(stream::pending())))
        } else {
            Ok(Box::pin(chunks))
        }
    }

    async fn probe_capability(&self, _model: &str) -> Result<Option<CapabilityHint>, ProviderError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.error() {
            return Err(e);
        }
        Ok(self.hint)
    }
}
