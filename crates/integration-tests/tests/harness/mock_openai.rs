//! Mock OpenAI-compatible backend
//!
//! Serves `/v1/chat/completions` and `/v1/models`, plus the Ollama
//! (`/api/tags`, `/api/show`) and LM Studio (`/api/v0/models`) routes, so
//! one mock can stand in for any compatible provider type.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::{DropFlag, serve, sse_frame};

/// Configures a [`MockOpenAi`] before it starts
#[derive(Default)]
pub struct MockBuilder {
    content: Vec<String>,
    reasoning: Vec<String>,
    tool_call: Option<(String, Vec<String>)>,
    status: Option<StatusCode>,
    stall: bool,
    models: Vec<String>,
    capabilities: Vec<String>,
    list_delay: Duration,
}

impl MockBuilder {
    /// Content deltas, joined for non-streaming replies
    pub fn content(mut self, deltas: &[&str]) -> Self {
        self.content = deltas.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    /// `reasoning_content` deltas
    pub fn reasoning(mut self, deltas: &[&str]) -> Self {
        self.reasoning = deltas.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    /// Reply with one tool call whose arguments arrive in `fragments`
    pub fn tool_call(mut self, name: &str, fragments: &[&str]) -> Self {
        self.tool_call = Some((name.to_owned(), fragments.iter().map(|f| (*f).to_owned()).collect()));
        self
    }

    /// Fail every chat request with `status`
    pub const fn failing(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Streams send their deltas and then only keep-alive comments
    pub const fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Models returned by every listing route
    pub fn models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| (*m).to_owned()).collect();
        self
    }

    /// Capabilities reported by `/api/show`
    pub fn capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Delay before answering a listing request
    pub const fn list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// Start the mock server, returning immediately
    pub async fn start(self) -> anyhow::Result<MockOpenAi> {
        let content = if self.content.is_empty() && self.tool_call.is_none() {
            vec!["Hello from mock".to_owned()]
        } else {
            self.content
        };
        let models = if self.models.is_empty() {
            vec!["mock-model".to_owned()]
        } else {
            self.models
        };

        let state = Arc::new(MockState {
            content,
            reasoning: self.reasoning,
            tool_call: self.tool_call,
            status: self.status,
            stall: self.stall,
            models,
            capabilities: self.capabilities,
            list_delay: self.list_delay,
            chat_count: AtomicU32::new(0),
            list_count: AtomicU32::new(0),
            show_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat))
            .route("/v1/models", routing::get(handle_models))
            .route("/api/tags", routing::get(handle_tags))
            .route("/api/show", routing::post(handle_show))
            .route("/api/v0/models", routing::get(handle_rest_models))
            .route("/api/v0/models/{id}", routing::get(handle_rest_model))
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let addr = serve(app, shutdown.clone()).await?;

        Ok(MockOpenAi { addr, shutdown, state })
    }
}

/// Mock compatible backend with request counters
pub struct MockOpenAi {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    content: Vec<String>,
    reasoning: Vec<String>,
    tool_call: Option<(String, Vec<String>)>,
    status: Option<StatusCode>,
    stall: bool,
    models: Vec<String>,
    capabilities: Vec<String>,
    list_delay: Duration,
    chat_count: AtomicU32,
    list_count: AtomicU32,
    show_count: AtomicU32,
    last_request: Mutex<Option<Value>>,
    stream_dropped: Arc<AtomicBool>,
}

impl MockOpenAi {
    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    /// Mock replying "Hello from mock"
    pub async fn start() -> anyhow::Result<Self> {
        MockBuilder::default().start().await
    }

    /// Base URL including `/v1`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Chat requests received
    pub fn chat_count(&self) -> u32 {
        self.state.chat_count.load(Ordering::SeqCst)
    }

    /// Listing requests received on any listing route
    pub fn list_count(&self) -> u32 {
        self.state.list_count.load(Ordering::SeqCst)
    }

    /// Per-model capability lookups received
    pub fn show_count(&self) -> u32 {
        self.state.show_count.load(Ordering::SeqCst)
    }

    /// Body of the most recent chat request
    pub fn last_request(&self) -> Option<Value> {
        self.state.last_request.lock().unwrap().clone()
    }

    /// Whether a stalled stream body was released by the server
    pub fn stream_dropped(&self) -> bool {
        self.state.stream_dropped.load(Ordering::SeqCst)
    }
}

impl Drop for MockOpenAi {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_chat(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.chat_count.fetch_add(1, Ordering::SeqCst);
    let model = body["model"].as_str().unwrap_or("mock-model").to_owned();
    let stream = body["stream"].as_bool().unwrap_or(false);
    *state.last_request.lock().unwrap() = Some(body);

    if let Some(status) = state.status {
        let error = json!({"error": {"message": "mock failure", "type": "server_error"}});
        return (status, Json(error)).into_response();
    }

    if stream {
        return stream_response(&state, &model);
    }

    let mut message = json!({"role": "assistant", "content": state.content.concat()});
    if !state.reasoning.is_empty() {
        message["reasoning_content"] = json!(state.reasoning.concat());
    }
    if let Some((name, fragments)) = &state.tool_call {
        message["tool_calls"] = json!([{
            "id": "call_mock",
            "type": "function",
            "function": {"name": name, "arguments": fragments.concat()}
        }]);
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason(&state)}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

fn finish_reason(state: &MockState) -> &'static str {
    if state.tool_call.is_some() { "tool_calls" } else { "stop" }
}

fn stream_response(state: &MockState, model: &str) -> Response {
    let delta = |delta: Value| {
        sse_frame(&json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{"index": 0, "delta": delta}]
        }))
    };

    let mut frames = vec![delta(json!({"role": "assistant"}))];
    frames.extend(state.reasoning.iter().map(|r| delta(json!({"reasoning_content": r}))));
    frames.extend(state.content.iter().map(|c| delta(json!({"content": c}))));

    if let Some((name, fragments)) = &state.tool_call {
        for (i, fragment) in fragments.iter().enumerate() {
            let call = if i == 0 {
                json!({"index": 0, "id": "call_mock", "type": "function", "function": {"name": name, "arguments": fragment}})
            } else {
                json!({"index": 0, "function": {"arguments": fragment}})
            };
            frames.push(delta(json!({"tool_calls": [call]})));
        }
    }

    let body = if state.stall {
        let guard = DropFlag::new(Arc::clone(&state.stream_dropped));
        // Comment frames keep writing so a closed client is noticed
        let keepalive = futures_util::stream::unfold((), |()| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some((Ok(": keep-alive\n\n".to_owned()), ()))
        });
        let frames = futures_util::stream::iter(frames.into_iter().map(Ok::<_, Infallible>))
            .chain(keepalive)
            .map(move |frame| {
                let _held = &guard;
                frame
            });
        Body::from_stream(frames)
    } else {
        frames.push(sse_frame(&json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": finish_reason(state)}]
        })));
        frames.push(sse_frame(&json!({
            "choices": [],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })));
        frames.push("data: [DONE]\n\n".to_owned());
        Body::from(frames.concat())
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(body)
        .unwrap()
}

async fn listed(state: &MockState) {
    state.list_count.fetch_add(1, Ordering::SeqCst);
    if !state.list_delay.is_zero() {
        tokio::time::sleep(state.list_delay).await;
    }
}

async fn handle_models(State(state): State<Arc<MockState>>) -> Json<Value> {
    listed(&state).await;
    let data: Vec<_> = state
        .models
        .iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "mock"}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}

async fn handle_tags(State(state): State<Arc<MockState>>) -> Json<Value> {
    listed(&state).await;
    let models: Vec<_> = state
        .models
        .iter()
        .map(|name| json!({"name": name, "size": 1_000_000, "details": {"family": "llama", "families": ["llama"]}}))
        .collect();
    Json(json!({"models": models}))
}

async fn handle_show(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.show_count.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "capabilities": state.capabilities,
        "model_info": {"general.architecture": "llama", "llama.context_length": 8192}
    }))
}

fn rest_model(state: &MockState, id: &str) -> Value {
    let model_type = if state.capabilities.iter().any(|c| c == "vision") { "vlm" } else { "llm" };
    let capabilities: Vec<_> = state
        .capabilities
        .iter()
        .filter(|c| *c == "tools")
        .map(|_| "tool_use")
        .collect();
    json!({
        "id": id,
        "type": model_type,
        "state": "loaded",
        "max_context_length": 4096,
        "capabilities": capabilities
    })
}

async fn handle_rest_models(State(state): State<Arc<MockState>>) -> Json<Value> {
    listed(&state).await;
    let mut data: Vec<_> = state.models.iter().map(|id| rest_model(&state, id)).collect();
    data.push(json!({"id": "text-embedding-nomic-embed-text-v1.5", "type": "embeddings", "state": "not-loaded"}));
    Json(json!({"object": "list", "data": data}))
}

async fn handle_rest_model(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Json<Value> {
    state.show_count.fetch_add(1, Ordering::SeqCst);
    Json(rest_model(&state, &id))
}
