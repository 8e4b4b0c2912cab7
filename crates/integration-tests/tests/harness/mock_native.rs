//! Mock `generateContent` backend
//!
//! Replies with one thought part followed by the answer, as a whole
//! response or split over three SSE events.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::{serve, sse_frame};

pub const THOUGHT: &str = "Considering the greeting.";
pub const ANSWER: &str = "Hello world";

/// Mock native-dialect backend
pub struct MockNative {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<NativeState>,
}

#[derive(Default)]
struct NativeState {
    generate_count: AtomicU32,
    list_count: AtomicU32,
    last_request: Mutex<Option<Value>>,
    last_api_key: Mutex<Option<String>>,
}

impl MockNative {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(NativeState::default());

        let app = Router::new()
            .route("/v1beta/models", routing::get(handle_models))
            .route("/v1beta/models/{action}", routing::post(handle_action))
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let addr = serve(app, shutdown.clone()).await?;

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL including the API version
    pub fn base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    pub fn generate_count(&self) -> u32 {
        self.state.generate_count.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> u32 {
        self.state.list_count.load(Ordering::SeqCst)
    }

    /// Body of the most recent generation request
    pub fn last_request(&self) -> Option<Value> {
        self.state.last_request.lock().unwrap().clone()
    }

    /// `x-goog-api-key` header of the most recent generation request
    pub fn last_api_key(&self) -> Option<String> {
        self.state.last_api_key.lock().unwrap().clone()
    }
}

impl Drop for MockNative {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_models(State(state): State<Arc<NativeState>>) -> Json<Value> {
    state.list_count.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "models": [
            {
                "name": "models/gemini-2.5-flash",
                "displayName": "Gemini 2.5 Flash",
                "inputTokenLimit": 1_048_576,
                "supportedGenerationMethods": ["generateContent", "countTokens"]
            },
            {
                "name": "models/text-embedding-004",
                "displayName": "Text Embedding 004",
                "supportedGenerationMethods": ["embedContent"]
            }
        ]
    }))
}

async fn handle_action(
    State(state): State<Arc<NativeState>>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some((model, method)) = action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    state.generate_count.fetch_add(1, Ordering::SeqCst);
    *state.last_request.lock().unwrap() = Some(body);
    *state.last_api_key.lock().unwrap() = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);

    let usage = json!({
        "promptTokenCount": 4,
        "candidatesTokenCount": 2,
        "thoughtsTokenCount": 3,
        "totalTokenCount": 9
    });

    match method {
        "generateContent" => Json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": THOUGHT, "thought": true}, {"text": ANSWER}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": usage,
            "modelVersion": model
        }))
        .into_response(),
        "streamGenerateContent" => {
            let events = [
                json!({"candidates": [{"content": {"role": "model", "parts": [{"text": THOUGHT, "thought": true}]}}]}),
                json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}]}}]}),
                json!({
                    "candidates": [{"content": {"role": "model", "parts": [{"text": " world"}]}, "finishReason": "STOP"}],
                    "usageMetadata": usage
                }),
            ];
            let body: String = events.iter().map(sse_frame).collect();
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
