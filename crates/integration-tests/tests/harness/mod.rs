#![allow(dead_code)]

pub mod config;
pub mod mock_native;
pub mod mock_openai;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Serve `app` on an ephemeral loopback port until `shutdown` fires
pub async fn serve(app: axum::Router, shutdown: CancellationToken) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            })
            .await
            .ok();
    });

    Ok(addr)
}

/// Base URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1")
}

/// Format one SSE event
pub fn sse_frame(data: &serde_json::Value) -> String {
    format!("data: {data}\n\n")
}

/// Sets its flag when the response body holding it is dropped
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub const fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Poll `condition` for up to two seconds
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}
