//! Provider availability with a short-lived cache
//!
//! Results are cached per provider for a TTL. A miss triggers one probe;
//! concurrent checks of the same provider wait on that probe instead of
//! issuing their own. Cached entries are only ever replaced wholesale.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use jiff::Timestamp;
use mini_moka::sync::Cache;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::SingleFlight;
use crate::error::{ProviderError, RelayError};
use crate::provider::Provider;

/// Availability of one provider at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub provider: String,
    /// Whether the last probe succeeded
    pub available: bool,
    /// Model ids reported by the probe
    pub models: Vec<String>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Remediation for an unavailable provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// When the probe completed
    pub checked_at: Timestamp,
}

impl ProviderStatus {
    fn up(provider: &str, models: Vec<String>) -> Self {
        Self {
            provider: provider.to_owned(),
            available: true,
            models,
            error: None,
            hint: None,
            checked_at: Timestamp::now(),
        }
    }

    fn down(provider: &dyn Provider, error: String) -> Self {
        Self {
            provider: provider.name().to_owned(),
            available: false,
            models: Vec::new(),
            error: Some(error),
            hint: Some(provider.kind().hint().to_owned()),
            checked_at: Timestamp::now(),
        }
    }
}

/// Cache-aware availability checks for every configured provider
pub struct HealthMonitor {
    providers: IndexMap<String, Arc<dyn Provider>>,
    cache: Cache<String, ProviderStatus>,
    inflight: SingleFlight<String, ProviderStatus>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    /// Monitor over `providers` with result lifetime `ttl`
    pub fn new(providers: IndexMap<String, Arc<dyn Provider>>, ttl: Duration, probe_timeout: Duration) -> Self {
        Self {
            providers,
            cache: Cache::builder().time_to_live(ttl).build(),
            inflight: SingleFlight::new(),
            probe_timeout,
        }
    }

    /// Status of one provider, probing on a cache miss
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ProviderNotFound` if no provider has that name.
    pub async fn check_one(&self, name: &str) -> Result<ProviderStatus, RelayError> {
        let provider = self.providers.get(name).ok_or_else(|| RelayError::ProviderNotFound {
            provider: name.to_owned(),
        })?;

        let key = name.to_owned();
        if let Some(status) = self.cache.get(&key) {
            tracing::debug!(provider = %name, available = status.available, "health cache hit");
            return Ok(status);
        }

        let provider = Arc::clone(provider);
        let cache = self.cache.clone();
        let timeout = self.probe_timeout;
        let lookup_key = key.clone();

        let status = self
            .inflight
            .run_unless(
                key.clone(),
                || self.cache.get(&lookup_key),
                move || async move {
                    let status = probe(provider.as_ref(), timeout).await;
                    cache.insert(key, status.clone());
                    status
                },
            )
            .await;

        Ok(status)
    }

    /// Status of every provider, probed concurrently
    pub async fn check_all(&self) -> Vec<ProviderStatus> {
        let checks = self.providers.keys().map(|name| self.check_one(name));
        futures_util::future::join_all(checks)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Whether a provider is currently reachable
    pub async fn is_available(&self, name: &str) -> bool {
        self.check_one(name).await.is_ok_and(|s| s.available)
    }

    /// Record a connection-class failure observed outside a probe
    pub fn mark_unavailable(&self, name: &str, error: &ProviderError) {
        let Some(provider) = self.providers.get(name) else {
            return;
        };
        self.cache
            .insert(name.to_owned(), ProviderStatus::down(provider.as_ref(), error.to_string()));
    }

    /// Drop the cached status of one provider
    pub fn invalidate(&self, name: &str) {
        self.cache.invalidate(&name.to_owned());
    }

    /// Drop every cached status
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.inflight.clear();
    }

    /// Keep the cache warm by re-probing every `interval` until `cancel` fires
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                monitor.cache.invalidate_all();
                for status in monitor.check_all().await {
                    tracing::debug!(
                        provider = %status.provider,
                        available = status.available,
                        models = status.models.len(),
                        "refreshed provider health"
                    );
                }
            }
            tracing::debug!("health refresh stopped");
        })
    }
}

async fn probe(provider: &dyn Provider, timeout: Duration) -> ProviderStatus {
    match tokio::time::timeout(timeout, provider.list_models()).await {
        Ok(Ok(models)) => ProviderStatus::up(provider.name(), models.into_iter().map(|m| m.id).collect()),
        Ok(Err(e)) => {
            tracing::warn!(provider = %provider.name(), error = %e, "provider unavailable");
            ProviderStatus::down(provider, e.to_string())
        }
        Err(_) => {
            tracing::warn!(provider = %provider.name(), "provider probe timed out");
            ProviderStatus::down(provider, format!("probe timed out after {}ms", timeout.as_millis()))
        }
    }
}
