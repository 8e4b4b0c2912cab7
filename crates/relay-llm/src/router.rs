//! Routing engine
//!
//! Resolves a `provider:model` selector, checks the model's capabilities,
//! calls the adapter and, when the provider cannot be reached, walks the
//! fallback chain. Every substitution is reported back to the caller.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use relay_config::{FallbackConfig, LlmConfig};
use tokio_util::sync::CancellationToken;

use crate::capability::{CapabilityRegistry, ModelCapability, ReasoningKind};
use crate::error::{RelayError, TransformError};
use crate::health::{HealthMonitor, ProviderStatus};
use crate::provider::{self, CallOptions, Provider, ReasoningSettings};
use crate::stream::{EventStream, event_stream};
use crate::thinking::ThinkingProcessor;
use crate::types::{CompletionRequest, CompletionResponse, Content, ModelInfo, ModelSelector};

/// A chain entry that was abandoned, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackAttempt {
    /// Provider name
    pub provider: String,
    /// Model id (empty when it could not be resolved)
    pub model: String,
    /// Why the entry was abandoned
    pub reason: String,
}

impl FallbackAttempt {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FallbackAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.model.is_empty() {
            write!(f, "{} ({})", self.provider, self.reason)
        } else {
            write!(f, "{}:{} ({})", self.provider, self.model, self.reason)
        }
    }
}

/// Complete response and the provider that served it
#[derive(Debug)]
pub struct RoutedResponse {
    /// Provider that produced the response
    pub provider: String,
    /// Model that produced the response
    pub model: String,
    /// Canonical response
    pub response: CompletionResponse,
    /// Chain entries abandoned before this one
    pub fallbacks: Vec<FallbackAttempt>,
}

/// Event stream and the provider serving it
pub struct RoutedStream {
    /// Provider serving the stream
    pub provider: String,
    /// Model serving the stream
    pub model: String,
    /// Chain entries abandoned before this one
    pub fallbacks: Vec<FallbackAttempt>,
    /// Typed events
    pub events: EventStream,
}

impl fmt::Debug for RoutedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutedStream")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("fallbacks", &self.fallbacks)
            .finish_non_exhaustive()
    }
}

/// Result of [`Router::route`]
#[derive(Debug)]
pub enum RouteOutcome {
    /// Non-streaming request
    Complete(RoutedResponse),
    /// Streaming request
    Stream(RoutedStream),
}

enum Served {
    Complete(CompletionResponse),
    Stream(EventStream),
}

/// Entry point for every generation call
pub struct Router {
    providers: IndexMap<String, Arc<dyn Provider>>,
    default_provider: String,
    fallback: FallbackConfig,
    registry: CapabilityRegistry,
    health: Arc<HealthMonitor>,
}

impl Router {
    /// Build every configured provider and the shared caches
    ///
    /// # Errors
    ///
    /// Returns an error if a provider or a capability entry cannot be built.
    pub fn from_config(config: &LlmConfig) -> Result<Self, RelayError> {
        let providers = config
            .providers
            .iter()
            .map(|(name, provider_config)| Ok((name.clone(), provider::build(name, provider_config, &config.timeouts)?)))
            .collect::<Result<IndexMap<_, _>, RelayError>>()?;

        let registry = CapabilityRegistry::with_builtin_defaults(&config.capabilities, config.cache.capability_ttl)?;
        let health = HealthMonitor::new(providers.clone(), config.cache.health_ttl, config.timeouts.probe);

        Ok(Self::new(
            providers,
            config.default_provider.clone(),
            config.fallback.clone(),
            registry,
            Arc::new(health),
        ))
    }

    /// Router over already-built parts
    pub fn new(
        providers: IndexMap<String, Arc<dyn Provider>>,
        default_provider: String,
        fallback: FallbackConfig,
        registry: CapabilityRegistry,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            providers,
            default_provider,
            fallback,
            registry,
            health,
        }
    }

    /// Shared health monitor
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Capability registry
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Parse a selector against the configured providers
    pub fn parse_selector(&self, raw: &str) -> ModelSelector {
        ModelSelector::parse(raw, &self.default_provider, |p| self.providers.contains_key(p))
    }

    /// Ordered, provider-unique chain for a request
    fn chain(&self, request: &CompletionRequest) -> Vec<ModelSelector> {
        let primary = self.parse_selector(&request.model);
        if !self.fallback.enabled {
            return vec![primary];
        }

        let rest = match &request.fallback {
            Some(explicit) => explicit.clone(),
            None if !self.fallback.chain.is_empty() => self.fallback.chain.clone(),
            None => self.default_chain(&primary.provider),
        };

        let mut chain = vec![primary];
        for raw in rest {
            let selector = self.parse_selector(&raw);
            if !chain.iter().any(|s| s.provider == selector.provider) {
                chain.push(selector);
            }
        }
        chain
    }

    /// `[secondary-local, cloud-default]`
    ///
    /// Without configuration, the secondary local runtime is another local
    /// provider when the primary is local, and the cloud default is the
    /// default provider.
    fn default_chain(&self, primary: &str) -> Vec<String> {
        let primary_is_local = self.providers.get(primary).is_some_and(|p| p.kind().is_local());

        let secondary = self.fallback.secondary_local.clone().or_else(|| {
            primary_is_local
                .then(|| {
                    self.providers
                        .iter()
                        .find(|(name, p)| name.as_str() != primary && p.kind().is_local())
                        .map(|(name, _)| name.clone())
                })
                .flatten()
        });
        let cloud = self
            .fallback
            .cloud_default
            .clone()
            .unwrap_or_else(|| self.default_provider.clone());

        secondary.into_iter().chain(std::iter::once(cloud)).collect()
    }

    /// Route a request, walking the fallback chain on connection failures
    ///
    /// # Errors
    ///
    /// Returns the first non-connection failure as is, a
    /// `CapabilityMismatch` when the requested model lacks a needed feature,
    /// `Cancelled` when `cancel` fires, or `AllProvidersFailed` listing every
    /// abandoned entry.
    pub async fn route(&self, request: CompletionRequest, cancel: &CancellationToken) -> Result<RouteOutcome, RelayError> {
        request.validate()?;

        let chain = self.chain(&request);
        let mut attempts = Vec::new();

        for (position, selector) in chain.into_iter().enumerate() {
            let primary = position == 0;
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }

            let Some(provider) = self.providers.get(&selector.provider) else {
                if primary {
                    return Err(RelayError::ProviderNotFound {
                        provider: selector.provider,
                    });
                }
                attempts.push(FallbackAttempt::new(&selector.provider, &selector.model, "provider not configured"));
                continue;
            };

            let model = match resolve_model(&selector, provider.as_ref()) {
                Ok(model) => model,
                Err(e) if primary => return Err(e.into()),
                Err(e) => {
                    attempts.push(FallbackAttempt::new(&selector.provider, "", e.to_string()));
                    continue;
                }
            };

            if !primary && let Some(reason) = self.unavailable_reason(&selector.provider).await {
                tracing::warn!(provider = %selector.provider, reason = %reason, "skipping unavailable fallback provider");
                attempts.push(FallbackAttempt::new(&selector.provider, &model, reason));
                continue;
            }

            let capability = self.registry.refresh(provider, &model).await;
            if let Err(e) = check_capability(&request, &selector.provider, &model, &capability) {
                if primary {
                    return Err(e);
                }
                attempts.push(FallbackAttempt::new(&selector.provider, &model, e.to_string()));
                continue;
            }

            let mut call = request.clone();
            call.model.clone_from(&model);
            let options = call_options(&request, &capability);

            match attempt(provider.as_ref(), &call, &options, &capability, cancel).await {
                Ok(served) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            provider = %selector.provider,
                            model = %model,
                            abandoned = attempts.len(),
                            "request served by fallback provider"
                        );
                    }
                    return Ok(routed(served, selector.provider, model, attempts));
                }
                Err(RelayError::Provider(e)) if e.is_connection_class() => {
                    tracing::warn!(
                        provider = %selector.provider,
                        model = %model,
                        error = %e,
                        "provider unreachable, trying next in chain"
                    );
                    self.health.mark_unavailable(&selector.provider, &e);
                    attempts.push(FallbackAttempt::new(&selector.provider, &model, e.to_string()));

                    if !self.fallback.enabled {
                        return Err(RelayError::Provider(e));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(RelayError::AllProvidersFailed { attempts })
    }

    /// Route a non-streaming request
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub async fn complete(
        &self,
        mut request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<RoutedResponse, RelayError> {
        request.stream = false;
        match self.route(request, cancel).await? {
            RouteOutcome::Complete(routed) => Ok(routed),
            RouteOutcome::Stream(_) => Err(anyhow::anyhow!("non-streaming request produced a stream").into()),
        }
    }

    /// Route a streaming request
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub async fn stream(&self, mut request: CompletionRequest, cancel: &CancellationToken) -> Result<RoutedStream, RelayError> {
        request.stream = true;
        match self.route(request, cancel).await? {
            RouteOutcome::Stream(routed) => Ok(routed),
            RouteOutcome::Complete(_) => Err(anyhow::anyhow!("streaming request produced a complete response").into()),
        }
    }

    /// Status of every configured provider
    pub async fn list_providers(&self) -> Vec<ProviderStatus> {
        self.health.check_all().await
    }

    /// Models of one provider, or of every reachable provider
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotFound` for an unknown name, or the provider's
    /// listing failure when a single provider is named.
    pub async fn list_models(&self, provider: Option<&str>) -> Result<Vec<ModelInfo>, RelayError> {
        if let Some(name) = provider {
            let provider = self.providers.get(name).ok_or_else(|| RelayError::ProviderNotFound {
                provider: name.to_owned(),
            })?;
            return Ok(provider.list_models().await?);
        }

        let listings = self.providers.values().map(|p| async move { (p.name(), p.list_models().await) });
        let mut models = Vec::new();
        for (name, listing) in futures_util::future::join_all(listings).await {
            match listing {
                Ok(list) => models.extend(list),
                Err(e) => tracing::debug!(provider = %name, error = %e, "skipping provider in model listing"),
            }
        }
        Ok(models)
    }

    /// Fresh availability probe of one provider
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotFound` for an unknown name.
    pub async fn ping(&self, provider: &str) -> Result<ProviderStatus, RelayError> {
        self.health.invalidate(provider);
        self.health.check_one(provider).await
    }

    async fn unavailable_reason(&self, provider: &str) -> Option<String> {
        match self.health.check_one(provider).await {
            Ok(status) if status.available => None,
            Ok(status) => Some(status.error.unwrap_or_else(|| "unavailable".to_owned())),
            Err(e) => Some(e.to_string()),
        }
    }
}

fn resolve_model(selector: &ModelSelector, provider: &dyn Provider) -> Result<String, TransformError> {
    if !selector.model.is_empty() {
        return Ok(selector.model.clone());
    }
    provider
        .default_model()
        .map(ToOwned::to_owned)
        .ok_or_else(|| TransformError::MissingModel {
            provider: selector.provider.clone(),
        })
}

fn check_capability(
    request: &CompletionRequest,
    provider: &str,
    model: &str,
    capability: &ModelCapability,
) -> Result<(), RelayError> {
    let feature = if request.has_images() && !capability.supports_vision {
        "vision"
    } else if request.has_tools() && !capability.supports_tools {
        "tools"
    } else {
        return Ok(());
    };

    Err(RelayError::CapabilityMismatch {
        provider: provider.to_owned(),
        model: model.to_owned(),
        feature,
    })
}

/// Reasoning level for reasoning-capable models; other models get none
fn call_options(request: &CompletionRequest, capability: &ModelCapability) -> CallOptions {
    let reasoning = if capability.reasoning.kind == ReasoningKind::None {
        if request.reasoning.is_some() {
            tracing::debug!(model = %capability.model_pattern, "ignoring reasoning level for non-reasoning model");
        }
        None
    } else {
        request
            .reasoning
            .or(capability.reasoning.default_level)
            .map(|level| ReasoningSettings {
                level,
                param_name: capability.reasoning.native_param.clone(),
            })
    };

    CallOptions {
        reasoning,
        timeout: request.timeout,
    }
}

async fn attempt(
    provider: &dyn Provider,
    request: &CompletionRequest,
    options: &CallOptions,
    capability: &ModelCapability,
    cancel: &CancellationToken,
) -> Result<Served, RelayError> {
    if request.stream {
        let chunks = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RelayError::Cancelled),
            chunks = provider.generate_stream(request, options) => chunks?,
        };
        let processor = ThinkingProcessor::new(&capability.reasoning);
        return Ok(Served::Stream(event_stream(chunks, processor, cancel.clone())));
    }

    let mut response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(RelayError::Cancelled),
        response = provider.generate(request, options) => response?,
    };

    if capability.reasoning.kind == ReasoningKind::Pattern
        && let Content::Text(text) = &response.message.content
    {
        let split = ThinkingProcessor::new(&capability.reasoning).split_complete(text);
        if let Some(reasoning) = split.reasoning {
            response.reasoning = Some(reasoning);
            response.message.content = Content::Text(split.content);
        }
    }

    Ok(Served::Complete(response))
}

fn routed(served: Served, provider: String, model: String, fallbacks: Vec<FallbackAttempt>) -> RouteOutcome {
    match served {
        Served::Complete(response) => RouteOutcome::Complete(RoutedResponse {
            provider,
            model,
            response,
            fallbacks,
        }),
        Served::Stream(events) => RouteOutcome::Stream(RoutedStream {
            provider,
            model,
            fallbacks,
            events,
        }),
    }
}
