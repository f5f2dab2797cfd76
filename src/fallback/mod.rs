//! Priority-ordered execution across the providers of one category.
//!
//! A request walks the configured providers of its category one at a time.
//! The first success wins and no later provider is touched; a failure is
//! recorded and the next provider is tried. Providers are never called in
//! parallel because every call may be billed or rate limited.

use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::providers::{Artifact, Category, GenerationRequest, ProviderDescriptor};
use crate::registry::ProviderRegistry;
use crate::utils::truncate;
use crate::{FallbackError, ProviderError};

/// One generation request against a category
#[derive(Debug, Clone)]
pub struct FallbackRequest {
    pub category: Category,
    pub payload: GenerationRequest,

    /// Cap on providers attempted; defaults to every configured provider
    pub max_attempts: Option<NonZeroUsize>,

    /// Deadline for the whole request, across all providers
    pub timeout: Option<Duration>,
}

impl FallbackRequest {
    pub fn new(category: Category, payload: GenerationRequest) -> Self {
        Self {
            category,
            payload,
            max_attempts: None,
            timeout: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: NonZeroUsize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A failed provider attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub provider: String,
    pub error: String,
}

impl AttemptRecord {
    fn new(provider: &ProviderDescriptor, error: &ProviderError) -> Self {
        Self {
            provider: provider.name().to_string(),
            error: error.to_string(),
        }
    }
}

/// Successful outcome of a fallback request
#[derive(Debug, Clone)]
pub struct FallbackResult {
    pub data: Artifact,
    pub provider_name: String,

    /// Providers that failed before `provider_name` succeeded, in order
    pub failed_attempts: Vec<AttemptRecord>,
}

/// One-line summary of an attempt log, used in error messages
pub fn summarize(attempts: &[AttemptRecord]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{}: {}", attempt.provider, truncate(&attempt.error, 100)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs requests against the registry with fallback across providers
///
/// Holds no per-request state, so one executor can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct FallbackExecutor {
    registry: Arc<ProviderRegistry>,
}

impl FallbackExecutor {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Execute a request without external cancellation
    pub async fn execute(&self, request: FallbackRequest) -> Result<FallbackResult, FallbackError> {
        self.execute_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Execute a request, abandoning it when `cancel` fires or the request times out
    ///
    /// Cancellation aborts the in-flight provider call and never advances to the
    /// next provider.
    pub async fn execute_with_cancellation(
        &self,
        request: FallbackRequest,
        cancel: &CancellationToken,
    ) -> Result<FallbackResult, FallbackError> {
        let category = request.category;
        let registered = self.registry.list_providers(category);
        if registered.is_empty() {
            return Err(FallbackError::NoProviderConfigured(category));
        }

        let configured: Vec<&ProviderDescriptor> = registered
            .iter()
            .filter(|provider| {
                let configured = provider.is_configured();
                if !configured {
                    tracing::debug!(provider = %provider.name(), %category, "Skipping provider without credentials");
                }
                configured
            })
            .collect();
        if configured.is_empty() {
            return Err(FallbackError::NoProviderConfigured(category));
        }

        let limit = request
            .max_attempts
            .map_or(configured.len(), NonZeroUsize::get);
        let deadline = request.timeout.map(|timeout| Instant::now() + timeout);

        tracing::info!(
            %category,
            providers = ?configured.iter().map(|p| p.name()).collect::<Vec<_>>(),
            limit,
            "Available providers"
        );

        let mut attempts = Vec::new();
        for provider in configured.into_iter().take(limit) {
            tracing::info!(provider = %provider.name(), %category, "Attempting generation");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(provider = %provider.name(), %category, "Request cancelled");
                    return Err(FallbackError::Cancelled {
                        category,
                        provider: provider.name().to_string(),
                    });
                }
                _ = sleep_until(deadline) => {
                    tracing::warn!(provider = %provider.name(), %category, "Request timed out");
                    return Err(FallbackError::TimedOut {
                        category,
                        provider: provider.name().to_string(),
                        timeout: request.timeout.unwrap_or_default(),
                    });
                }
                result = provider.invoke(&request.payload) => result,
            };

            match outcome.and_then(|artifact| check_artifact(category, artifact)) {
                Ok(data) => {
                    tracing::info!(
                        provider = %provider.name(),
                        %category,
                        bytes = data.len(),
                        failed_before = attempts.len(),
                        "Generation succeeded"
                    );
                    return Ok(FallbackResult {
                        data,
                        provider_name: provider.name().to_string(),
                        failed_attempts: attempts,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        provider = %provider.name(),
                        %category,
                        error = %truncate(&error.to_string(), 100),
                        "Provider failed, falling back"
                    );
                    attempts.push(AttemptRecord::new(provider, &error));
                }
            }
        }

        Err(FallbackError::AllProvidersFailed { category, attempts })
    }
}

/// Reject artifacts that do not belong to the requested category
fn check_artifact(category: Category, artifact: Artifact) -> Result<Artifact, ProviderError> {
    if artifact.category() != category {
        return Err(ProviderError::WrongArtifact {
            expected: category,
            actual: artifact.category(),
        });
    }
    if artifact.is_empty() {
        return Err(ProviderError::MalformedResponse("empty output".into()));
    }
    Ok(artifact)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
