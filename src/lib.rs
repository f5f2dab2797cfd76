//! Reelforge - multi-provider content generation for short-form video
//!
//! This library generates video scripts, images and voiceovers through external
//! AI providers. Each content category keeps a prioritized provider list; requests
//! walk that list in order and fall back to the next provider when one fails.

pub mod cli;
pub mod config;
pub mod fallback;
pub mod output;
pub mod placeholder;
pub mod providers;
pub mod registry;
pub mod status;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use fallback::{AttemptRecord, FallbackExecutor, FallbackRequest, FallbackResult};
pub use providers::{Artifact, Category, GenerationRequest, ProviderBackend, ProviderDescriptor};
pub use registry::ProviderRegistry;
pub use status::{StatusReport, StatusReporter};

/// Result type used by the application layer
pub type Result<T> = anyhow::Result<T>;

/// Failure of a single provider call.
///
/// Never crosses the executor boundary: the executor records it and moves on.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("no API key configured for {0}")]
    MissingCredentials(String),

    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("expected {expected} output, provider returned {actual}")]
    WrongArtifact { expected: Category, actual: Category },

    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for ProviderError {
    // Request URLs can carry credentials, keep them out of error text
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.without_url())
    }
}

/// Configuration error raised while the registry is being built
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate {category} provider: {name}")]
    DuplicateProvider { category: Category, name: String },
}

/// Terminal outcome of a fallback request
#[derive(thiserror::Error, Debug)]
pub enum FallbackError {
    #[error("no provider configured for {0} generation")]
    NoProviderConfigured(Category),

    #[error("all {category} providers failed: {}", fallback::summarize(.attempts))]
    AllProvidersFailed {
        category: Category,
        attempts: Vec<AttemptRecord>,
    },

    #[error("{category} generation cancelled while {provider} was running")]
    Cancelled { category: Category, provider: String },

    #[error("{category} generation timed out after {timeout:?} while {provider} was running")]
    TimedOut {
        category: Category,
        provider: String,
        timeout: std::time::Duration,
    },
}

impl FallbackError {
    /// True for the two outcomes meaning "no provider could produce the content"
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            FallbackError::NoProviderConfigured(_) | FallbackError::AllProvidersFailed { .. }
        )
    }
}
