use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod image;
pub mod script;
pub mod voice;

use crate::config::{HttpConfig, ProviderConfig};
use crate::utils::truncate;
use crate::ProviderError;

/// Header carrying the API key for Google APIs
pub(crate) const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";

/// Content generation domains, each with its own provider priority list
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Script,
    Image,
    Voice,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Script, Category::Image, Category::Voice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Script => "script",
            Category::Image => "image",
            Category::Voice => "voice",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional knobs forwarded to providers that understand them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens for script generation
    pub max_tokens: Option<u32>,

    /// Sampling temperature for script generation
    pub temperature: Option<f32>,

    /// Image aspect ratio such as "16:9"
    pub aspect_ratio: Option<String>,

    /// Voice identifier or voice name for speech synthesis
    pub voice: Option<String>,

    /// Send the prompt to script providers as-is instead of wrapping it in the narration template
    pub verbatim: bool,
}

/// Payload of a generation call: topic, image description or narration text
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Output of a successful generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Text(String),
    Image(Vec<u8>),
    Audio(Vec<u8>),
}

impl Artifact {
    /// Category this artifact belongs to
    pub fn category(&self) -> Category {
        match self {
            Artifact::Text(_) => Category::Script,
            Artifact::Image(_) => Category::Image,
            Artifact::Audio(_) => Category::Voice,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Artifact::Text(text) => text.as_bytes(),
            Artifact::Image(bytes) | Artifact::Audio(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// File extension used when saving the artifact
    pub fn default_extension(&self) -> &'static str {
        match self {
            Artifact::Text(_) => "txt",
            Artifact::Image(bytes) if bytes.starts_with(b"\x89PNG") => "png",
            Artifact::Image(_) => "jpg",
            Artifact::Audio(_) => "mp3",
        }
    }
}

/// Capability interface every provider implements
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Whether credentials are present. Must not perform network I/O.
    fn is_configured(&self) -> bool;

    /// Lightweight connectivity probe, used for diagnostics only
    async fn is_connected(&self) -> Result<bool, ProviderError>;

    /// Perform the generation call
    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError>;
}

/// A named, prioritized provider within one category
#[derive(Clone)]
pub struct ProviderDescriptor {
    name: String,
    category: Category,
    priority: i32,
    backend: Arc<dyn ProviderBackend>,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        priority: i32,
        backend: Arc<dyn ProviderBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            priority,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub async fn is_connected(&self) -> Result<bool, ProviderError> {
        self.backend.is_connected().await
    }

    pub async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        self.backend.invoke(request).await
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Concrete provider families known to the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Gemini,
    OpenAi,
    Replicate,
    HuggingFace,
    Stability,
    ElevenLabs,
    GoogleTts,
}

impl ProviderKind {
    /// Category the provider family generates for
    pub fn category(&self) -> Category {
        match self {
            ProviderKind::Groq | ProviderKind::Gemini | ProviderKind::OpenAi => Category::Script,
            ProviderKind::Replicate | ProviderKind::HuggingFace | ProviderKind::Stability => {
                Category::Image
            }
            ProviderKind::ElevenLabs | ProviderKind::GoogleTts => Category::Voice,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Replicate => "https://api.replicate.com/v1",
            ProviderKind::HuggingFace => "https://api-inference.huggingface.co/models",
            ProviderKind::Stability => "https://api.stability.ai",
            ProviderKind::ElevenLabs => "https://api.elevenlabs.io/v1",
            ProviderKind::GoogleTts => "https://texttospeech.googleapis.com/v1",
        }
    }

    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Groq => Some("llama-3.1-8b-instant"),
            ProviderKind::Gemini => Some("gemini-1.5-flash"),
            ProviderKind::OpenAi => Some("gpt-3.5-turbo"),
            ProviderKind::Replicate => Some("black-forest-labs/flux-schnell"),
            ProviderKind::HuggingFace => Some("stabilityai/stable-diffusion-xl-base-1.0"),
            ProviderKind::Stability => Some("sd3"),
            ProviderKind::ElevenLabs => Some("eleven_multilingual_v2"),
            ProviderKind::GoogleTts => None,
        }
    }
}

/// Connection details shared by every HTTP backend
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    probe_timeout: Duration,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            probe_timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// API key, or a `MissingCredentials` error naming the provider
    pub fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredentials(self.name.clone()))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET request limited to the probe timeout
    pub fn probe(&self, url: &str) -> RequestBuilder {
        self.client.get(url).timeout(self.probe_timeout)
    }
}

/// Turn a non-success response into `ProviderError::Status`
pub async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body: truncate(body.trim(), 200),
    })
}

/// Build the backend for one configured provider
pub fn build_backend(
    provider: &ProviderConfig,
    http: &HttpConfig,
    client: &Client,
) -> Arc<dyn ProviderBackend> {
    let endpoint = Endpoint::new(
        provider.name.as_str(),
        client.clone(),
        provider
            .base_url
            .as_deref()
            .unwrap_or_else(|| provider.kind.default_base_url()),
        crate::config::resolve_credential(&provider.credential_env_keys),
        http.probe_timeout(),
    );
    let model = provider
        .model
        .clone()
        .or_else(|| provider.kind.default_model().map(str::to_string))
        .unwrap_or_default();

    match provider.kind {
        ProviderKind::Groq | ProviderKind::OpenAi => {
            Arc::new(script::ChatCompletionsBackend::new(endpoint, model))
        }
        ProviderKind::Gemini => Arc::new(script::GeminiBackend::new(endpoint, model)),
        ProviderKind::Replicate => Arc::new(image::ReplicateBackend::new(endpoint, model)),
        ProviderKind::HuggingFace => Arc::new(image::HuggingFaceBackend::new(endpoint, model)),
        ProviderKind::Stability => Arc::new(image::StabilityBackend::new(endpoint, model)),
        ProviderKind::ElevenLabs => Arc::new(voice::ElevenLabsBackend::new(
            endpoint,
            model,
            provider.voice.clone(),
        )),
        ProviderKind::GoogleTts => Arc::new(voice::GoogleTtsBackend::new(
            endpoint,
            provider.voice.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_categories() {
        assert_eq!(ProviderKind::Groq.category(), Category::Script);
        assert_eq!(ProviderKind::HuggingFace.category(), Category::Image);
        assert_eq!(ProviderKind::GoogleTts.category(), Category::Voice);
    }

    #[test]
    fn test_provider_kind_serde_names() {
        let kind: ProviderKind = serde_yaml::from_str("elevenlabs").unwrap();
        assert_eq!(kind, ProviderKind::ElevenLabs);
        let kind: ProviderKind = serde_yaml::from_str("openai").unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
    }

    #[test]
    fn test_artifact_extension() {
        assert_eq!(Artifact::Text("hi".into()).default_extension(), "txt");
        assert_eq!(Artifact::Image(b"\x89PNG....".to_vec()).default_extension(), "png");
        assert_eq!(Artifact::Image(vec![0xff, 0xd8]).default_extension(), "jpg");
        assert_eq!(Artifact::Audio(vec![1, 2, 3]).category(), Category::Voice);
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let endpoint = Endpoint::new(
            "Example",
            Client::new(),
            "https://api.example.com/v1/",
            None,
            Duration::from_secs(1),
        );
        assert_eq!(endpoint.url("/models"), "https://api.example.com/v1/models");
        assert!(!endpoint.is_configured());
        assert!(matches!(
            endpoint.api_key(),
            Err(ProviderError::MissingCredentials(_))
        ));
    }
}
