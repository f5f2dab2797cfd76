use async_trait::async_trait;
use base64::Engine;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::json;

use super::{
    ensure_success, Artifact, Endpoint, GenerationRequest, ProviderBackend, GOOGLE_API_KEY_HEADER,
};
use crate::ProviderError;

const GOOGLE_DEFAULT_VOICE: &str = "en-US-Neural2-J";
const GOOGLE_DEFAULT_LANGUAGE: &str = "en-US";

/// ElevenLabs text-to-speech API
pub struct ElevenLabsBackend {
    endpoint: Endpoint,
    model: String,
    voice_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Debug, Deserialize)]
struct Voice {
    voice_id: String,
    #[serde(default)]
    name: String,
}

impl ElevenLabsBackend {
    pub fn new(endpoint: Endpoint, model: String, voice_id: Option<String>) -> Self {
        Self {
            endpoint,
            model,
            voice_id,
        }
    }

    async fn list_voices(&self) -> Result<VoiceList, ProviderError> {
        let response = self
            .endpoint
            .probe(&self.endpoint.url("voices"))
            .header("xi-api-key", self.endpoint.api_key()?)
            .send()
            .await?;

        Ok(ensure_success(response).await?.json().await?)
    }

    /// Voice from the request, then the configuration, then the first voice on the account
    async fn resolve_voice(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        if let Some(voice) = request.options.voice.as_ref().or(self.voice_id.as_ref()) {
            return Ok(voice.clone());
        }

        let first = self
            .list_voices()
            .await?
            .voices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Failed("account has no voices".into()))?;
        tracing::info!(voice = %first.name, "Using first available ElevenLabs voice");

        Ok(first.voice_id)
    }
}

#[async_trait]
impl ProviderBackend for ElevenLabsBackend {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        Ok(!self.list_voices().await?.voices.is_empty())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        let voice_id = self.resolve_voice(request).await?;
        tracing::debug!(provider = %self.endpoint.name(), voice = %voice_id, "Requesting ElevenLabs speech");

        let url = self.endpoint.url(&format!(
            "text-to-speech/{}",
            urlencoding::encode(&voice_id)
        ));
        let response = self
            .endpoint
            .client()
            .post(url)
            .header("xi-api-key", self.endpoint.api_key()?)
            .header(ACCEPT, "audio/mpeg")
            .json(&json!({ "text": request.prompt, "model_id": self.model }))
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;

        Ok(Artifact::Audio(bytes.to_vec()))
    }
}

/// Google Cloud text-to-speech API
pub struct GoogleTtsBackend {
    endpoint: Endpoint,
    voice_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleTtsBackend {
    pub fn new(endpoint: Endpoint, voice_name: Option<String>) -> Self {
        Self {
            endpoint,
            voice_name,
        }
    }
}

/// Language code prefix of a Google voice name, e.g. "en-GB" for "en-GB-Neural2-B"
fn language_of(voice_name: &str) -> &str {
    let mut dashes = voice_name.match_indices('-').map(|(idx, _)| idx);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(second)) => &voice_name[..second],
        _ => GOOGLE_DEFAULT_LANGUAGE,
    }
}

fn decode_audio(encoded: &str) -> Result<Vec<u8>, ProviderError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid audio content: {e}")))
}

#[async_trait]
impl ProviderBackend for GoogleTtsBackend {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        let response = self
            .endpoint
            .probe(&self.endpoint.url("voices"))
            .header(GOOGLE_API_KEY_HEADER, self.endpoint.api_key()?)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        let voice_name = request
            .options
            .voice
            .as_deref()
            .or(self.voice_name.as_deref())
            .unwrap_or(GOOGLE_DEFAULT_VOICE);
        tracing::debug!(provider = %self.endpoint.name(), voice = %voice_name, "Requesting Google speech");

        let body = json!({
            "input": { "text": request.prompt },
            "voice": {
                "languageCode": language_of(voice_name),
                "name": voice_name,
            },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": 1.0,
                "pitch": 0.0,
            }
        });

        let response = self
            .endpoint
            .client()
            .post(self.endpoint.url("text:synthesize"))
            .header(GOOGLE_API_KEY_HEADER, self.endpoint.api_key()?)
            .json(&body)
            .send()
            .await?;
        let parsed: SynthesizeResponse = ensure_success(response).await?.json().await?;

        Ok(Artifact::Audio(decode_audio(&parsed.audio_content)?))
    }
}
