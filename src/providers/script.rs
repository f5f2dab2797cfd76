use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    ensure_success, Artifact, Endpoint, GenerationRequest, ProviderBackend, GOOGLE_API_KEY_HEADER,
};
use crate::ProviderError;

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Wrap a topic in the narration prompt sent to script providers
pub fn narration_prompt(request: &GenerationRequest) -> String {
    if request.options.verbatim {
        return request.prompt.clone();
    }

    format!(
        "Write a natural, conversational narration script for a short video about '{}'. \
         Write ONLY the words that should be spoken - no headers, no stage directions, no formatting. \
         Start with a hook, cover 2-3 main points with interesting facts, \
         and end with a call to action. \
         Keep it under 300 words and use simple language.",
        request.prompt.trim()
    )
}

/// OpenAI-compatible chat completions API (Groq, OpenAI)
pub struct ChatCompletionsBackend {
    endpoint: Endpoint,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletionsBackend {
    pub fn new(endpoint: Endpoint, model: String) -> Self {
        Self { endpoint, model }
    }
}

#[async_trait]
impl ProviderBackend for ChatCompletionsBackend {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        let response = self
            .endpoint
            .probe(&self.endpoint.url("models"))
            .bearer_auth(self.endpoint.api_key()?)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        tracing::debug!(provider = %self.endpoint.name(), model = %self.model, "Requesting chat completion");

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": narration_prompt(request) }],
            "max_tokens": request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });

        let response = self
            .endpoint
            .client()
            .post(self.endpoint.url("chat/completions"))
            .bearer_auth(self.endpoint.api_key()?)
            .json(&body)
            .send()
            .await?;
        let parsed: ChatResponse = ensure_success(response).await?.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .map(Artifact::Text)
            .ok_or_else(|| ProviderError::MalformedResponse("no completion text in response".into()))
    }
}

/// Google Gemini generateContent API
pub struct GeminiBackend {
    endpoint: Endpoint,
    model: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

impl GeminiBackend {
    pub fn new(endpoint: Endpoint, model: String) -> Self {
        Self { endpoint, model }
    }
}

#[async_trait]
impl ProviderBackend for GeminiBackend {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        let response = self
            .endpoint
            .probe(&self.endpoint.url("models"))
            .header(GOOGLE_API_KEY_HEADER, self.endpoint.api_key()?)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        tracing::debug!(provider = %self.endpoint.name(), model = %self.model, "Requesting Gemini content");

        let body = json!({
            "contents": [{ "parts": [{ "text": narration_prompt(request) }] }],
            "generationConfig": {
                "temperature": request.options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                "maxOutputTokens": request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            }
        });

        let url = self
            .endpoint
            .url(&format!("models/{}:generateContent", self.model));
        let response = self
            .endpoint
            .client()
            .post(url)
            .header(GOOGLE_API_KEY_HEADER, self.endpoint.api_key()?)
            .json(&body)
            .send()
            .await?;
        let parsed: GeminiResponse = ensure_success(response).await?.json().await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "no candidate text in response".into(),
            ));
        }

        Ok(Artifact::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::GenerationOptions;

    #[test]
    fn test_narration_prompt_wraps_topic() {
        let request = GenerationRequest::new("  morning exercise ");
        let prompt = narration_prompt(&request);
        assert!(prompt.contains("'morning exercise'"));
        assert!(prompt.starts_with("Write a natural"));
    }

    #[test]
    fn test_narration_prompt_verbatim() {
        let request = GenerationRequest::new("List three facts about owls").with_options(
            GenerationOptions {
                verbatim: true,
                ..Default::default()
            },
        );
        assert_eq!(narration_prompt(&request), "List three facts about owls");
    }

    #[test]
    fn test_chat_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Hello there"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Hello there")
        );
    }

    #[test]
    fn test_gemini_response_parsing() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Part one. "},{"text":"Part two."}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let parts = &parsed.candidates[0].content.parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].text.as_deref(), Some("Part two."));
    }

    #[tokio::test]
    async fn test_gemini_connection_error_hides_api_key() {
        let endpoint = Endpoint::new(
            "Gemini",
            reqwest::Client::new(),
            "http://127.0.0.1:1/v1beta",
            Some("SECRET_KEY_123".to_string()),
            std::time::Duration::from_secs(2),
        );
        let backend = GeminiBackend::new(endpoint, "gemini-1.5-flash".to_string());

        let err = backend
            .invoke(&GenerationRequest::new("owls"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)));
        assert!(!err.to_string().contains("SECRET_KEY_123"));

        let err = backend.is_connected().await.unwrap_err();
        assert!(!err.to_string().contains("SECRET_KEY_123"));
    }
}
