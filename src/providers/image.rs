use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::Form;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ensure_success, Artifact, Endpoint, GenerationRequest, ProviderBackend};
use crate::ProviderError;

const DEFAULT_ASPECT_RATIO: &str = "16:9";
const HUGGINGFACE_WHOAMI_URL: &str = "https://huggingface.co/api/whoami-v2";
const REPLICATE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const REPLICATE_MAX_POLLS: usize = 120;

fn aspect_ratio(request: &GenerationRequest) -> &str {
    request
        .options
        .aspect_ratio
        .as_deref()
        .unwrap_or(DEFAULT_ASPECT_RATIO)
}

/// Replicate predictions API (FLUX, SDXL, ...)
pub struct ReplicateBackend {
    endpoint: Endpoint,
    model: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL; models return either a string or a list of strings
    fn output_url(&self) -> Option<&str> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
    }
}

impl ReplicateBackend {
    pub fn new(endpoint: Endpoint, model: String) -> Self {
        Self { endpoint, model }
    }

    async fn wait_for_prediction(&self, mut prediction: Prediction) -> Result<Prediction, ProviderError> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= REPLICATE_MAX_POLLS {
                return Err(ProviderError::Failed(format!(
                    "prediction still {} after {} polls",
                    prediction.status, polls
                )));
            }

            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|urls| urls.get.clone())
                .ok_or_else(|| ProviderError::MalformedResponse("prediction has no poll URL".into()))?;

            tokio::time::sleep(REPLICATE_POLL_INTERVAL).await;
            polls += 1;

            let response = self
                .endpoint
                .client()
                .get(poll_url)
                .bearer_auth(self.endpoint.api_key()?)
                .send()
                .await?;
            prediction = ensure_success(response).await?.json().await?;
            tracing::debug!(status = %prediction.status, polls, "Polled Replicate prediction");
        }

        Ok(prediction)
    }
}

#[async_trait]
impl ProviderBackend for ReplicateBackend {
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
        tracing::debug!(provider = %self.endpoint.name(), model = %self.model, "Creating Replicate prediction");

        let body = json!({
            "input": {
                "prompt": request.prompt,
                "num_outputs": 1,
                "aspect_ratio": aspect_ratio(request),
                "output_format": "jpg",
                "output_quality": 90,
            }
        });

        let response = self
            .endpoint
            .client()
            .post(self.endpoint.url(&format!("models/{}/predictions", self.model)))
            .bearer_auth(self.endpoint.api_key()?)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let prediction: Prediction = ensure_success(response).await?.json().await?;
        let prediction = self.wait_for_prediction(prediction).await?;

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .map(|error| error.to_string())
                .unwrap_or_else(|| prediction.status.clone());
            return Err(ProviderError::Failed(format!("prediction {reason}")));
        }

        let image_url = prediction
            .output_url()
            .ok_or_else(|| ProviderError::MalformedResponse("prediction has no output URL".into()))?;
        let response = self.endpoint.client().get(image_url).send().await?;
        let bytes = ensure_success(response).await?.bytes().await?;

        Ok(Artifact::Image(bytes.to_vec()))
    }
}

/// Hugging Face inference API
pub struct HuggingFaceBackend {
    endpoint: Endpoint,
    model: String,
}

impl HuggingFaceBackend {
    pub fn new(endpoint: Endpoint, model: String) -> Self {
        Self { endpoint, model }
    }
}

#[async_trait]
impl ProviderBackend for HuggingFaceBackend {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        let response = self
            .endpoint
            .probe(HUGGINGFACE_WHOAMI_URL)
            .bearer_auth(self.endpoint.api_key()?)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        tracing::debug!(provider = %self.endpoint.name(), model = %self.model, "Requesting Hugging Face image");

        let response = self
            .endpoint
            .client()
            .post(self.endpoint.url(&self.model))
            .bearer_auth(self.endpoint.api_key()?)
            .json(&json!({ "inputs": request.prompt }))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        // The API answers model-loading and quota problems with a 200 JSON body
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        if is_json {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::MalformedResponse(crate::utils::truncate(&body, 200)));
        }

        Ok(Artifact::Image(response.bytes().await?.to_vec()))
    }
}

/// Stability AI stable-image API
pub struct StabilityBackend {
    endpoint: Endpoint,
    model: String,
}

impl StabilityBackend {
    pub fn new(endpoint: Endpoint, model: String) -> Self {
        Self { endpoint, model }
    }
}

#[async_trait]
impl ProviderBackend for StabilityBackend {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn is_connected(&self) -> Result<bool, ProviderError> {
        let response = self
            .endpoint
            .probe(&self.endpoint.url("v1/user/account"))
            .bearer_auth(self.endpoint.api_key()?)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<Artifact, ProviderError> {
        tracing::debug!(provider = %self.endpoint.name(), model = %self.model, "Requesting Stability image");

        let form = Form::new()
            .text("prompt", request.prompt.clone())
            .text("output_format", "jpeg")
            .text("aspect_ratio", aspect_ratio(request).to_string());

        let response = self
            .endpoint
            .client()
            .post(
                self.endpoint
                    .url(&format!("v2beta/stable-image/generate/{}", self.model)),
            )
            .bearer_auth(self.endpoint.api_key()?)
            .header(ACCEPT, "image/*")
            .multipart(form)
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;

        Ok(Artifact::Image(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_output_url_from_list() {
        let raw = r#"{"status":"succeeded","output":["https://replicate.delivery/a.jpg"]}"#;
        let prediction: Prediction = serde_json::from_str(raw).unwrap();
        assert!(prediction.is_terminal());
        assert_eq!(
            prediction.output_url(),
            Some("https://replicate.delivery/a.jpg")
        );
    }

    #[test]
    fn test_prediction_output_url_from_string() {
        let raw = r#"{"status":"succeeded","output":"https://replicate.delivery/b.jpg"}"#;
        let prediction: Prediction = serde_json::from_str(raw).unwrap();
        assert_eq!(
            prediction.output_url(),
            Some("https://replicate.delivery/b.jpg")
        );
    }

    #[test]
    fn test_prediction_in_progress() {
        let raw = r#"{"status":"processing","output":null,"urls":{"get":"https://api.replicate.com/v1/predictions/xyz"}}"#;
        let prediction: Prediction = serde_json::from_str(raw).unwrap();
        assert!(!prediction.is_terminal());
        assert_eq!(prediction.output_url(), None);
        assert!(prediction.urls.and_then(|u| u.get).is_some());
    }

    #[test]
    fn test_aspect_ratio_default() {
        let request = GenerationRequest::new("a lighthouse at dusk");
        assert_eq!(aspect_ratio(&request), "16:9");
    }
}
