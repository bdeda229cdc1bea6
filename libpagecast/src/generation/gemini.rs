//! Gemini image generation provider
//!
//! Requests a single image for a prompt and stores the returned inline
//! base64 payload on disk.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::{store_image, ImageProvider};
use crate::config::{GeminiConfig, RetryConfig};
use crate::error::{ConfigError, GenerationError, Result};
use crate::types::{ImageMimeType, ImageRef};

pub struct GeminiImageProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    aspect_ratio: String,
    image_size: String,
    images_dir: PathBuf,
}

impl GeminiImageProvider {
    pub fn new(
        api_key: String,
        config: &GeminiConfig,
        retry: &RetryConfig,
        images_dir: PathBuf,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "generation.gemini".to_string(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: SecretString::from(api_key),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            aspect_ratio: config.aspect_ratio.clone(),
            image_size: config.image_size.clone(),
            images_dir,
        })
    }

    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: ImageGenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
                image_config: ImageConfig {
                    aspect_ratio: self.aspect_ratio.clone(),
                    image_size: self.image_size.clone(),
                },
            },
        }
    }
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    async fn generate_image(&self, prompt: &str) -> std::result::Result<ImageRef, GenerationError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting image");

        let response = self
            .client
            .post(self.api_url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| GenerationError::Provider(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Gemini returned an error");
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                GenerationError::RateLimited(format!("Gemini: {}", body))
            } else {
                GenerationError::Provider(format!("Gemini HTTP {}: {}", status.as_u16(), body))
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(format!("Unreadable Gemini response: {}", e)))?;

        let inline = body
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .find_map(|part| part.inline_data)
            .ok_or_else(|| GenerationError::Provider("Gemini response contained no image".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| GenerationError::Provider(format!("Invalid image encoding: {}", e)))?;
        let mime_type = ImageMimeType::from_mime_str(&inline.mime_type).unwrap_or(ImageMimeType::Png);

        store_image(&self.images_dir, &bytes, mime_type).await
    }
}

// === Request/Response Types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: ImageGenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageGenerationConfig {
    response_modalities: Vec<&'static str>,
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
    image_size: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType", alias = "mime_type", default)]
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str, images_dir: PathBuf) -> GeminiImageProvider {
        let config = GeminiConfig {
            base_url: base_url.to_string(),
            model: "image-test".to_string(),
            ..GeminiConfig::default()
        };
        GeminiImageProvider::new("g-key".to_string(), &config, &RetryConfig::default(), images_dir).unwrap()
    }

    #[tokio::test]
    async fn test_image_decoded_and_stored() {
        let server = MockServer::start().await;
        let temp = tempfile::TempDir::new().unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"\x89PNG fake image");

        Mock::given(method("POST"))
            .and(path("/models/image-test:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [
                        {"text": "Here is your image"},
                        {"inlineData": {"mimeType": "image/png", "data": encoded}}
                    ]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = provider(&server.uri(), temp.path().to_path_buf())
            .generate_image("a loaf of bread")
            .await
            .unwrap();

        assert_eq!(image.mime_type, ImageMimeType::Png);
        assert_eq!(image.size, 15);
        assert_eq!(std::fs::read(&image.path).unwrap(), b"\x89PNG fake image");
        assert!(image.path.contains("post_"));
    }

    #[tokio::test]
    async fn test_request_asks_for_square_image() {
        let server = MockServer::start().await;
        let temp = tempfile::TempDir::new().unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/jpeg", "data": "aGk="}}]}}]
            })))
            .mount(&server)
            .await;

        let image = provider(&server.uri(), temp.path().to_path_buf())
            .generate_image("prompt")
            .await
            .unwrap();
        assert_eq!(image.mime_type, ImageMimeType::Jpeg);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "2K");
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["TEXT", "IMAGE"]));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt");
    }

    #[tokio::test]
    async fn test_no_image_is_provider_error() {
        let server = MockServer::start().await;
        let temp = tempfile::TempDir::new().unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "I can't draw that"}]}}]
            })))
            .mount(&server)
            .await;

        let result = provider(&server.uri(), temp.path().to_path_buf())
            .generate_image("prompt")
            .await;
        assert!(matches!(result, Err(GenerationError::Provider(_))));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        for (status, expect_rate_limit) in [(429, true), (403, false), (503, false)] {
            let server = MockServer::start().await;
            let temp = tempfile::TempDir::new().unwrap();
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let result = provider(&server.uri(), temp.path().to_path_buf())
                .generate_image("prompt")
                .await;
            assert_eq!(
                matches!(result, Err(GenerationError::RateLimited(_))),
                expect_rate_limit,
                "status {}",
                status
            );
            assert!(result.is_err());
        }
    }
}
