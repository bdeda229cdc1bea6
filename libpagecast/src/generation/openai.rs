//! OpenAI Responses API caption provider

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    caption_prompt, extract_copy, AccountProfile, CaptionProvider, GeneratedCopy, PostContext,
    COPYWRITER_INSTRUCTIONS,
};
use crate::config::{OpenAiConfig, RetryConfig};
use crate::error::{ConfigError, GenerationError, Result};

pub struct OpenAiCaptionProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiCaptionProvider {
    pub fn new(api_key: String, config: &OpenAiConfig, retry: &RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "generation.openai".to_string(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: SecretString::from(api_key),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn build_request(&self, profile: &AccountProfile, context: &PostContext) -> ResponsesRequest {
        ResponsesRequest {
            model: self.model.clone(),
            input: vec![
                InputMessage {
                    role: "system",
                    content: COPYWRITER_INSTRUCTIONS.to_string(),
                },
                InputMessage {
                    role: "user",
                    content: caption_prompt(profile, context),
                },
            ],
        }
    }
}

#[async_trait]
impl CaptionProvider for OpenAiCaptionProvider {
    async fn generate_caption(
        &self,
        profile: &AccountProfile,
        context: &PostContext,
    ) -> std::result::Result<GeneratedCopy, GenerationError> {
        debug!(model = %self.model, post_id = %context.post_id, "Requesting caption");

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.build_request(profile, context))
            .send()
            .await
            .map_err(|e| GenerationError::Provider(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "OpenAI returned an error");
            return Err(map_status(status, &body));
        }

        let body: ResponsesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(format!("Unreadable OpenAI response: {}", e)))?;

        extract_copy(&body.output_text())
    }
}

fn map_status(status: StatusCode, body: &str) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited(format!("OpenAI: {}", body))
    } else {
        GenerationError::Provider(format!("OpenAI HTTP {}: {}", status.as_u16(), body))
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputMessage>,
}

#[derive(Debug, Serialize)]
struct InputMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ResponsesResponse {
    /// Concatenated text of all message outputs
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|c| c.kind == "output_text" || c.kind == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> OpenAiCaptionProvider {
        let config = OpenAiConfig {
            api_key: None,
            base_url: base_url.to_string(),
            model: "gpt-test".to_string(),
        };
        OpenAiCaptionProvider::new("sk-test".to_string(), &config, &RetryConfig::default()).unwrap()
    }

    fn profile() -> AccountProfile {
        AccountProfile {
            business_summary: "Bike repair shop".to_string(),
            post_style: "Friendly".to_string(),
        }
    }

    fn context() -> PostContext {
        PostContext {
            post_id: "post-1".to_string(),
            post_number: 2,
            scheduled_at: 0,
        }
    }

    #[tokio::test]
    async fn test_caption_parsed_from_message_output() {
        let server = MockServer::start().await;
        let reply = r#"{"image_prompt": "a mechanic fixing a bike", "caption": "Ride on!"}"#;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "resp_1",
                "output": [
                    {"type": "reasoning", "content": []},
                    {"type": "message", "content": [{"type": "output_text", "text": reply}]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let copy = provider(&server.uri()).generate_caption(&profile(), &context()).await.unwrap();

        assert_eq!(copy.caption, "Ride on!");
        assert_eq!(copy.image_prompt, "a mechanic fixing a bike");
    }

    #[tokio::test]
    async fn test_request_carries_model_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [{"type": "message", "content": [{"type": "output_text",
                    "text": "{\"image_prompt\": \"p\", \"caption\": \"c\"}"}]}]
            })))
            .mount(&server)
            .await;

        provider(&server.uri()).generate_caption(&profile(), &context()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["input"][0]["role"], "system");
        assert!(body["input"][1]["content"].as_str().unwrap().contains("Bike repair shop"));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).generate_caption(&profile(), &context()).await;
        assert!(matches!(result, Err(GenerationError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).generate_caption(&profile(), &context()).await;
        match result {
            Err(GenerationError::Provider(message)) => assert!(message.contains("401")),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_reply_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [{"type": "message", "content": [{"type": "output_text", "text": "no json here"}]}]
            })))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).generate_caption(&profile(), &context()).await;
        assert!(matches!(result, Err(GenerationError::Provider(_))));
    }
}
