//! Facebook Graph API publisher
//!
//! Posts with an image go to `/{page_id}/photos` as a multipart upload; text
//! posts go to `/{page_id}/feed`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{post_url, AccountCredentials, PublishedPost, Publisher};
use crate::config::RetryConfig;
use crate::error::{ConfigError, PublishError, Result};
use crate::types::ImageRef;

/// Graph error codes meaning the token is no longer valid
const AUTH_ERROR_CODES: &[i64] = &[102, 190];

/// Graph error codes for throttling and temporary outages
const TRANSIENT_ERROR_CODES: &[i64] = &[4, 17, 32, 613];

pub struct FacebookPublisher {
    client: Client,
    base_url: String,
}

impl FacebookPublisher {
    pub fn new(base_url: &str, retry: &RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "publishing".to_string(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn upload_photo(
        &self,
        credentials: &AccountCredentials,
        page_id: &str,
        image: &ImageRef,
        caption: &str,
    ) -> std::result::Result<reqwest::Response, PublishError> {
        let bytes = tokio::fs::read(&image.path).await.map_err(|e| {
            PublishError::PlatformRejected(format!("Cannot read image {}: {}", image.path, e))
        })?;
        let file_name = std::path::Path::new(&image.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("post.{}", image.mime_type.extension()));
        let source = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(image.mime_type.as_str())
            .map_err(|e| PublishError::PlatformRejected(format!("Bad image type: {}", e)))?;

        let form = Form::new()
            .text("message", caption.to_string())
            .text("access_token", credentials.access_token().to_string())
            .part("source", source);

        self.client
            .post(format!("{}/{}/photos", self.base_url, page_id))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::Network(format!("Graph request failed: {}", e)))
    }

    async fn post_text(
        &self,
        credentials: &AccountCredentials,
        page_id: &str,
        caption: &str,
    ) -> std::result::Result<reqwest::Response, PublishError> {
        self.client
            .post(format!("{}/{}/feed", self.base_url, page_id))
            .form(&[("message", caption), ("access_token", credentials.access_token())])
            .send()
            .await
            .map_err(|e| PublishError::Network(format!("Graph request failed: {}", e)))
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn publish(
        &self,
        credentials: &AccountCredentials,
        page_id: &str,
        image: Option<&ImageRef>,
        caption: &str,
    ) -> std::result::Result<PublishedPost, PublishError> {
        if credentials.is_expired(chrono::Utc::now().timestamp()) {
            return Err(PublishError::AuthExpired(format!(
                "Page token for {} has expired",
                page_id
            )));
        }

        debug!(page_id, with_image = image.is_some(), "Publishing to Facebook");
        let response = match image {
            Some(image) => self.upload_photo(credentials, page_id, image, caption).await?,
            None => self.post_text(credentials, page_id, caption).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_error(status, &body);
            warn!(page_id, status = %status, kind = error.kind(), "Graph API rejected the post");
            return Err(error);
        }

        // The page already shows the post; publishing again would duplicate it
        let body: GraphPostResponse = response.json().await.map_err(|e| {
            PublishError::PlatformRejected(format!("Published but the Graph response was unreadable: {}", e))
        })?;

        let platform_post_id = body
            .post_id
            .or(body.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PublishError::PlatformRejected("Graph response had no post id".to_string()))?;

        let url = post_url(page_id, &platform_post_id);
        info!(page_id, platform_post_id = %platform_post_id, "Published to Facebook");
        Ok(PublishedPost { platform_post_id, url })
    }
}

/// Map a failed Graph response to a publish error
fn classify_error(status: StatusCode, body: &str) -> PublishError {
    let graph_error = serde_json::from_str::<GraphErrorResponse>(body)
        .ok()
        .map(|r| r.error);
    let code = graph_error.as_ref().and_then(|e| e.code);
    let message = graph_error
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if status == StatusCode::UNAUTHORIZED || code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c)) {
        PublishError::AuthExpired(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        || code.is_some_and(|c| TRANSIENT_ERROR_CODES.contains(&c))
    {
        PublishError::Network(message)
    } else {
        PublishError::PlatformRejected(message)
    }
}

#[derive(Debug, Deserialize)]
struct GraphPostResponse {
    id: Option<String>,
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
    code: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{with_retry, RetryPolicy};
    use crate::types::ImageMimeType;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(server: &MockServer) -> FacebookPublisher {
        FacebookPublisher::new(&server.uri(), &RetryConfig::default()).unwrap()
    }

    fn credentials() -> AccountCredentials {
        AccountCredentials::new("111".to_string(), "page-token".to_string(), None)
    }

    fn image_on_disk(dir: &std::path::Path) -> ImageRef {
        let path = dir.join("post_test.png");
        std::fs::write(&path, b"png-bytes").unwrap();
        ImageRef {
            path: path.to_string_lossy().into_owned(),
            mime_type: ImageMimeType::Png,
            size: 9,
            sha256: String::new(),
        }
    }

    fn graph_error(code: i64, message: &str) -> serde_json::Value {
        json!({"error": {"message": message, "type": "OAuthException", "code": code}})
    }

    #[tokio::test]
    async fn test_photo_upload_builds_url_from_post_id() {
        let server = MockServer::start().await;
        let temp = tempfile::TempDir::new().unwrap();
        Mock::given(method("POST"))
            .and(path("/111/photos"))
            .and(body_string_contains("page-token"))
            .and(body_string_contains("Fresh bread today"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "999", "post_id": "111_222"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let published = publisher(&server)
            .publish(&credentials(), "111", Some(&image_on_disk(temp.path())), "Fresh bread today")
            .await
            .unwrap();

        assert_eq!(published.platform_post_id, "111_222");
        assert_eq!(published.url, "https://www.facebook.com/111/posts/222");
    }

    #[tokio::test]
    async fn test_text_post_goes_to_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/111/feed"))
            .and(body_string_contains("message=Hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "111_333"})))
            .expect(1)
            .mount(&server)
            .await;

        let published = publisher(&server)
            .publish(&credentials(), "111", None, "Hello")
            .await
            .unwrap();

        assert_eq!(published.url, "https://www.facebook.com/111/posts/333");
    }

    #[tokio::test]
    async fn test_unreadable_success_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/111/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let policy = RetryPolicy::from_config(&RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            ..Default::default()
        });
        let publisher = publisher(&server);
        let credentials = credentials();
        let result = with_retry(&policy, "publish", || {
            publisher.publish(&credentials, "111", None, "Hi")
        })
        .await;

        assert!(matches!(result, Err(PublishError::PlatformRejected(ref m)) if m.contains("unreadable")));
    }

    #[tokio::test]
    async fn test_expired_token_code_is_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(graph_error(190, "Error validating access token")),
            )
            .mount(&server)
            .await;

        let result = publisher(&server).publish(&credentials(), "111", None, "Hi").await;
        assert_eq!(
            result,
            Err(PublishError::AuthExpired("Error validating access token".to_string()))
        );
    }

    #[tokio::test]
    async fn test_throttling_code_is_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(32, "Page request limit reached")))
            .mount(&server)
            .await;

        let result = publisher(&server).publish(&credentials(), "111", None, "Hi").await;
        assert!(matches!(result, Err(PublishError::Network(_))));
    }

    #[tokio::test]
    async fn test_other_client_error_is_rejected_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(graph_error(200, "(#200) Permissions error")),
            )
            .mount(&server)
            .await;

        let result = publisher(&server).publish(&credentials(), "111", None, "Hi").await;
        assert_eq!(
            result,
            Err(PublishError::PlatformRejected("(#200) Permissions error".to_string()))
        );
    }

    #[tokio::test]
    async fn test_expired_credentials_fail_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1_2"})))
            .expect(0)
            .mount(&server)
            .await;

        let expired = AccountCredentials::new("111".to_string(), "t".to_string(), Some(1));
        let result = publisher(&server).publish(&expired, "111", None, "Hi").await;
        assert!(matches!(result, Err(PublishError::AuthExpired(_))));
    }

    #[test]
    fn test_classify_status_without_graph_body() {
        assert!(matches!(
            classify_error(StatusCode::UNAUTHORIZED, ""),
            PublishError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, ""),
            PublishError::Network(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::BAD_GATEWAY, "<html>"),
            PublishError::Network(_)
        ));
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, "not json"),
            PublishError::PlatformRejected("HTTP 400".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_image_file_is_rejected() {
        let server = MockServer::start().await;
        let image = ImageRef {
            path: "/nonexistent/post.png".to_string(),
            mime_type: ImageMimeType::Png,
            size: 0,
            sha256: String::new(),
        };
        let result = publisher(&server)
            .publish(&credentials(), "111", Some(&image), "Hi")
            .await;
        assert!(matches!(result, Err(PublishError::PlatformRejected(_))));
    }
}
