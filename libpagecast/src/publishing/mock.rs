//! Mock publisher
//!
//! Records what would have been published. Selected with
//! `publishing.platform = "mock"` and used by tests to simulate expired
//! tokens, rejections and flaky networks.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{post_url, AccountCredentials, PublishedPost, Publisher};
use crate::error::PublishError;
use crate::types::ImageRef;

#[derive(Debug, Clone, Default)]
pub struct MockPublisherConfig {
    /// Returned by every publish call
    pub error: Option<PublishError>,
    /// The first N calls fail with a network error
    pub flaky_calls: usize,
    pub delay: Duration,
}

pub struct MockPublisher {
    config: MockPublisherConfig,
    calls: Arc<AtomicUsize>,
    published: Arc<Mutex<Vec<String>>>,
}

impl MockPublisher {
    pub fn new(config: MockPublisherConfig) -> Self {
        Self {
            config,
            calls: Arc::new(AtomicUsize::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn success() -> Self {
        Self::new(MockPublisherConfig::default())
    }

    pub fn failure(error: PublishError) -> Self {
        Self::new(MockPublisherConfig {
            error: Some(error),
            ..Default::default()
        })
    }

    pub fn flaky(failures: usize) -> Self {
        Self::new(MockPublisherConfig {
            flaky_calls: failures,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Captions that were published successfully
    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|captions| captions.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(
        &self,
        credentials: &AccountCredentials,
        page_id: &str,
        _image: Option<&ImageRef>,
        caption: &str,
    ) -> Result<PublishedPost, PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if credentials.is_expired(chrono::Utc::now().timestamp()) {
            return Err(PublishError::AuthExpired("mock token expired".to_string()));
        }
        if let Some(error) = &self.config.error {
            return Err(error.clone());
        }
        if call < self.config.flaky_calls {
            return Err(PublishError::Network(format!("flaky failure #{}", call + 1)));
        }

        let published_count = match self.published.lock() {
            Ok(mut captions) => {
                captions.push(caption.to_string());
                captions.len()
            }
            Err(_) => call + 1,
        };

        let platform_post_id = format!("{}_{}", page_id, 1000 + published_count);
        Ok(PublishedPost {
            url: post_url(page_id, &platform_post_id),
            platform_post_id,
        })
    }
}
