//! Publication adapters
//!
//! [`Publisher`] pushes a finished post to the connected page. Failures are
//! classified so the pipeline can tell an expired token (the owner must
//! reconnect) from a rejected post and from a transient network problem.

pub mod facebook;
pub mod mock;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, PublishingPlatform};
use crate::error::{PublishError, Result};
use crate::types::ImageRef;

pub use facebook::FacebookPublisher;
pub use mock::MockPublisher;

/// Page credentials of an account
#[derive(Debug)]
pub struct AccountCredentials {
    pub page_id: String,
    access_token: SecretString,
    /// Unix timestamp after which the token is no longer valid
    pub expires_at: Option<i64>,
}

impl AccountCredentials {
    pub fn new(page_id: String, access_token: String, expires_at: Option<i64>) -> Self {
        Self {
            page_id,
            access_token: SecretString::from(access_token),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Where a published post lives on the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub platform_post_id: String,
    pub url: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(
        &self,
        credentials: &AccountCredentials,
        page_id: &str,
        image: Option<&ImageRef>,
        caption: &str,
    ) -> std::result::Result<PublishedPost, PublishError>;
}

/// Build the publisher selected by `publishing.platform`
pub fn create_publisher(config: &Config) -> Result<Arc<dyn Publisher>> {
    match config.publishing.platform {
        PublishingPlatform::Facebook => Ok(Arc::new(FacebookPublisher::new(
            &config.publishing.graph_base_url,
            &config.retry,
        )?)),
        PublishingPlatform::Mock => Ok(Arc::new(MockPublisher::success())),
    }
}

/// Public URL of a page post
///
/// Graph ids of page posts have the form `{page_id}_{post_id}`.
pub fn post_url(page_id: &str, platform_post_id: &str) -> String {
    match platform_post_id.split_once('_') {
        Some((page, post)) => format!("https://www.facebook.com/{}/posts/{}", page, post),
        None => format!("https://www.facebook.com/{}/posts/{}", page_id, platform_post_id),
    }
}
