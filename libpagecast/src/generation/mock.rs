//! Mock content generator
//!
//! Produces deterministic copy and a tiny image file without network access.
//! Selected with `generation.provider = "mock"`, and used by tests to
//! simulate provider failures, flakiness and latency.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::{store_image, AccountProfile, ContentGenerator, GeneratedCopy, PostContext};
use crate::error::GenerationError;
use crate::types::{ImageMimeType, ImageRef};

/// 1x1 transparent PNG
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

#[derive(Debug, Clone, Default)]
pub struct MockGeneratorConfig {
    /// Returned by every caption call
    pub caption_error: Option<GenerationError>,
    /// Returned by every image call
    pub image_error: Option<GenerationError>,
    /// The first N image calls fail with a provider error, later ones succeed
    pub flaky_image_calls: usize,
    /// Delay before completing each call
    pub delay: Duration,
}

pub struct MockGenerator {
    config: MockGeneratorConfig,
    images_dir: PathBuf,
    caption_calls: Arc<AtomicUsize>,
    image_calls: Arc<AtomicUsize>,
}

impl MockGenerator {
    /// A generator that always succeeds
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(images_dir, MockGeneratorConfig::default())
    }

    pub fn with_config(images_dir: impl Into<PathBuf>, config: MockGeneratorConfig) -> Self {
        Self {
            config,
            images_dir: images_dir.into(),
            caption_calls: Arc::new(AtomicUsize::new(0)),
            image_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every image request fails with `error`
    pub fn image_failure(images_dir: impl Into<PathBuf>, error: GenerationError) -> Self {
        Self::with_config(
            images_dir,
            MockGeneratorConfig {
                image_error: Some(error),
                ..Default::default()
            },
        )
    }

    /// Every caption request fails with `error`
    pub fn caption_failure(images_dir: impl Into<PathBuf>, error: GenerationError) -> Self {
        Self::with_config(
            images_dir,
            MockGeneratorConfig {
                caption_error: Some(error),
                ..Default::default()
            },
        )
    }

    pub fn with_delay(images_dir: impl Into<PathBuf>, delay: Duration) -> Self {
        Self::with_config(
            images_dir,
            MockGeneratorConfig {
                delay,
                ..Default::default()
            },
        )
    }

    pub fn caption_calls(&self) -> usize {
        self.caption_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_caption(
        &self,
        profile: &AccountProfile,
        context: &PostContext,
    ) -> Result<GeneratedCopy, GenerationError> {
        self.caption_calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        if let Some(error) = &self.config.caption_error {
            return Err(error.clone());
        }

        Ok(GeneratedCopy {
            caption: format!(
                "Post #{} for {}",
                context.post_number,
                if profile.business_summary.is_empty() {
                    "our customers"
                } else {
                    profile.business_summary.as_str()
                }
            ),
            image_prompt: format!("Square photo, {} style", profile.post_style),
        })
    }

    async fn generate_image(&self, _prompt: &str) -> Result<ImageRef, GenerationError> {
        let call = self.image_calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        if let Some(error) = &self.config.image_error {
            return Err(error.clone());
        }
        if call < self.config.flaky_image_calls {
            return Err(GenerationError::Provider(format!("flaky failure #{}", call + 1)));
        }

        store_image(&self.images_dir, PLACEHOLDER_PNG, ImageMimeType::Png).await
    }
}
