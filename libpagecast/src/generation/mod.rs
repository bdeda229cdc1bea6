//! Content generation adapters
//!
//! A post needs two artifacts: copy (caption plus an image prompt) and an
//! image rendered from that prompt. [`ContentGenerator`] is the seam the
//! pipeline calls; the live implementation composes an OpenAI caption
//! provider with a Gemini image provider.

pub mod gemini;
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, GenerationProvider};
use crate::error::{ConfigError, GenerationError, Result};
use crate::types::{ImageMimeType, ImageRef};

pub use gemini::GeminiImageProvider;
pub use mock::MockGenerator;
pub use openai::OpenAiCaptionProvider;

/// Business profile the copy is written for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub business_summary: String,
    pub post_style: String,
}

/// Where a post sits in the account's sequence
#[derive(Debug, Clone, PartialEq)]
pub struct PostContext {
    pub post_id: String,
    /// 1-based position among the account's posts, used to vary output
    pub post_number: u32,
    pub scheduled_at: i64,
}

/// Caption and image prompt produced in one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCopy {
    pub caption: String,
    pub image_prompt: String,
}

/// Produces both artifacts of a post
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_caption(
        &self,
        profile: &AccountProfile,
        context: &PostContext,
    ) -> std::result::Result<GeneratedCopy, GenerationError>;

    async fn generate_image(&self, prompt: &str) -> std::result::Result<ImageRef, GenerationError>;
}

#[async_trait]
pub trait CaptionProvider: Send + Sync {
    async fn generate_caption(
        &self,
        profile: &AccountProfile,
        context: &PostContext,
    ) -> std::result::Result<GeneratedCopy, GenerationError>;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> std::result::Result<ImageRef, GenerationError>;
}

/// Copy from one provider, images from another
pub struct CompositeGenerator {
    captions: Box<dyn CaptionProvider>,
    images: Box<dyn ImageProvider>,
}

impl CompositeGenerator {
    pub fn new(captions: Box<dyn CaptionProvider>, images: Box<dyn ImageProvider>) -> Self {
        Self { captions, images }
    }
}

#[async_trait]
impl ContentGenerator for CompositeGenerator {
    fn name(&self) -> &str {
        "openai+gemini"
    }

    async fn generate_caption(
        &self,
        profile: &AccountProfile,
        context: &PostContext,
    ) -> std::result::Result<GeneratedCopy, GenerationError> {
        self.captions.generate_caption(profile, context).await
    }

    async fn generate_image(&self, prompt: &str) -> std::result::Result<ImageRef, GenerationError> {
        self.images.generate_image(prompt).await
    }
}

/// Build the generator selected by `generation.provider`
pub fn create_generator(config: &Config) -> Result<Arc<dyn ContentGenerator>> {
    let images_dir = config.images_dir();
    match config.generation.provider {
        GenerationProvider::Mock => Ok(Arc::new(MockGenerator::new(images_dir))),
        GenerationProvider::Live => {
            let openai_key = config.generation.openai.api_key.clone().ok_or_else(|| {
                ConfigError::MissingField("generation.openai.api_key (or OPENAI_API_KEY)".to_string())
            })?;
            let gemini_key = config.generation.gemini.api_key.clone().ok_or_else(|| {
                ConfigError::MissingField("generation.gemini.api_key (or GEMINI_API_KEY)".to_string())
            })?;

            let captions = OpenAiCaptionProvider::new(openai_key, &config.generation.openai, &config.retry)?;
            let images = GeminiImageProvider::new(
                gemini_key,
                &config.generation.gemini,
                &config.retry,
                images_dir,
            )?;
            Ok(Arc::new(CompositeGenerator::new(Box::new(captions), Box::new(images))))
        }
    }
}

/// Instructions sent with every caption request
pub(crate) const COPYWRITER_INSTRUCTIONS: &str = "You are a social media copywriter for small \
businesses. Reply with a single JSON object with the keys \"image_prompt\" and \"caption\" and \
nothing else.";

/// Build the user prompt for one post
pub fn caption_prompt(profile: &AccountProfile, context: &PostContext) -> String {
    format!(
        "Write a Facebook post for this business.\n\n\
         BUSINESS SUMMARY:\n{summary}\n\n\
         DESIRED STYLE:\n{style}\n\n\
         1. Write a very detailed IMAGE PROMPT for a professional square (1:1) photo: main \
         subject, photographic style, lighting, lens, depth of field, color palette, mood, \
         composition and textures.\n\
         2. Write a CAPTION of 50 to 150 words that hooks the reader, tells a short story or \
         message, ends with a subtle call to action, uses 2 to 4 emojis and closes with 2 or 3 \
         relevant hashtags.\n\n\
         This is post number {number}, so vary the content from earlier posts.\n\n\
         Respond with JSON only: {{\"image_prompt\": \"...\", \"caption\": \"...\"}}",
        summary = profile.business_summary,
        style = profile.post_style,
        number = context.post_number,
    )
}

/// Pull the `{image_prompt, caption}` object out of a model reply
///
/// Models sometimes wrap the object in prose or code fences, so the text
/// between the first `{` and the last `}` is parsed.
pub fn extract_copy(reply: &str) -> std::result::Result<GeneratedCopy, GenerationError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(GenerationError::Provider(
                "Reply did not contain a JSON object".to_string(),
            ))
        }
    };

    let copy: GeneratedCopy = serde_json::from_str(json)
        .map_err(|e| GenerationError::Provider(format!("Malformed copy JSON: {}", e)))?;

    if copy.caption.trim().is_empty() || copy.image_prompt.trim().is_empty() {
        return Err(GenerationError::Provider(
            "Reply had an empty caption or image prompt".to_string(),
        ));
    }
    Ok(copy)
}

/// Write image bytes under `dir` and describe the stored file
pub(crate) async fn store_image(
    dir: &Path,
    bytes: &[u8],
    mime_type: ImageMimeType,
) -> std::result::Result<ImageRef, GenerationError> {
    if bytes.is_empty() {
        return Err(GenerationError::Provider("Provider returned an empty image".to_string()));
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| GenerationError::Provider(format!("Cannot create {}: {}", dir.display(), e)))?;

    let path: PathBuf = dir.join(format!(
        "post_{}.{}",
        uuid::Uuid::new_v4(),
        mime_type.extension()
    ));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| GenerationError::Provider(format!("Cannot write {}: {}", path.display(), e)))?;

    Ok(ImageRef {
        path: path.to_string_lossy().into_owned(),
        mime_type,
        size: bytes.len() as u64,
        sha256: format!("{:x}", Sha256::digest(bytes)),
    })
}
