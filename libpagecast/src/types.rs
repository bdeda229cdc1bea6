//! Core types for Pagecast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PagecastError;

// ============================================================================
// Credits
// ============================================================================

/// Fixed-point credit amount in hundredths of a credit
///
/// Amounts are stored as integers so that a ledger's entries always sum
/// exactly to its balance. Serialized as a decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Credits(hundredths)
    }

    pub const fn from_whole(credits: i64) -> Self {
        Credits(credits * 100)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Credits)
    }
}

impl std::ops::Neg for Credits {
    type Output = Credits;

    fn neg(self) -> Credits {
        Credits(-self.0)
    }
}

impl std::iter::Sum for Credits {
    fn sum<I: Iterator<Item = Credits>>(iter: I) -> Credits {
        Credits(iter.map(|c| c.0).sum())
    }
}

impl TryFrom<f64> for Credits {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(format!("credit amount must be finite, got {}", value));
        }
        let scaled = (value * 100.0).round();
        if scaled.abs() > i64::MAX as f64 / 2.0 {
            return Err(format!("credit amount out of range: {}", value));
        }
        Ok(Credits(scaled as i64))
    }
}

impl From<Credits> for f64 {
    fn from(value: Credits) -> f64 {
        value.0 as f64 / 100.0
    }
}

impl FromStr for Credits {
    type Err = PagecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| PagecastError::InvalidInput(format!("Invalid credit amount: '{}'", s)))?;
        Credits::try_from(value).map_err(PagecastError::InvalidInput)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        f.pad(&format!("{}{}.{:02}", sign, abs / 100, abs % 100))
    }
}

// ============================================================================
// Posts
// ============================================================================

/// Lifecycle of a scheduled post
///
/// ```text
/// scheduled -> generating -> ready -> posting -> posted
///     |            |                    |
///     v            +------> failed <----+
/// cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Generating,
    Ready,
    Posting,
    Posted,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub const ALL: [PostStatus; 7] = [
        PostStatus::Scheduled,
        PostStatus::Generating,
        PostStatus::Ready,
        PostStatus::Posting,
        PostStatus::Posted,
        PostStatus::Failed,
        PostStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Generating => "generating",
            PostStatus::Ready => "ready",
            PostStatus::Posting => "posting",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }

    /// Posts in these states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Posted | PostStatus::Cancelled)
    }

    /// Claimed by a sweep worker and mid-flight
    pub fn is_in_flight(&self) -> bool {
        matches!(self, PostStatus::Generating | PostStatus::Posting)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = PagecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s.to_lowercase())
            .ok_or_else(|| PagecastError::InvalidInput(format!("Unknown post status: '{}'", s)))
    }
}

/// A unit of scheduled content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account_id: String,
    pub scheduled_at: i64,
    pub status: PostStatus,
    pub caption: Option<String>,
    pub image_prompt: Option<String>,
    pub image: Option<ImageRef>,
    pub platform_post_id: Option<String>,
    pub post_url: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub credits_charged: Credits,
    pub debit_attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub posted_at: Option<i64>,
}

impl Post {
    pub fn new(account_id: String, scheduled_at: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            scheduled_at,
            status: PostStatus::Scheduled,
            caption: None,
            image_prompt: None,
            image: None,
            platform_post_id: None,
            post_url: None,
            error_kind: None,
            error_message: None,
            credits_charged: Credits::ZERO,
            debit_attempts: 0,
            created_at: now,
            updated_at: now,
            posted_at: None,
        }
    }

    /// Both generated artifacts are present
    pub fn has_artifacts(&self) -> bool {
        self.caption.is_some() && self.image.is_some()
    }
}

// ============================================================================
// Images
// ============================================================================

/// Supported image MIME types for generated images
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a generated image stored on disk
///
/// Images are kept as files, not blobs in the database. `sha256` is the hex
/// digest of the file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: String,
    pub mime_type: ImageMimeType,
    pub size: u64,
    pub sha256: String,
}

// ============================================================================
// Accounts
// ============================================================================

/// How often an account publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Custom,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Biweekly => "biweekly",
            Recurrence::Monthly => "monthly",
            Recurrence::Custom => "custom",
        }
    }

    /// Days between posts; `custom_days` only applies to `Custom`
    pub fn interval_days(&self, custom_days: i64) -> i64 {
        match self {
            Recurrence::Daily => 1,
            Recurrence::Weekly => 7,
            Recurrence::Biweekly => 14,
            Recurrence::Monthly => 30,
            Recurrence::Custom if custom_days > 0 => custom_days,
            Recurrence::Custom => 7,
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = PagecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "biweekly" => Ok(Recurrence::Biweekly),
            "monthly" => Ok(Recurrence::Monthly),
            "custom" => Ok(Recurrence::Custom),
            _ => Err(PagecastError::InvalidInput(format!(
                "Unknown recurrence '{}'. Valid options: daily, weekly, biweekly, monthly, custom",
                s
            ))),
        }
    }
}

/// A tenant of the service with one connected page
///
/// The page access token is not part of this struct; it is
/// loaded on demand as [`crate::publishing::AccountCredentials`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    pub token_expires_at: Option<i64>,
    pub needs_reauth: bool,
    pub business_summary: Option<String>,
    pub post_style: Option<String>,
    pub recurrence: Recurrence,
    pub custom_recurrence_days: i64,
    pub preferred_time: String,
    pub utc_offset_minutes: i32,
    pub onboarded: bool,
    pub balance: Credits,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    pub fn new(email: String, name: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            name,
            page_id: None,
            page_name: None,
            token_expires_at: None,
            needs_reauth: false,
            business_summary: None,
            post_style: None,
            recurrence: Recurrence::Weekly,
            custom_recurrence_days: 7,
            preferred_time: "10:00".to_string(),
            utc_offset_minutes: 0,
            onboarded: false,
            balance: Credits::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn page_connected(&self) -> bool {
        self.page_id.is_some()
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Trial,
    Purchase,
    Generation,
    Refund,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Trial => "trial",
            EntryKind::Purchase => "purchase",
            EntryKind::Generation => "generation",
            EntryKind::Refund => "refund",
        }
    }
}

impl FromStr for EntryKind {
    type Err = PagecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(EntryKind::Trial),
            "purchase" => Ok(EntryKind::Purchase),
            "generation" => Ok(EntryKind::Generation),
            "refund" => Ok(EntryKind::Refund),
            _ => Err(PagecastError::InvalidInput(format!("Unknown ledger entry kind: '{}'", s))),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of a credit or debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: String,
    pub amount: Credits,
    pub balance_after: Credits,
    pub kind: EntryKind,
    pub description: String,
    pub post_id: Option<String>,
    pub payment_ref: Option<String>,
    pub created_at: i64,
}
