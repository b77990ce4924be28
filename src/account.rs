//! Account snapshots as fetched from the platform
//!
//! A snapshot is immutable once built and owned by the analysis that fetched
//! it. Nothing here is persisted.

use crate::errors::{GuardError, GuardResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest handle accepted anywhere in the engine.
pub const MAX_HANDLE_LEN: usize = 50;

/// Normalize a handle: trim, strip a leading `@`, lowercase.
///
/// Returns a validation error for empty handles or handles containing
/// anything other than ASCII letters, digits and underscores.
pub fn normalize_handle(raw: &str) -> GuardResult<String> {
    let handle = raw.trim().trim_start_matches('@').to_ascii_lowercase();
    if handle.is_empty() {
        return Err(GuardError::validation("handle", "handle is empty"));
    }
    if handle.len() > MAX_HANDLE_LEN {
        return Err(GuardError::validation(
            "handle",
            format!("handle longer than {MAX_HANDLE_LEN} characters"),
        ));
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GuardError::validation(
            "handle",
            format!("invalid characters in '{raw}'"),
        ));
    }
    Ok(handle)
}

/// Engagement counters on a single post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
    pub quotes: u64,
}

impl Engagement {
    pub fn total(&self) -> u64 {
        self.likes + self.reposts + self.replies + self.quotes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub engagement: Engagement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Normalized handle, the identifier used by the trust registry
    pub handle: String,
    /// Platform-side numeric id, when known
    #[serde(default)]
    pub platform_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub followers_count: u64,
    pub following_count: u64,
    /// Lifetime post count reported by the platform
    #[serde(default)]
    pub post_count: u64,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub protected: bool,
    /// Most recent first, as returned by the platform
    #[serde(default)]
    pub recent_posts: Vec<Post>,
}

impl AccountSnapshot {
    /// Whole days between creation and `now`; never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }

    /// Followers per followed account.
    ///
    /// `None` when both counts are zero. An account following nobody is
    /// measured as if it followed one.
    pub fn follower_ratio(&self) -> Option<f64> {
        match (self.followers_count, self.following_count) {
            (0, 0) => None,
            (followers, 0) => Some(followers as f64),
            (followers, following) => Some(followers as f64 / following as f64),
        }
    }
}
