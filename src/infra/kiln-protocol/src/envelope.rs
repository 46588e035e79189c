use serde::{Deserialize, Serialize};

use crate::{AuthorSnapshot, Story, StoryAnalytics, StoryDraft};

/// Header carrying the authenticated requester id, set by the auth layer in
/// front of the engine.
pub const USER_HEADER: &str = "x-kiln-user";

/// Client → server: create a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryRequest {
    pub author: AuthorSnapshot,
    pub content: StoryDraft,
}

/// One author's slot in the story tray.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub owner_id: String,
    /// Newest active story by this owner.
    pub latest: Story,
    /// Number of active stories this owner currently has.
    pub story_count: usize,
}

/// Story tray for one viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFeed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own: Option<FeedEntry>,
    /// Other authors, newest first.
    pub others: Vec<FeedEntry>,
}

/// Server → client: analytics for the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub analytics: StoryAnalytics,
    /// Presentation-only blend, 0..=100. Not persisted.
    pub performance_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResponse {
    pub deactivated: usize,
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
        }
    }
}

/// Well-known error codes.
pub mod error_codes {
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_CONTENT: &str = "invalid_content";
}
