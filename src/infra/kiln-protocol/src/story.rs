use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author display data captured when a story is created.
///
/// Not live-joined to the user record: renaming a profile does not rewrite
/// stories that are already out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSnapshot {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// The single primary payload of a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoryMedia {
    Image {
        url: String,
    },
    Video {
        url: String,
        #[serde(default, rename = "thumbnailUrl", skip_serializing_if = "Option::is_none")]
        thumbnail_url: Option<String>,
    },
    Text {
        body: String,
        #[serde(
            default,
            rename = "backgroundColor",
            skip_serializing_if = "Option::is_none"
        )]
        background_color: Option<String>,
    },
    Color {
        #[serde(rename = "backgroundColor")]
        background_color: String,
    },
}

/// Primary payload plus the optional short text overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryContent {
    pub primary: StoryMedia,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_text: Option<String>,
}

impl StoryContent {
    /// URL a client should use for a preview tile.
    ///
    /// Videos without a thumbnail fall back to the raw media reference.
    pub fn preview_url(&self) -> Option<&str> {
        match &self.primary {
            StoryMedia::Image { url } => Some(url.as_str()),
            StoryMedia::Video { url, thumbnail_url } => {
                Some(thumbnail_url.as_deref().unwrap_or(url))
            }
            StoryMedia::Text { .. } | StoryMedia::Color { .. } => None,
        }
    }
}

/// Creation input as sent by a capture client.
///
/// Every field is optional; the engine resolves it into a [`StoryContent`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoryDraft {
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub text: Option<String>,
    pub background_color: Option<String>,
    pub overlay_text: Option<String>,
}

/// A time-bound content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub owner_id: String,
    pub author: AuthorSnapshot,
    pub content: StoryContent,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Story {
    /// True while the story should appear in feeds.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}
