use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One viewer's engagement history with one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub viewer_id: String,
    pub first_viewed_at: DateTime<Utc>,
    pub last_viewed_at: DateTime<Utc>,
    /// Best watch duration observed so far. Never decreases.
    pub watch_duration_seconds: f64,
    /// Sticky once true.
    pub completed: bool,
    pub replayed: bool,
    pub view_count: u32,
}

/// Engagement signal reported by a viewing client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewEngagement {
    pub watch_duration_seconds: Option<f64>,
    pub completed: Option<bool>,
    /// Set by the client when this is a distinct playback session rather
    /// than a continuation of the previous one.
    pub replayed: Option<bool>,
}

impl ViewEngagement {
    /// Reported duration, with missing, negative and non-finite values as 0.
    pub fn duration_secs(&self) -> f64 {
        match self.watch_duration_seconds {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => 0.0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed.unwrap_or(false)
    }

    pub fn is_replay(&self) -> bool {
        self.replayed.unwrap_or(false)
    }
}

/// Aggregate metrics for a single story. Carries no viewer identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryAnalytics {
    pub story_id: String,
    pub total_views: u64,
    pub unique_viewers: u64,
    pub total_replays: u64,
    pub completed_views: u64,
    /// Percentage, 0..=100.
    pub completion_rate: u32,
    pub average_watch_duration_seconds: u64,
}
