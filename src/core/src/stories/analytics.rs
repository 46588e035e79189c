use std::sync::Arc;

use kiln_protocol::{StoryAnalytics, StoryView};
use serde::Deserialize;

use crate::error::StoryError;
use crate::storage::Store;

/// Fold a story's view records into aggregate metrics.
///
/// Per-view quantities are clamped before summing since stored records may
/// be malformed: counts below 1 count as 1, bad durations as 0.
pub fn aggregate(story_id: &str, views: &[StoryView]) -> StoryAnalytics {
    let unique_viewers = views.len() as u64;
    let mut total_views = 0u64;
    let mut total_replays = 0u64;
    let mut completed_views = 0u64;
    let mut total_watch_secs = 0f64;

    for view in views {
        let count = u64::from(view.view_count.max(1));
        total_views += count;
        total_replays += count - 1;
        if view.completed {
            completed_views += 1;
        }
        if view.watch_duration_seconds.is_finite() && view.watch_duration_seconds > 0.0 {
            total_watch_secs += view.watch_duration_seconds;
        }
    }

    let (completion_rate, average_watch_duration_seconds) = if unique_viewers == 0 {
        (0, 0)
    } else {
        let rate = (100.0 * completed_views as f64 / unique_viewers as f64).round() as u32;
        let avg = (total_watch_secs / unique_viewers as f64).round() as u64;
        (rate, avg)
    };

    StoryAnalytics {
        story_id: story_id.to_string(),
        total_views,
        unique_viewers,
        total_replays,
        completed_views,
        completion_rate,
        average_watch_duration_seconds,
    }
}

/// Weights for the presentation-only performance score.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub completion_weight: f64,
    pub replay_weight: f64,
    pub watch_weight: f64,
    /// Average watch time that earns full marks, in seconds.
    pub reference_watch_secs: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            completion_weight: 0.5,
            replay_weight: 0.2,
            watch_weight: 0.3,
            reference_watch_secs: 15.0,
        }
    }
}

/// Blend completion rate, replay ratio and normalized watch time into 0..=100.
pub fn performance_score(analytics: &StoryAnalytics, weights: &ScoreWeights) -> u32 {
    if analytics.unique_viewers == 0 {
        return 0;
    }
    let viewers = analytics.unique_viewers as f64;
    let replay_pct = (100.0 * analytics.total_replays as f64 / viewers).min(100.0);
    let watch_pct = if weights.reference_watch_secs > 0.0 {
        (100.0 * analytics.average_watch_duration_seconds as f64 / weights.reference_watch_secs)
            .min(100.0)
    } else {
        0.0
    };
    let score = weights.completion_weight * f64::from(analytics.completion_rate)
        + weights.replay_weight * replay_pct
        + weights.watch_weight * watch_pct;
    if score.is_finite() {
        score.round().clamp(0.0, 100.0) as u32
    } else {
        0
    }
}

/// Owner-only analytics reads.
pub struct AnalyticsAggregator {
    store: Option<Arc<dyn Store>>,
}

impl AnalyticsAggregator {
    pub fn new(store: Option<Arc<dyn Store>>) -> Self {
        Self { store }
    }

    pub fn compute_analytics(
        &self,
        story_id: &str,
        requester_id: &str,
    ) -> Result<StoryAnalytics, StoryError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| StoryError::StoreUnavailable("story store is not configured".into()))?;
        let story = store
            .get_story(story_id)?
            .ok_or_else(|| StoryError::NotFound(story_id.to_string()))?;
        if story.owner_id != requester_id {
            return Err(StoryError::Unauthorized);
        }
        let views = store.list_views(story_id)?;
        Ok(aggregate(story_id, &views))
    }
}
