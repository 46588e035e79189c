mod analytics;
mod content;
mod feed;
mod lifecycle;
mod thumbnail;
mod views;

pub use analytics::{aggregate, performance_score, AnalyticsAggregator, ScoreWeights};
pub use content::{resolve_draft, MAX_OVERLAY_CHARS};
pub use feed::compose_feed;
pub use lifecycle::StoryLifecycle;
pub use thumbnail::Thumbnailer;
pub use views::{merge_view, ViewOutcome, ViewTracker};
