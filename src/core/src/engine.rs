use std::sync::Arc;

use crate::clock::Clock;
use crate::kiln_config::KilnConfig;
use crate::storage::Store;
use crate::stories::{AnalyticsAggregator, StoryLifecycle, Thumbnailer, ViewTracker};

/// The story services wired to one store and clock.
#[derive(Clone)]
pub struct StoryEngine {
    pub lifecycle: Arc<StoryLifecycle>,
    pub tracker: Arc<ViewTracker>,
    pub analytics: Arc<AnalyticsAggregator>,
}

impl StoryEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &KilnConfig) -> Self {
        Self::build(store, clock, config, None)
    }

    pub fn with_thumbnailer(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: &KilnConfig,
        thumbnailer: Arc<dyn Thumbnailer>,
    ) -> Self {
        Self::build(store, clock, config, Some(thumbnailer))
    }

    fn build(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        config: &KilnConfig,
        thumbnailer: Option<Arc<dyn Thumbnailer>>,
    ) -> Self {
        let mut lifecycle =
            StoryLifecycle::new(Some(store.clone()), clock.clone(), config.story_policy());
        if let Some(thumbnailer) = thumbnailer {
            lifecycle = lifecycle.with_thumbnailer(thumbnailer);
        }
        Self {
            lifecycle: Arc::new(lifecycle),
            tracker: Arc::new(ViewTracker::new(
                Some(store.clone()),
                clock,
                config.views.max_write_attempts,
            )),
            analytics: Arc::new(AnalyticsAggregator::new(Some(store))),
        }
    }
}
