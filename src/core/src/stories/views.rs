use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kiln_protocol::{StoryView, ViewEngagement};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::storage::{Store, StoreError};

/// What a `record_view` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    /// First view by this viewer.
    Created,
    /// A distinct additional playback was counted.
    Replayed,
    /// Longer watch time or a first completion was merged in.
    Updated,
    /// Nothing new to report; no write.
    Unchanged,
    /// The owner watched their own story; not tracked.
    SelfView,
    /// No story with that id.
    StoryMissing,
    /// A store failure or write contention; logged and dropped.
    Dropped,
}

/// Merge an engagement report into the viewer's existing record.
///
/// Returns the record to write, or `None` when the report adds nothing.
/// Watch duration only grows, completion only flips false → true, and the
/// view count only moves on an explicit replay.
pub fn merge_view(
    existing: Option<&StoryView>,
    viewer_id: &str,
    engagement: &ViewEngagement,
    now: DateTime<Utc>,
) -> (Option<StoryView>, ViewOutcome) {
    let incoming_secs = engagement.duration_secs();
    let incoming_completed = engagement.is_completed();

    let Some(existing) = existing else {
        let view = StoryView {
            viewer_id: viewer_id.to_string(),
            first_viewed_at: now,
            last_viewed_at: now,
            watch_duration_seconds: incoming_secs,
            completed: incoming_completed,
            replayed: false,
            view_count: 1,
        };
        return (Some(view), ViewOutcome::Created);
    };

    let stored_secs = clamp_secs(existing.watch_duration_seconds);
    let mut next = existing.clone();
    next.view_count = existing.view_count.max(1);
    next.watch_duration_seconds = stored_secs.max(incoming_secs);
    next.completed = existing.completed || incoming_completed;

    if engagement.is_replay() {
        next.view_count = next.view_count.saturating_add(1);
        next.replayed = next.view_count > 1;
        next.last_viewed_at = now;
        return (Some(next), ViewOutcome::Replayed);
    }

    let longer = incoming_secs > stored_secs;
    let newly_completed = incoming_completed && !existing.completed;
    if longer || newly_completed {
        next.replayed = next.view_count > 1;
        next.last_viewed_at = now;
        return (Some(next), ViewOutcome::Updated);
    }

    (None, ViewOutcome::Unchanged)
}

fn clamp_secs(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}

/// Records per-viewer engagement with at most one record per viewer.
///
/// Best-effort: every failure is logged and swallowed so story playback is
/// never blocked by tracking.
pub struct ViewTracker {
    store: Option<Arc<dyn Store>>,
    clock: Arc<dyn Clock>,
    max_write_attempts: usize,
}

impl ViewTracker {
    pub fn new(
        store: Option<Arc<dyn Store>>,
        clock: Arc<dyn Clock>,
        max_write_attempts: usize,
    ) -> Self {
        Self {
            store,
            clock,
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    pub fn record_view(
        &self,
        story_id: &str,
        viewer_id: &str,
        engagement: Option<ViewEngagement>,
    ) -> ViewOutcome {
        let Some(store) = self.store.as_ref() else {
            warn!(story_id = %story_id, "view not recorded: story store is not configured");
            return ViewOutcome::Dropped;
        };
        let engagement = engagement.unwrap_or_default();
        match self.try_record(store, story_id, viewer_id, &engagement) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(story_id = %story_id, viewer_id = %viewer_id, error = %err, "view not recorded");
                ViewOutcome::Dropped
            }
        }
    }

    fn try_record(
        &self,
        store: &Arc<dyn Store>,
        story_id: &str,
        viewer_id: &str,
        engagement: &ViewEngagement,
    ) -> Result<ViewOutcome, StoreError> {
        let Some(story) = store.get_story(story_id)? else {
            debug!(story_id = %story_id, "view for unknown story ignored");
            return Ok(ViewOutcome::StoryMissing);
        };
        if story.owner_id == viewer_id {
            return Ok(ViewOutcome::SelfView);
        }

        for attempt in 1..=self.max_write_attempts {
            let current = store.get_view(story_id, viewer_id)?;
            let (next, outcome) = merge_view(
                current.as_ref().map(|c| &c.view),
                viewer_id,
                engagement,
                self.clock.now(),
            );
            let Some(next) = next else {
                return Ok(outcome);
            };
            if store.put_view(story_id, &next, current.map(|c| c.revision))? {
                debug!(story_id = %story_id, viewer_id = %viewer_id, ?outcome, "view recorded");
                return Ok(outcome);
            }
            debug!(story_id = %story_id, viewer_id = %viewer_id, attempt, "view write conflict; retrying");
        }

        warn!(
            story_id = %story_id,
            viewer_id = %viewer_id,
            attempts = self.max_write_attempts,
            "view not recorded: write contention"
        );
        Ok(ViewOutcome::Dropped)
    }

    /// Fire-and-forget `record_view` on the blocking pool, bounded by
    /// `timeout`. The caller never waits on tracking.
    pub fn spawn_record_view(
        self: &Arc<Self>,
        story_id: String,
        viewer_id: String,
        engagement: Option<ViewEngagement>,
        timeout: Duration,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let sid = story_id.clone();
            let work = tokio::task::spawn_blocking(move || {
                tracker.record_view(&story_id, &viewer_id, engagement)
            });
            match tokio::time::timeout(timeout, work).await {
                Ok(Ok(outcome)) => debug!(story_id = %sid, ?outcome, "view tracking finished"),
                Ok(Err(err)) => warn!(story_id = %sid, error = %err, "view tracking task failed"),
                Err(_) => warn!(story_id = %sid, timeout_ms = timeout.as_millis() as u64, "view tracking timed out"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{NewStory, SqliteStore, VersionedView};
    use chrono::TimeZone;
    use kiln_protocol::{AuthorSnapshot, Story, StoryContent, StoryMedia};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap()
    }

    fn engagement(secs: f64, completed: bool, replayed: bool) -> ViewEngagement {
        ViewEngagement {
            watch_duration_seconds: Some(secs),
            completed: Some(completed),
            replayed: Some(replayed),
        }
    }

    fn seed_story(store: &dyn Store, owner: &str) -> Story {
        store
            .insert_story(&NewStory {
                owner_id: owner.into(),
                author: AuthorSnapshot {
                    display_name: owner.into(),
                    avatar_url: None,
                },
                content: StoryContent {
                    primary: StoryMedia::Text {
                        body: "open studio".into(),
                        background_color: None,
                    },
                    overlay_text: None,
                },
                created_at: t0(),
                expires_at: t0() + chrono::Duration::hours(24),
            })
            .unwrap()
    }

    fn setup() -> (Arc<ViewTracker>, Arc<ManualClock>, Arc<dyn Store>, Story) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let story = seed_story(store.as_ref(), "owner");
        let tracker = Arc::new(ViewTracker::new(Some(store.clone()), clock.clone(), 5));
        (tracker, clock, store, story)
    }

    #[test]
    fn merge_creates_first_record() {
        let (view, outcome) = merge_view(None, "v", &engagement(-3.0, true, true), t0());
        let view = view.unwrap();
        assert_eq!(outcome, ViewOutcome::Created);
        assert_eq!(view.view_count, 1);
        assert!(!view.replayed);
        assert!(view.completed);
        assert_eq!(view.watch_duration_seconds, 0.0);
        assert_eq!(view.first_viewed_at, view.last_viewed_at);
    }

    #[test]
    fn merge_same_payload_twice_is_stable() {
        let e = engagement(4.0, false, false);
        let (first, _) = merge_view(None, "v", &e, t0());
        let first = first.unwrap();
        let (second, outcome) = merge_view(Some(&first), "v", &e, t0());
        assert!(second.is_none());
        assert_eq!(outcome, ViewOutcome::Unchanged);
    }

    #[test]
    fn merge_never_unsets_completion() {
        let (first, _) = merge_view(None, "v", &engagement(9.0, true, false), t0());
        let first = first.unwrap();
        let (next, outcome) = merge_view(Some(&first), "v", &engagement(1.0, false, true), t0());
        let next = next.unwrap();
        assert_eq!(outcome, ViewOutcome::Replayed);
        assert!(next.completed);
        assert_eq!(next.watch_duration_seconds, 9.0);
    }

    #[test]
    fn merge_repairs_replay_flag_on_malformed_record() {
        let stored = StoryView {
            viewer_id: "v".into(),
            first_viewed_at: t0(),
            last_viewed_at: t0(),
            watch_duration_seconds: 1.0,
            completed: false,
            replayed: false,
            view_count: 3,
        };
        let (next, outcome) = merge_view(Some(&stored), "v", &engagement(5.0, false, false), t0());
        let next = next.unwrap();
        assert_eq!(outcome, ViewOutcome::Updated);
        assert_eq!(next.view_count, 3);
        assert!(next.replayed);

        let zeroed = StoryView {
            view_count: 0,
            replayed: true,
            ..stored
        };
        let (next, outcome) = merge_view(Some(&zeroed), "v", &engagement(5.0, false, false), t0());
        let next = next.unwrap();
        assert_eq!(outcome, ViewOutcome::Updated);
        assert_eq!(next.view_count, 1);
        assert!(!next.replayed);
    }

    #[test]
    fn shorter_continuation_keeps_best_duration() {
        let (tracker, _clock, store, story) = setup();
        assert_eq!(
            tracker.record_view(&story.id, "v", Some(engagement(3.0, false, false))),
            ViewOutcome::Created
        );
        assert_eq!(
            tracker.record_view(&story.id, "v", Some(engagement(2.0, false, false))),
            ViewOutcome::Unchanged
        );

        let stored = store.get_view(&story.id, "v").unwrap().unwrap();
        assert_eq!(stored.view.watch_duration_seconds, 3.0);
        assert_eq!(stored.view.view_count, 1);
        assert!(!stored.view.completed);
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn replay_counts_and_merges() {
        let (tracker, clock, store, story) = setup();
        tracker.record_view(&story.id, "v", Some(engagement(3.0, false, false)));
        tracker.record_view(&story.id, "v", Some(engagement(2.0, false, false)));
        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(
            tracker.record_view(&story.id, "v", Some(engagement(5.0, true, true))),
            ViewOutcome::Replayed
        );

        let view = store.get_view(&story.id, "v").unwrap().unwrap().view;
        assert_eq!(view.view_count, 2);
        assert!(view.replayed);
        assert_eq!(view.watch_duration_seconds, 5.0);
        assert!(view.completed);
        assert_eq!(view.first_viewed_at, t0());
        assert_eq!(view.last_viewed_at, t0() + chrono::Duration::minutes(10));
    }

    #[test]
    fn continuation_with_progress_updates_without_counting() {
        let (tracker, clock, store, story) = setup();
        tracker.record_view(&story.id, "v", Some(engagement(1.0, false, false)));
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(
            tracker.record_view(&story.id, "v", Some(engagement(6.0, true, false))),
            ViewOutcome::Updated
        );
        let view = store.get_view(&story.id, "v").unwrap().unwrap().view;
        assert_eq!(view.view_count, 1);
        assert!(!view.replayed);
        assert!(view.completed);
        assert_eq!(view.watch_duration_seconds, 6.0);
        assert_eq!(view.last_viewed_at, t0() + chrono::Duration::seconds(30));
    }

    #[test]
    fn repeated_calls_keep_one_record_per_viewer() {
        let (tracker, _clock, store, story) = setup();
        for i in 0..6 {
            tracker.record_view(&story.id, "v", Some(engagement(i as f64, false, i % 2 == 0)));
            tracker.record_view(&story.id, "w", None);
        }
        let views = store.list_views(&story.id).unwrap();
        assert_eq!(views.len(), 2);
        let v = views.iter().find(|v| v.viewer_id == "v").unwrap();
        assert_eq!(v.view_count, 3);
        assert!(v.replayed);
        assert_eq!(v.replayed, v.view_count > 1);
    }

    #[test]
    fn owner_views_are_not_tracked() {
        let (tracker, _clock, store, story) = setup();
        assert_eq!(
            tracker.record_view(&story.id, "owner", Some(engagement(8.0, true, true))),
            ViewOutcome::SelfView
        );
        assert!(store.list_views(&story.id).unwrap().is_empty());
    }

    #[test]
    fn missing_story_is_silent() {
        let (tracker, _clock, store, _story) = setup();
        assert_eq!(
            tracker.record_view("nope", "v", None),
            ViewOutcome::StoryMissing
        );
        assert!(store.list_views("nope").unwrap().is_empty());
    }

    #[test]
    fn unconfigured_store_drops() {
        let clock = Arc::new(ManualClock::new(t0()));
        let tracker = ViewTracker::new(None, clock, 5);
        assert_eq!(tracker.record_view("s", "v", None), ViewOutcome::Dropped);
    }

    /// Delegates to sqlite, optionally failing writes, losing every
    /// compare-and-set, stalling before writes, or slipping in a competing
    /// replay right before the first compare-and-set.
    struct FlakyStore {
        inner: SqliteStore,
        deny_writes: bool,
        always_conflict: bool,
        write_delay: Duration,
        race_once: AtomicBool,
        clock_now: DateTime<Utc>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::open_memory().unwrap(),
                deny_writes: false,
                always_conflict: false,
                write_delay: Duration::ZERO,
                race_once: AtomicBool::new(false),
                clock_now: t0(),
            }
        }
    }

    impl Store for FlakyStore {
        fn insert_story(&self, story: &NewStory) -> Result<Story, StoreError> {
            self.inner.insert_story(story)
        }
        fn get_story(&self, story_id: &str) -> Result<Option<Story>, StoreError> {
            self.inner.get_story(story_id)
        }
        fn set_story_active(&self, story_id: &str, active: bool) -> Result<bool, StoreError> {
            self.inner.set_story_active(story_id, active)
        }
        fn list_active_stories(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<Story>, StoreError> {
            self.inner.list_active_stories(now, limit)
        }
        fn list_expired_story_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
            self.inner.list_expired_story_ids(now)
        }
        fn get_view(
            &self,
            story_id: &str,
            viewer_id: &str,
        ) -> Result<Option<VersionedView>, StoreError> {
            self.inner.get_view(story_id, viewer_id)
        }
        fn put_view(
            &self,
            story_id: &str,
            view: &StoryView,
            expected_revision: Option<u64>,
        ) -> Result<bool, StoreError> {
            if !self.write_delay.is_zero() {
                std::thread::sleep(self.write_delay);
            }
            if self.deny_writes {
                return Err(StoreError::PermissionDenied("rules rejected write".into()));
            }
            if self.always_conflict {
                return Ok(false);
            }
            if expected_revision.is_some() && self.race_once.swap(false, Ordering::SeqCst) {
                let other = self.inner.get_view(story_id, &view.viewer_id)?.unwrap();
                let (next, _) = merge_view(
                    Some(&other.view),
                    &view.viewer_id,
                    &engagement(1.0, false, true),
                    self.clock_now,
                );
                self.inner
                    .put_view(story_id, &next.unwrap(), Some(other.revision))?;
            }
            self.inner.put_view(story_id, view, expected_revision)
        }
        fn list_views(&self, story_id: &str) -> Result<Vec<StoryView>, StoreError> {
            self.inner.list_views(story_id)
        }
    }

    fn tracked(store: FlakyStore) -> (Arc<ViewTracker>, Arc<dyn Store>, Story) {
        let story = seed_story(&store, "owner");
        let store: Arc<dyn Store> = Arc::new(store);
        let clock = Arc::new(ManualClock::new(t0()));
        let tracker = Arc::new(ViewTracker::new(Some(store.clone()), clock, 5));
        (tracker, store, story)
    }

    fn flaky(deny_writes: bool, race_once: bool) -> (Arc<ViewTracker>, Arc<dyn Store>, Story) {
        tracked(FlakyStore {
            deny_writes,
            race_once: AtomicBool::new(race_once),
            ..FlakyStore::new()
        })
    }

    #[test]
    fn permission_failure_is_swallowed() {
        let (tracker, store, story) = flaky(true, false);
        assert_eq!(
            tracker.record_view(&story.id, "v", None),
            ViewOutcome::Dropped
        );
        assert!(store.list_views(&story.id).unwrap().is_empty());
    }

    #[test]
    fn write_contention_gives_up_after_max_attempts() {
        let (tracker, store, story) = tracked(FlakyStore {
            always_conflict: true,
            ..FlakyStore::new()
        });
        assert_eq!(
            tracker.record_view(&story.id, "v", Some(engagement(3.0, true, false))),
            ViewOutcome::Dropped
        );
        assert!(store.list_views(&story.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_write_times_out_quietly() {
        let (tracker, store, story) = tracked(FlakyStore {
            write_delay: Duration::from_millis(300),
            ..FlakyStore::new()
        });
        let handle = tracker.spawn_record_view(
            story.id.clone(),
            "v".into(),
            None,
            Duration::from_millis(20),
        );
        assert!(handle.await.is_ok());
        assert!(store.list_views(&story.id).unwrap().is_empty());
    }

    #[test]
    fn concurrent_replay_is_not_lost() {
        let (tracker, store, story) = flaky(false, true);
        tracker.record_view(&story.id, "v", None);
        assert_eq!(
            tracker.record_view(&story.id, "v", Some(engagement(2.0, false, true))),
            ViewOutcome::Replayed
        );
        let view = store.get_view(&story.id, "v").unwrap().unwrap().view;
        assert_eq!(view.view_count, 3);
    }

    #[test]
    fn parallel_replays_from_many_devices() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let story = seed_story(store.as_ref(), "owner");
        let tracker = Arc::new(ViewTracker::new(Some(store.clone()), clock, 64));
        tracker.record_view(&story.id, "v", None);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                let story_id = story.id.clone();
                std::thread::spawn(move || {
                    tracker.record_view(&story_id, "v", Some(engagement(1.0, false, true)))
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), ViewOutcome::Replayed);
        }

        let view = store.get_view(&story.id, "v").unwrap().unwrap().view;
        assert_eq!(view.view_count, 9);
        assert_eq!(store.list_views(&story.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spawned_recording_completes_in_background() {
        let (tracker, _clock, store, story) = setup();
        let handle = tracker.spawn_record_view(
            story.id.clone(),
            "v".into(),
            Some(engagement(4.0, true, false)),
            Duration::from_secs(2),
        );
        handle.await.unwrap();
        let view = store.get_view(&story.id, "v").unwrap().unwrap().view;
        assert!(view.completed);
        assert_eq!(view.watch_duration_seconds, 4.0);
    }
}
