use std::sync::Arc;

use chrono::{DateTime, Utc};
use kiln_protocol::{AuthorSnapshot, Story, StoryContent, StoryDraft, StoryMedia};
use tracing::{debug, info, warn};

use super::content::resolve_draft;
use super::thumbnail::Thumbnailer;
use crate::clock::Clock;
use crate::config::StoryPolicy;
use crate::error::StoryError;
use crate::storage::{NewStory, Store};

/// Creates, deactivates and expires stories.
pub struct StoryLifecycle {
    store: Option<Arc<dyn Store>>,
    clock: Arc<dyn Clock>,
    policy: StoryPolicy,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
}

impl StoryLifecycle {
    pub fn new(store: Option<Arc<dyn Store>>, clock: Arc<dyn Clock>, policy: StoryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            thumbnailer: None,
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    fn store(&self) -> Result<&Arc<dyn Store>, StoryError> {
        self.store
            .as_ref()
            .ok_or_else(|| StoryError::StoreUnavailable("story store is not configured".into()))
    }

    /// Create an active story expiring one TTL after now.
    pub fn create(
        &self,
        owner_id: &str,
        author: AuthorSnapshot,
        draft: &StoryDraft,
    ) -> Result<Story, StoryError> {
        let store = self.store()?;
        if owner_id.trim().is_empty() {
            return Err(StoryError::InvalidContent("owner id is required".into()));
        }
        if owner_id.trim() != owner_id {
            return Err(StoryError::InvalidContent(
                "owner id must not have surrounding whitespace".into(),
            ));
        }
        let mut content = resolve_draft(draft)?;
        self.attach_thumbnail(&mut content);

        let created_at = self.clock.now();
        let new_story = NewStory {
            owner_id: owner_id.to_string(),
            author,
            content,
            created_at,
            expires_at: created_at + self.policy.ttl,
        };
        let story = store.insert_story(&new_story)?;
        info!(story_id = %story.id, owner_id = %story.owner_id, expires_at = %story.expires_at, "story created");
        Ok(story)
    }

    fn attach_thumbnail(&self, content: &mut StoryContent) {
        let StoryMedia::Video { url, thumbnail_url } = &mut content.primary else {
            return;
        };
        if thumbnail_url.is_some() {
            return;
        }
        let Some(thumbnailer) = self.thumbnailer.as_ref() else {
            return;
        };
        match thumbnailer.thumbnail_for(url) {
            Ok(thumb) => *thumbnail_url = Some(thumb),
            Err(err) => {
                warn!(video_url = %url, error = %err, "thumbnail generation failed; storing without thumbnail");
            }
        }
    }

    /// Fetch one story.
    pub fn get(&self, story_id: &str) -> Result<Story, StoryError> {
        self.store()?
            .get_story(story_id)?
            .ok_or_else(|| StoryError::NotFound(story_id.to_string()))
    }

    /// Soft-delete a story on its owner's request. Views are kept.
    pub fn deactivate(&self, story_id: &str, requester_id: &str) -> Result<(), StoryError> {
        let store = self.store()?;
        let story = store
            .get_story(story_id)?
            .ok_or_else(|| StoryError::NotFound(story_id.to_string()))?;
        if story.owner_id != requester_id {
            return Err(StoryError::Unauthorized);
        }
        if store.set_story_active(story_id, false)? {
            info!(story_id = %story_id, "story deactivated by owner");
        } else {
            debug!(story_id = %story_id, "story already inactive");
        }
        Ok(())
    }

    /// Deactivate every active story whose expiry is at or before `now`.
    ///
    /// Returns how many stories this call flipped; a repeat call with no new
    /// expirations returns 0.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoryError> {
        let store = self.store()?;
        let mut deactivated = 0;
        for story_id in store.list_expired_story_ids(now)? {
            if store.set_story_active(&story_id, false)? {
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    /// Active, unexpired stories at the current time, newest first.
    pub fn active_stories(&self, limit: usize) -> Result<Vec<Story>, StoryError> {
        let now = self.clock.now();
        Ok(self.store()?.list_active_stories(now, limit)?)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
