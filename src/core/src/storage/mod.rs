mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use kiln_protocol::{AuthorSnapshot, Story, StoryContent, StoryView};
use thiserror::Error;

/// Errors reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("backend: {0}")]
    Backend(String),
}

/// A story as handed to the store; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub owner_id: String,
    pub author: AuthorSnapshot,
    pub content: StoryContent,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A view record together with its write revision.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedView {
    pub view: StoryView,
    pub revision: u64,
}

/// Abstract storage interface for stories and their per-viewer records.
///
/// All methods use `&self`; implementations handle interior mutability
/// (e.g. `Mutex<Connection>` for sqlite). View records are addressed by
/// `(story_id, viewer_id)` so each update touches exactly one record.
pub trait Store: Send + Sync + 'static {
    /// Persist a new, active story and return it with its assigned id.
    fn insert_story(&self, story: &NewStory) -> Result<Story, StoreError>;

    /// Get a story by ID.
    fn get_story(&self, story_id: &str) -> Result<Option<Story>, StoreError>;

    /// Set `is_active`. Returns whether the stored value changed.
    fn set_story_active(&self, story_id: &str, active: bool) -> Result<bool, StoreError>;

    /// Active stories with `expires_at > now`, newest first.
    fn list_active_stories(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Story>, StoreError>;

    /// IDs of active stories with `expires_at <= now`.
    fn list_expired_story_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    /// Get one viewer's record for a story.
    fn get_view(
        &self,
        story_id: &str,
        viewer_id: &str,
    ) -> Result<Option<VersionedView>, StoreError>;

    /// Compare-and-set write of a view record.
    ///
    /// `expected_revision = None` inserts only if no record exists;
    /// `Some(rev)` updates only if the stored revision is still `rev`.
    /// Returns `false` when the precondition no longer holds.
    fn put_view(
        &self,
        story_id: &str,
        view: &StoryView,
        expected_revision: Option<u64>,
    ) -> Result<bool, StoreError>;

    /// All view records for a story.
    fn list_views(&self, story_id: &str) -> Result<Vec<StoryView>, StoreError>;
}
