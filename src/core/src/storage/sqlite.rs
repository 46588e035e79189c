use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kiln_protocol::{Story, StoryView};
use rusqlite::{params, types::Type, Connection, ErrorCode, Row};
use uuid::Uuid;

use super::{NewStory, Store, StoreError, VersionedView};

const STORY_COLUMNS: &str =
    "story_id, owner_id, author_json, content_json, created_at, expires_at, is_active";

const VIEW_COLUMNS: &str = "viewer_id, first_viewed_at, last_viewed_at, watch_duration_secs,
     completed, replayed, view_count, revision";

/// SQLite-backed story store.
///
/// Uses a `Mutex<Connection>` for thread-safe interior mutability.
/// The database is created/migrated on `open()`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a sqlite database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("sqlite open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("sqlite open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock: {e}")))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS stories (
                story_id     TEXT PRIMARY KEY,
                owner_id     TEXT NOT NULL,
                author_json  TEXT NOT NULL,
                content_json TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                expires_at   INTEGER NOT NULL,
                is_active    INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_stories_active_expiry
                ON stories (is_active, expires_at);

            CREATE INDEX IF NOT EXISTS idx_stories_created
                ON stories (created_at DESC);

            CREATE TABLE IF NOT EXISTS story_views (
                story_id            TEXT NOT NULL,
                viewer_id           TEXT NOT NULL,
                first_viewed_at     INTEGER NOT NULL,
                last_viewed_at      INTEGER NOT NULL,
                watch_duration_secs REAL NOT NULL DEFAULT 0,
                completed           INTEGER NOT NULL DEFAULT 0,
                replayed            INTEGER NOT NULL DEFAULT 0,
                view_count          INTEGER NOT NULL DEFAULT 1,
                revision            INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (story_id, viewer_id)
            );
            ",
        )
        .map_err(|e| map_sqlite("migrate", e))?;

        Ok(())
    }
}

impl Store for SqliteStore {
    fn insert_story(&self, story: &NewStory) -> Result<Story, StoreError> {
        let author_json = serde_json::to_string(&story.author)
            .map_err(|e| StoreError::Backend(format!("serialize author: {e}")))?;
        let content_json = serde_json::to_string(&story.content)
            .map_err(|e| StoreError::Backend(format!("serialize content: {e}")))?;
        let story_id = Uuid::new_v4().to_string();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO stories (story_id, owner_id, author_json, content_json,
                                  created_at, expires_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                story_id,
                story.owner_id,
                author_json,
                content_json,
                story.created_at.timestamp_millis(),
                story.expires_at.timestamp_millis(),
            ],
        )
        .map_err(|e| map_sqlite("insert_story", e))?;

        Ok(Story {
            id: story_id,
            owner_id: story.owner_id.clone(),
            author: story.author.clone(),
            content: story.content.clone(),
            created_at: story.created_at,
            expires_at: story.expires_at,
            is_active: true,
        })
    }

    fn get_story(&self, story_id: &str) -> Result<Option<Story>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STORY_COLUMNS} FROM stories WHERE story_id = ?1"
            ))
            .map_err(|e| map_sqlite("get_story prepare", e))?;

        let mut rows = stmt
            .query_map(params![story_id], story_from_row)
            .map_err(|e| map_sqlite("get_story query", e))?;

        match rows.next() {
            Some(Ok(story)) => Ok(Some(story)),
            Some(Err(e)) => Err(map_sqlite("get_story row", e)),
            None => Ok(None),
        }
    }

    fn set_story_active(&self, story_id: &str, active: bool) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE stories SET is_active = ?1 WHERE story_id = ?2 AND is_active <> ?1",
                params![active, story_id],
            )
            .map_err(|e| map_sqlite("set_story_active", e))?;
        Ok(changed > 0)
    }

    fn list_active_stories(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Story>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STORY_COLUMNS} FROM stories
                 WHERE is_active = 1 AND expires_at > ?1
                 ORDER BY created_at DESC
                 LIMIT ?2"
            ))
            .map_err(|e| map_sqlite("list_active_stories prepare", e))?;

        let rows = stmt
            .query_map(
                params![now.timestamp_millis(), limit.min(i64::MAX as usize) as i64],
                story_from_row,
            )
            .map_err(|e| map_sqlite("list_active_stories query", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlite("list_active_stories collect", e))
    }

    fn list_expired_story_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT story_id FROM stories
                 WHERE is_active = 1 AND expires_at <= ?1
                 ORDER BY expires_at ASC",
            )
            .map_err(|e| map_sqlite("list_expired_story_ids prepare", e))?;

        let rows = stmt
            .query_map(params![now.timestamp_millis()], |row| row.get::<_, String>(0))
            .map_err(|e| map_sqlite("list_expired_story_ids query", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlite("list_expired_story_ids collect", e))
    }

    fn get_view(
        &self,
        story_id: &str,
        viewer_id: &str,
    ) -> Result<Option<VersionedView>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {VIEW_COLUMNS} FROM story_views
                 WHERE story_id = ?1 AND viewer_id = ?2"
            ))
            .map_err(|e| map_sqlite("get_view prepare", e))?;

        let mut rows = stmt
            .query_map(params![story_id, viewer_id], versioned_view_from_row)
            .map_err(|e| map_sqlite("get_view query", e))?;

        match rows.next() {
            Some(Ok(view)) => Ok(Some(view)),
            Some(Err(e)) => Err(map_sqlite("get_view row", e)),
            None => Ok(None),
        }
    }

    fn put_view(
        &self,
        story_id: &str,
        view: &StoryView,
        expected_revision: Option<u64>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = match expected_revision {
            None => conn
                .execute(
                    "INSERT INTO story_views (story_id, viewer_id, first_viewed_at, last_viewed_at,
                                              watch_duration_secs, completed, replayed, view_count,
                                              revision)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
                     ON CONFLICT(story_id, viewer_id) DO NOTHING",
                    params![
                        story_id,
                        view.viewer_id,
                        view.first_viewed_at.timestamp_millis(),
                        view.last_viewed_at.timestamp_millis(),
                        view.watch_duration_seconds,
                        view.completed,
                        view.replayed,
                        view.view_count,
                    ],
                )
                .map_err(|e| map_sqlite("put_view insert", e))?,
            Some(revision) => conn
                .execute(
                    "UPDATE story_views SET
                        last_viewed_at = ?3,
                        watch_duration_secs = ?4,
                        completed = ?5,
                        replayed = ?6,
                        view_count = ?7,
                        revision = revision + 1
                     WHERE story_id = ?1 AND viewer_id = ?2 AND revision = ?8",
                    params![
                        story_id,
                        view.viewer_id,
                        view.last_viewed_at.timestamp_millis(),
                        view.watch_duration_seconds,
                        view.completed,
                        view.replayed,
                        view.view_count,
                        revision as i64,
                    ],
                )
                .map_err(|e| map_sqlite("put_view update", e))?,
        };
        Ok(changed == 1)
    }

    fn list_views(&self, story_id: &str) -> Result<Vec<StoryView>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {VIEW_COLUMNS} FROM story_views
                 WHERE story_id = ?1
                 ORDER BY first_viewed_at ASC"
            ))
            .map_err(|e| map_sqlite("list_views prepare", e))?;

        let rows = stmt
            .query_map(params![story_id], |row| {
                versioned_view_from_row(row).map(|v| v.view)
            })
            .map_err(|e| map_sqlite("list_views query", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlite("list_views collect", e))
    }
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    let author_json: String = row.get(2)?;
    let content_json: String = row.get(3)?;
    Ok(Story {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        author: serde_json::from_str(&author_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        content: serde_json::from_str(&content_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        created_at: millis_to_datetime(4, row.get(4)?)?,
        expires_at: millis_to_datetime(5, row.get(5)?)?,
        is_active: row.get(6)?,
    })
}

fn versioned_view_from_row(row: &Row<'_>) -> rusqlite::Result<VersionedView> {
    Ok(VersionedView {
        view: StoryView {
            viewer_id: row.get(0)?,
            first_viewed_at: millis_to_datetime(1, row.get(1)?)?,
            last_viewed_at: millis_to_datetime(2, row.get(2)?)?,
            watch_duration_seconds: row.get(3)?,
            completed: row.get(4)?,
            replayed: row.get(5)?,
            view_count: row.get(6)?,
        },
        revision: row.get::<_, i64>(7)? as u64,
    })
}

fn millis_to_datetime(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

fn map_sqlite(context: &str, e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ReadOnly)
        | Some(ErrorCode::PermissionDenied)
        | Some(ErrorCode::AuthorizationForStatementDenied) => {
            StoreError::PermissionDenied(format!("{context}: {e}"))
        }
        Some(ErrorCode::DatabaseBusy)
        | Some(ErrorCode::DatabaseLocked)
        | Some(ErrorCode::CannotOpen) => StoreError::Unavailable(format!("{context}: {e}")),
        _ => StoreError::Backend(format!("{context}: {e}")),
    }
}
