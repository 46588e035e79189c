use thiserror::Error;

use crate::storage::StoreError;

/// Failures surfaced by lifecycle and analytics operations.
///
/// View tracking never returns these; it logs and moves on.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("story not found: {0}")]
    NotFound(String),

    #[error("requester is not the story owner")]
    Unauthorized,

    #[error("invalid story content: {0}")]
    InvalidContent(String),
}

impl From<StoreError> for StoryError {
    fn from(e: StoreError) -> Self {
        StoryError::StoreUnavailable(e.to_string())
    }
}
