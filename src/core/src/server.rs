use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kiln_protocol::{
    error_codes, AnalyticsResponse, CreateStoryRequest, ErrorBody, Story, StoryFeed,
    SweepResponse, ViewEngagement, USER_HEADER,
};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::engine::StoryEngine;
use crate::error::StoryError;
use crate::stories::{compose_feed, performance_score, ScoreWeights};

/// Shared state accessible by handlers.
#[derive(Clone)]
struct AppState {
    config: ServerConfig,
    engine: StoryEngine,
    weights: ScoreWeights,
}

/// Build the axum router for the story API.
///
/// Requester identity comes from the `x-kiln-user` header, which the auth
/// layer in front of this service is trusted to set.
pub fn build_router(config: ServerConfig, engine: StoryEngine, weights: ScoreWeights) -> Router {
    let state = AppState {
        config,
        engine,
        weights,
    };

    Router::new()
        .route("/health", get(health))
        .route("/stories", post(create_story))
        .route("/stories/feed", get(feed))
        .route("/stories/sweep", post(sweep))
        .route("/stories/{id}", get(get_story).delete(delete_story))
        .route("/stories/{id}/views", post(record_view))
        .route("/stories/{id}/analytics", get(analytics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(code, message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<StoryError> for ApiError {
    fn from(e: StoryError) -> Self {
        let message = e.to_string();
        match e {
            StoryError::StoreUnavailable(_) => {
                tracing::warn!(error = %message, "story store unavailable");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    error_codes::STORE_UNAVAILABLE,
                    message,
                )
            }
            StoryError::NotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, message)
            }
            StoryError::Unauthorized => {
                ApiError::new(StatusCode::FORBIDDEN, error_codes::UNAUTHORIZED, message)
            }
            StoryError::InvalidContent(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, error_codes::INVALID_CONTENT, message)
            }
        }
    }
}

/// Authenticated requester id.
struct Requester(String);

impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Requester(v.to_string()))
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    error_codes::UNAUTHORIZED,
                    format!("missing {USER_HEADER} header"),
                )
            })
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn create_story(
    State(state): State<AppState>,
    Requester(user): Requester,
    Json(payload): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<Story>), ApiError> {
    let story = state
        .engine
        .lifecycle
        .create(&user, payload.author, &payload.content)?;
    Ok((StatusCode::CREATED, Json(story)))
}

async fn feed(
    State(state): State<AppState>,
    Requester(user): Requester,
) -> Result<Json<StoryFeed>, ApiError> {
    let stories = state
        .engine
        .lifecycle
        .active_stories(state.config.feed_limit)?;
    Ok(Json(compose_feed(stories, &user)))
}

async fn get_story(
    State(state): State<AppState>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> Result<Json<Story>, ApiError> {
    let lifecycle = &state.engine.lifecycle;
    let story = lifecycle.get(&id)?;
    if story.owner_id != user && !story.is_visible_at(lifecycle.now()) {
        return Err(StoryError::NotFound(id).into());
    }
    Ok(Json(story))
}

async fn delete_story(
    State(state): State<AppState>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.lifecycle.deactivate(&id, &user)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_view(
    State(state): State<AppState>,
    Requester(user): Requester,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let engagement = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<Option<ViewEngagement>>(&body).map_err(|e| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_CONTENT,
                format!("invalid engagement payload: {e}"),
            )
        })?
    };

    state.engine.tracker.spawn_record_view(
        id,
        user,
        engagement,
        state.config.view_record_timeout,
    );
    Ok(StatusCode::ACCEPTED)
}

async fn analytics(
    State(state): State<AppState>,
    Requester(user): Requester,
    Path(id): Path<String>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let analytics = state.engine.analytics.compute_analytics(&id, &user)?;
    let performance_score = performance_score(&analytics, &state.weights);
    Ok(Json(AnalyticsResponse {
        analytics,
        performance_score,
    }))
}

async fn sweep(
    State(state): State<AppState>,
    Requester(user): Requester,
) -> Result<Json<SweepResponse>, ApiError> {
    let lifecycle = &state.engine.lifecycle;
    let deactivated = lifecycle.sweep_expired(lifecycle.now())?;
    tracing::info!(requested_by = %user, deactivated, "manual expiry sweep");
    Ok(Json(SweepResponse { deactivated }))
}
