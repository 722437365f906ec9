//! C8 — Session Gateway: the REST surface and the per-duel streaming
//! channel (§6). Routing/state shape generalizes the teacher's daemon
//! entry point (one `Arc`-shared context handed to every handler) into an
//! axum `Router`; the unified error envelope is grounded on the workflow
//! pack's `ApiError`/`to_http_status` pattern, since the teacher itself
//! carries no HTTP server.

mod dto;
mod ws;

use crate::domain::{DuelId, UserId};
use crate::duel_engine::DuelEngine;
use crate::fabric::EventFabric;
use crate::rating::RatingService;
use crate::repository::Repository;
use crate::DuelError;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use dto::{
    AiDuelRequest, CancelDuelRequest, CreateDuelRequest, HistoryQuery, JoinDuelRequest,
    LeaderboardQuery, SubmitCodeRequest, TestCodeRequest, VerdictResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DuelEngine>,
    pub repo: Arc<Repository>,
    pub rating: Arc<RatingService>,
    pub fabric: EventFabric,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/duels/create", post(create_duel))
        .route("/duels/ai-duel", post(create_ai_duel))
        .route("/duels/join", post(join_duel))
        .route("/duels/active", get(active_duel))
        .route("/duels/active-or-waiting", get(active_or_waiting_duel))
        .route("/duels/cancel", post(cancel_duel))
        .route("/duels/stats/me", get(my_stats))
        .route("/duels/leaderboard", get(leaderboard))
        .route("/public/duels/leaderboard", get(public_leaderboard))
        .route("/duels/history", get(history))
        .route("/duels/:id", get(get_duel))
        .route("/duels/:id/submit", post(submit_code))
        .route("/duels/:id/test-code", post(test_code))
        .route("/duels/ws/:id", get(ws::handle_upgrade))
        .with_state(state)
}

/// Stand-in identity extractor. Real authentication (OAuth, session
/// cookies, token verification) is out of this crate's scope — the
/// bearer token is taken directly as the caller's user id, matching the
/// gap already documented for `ai_opponent_user_id`'s lone carve-out of
/// the user-id space.
pub struct AuthUser(pub UserId);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new("AUTH_MISSING", "missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::new("AUTH_MISSING", "expected a bearer token"))?;

        token
            .parse()
            .map(AuthUser)
            .map_err(|_| ApiError::new("AUTH_INVALID", "bearer token is not a valid user id"))
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "CONFLICT" => StatusCode::CONFLICT,
            "VALIDATION_ERROR" | "AUTH_MISSING" | "AUTH_INVALID" => StatusCode::BAD_REQUEST,
            "JUDGE_ERROR" | "GENERATION_ERROR" | "INFRASTRUCTURE_ERROR" => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "code": self.code, "message": self.message }))).into_response()
    }
}

impl From<DuelError> for ApiError {
    fn from(err: DuelError) -> Self {
        match err {
            DuelError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            DuelError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            DuelError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            DuelError::Validation(msg) => ApiError::new("VALIDATION_ERROR", msg),
            DuelError::Judge(msg) => ApiError::new("JUDGE_ERROR", msg),
            DuelError::Generation(msg) => ApiError::new("GENERATION_ERROR", msg),
            DuelError::Infrastructure(msg) => ApiError::new("INFRASTRUCTURE_ERROR", msg),
            DuelError::RateLimited(msg) => ApiError::new("RATE_LIMITED", msg),
            DuelError::Sqlite(e) => ApiError::new("INFRASTRUCTURE_ERROR", e.to_string()),
            DuelError::Json(e) => ApiError::new("INFRASTRUCTURE_ERROR", e.to_string()),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn create_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateDuelRequest>,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state
        .engine
        .create_duel(user, body.mode, body.difficulty, body.problem_type, body.room_code)
        .await?;
    Ok(Json(duel))
}

async fn create_ai_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<AiDuelRequest>,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state
        .engine
        .create_duel(user, crate::domain::DuelMode::AiOpponent, body.difficulty, body.problem_type, None)
        .await?;
    Ok(Json(duel))
}

async fn join_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<JoinDuelRequest>,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state.engine.join_duel(user, body.room_code, body.difficulty).await?;
    Ok(Json(duel))
}

async fn active_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state.repo.active_duel_for_user(user)?;
    match duel {
        Some(d) if d.status == crate::domain::DuelStatus::InProgress => Ok(Json(d)),
        _ => Err(ApiError::new("NOT_FOUND", "no active duel")),
    }
}

async fn active_or_waiting_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state.repo.active_duel_for_user(user)?;
    duel.map(Json).ok_or_else(|| ApiError::new("NOT_FOUND", "no active or waiting duel"))
}

async fn get_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<DuelId>,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state.repo.require_duel(id)?;
    if !duel.has_participant(user) {
        return Err(ApiError::new("FORBIDDEN", "not a participant in this duel"));
    }
    Ok(Json(duel))
}

async fn submit_code(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<DuelId>,
    Json(body): Json<SubmitCodeRequest>,
) -> ApiResult<Json<VerdictResponse>> {
    let verdict = state.engine.submit_code(id, user, body.code, body.language).await?;
    Ok(Json(VerdictResponse::from(&verdict)))
}

async fn test_code(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<DuelId>,
    Json(body): Json<TestCodeRequest>,
) -> ApiResult<Json<VerdictResponse>> {
    let verdict = state.engine.test_code(id, user, body.code, body.language).await?;
    Ok(Json(VerdictResponse::from(&verdict)))
}

async fn cancel_duel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CancelDuelRequest>,
) -> ApiResult<Json<crate::domain::Duel>> {
    let duel = state.engine.cancel_duel(body.duel_id, user)?;
    Ok(Json(duel))
}

async fn my_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<crate::domain::PlayerRating>> {
    Ok(Json(state.rating.rating_for(user)?))
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<crate::domain::PlayerRating>>> {
    Ok(Json(state.rating.leaderboard(query.limit.unwrap_or(50))?))
}

/// Unauthenticated mirror of `/duels/leaderboard` for public display
/// surfaces (§6) — identical data, no bearer token required.
async fn public_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<crate::domain::PlayerRating>>> {
    Ok(Json(state.rating.leaderboard(query.limit.unwrap_or(50))?))
}

async fn history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<crate::domain::Duel>>> {
    Ok(Json(state.repo.duel_history_for_user(user, query.limit.unwrap_or(20))?))
}
