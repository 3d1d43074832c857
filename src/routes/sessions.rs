use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{ApplyMoveRequest, CreateSessionRequest, OutcomeDto, OutcomeQuery, SessionPatch},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes creating, reading and playing sessions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/moves", post(apply_move))
        .route("/sessions/{id}/outcome", get(get_outcome))
        .route("/players/{id}/session", get(get_active_session))
}

/// Open a session between two players on a freshly shuffled board.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionPatch),
        (status = 400, description = "Both players are the same"),
        (status = 409, description = "A player already plays another session"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<Json<SessionPatch>, AppError> {
    let patch = session_service::create_session(&state, payload).await?;
    Ok(Json(patch))
}

/// Latest committed state of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionPatch),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionPatch>, AppError> {
    let patch = session_service::get_session(&state, id).await?;
    Ok(Json(patch))
}

/// Flip a card on behalf of the turn owner.
#[utoipa::path(
    post,
    path = "/sessions/{id}/moves",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ApplyMoveRequest,
    responses(
        (status = 200, description = "Card revealed", body = SessionPatch),
        (status = 400, description = "Invalid move"),
        (status = 403, description = "Not the actor's turn"),
        (status = 409, description = "Session over or concurrent write"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn apply_move(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ApplyMoveRequest>>,
) -> Result<Json<SessionPatch>, AppError> {
    let patch = session_service::apply_move(&state, id, payload.actor_id, payload.card_id).await?;
    Ok(Json(patch))
}

/// Result of a completed session from one participant's point of view.
#[utoipa::path(
    get,
    path = "/sessions/{id}/outcome",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("viewer" = Uuid, Query, description = "Participant asking for the outcome")
    ),
    responses(
        (status = 200, description = "Outcome", body = OutcomeDto),
        (status = 404, description = "Unknown session or participant"),
        (status = 409, description = "Session still active")
    )
)]
pub async fn get_outcome(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OutcomeQuery>,
) -> Result<Json<OutcomeDto>, AppError> {
    let outcome = session_service::outcome(&state, id, query.viewer).await?;
    Ok(Json(outcome.into()))
}

/// Active session a player takes part in.
#[utoipa::path(
    get,
    path = "/players/{id}/session",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Player identifier")),
    responses(
        (status = 200, description = "Active session", body = SessionPatch),
        (status = 404, description = "No active session")
    )
)]
pub async fn get_active_session(
    State(state): State<SharedState>,
    Path(player): Path<Uuid>,
) -> Result<Json<SessionPatch>, AppError> {
    let patch = session_service::find_active_session(&state, player).await?;
    Ok(Json(patch))
}
