use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{session_service, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{id}/ws",
    tag = "players",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "Unknown session")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket bound to one session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let handle = session_service::load_session(&state, id).await?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, handle, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/ws", get(ws_handler))
}
