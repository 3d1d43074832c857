use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session patch stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
/// Stream committed patches of a session to observers.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    Ok(sse_service::session_stream(&state, id).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/events", get(session_events))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{http::header, response::IntoResponse};

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::memory::MemorySessionStore,
        dto::session::CreateSessionRequest, services::session_service, state::AppState,
    };

    #[tokio::test]
    async fn stream_outlives_the_extracted_state() {
        let state = AppState::new(AppConfig::default());
        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let created = session_service::create_session(
            &state,
            CreateSessionRequest {
                player_a: Uuid::new_v4(),
                player_b: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();

        let response = session_events(State(Arc::clone(&state)), Path(created.session_id))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(state.session(created.session_id).unwrap().subscriber_count(), 1);

        let missing = session_events(State(state), Path(Uuid::new_v4())).await;
        assert!(missing.is_err());
    }
}
