use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Flag Duel Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::apply_move,
        crate::routes::sessions::get_outcome,
        crate::routes::sessions::get_active_session,
        crate::routes::sse::session_events,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::ApplyMoveRequest,
            crate::dto::session::SessionPatch,
            crate::dto::session::CardState,
            crate::dto::session::SessionStatusDto,
            crate::dto::session::OutcomeDto,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::ws::PlayerInboundMessage,
            crate::dto::ws::PlayerOutboundMessage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle and moves"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "players", description = "WebSocket channel for players"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_session_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/sessions",
            "/sessions/{id}",
            "/sessions/{id}/moves",
            "/sessions/{id}/outcome",
            "/sessions/{id}/events",
            "/sessions/{id}/ws",
            "/players/{id}/session",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
