/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session lifecycle, moves and pair resolution.
pub mod session_service;
/// Server-Sent Events payloads.
pub mod sse_events;
/// Server-Sent Events streaming of session patches.
pub mod sse_service;
/// Session store connection supervisor.
pub mod storage_supervisor;
/// Player WebSocket connections.
pub mod websocket_service;
