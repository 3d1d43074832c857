use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Sessions currently held in memory.
    pub loaded_sessions: usize,
}

impl HealthResponse {
    pub fn ok(loaded_sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            loaded_sessions,
        }
    }

    /// The session store is unreachable; moves are refused.
    pub fn degraded(loaded_sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            loaded_sessions,
        }
    }
}
