use serde::Serialize;
use tracing::warn;

use crate::dto::{
    session::SessionPatch,
    sse::{Handshake, ServerEvent, SystemStatus},
};

pub const EVENT_HANDSHAKE: &str = "handshake";
pub const EVENT_SESSION_PATCH: &str = "session.patch";
pub const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Greeting sent once per subscription.
pub fn handshake(patch: &SessionPatch, degraded: bool) -> Option<ServerEvent> {
    let payload = Handshake {
        session_id: patch.session_id,
        version: patch.version,
        message: format!("subscribed to session {}", patch.session_id),
        degraded,
    };
    encode(EVENT_HANDSHAKE, &payload)
}

/// Committed session state.
pub fn session_patch(patch: &SessionPatch) -> Option<ServerEvent> {
    encode(EVENT_SESSION_PATCH, patch)
}

/// Storage availability change.
pub fn system_status(degraded: bool) -> Option<ServerEvent> {
    encode(EVENT_SYSTEM_STATUS, &SystemStatus { degraded })
}

fn encode(event: &'static str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::encode(event, payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_is_named_and_encoded() {
        let event = system_status(true).unwrap();
        assert_eq!(event.name, EVENT_SYSTEM_STATUS);
        assert_eq!(event.data, r#"{"degraded":true}"#);
    }
}
