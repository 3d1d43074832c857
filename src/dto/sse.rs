use axum::response::sse::Event;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One encoded frame of a session event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerEvent {
    /// SSE `event:` field.
    pub name: &'static str,
    /// JSON body sent as the `data:` field.
    pub data: String,
}

impl ServerEvent {
    pub fn encode<T: Serialize>(name: &'static str, payload: &T) -> serde_json::Result<Self> {
        let data = serde_json::to_string(payload)?;
        Ok(Self { name, data })
    }
}

impl From<ServerEvent> for Event {
    fn from(frame: ServerEvent) -> Self {
        Event::default().event(frame.name).data(frame.data)
    }
}

/// Greeting pushed right after an observer subscribes.
#[derive(Debug, Serialize, ToSchema)]
pub struct Handshake {
    pub session_id: Uuid,
    /// Version of the snapshot that follows the greeting.
    pub version: u64,
    pub message: String,
    /// Moves are refused while storage is unreachable.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatus {
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_carry_their_name_and_json_body() {
        let frame = ServerEvent::encode(
            "handshake",
            &Handshake {
                session_id: Uuid::nil(),
                version: 4,
                message: "hello".into(),
                degraded: false,
            },
        )
        .unwrap();

        assert_eq!(frame.name, "handshake");
        let body: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(body["version"], 4);
        assert_eq!(body["degraded"], false);
    }
}
