use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::session::SessionPatch,
    state::board::{BOARD_SIZE, CardId},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerInboundMessage {
    /// Must be the first frame of a connection.
    Identification { player_id: Uuid },
    Flip { card_id: CardId },
    #[serde(other)]
    Unknown,
}

/// Why an inbound frame was refused before reaching the session.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("card {0} is outside the board")]
    CardOutOfRange(CardId),
}

impl PlayerInboundMessage {
    /// Parse a text frame and check its bounds.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        match message {
            Self::Flip { card_id } if card_id as usize >= BOARD_SIZE => {
                Err(InboundError::CardOutOfRange(card_id))
            }
            message => Ok(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerOutboundMessage {
    /// Identification accepted.
    Welcome { session_id: Uuid, player_id: Uuid },
    /// State the client must render.
    Patch { patch: SessionPatch },
    /// The coordinator committed the client's own move exactly as predicted.
    Ack { version: u64 },
    /// A move or frame was refused; a `patch` with the durable state follows when relevant.
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        card_id: Option<CardId>,
        reason: String,
    },
    /// Storage availability changed.
    SystemStatus { degraded: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_messages() {
        let id = Uuid::new_v4();
        let message =
            PlayerInboundMessage::from_json_str(&format!(r#"{{"type":"identification","player_id":"{id}"}}"#))
                .unwrap();
        assert_eq!(message, PlayerInboundMessage::Identification { player_id: id });

        let message = PlayerInboundMessage::from_json_str(r#"{"type":"flip","card_id":7}"#).unwrap();
        assert_eq!(message, PlayerInboundMessage::Flip { card_id: 7 });

        let message = PlayerInboundMessage::from_json_str(r#"{"type":"dance"}"#).unwrap();
        assert_eq!(message, PlayerInboundMessage::Unknown);
    }

    #[test]
    fn rejects_out_of_range_cards() {
        let err = PlayerInboundMessage::from_json_str(r#"{"type":"flip","card_id":36}"#).unwrap_err();
        assert!(matches!(err, InboundError::CardOutOfRange(36)));
        assert!(PlayerInboundMessage::from_json_str("not json").is_err());
    }

    #[test]
    fn rejection_omits_missing_card() {
        let json = serde_json::to_string(&PlayerOutboundMessage::Rejected {
            card_id: None,
            reason: "no".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"rejected","reason":"no"}"#);
    }
}
