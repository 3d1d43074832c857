use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    dto::format_system_time,
    state::{
        board::{BOARD_SIZE, Card},
        rules::Outcome,
        session::{Session, SessionStatus},
    },
};

/// Payload sent by the lobby to open a session between two players.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_distinct_players"))]
pub struct CreateSessionRequest {
    pub player_a: Uuid,
    pub player_b: Uuid,
}

fn validate_distinct_players(request: &CreateSessionRequest) -> Result<(), ValidationError> {
    if request.player_a == request.player_b {
        let mut err = ValidationError::new("distinct_players");
        err.message = Some("a session requires two different players".into());
        return Err(err);
    }
    Ok(())
}

/// A card flip issued by one of the participants.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ApplyMoveRequest {
    pub actor_id: Uuid,
    #[validate(range(max = 35))]
    pub card_id: u32,
}

/// Query string of the outcome route.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OutcomeQuery {
    /// Player the outcome is computed for.
    pub viewer: Uuid,
}

/// Lifecycle status exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusDto {
    Active,
    Completed,
}

impl From<SessionStatus> for SessionStatusDto {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Active => SessionStatusDto::Active,
            SessionStatus::Completed => SessionStatusDto::Completed,
        }
    }
}

/// Rendering state of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardState {
    pub id: u32,
    pub token: String,
    pub revealed: bool,
    pub matched: bool,
    pub position: u8,
}

impl From<&Card> for CardState {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            token: card.token.clone(),
            revealed: card.revealed,
            matched: card.matched,
            position: card.position,
        }
    }
}

/// Full snapshot of the mutable session fields, broadcast after every committed mutation.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionPatch {
    pub session_id: Uuid,
    /// Commit counter; a patch with a lower version is older.
    pub version: u64,
    pub player_a: Uuid,
    pub player_b: Uuid,
    pub turn_owner: Uuid,
    /// Cards in position order.
    #[schema(max_items = 36)]
    pub board: Vec<CardState>,
    pub matches_a: Vec<String>,
    pub matches_b: Vec<String>,
    pub status: SessionStatusDto,
    #[serde(default)]
    pub winner: Option<Uuid>,
    /// Player whose move produced this snapshot.
    #[serde(default)]
    pub last_actor: Option<Uuid>,
    pub updated_at: String,
}

impl SessionPatch {
    /// Flip a face-down card in place; returns `false` when the card cannot be flipped.
    pub fn reveal(&mut self, card_id: u32) -> bool {
        match self.board.iter_mut().find(|card| card.id == card_id) {
            Some(card) if !card.revealed && !card.matched => {
                card.revealed = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the session accepts moves.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatusDto::Active
    }
}

impl From<&Session> for SessionPatch {
    fn from(session: &Session) -> Self {
        let mut board: Vec<CardState> = session.board.cards().iter().map(Into::into).collect();
        debug_assert!(board.len() <= BOARD_SIZE);
        board.sort_by_key(|card| card.position);

        Self {
            session_id: session.id,
            version: session.version,
            player_a: session.player_a,
            player_b: session.player_b,
            turn_owner: session.turn_owner,
            board,
            matches_a: session.matches_a.clone(),
            matches_b: session.matches_b.clone(),
            status: session.status.into(),
            winner: session.winner,
            last_actor: session.last_actor,
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Final result of a session for the requesting viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "result", content = "player_id", rename_all = "snake_case")]
pub enum OutcomeDto {
    /// The viewer won.
    Win(Uuid),
    /// The viewer lost to the carried player.
    Loss(Uuid),
    Tie,
}

impl From<Outcome> for OutcomeDto {
    fn from(value: Outcome) -> Self {
        match value {
            Outcome::Win(player) => OutcomeDto::Win(player),
            Outcome::Loss(winner) => OutcomeDto::Loss(winner),
            Outcome::Tie => OutcomeDto::Tie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_players_are_rejected() {
        let player = Uuid::new_v4();
        let request = CreateSessionRequest {
            player_a: player,
            player_b: player,
        };
        assert!(request.validate().is_err());

        let request = CreateSessionRequest {
            player_a: player,
            player_b: Uuid::new_v4(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn card_id_out_of_board_is_rejected() {
        let request = ApplyMoveRequest {
            actor_id: Uuid::new_v4(),
            card_id: 36,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let winner = Uuid::nil();
        let json = serde_json::to_value(OutcomeDto::Loss(winner)).unwrap();
        assert_eq!(json["result"], "loss");
        assert_eq!(json["player_id"], winner.to_string());

        let json = serde_json::to_value(OutcomeDto::Tie).unwrap();
        assert_eq!(json["result"], "tie");
    }
}
