use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    board::{Board, Card},
    session::{Session, SessionStatus},
};

/// Lifecycle status persisted with a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusEntity {
    Active,
    Completed,
}

/// Card as stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardEntity {
    pub id: u32,
    pub token: String,
    pub revealed: bool,
    pub matched: bool,
    pub position: u8,
}

/// Full snapshot of a session as written by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Stable identifier for the session.
    pub id: Uuid,
    pub player_a: Uuid,
    pub player_b: Uuid,
    pub turn_owner: Uuid,
    /// Cards in position order.
    pub cards: Vec<CardEntity>,
    /// Token appearing once that never pairs.
    pub singleton_token: String,
    /// Neutral token appearing once that never pairs.
    pub neutral_token: String,
    pub matches_a: Vec<String>,
    pub matches_b: Vec<String>,
    pub status: SessionStatusEntity,
    pub winner: Option<Uuid>,
    /// Player whose move produced this snapshot.
    pub last_actor: Option<Uuid>,
    /// Commit counter used for compare-and-swap writes.
    pub version: u64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Whether `player` sits in this session.
    pub fn has_player(&self, player: Uuid) -> bool {
        self.player_a == player || self.player_b == player
    }

    /// Whether moves are still accepted.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatusEntity::Active
    }
}

impl From<&Session> for SessionEntity {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            player_a: session.player_a,
            player_b: session.player_b,
            turn_owner: session.turn_owner,
            cards: session
                .board
                .cards()
                .iter()
                .map(|card| CardEntity {
                    id: card.id,
                    token: card.token.clone(),
                    revealed: card.revealed,
                    matched: card.matched,
                    position: card.position,
                })
                .collect(),
            singleton_token: session.board.singleton().to_owned(),
            neutral_token: session.board.neutral().to_owned(),
            matches_a: session.matches_a.clone(),
            matches_b: session.matches_b.clone(),
            status: match session.status {
                SessionStatus::Active => SessionStatusEntity::Active,
                SessionStatus::Completed => SessionStatusEntity::Completed,
            },
            winner: session.winner,
            last_actor: session.last_actor,
            version: session.version,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(value: SessionEntity) -> Self {
        let cards = value
            .cards
            .into_iter()
            .map(|card| Card {
                id: card.id,
                token: card.token,
                revealed: card.revealed,
                matched: card.matched,
                position: card.position,
            })
            .collect();

        Self {
            id: value.id,
            player_a: value.player_a,
            player_b: value.player_b,
            turn_owner: value.turn_owner,
            board: Board::from_parts(cards, value.singleton_token, value.neutral_token),
            matches_a: value.matches_a,
            matches_b: value.matches_b,
            status: match value.status {
                SessionStatusEntity::Active => SessionStatus::Active,
                SessionStatusEntity::Completed => SessionStatus::Completed,
            },
            winner: value.winner,
            last_actor: value.last_actor,
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}
