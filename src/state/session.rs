use std::time::SystemTime;

use rand::Rng;
use uuid::Uuid;

use crate::state::board::{self, Board, CardId, TokenCatalog};

/// Identifier of a participant, provided by the identity collaborator.
pub type PlayerId = Uuid;
/// Identifier of a session.
pub type SessionId = Uuid;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Moves are accepted.
    Active,
    /// Every pair has been claimed; the session is frozen.
    Completed,
}

/// Which of the two participant slots a player occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    /// The first participant (`player_a`).
    A,
    /// The second participant (`player_b`).
    B,
}

impl Seat {
    /// The other seat.
    pub fn other(self) -> Self {
        match self {
            Seat::A => Seat::B,
            Seat::B => Seat::A,
        }
    }
}

/// Authoritative record of one match between two players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Primary key of the session.
    pub id: SessionId,
    /// First participant.
    pub player_a: PlayerId,
    /// Second participant.
    pub player_b: PlayerId,
    /// Player allowed to flip cards.
    pub turn_owner: PlayerId,
    /// Cards in position order.
    pub board: Board,
    /// Tokens claimed by `player_a`, in claim order.
    pub matches_a: Vec<String>,
    /// Tokens claimed by `player_b`, in claim order.
    pub matches_b: Vec<String>,
    /// Whether moves are still accepted.
    pub status: SessionStatus,
    /// Winner once completed; `None` while active or after a tie.
    pub winner: Option<PlayerId>,
    /// Player whose move produced the current state.
    pub last_actor: Option<PlayerId>,
    /// Monotonic commit counter, bumped on every persisted mutation.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Timestamp of the last committed mutation.
    pub updated_at: SystemTime,
}

impl Session {
    /// Build a new active session where `first` moves first.
    pub fn new(player_a: PlayerId, player_b: PlayerId, board: Board, first: Seat) -> Self {
        let now = SystemTime::now();
        let turn_owner = match first {
            Seat::A => player_a,
            Seat::B => player_b,
        };

        Self {
            id: Uuid::new_v4(),
            player_a,
            player_b,
            turn_owner,
            board,
            matches_a: Vec::new(),
            matches_b: Vec::new(),
            status: SessionStatus::Active,
            winner: None,
            last_actor: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a match on a freshly generated board with a random first player.
    pub fn start(player_a: PlayerId, player_b: PlayerId, catalog: &TokenCatalog) -> Self {
        let first = if rand::rng().random_bool(0.5) {
            Seat::A
        } else {
            Seat::B
        };
        Self::new(player_a, player_b, board::generate(catalog), first)
    }

    /// Seat occupied by `player`, if they take part in this session.
    pub fn seat_of(&self, player: PlayerId) -> Option<Seat> {
        if player == self.player_a {
            Some(Seat::A)
        } else if player == self.player_b {
            Some(Seat::B)
        } else {
            None
        }
    }

    /// Player sitting at `seat`.
    pub fn player(&self, seat: Seat) -> PlayerId {
        match seat {
            Seat::A => self.player_a,
            Seat::B => self.player_b,
        }
    }

    /// Tokens claimed by the player at `seat`.
    pub fn matches(&self, seat: Seat) -> &[String] {
        match seat {
            Seat::A => &self.matches_a,
            Seat::B => &self.matches_b,
        }
    }

    pub(crate) fn matches_mut(&mut self, seat: Seat) -> &mut Vec<String> {
        match seat {
            Seat::A => &mut self.matches_a,
            Seat::B => &mut self.matches_b,
        }
    }

    /// Whether moves are still accepted.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether `player` takes part in this session.
    pub fn has_player(&self, player: PlayerId) -> bool {
        self.seat_of(player).is_some()
    }
}

/// Cards flipped by the turn owner since the last resolution (at most two).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSelection {
    cards: Vec<CardId>,
}

impl PendingSelection {
    /// Maximum number of cards flipped before a resolution.
    pub const CAPACITY: usize = 2;

    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the selection implied by a persisted board: face-up cards not yet claimed.
    pub fn from_board(board: &Board) -> Self {
        Self {
            cards: board
                .cards()
                .iter()
                .filter(|card| card.revealed && !card.matched)
                .map(|card| card.id)
                .collect(),
        }
    }

    /// Selected card identifiers in selection order.
    pub fn ids(&self) -> &[CardId] {
        &self.cards
    }

    /// Number of selected cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Whether a pair is waiting for resolution.
    pub fn is_full(&self) -> bool {
        self.cards.len() >= Self::CAPACITY
    }

    pub(crate) fn push(&mut self, id: CardId) {
        self.cards.push(id);
    }

    pub(crate) fn clear(&mut self) {
        self.cards.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::board::Card;

    fn card(id: CardId, token: &str, revealed: bool, matched: bool) -> Card {
        Card {
            id,
            token: token.into(),
            revealed,
            matched,
            position: id as u8,
        }
    }

    #[test]
    fn new_session_starts_active_with_chosen_player() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let board = board::generate(&TokenCatalog::default());

        let session = Session::new(a, b, board, Seat::B);

        assert_eq!(session.turn_owner, b);
        assert!(session.is_active());
        assert_eq!(session.version, 0);
        assert!(session.matches_a.is_empty() && session.matches_b.is_empty());
        assert_eq!(session.winner, None);
        assert_eq!(session.last_actor, None);
    }

    #[test]
    fn start_picks_one_of_the_players() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let session = Session::start(a, b, &TokenCatalog::default());
        assert!(session.turn_owner == a || session.turn_owner == b);
    }

    #[test]
    fn seats_resolve_players() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let session = Session::new(a, b, board::generate(&TokenCatalog::default()), Seat::A);

        assert_eq!(session.seat_of(a), Some(Seat::A));
        assert_eq!(session.seat_of(b), Some(Seat::B));
        assert_eq!(session.seat_of(Uuid::new_v4()), None);
        assert_eq!(session.player(Seat::A.other()), b);
    }

    #[test]
    fn pending_selection_is_rebuilt_from_face_up_unmatched_cards() {
        let board = Board::from_parts(
            vec![
                card(0, "fr", true, true),
                card(1, "fr", true, true),
                card(2, "de", true, false),
                card(3, "de", false, false),
            ],
            "ch",
            "white",
        );

        let pending = PendingSelection::from_board(&board);
        assert_eq!(pending.ids(), &[2]);
        assert!(!pending.is_full());
    }
}
