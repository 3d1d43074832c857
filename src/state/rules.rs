//! Turn resolution: card selection, pair checks, scoring and completion.
//!
//! Every function validates all of its preconditions before touching the session, so a
//! rejected move never leaves a partial mutation behind.

use std::cmp::Ordering;

use thiserror::Error;

use crate::state::{
    board::{Board, Card, CardId},
    session::{PendingSelection, PlayerId, Seat, Session, SessionStatus},
};

/// Why a move was refused as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMoveReason {
    /// The card does not exist on this board.
    #[error("card {0} does not exist")]
    UnknownCard(CardId),
    /// The card is already face up.
    #[error("card {0} is already revealed")]
    AlreadyRevealed(CardId),
    /// The card already belongs to a claimed pair.
    #[error("card {0} is already matched")]
    AlreadyMatched(CardId),
    /// Two cards are already waiting for resolution.
    #[error("two cards are already selected")]
    SelectionFull,
    /// Resolution was requested without exactly two valid face-up cards.
    #[error("pending selection is malformed ({0} card(s))")]
    MalformedPending(usize),
    /// Another move for this session is being committed.
    #[error("another move is in progress")]
    MoveInProgress,
}

/// Rejections produced by the turn engine. None of them mutate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// The move is malformed or targets an already resolved card.
    #[error("invalid move: {0}")]
    InvalidMove(#[from] InvalidMoveReason),
    /// The actor does not own the turn.
    #[error("not your turn")]
    NotYourTurn,
    /// The session is completed.
    #[error("game is not active")]
    GameNotActive,
}

/// Result of a successful card selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionResult {
    /// Card that was flipped.
    pub card_id: CardId,
    /// Token now visible on the flipped card.
    pub token: String,
    /// Whether this selection completed a pair awaiting resolution.
    pub pair_complete: bool,
}

/// Whether the resolved pair matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairResult {
    /// Both cards share a pairable token, which was credited to the actor.
    Match {
        /// The claimed token.
        token: String,
    },
    /// The cards were flipped back and the turn passed on.
    Mismatch,
}

/// Ranking of the two seats by number of claimed pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// The seat holding strictly more pairs.
    Winner(Seat),
    /// Both seats hold the same number of pairs.
    Tie,
}

impl Standing {
    /// Standing as seen after swapping the two seats.
    pub fn swapped(self) -> Self {
        match self {
            Standing::Winner(seat) => Standing::Winner(seat.other()),
            Standing::Tie => Standing::Tie,
        }
    }
}

/// Result of resolving a pending pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// The two resolved cards in selection order.
    pub cards: [CardId; 2],
    /// Match or mismatch.
    pub result: PairResult,
    /// Turn owner after the resolution.
    pub turn_owner: PlayerId,
    /// Final standing when this resolution completed the session.
    pub completed: Option<Standing>,
}

/// Final result of a session from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The viewer won; carries the viewer's id.
    Win(PlayerId),
    /// The viewer lost; carries the winner's id.
    Loss(PlayerId),
    /// Same number of pairs on both sides.
    Tie,
}

/// Flip `card_id` for `actor` and append it to the pending selection.
pub fn select_card(
    session: &mut Session,
    pending: &mut PendingSelection,
    actor: PlayerId,
    card_id: CardId,
) -> Result<SelectionResult, MoveError> {
    if session.status != SessionStatus::Active {
        return Err(MoveError::GameNotActive);
    }
    if actor != session.turn_owner {
        return Err(MoveError::NotYourTurn);
    }
    if pending.is_full() {
        return Err(MoveError::from(InvalidMoveReason::SelectionFull));
    }

    let card = session
        .board
        .card_mut(card_id)
        .ok_or(InvalidMoveReason::UnknownCard(card_id))?;
    if card.matched {
        return Err(InvalidMoveReason::AlreadyMatched(card_id).into());
    }
    if card.revealed {
        return Err(InvalidMoveReason::AlreadyRevealed(card_id).into());
    }

    card.revealed = true;
    let token = card.token.clone();
    pending.push(card_id);
    session.last_actor = Some(actor);

    Ok(SelectionResult {
        card_id,
        token,
        pair_complete: pending.is_full(),
    })
}

/// Resolve the two pending cards: claim them on a match, hide them and pass the turn otherwise.
pub fn resolve_pair(
    session: &mut Session,
    pending: &mut PendingSelection,
) -> Result<ResolutionOutcome, MoveError> {
    if session.status != SessionStatus::Active {
        return Err(MoveError::GameNotActive);
    }

    let [first_id, second_id] = pending_pair(&session.board, pending)?;
    let actor = session.turn_owner;
    let seat = session
        .seat_of(actor)
        .ok_or(InvalidMoveReason::MalformedPending(pending.len()))?;

    // Both ids were validated above.
    let (is_match, token) = match (session.board.card(first_id), session.board.card(second_id)) {
        (Some(first), Some(second)) => (
            check_match(&session.board, first, second),
            first.token.clone(),
        ),
        _ => return Err(InvalidMoveReason::MalformedPending(pending.len()).into()),
    };

    for id in [first_id, second_id] {
        if let Some(card) = session.board.card_mut(id) {
            if is_match {
                card.matched = true;
                card.revealed = true;
            } else {
                card.revealed = false;
            }
        }
    }

    let result = if is_match {
        session.matches_mut(seat).push(token.clone());
        PairResult::Match { token }
    } else {
        session.turn_owner = session.player(seat.other());
        PairResult::Mismatch
    };

    pending.clear();
    session.last_actor = Some(actor);

    let completed = if check_completion(&session.board) {
        let standing = determine_winner(&session.matches_a, &session.matches_b);
        session.status = SessionStatus::Completed;
        session.winner = match standing {
            Standing::Winner(seat) => Some(session.player(seat)),
            Standing::Tie => None,
        };
        Some(standing)
    } else {
        None
    };

    Ok(ResolutionOutcome {
        cards: [first_id, second_id],
        result,
        turn_owner: session.turn_owner,
        completed,
    })
}

/// Two cards match when they share a pairable token and are distinct cards.
pub fn check_match(board: &Board, first: &Card, second: &Card) -> bool {
    first.token == second.token && first.id != second.id && !board.is_inert(&first.token)
}

/// A board is complete once every pairable card has been claimed.
pub fn check_completion(board: &Board) -> bool {
    board
        .cards()
        .iter()
        .all(|card| card.matched || board.is_inert(&card.token))
}

/// Rank the seats by number of claimed pairs; equal counts tie.
pub fn determine_winner(matches_a: &[String], matches_b: &[String]) -> Standing {
    match matches_a.len().cmp(&matches_b.len()) {
        Ordering::Greater => Standing::Winner(Seat::A),
        Ordering::Less => Standing::Winner(Seat::B),
        Ordering::Equal => Standing::Tie,
    }
}

/// Outcome of a completed session for `viewer`, or `None` while it is active or when the
/// viewer is not a participant.
pub fn outcome_for(session: &Session, viewer: PlayerId) -> Option<Outcome> {
    if session.is_active() || !session.has_player(viewer) {
        return None;
    }

    Some(match session.winner {
        Some(winner) if winner == viewer => Outcome::Win(viewer),
        Some(winner) => Outcome::Loss(winner),
        None => Outcome::Tie,
    })
}

fn pending_pair(board: &Board, pending: &PendingSelection) -> Result<[CardId; 2], MoveError> {
    let malformed = || MoveError::from(InvalidMoveReason::MalformedPending(pending.len()));

    let &[first, second] = pending.ids() else {
        return Err(malformed());
    };
    if first == second {
        return Err(malformed());
    }

    for id in [first, second] {
        match board.card(id) {
            Some(card) if card.revealed && !card.matched => {}
            _ => return Err(malformed()),
        }
    }

    Ok([first, second])
}
