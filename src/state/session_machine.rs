use std::time::{Instant, SystemTime};

use thiserror::Error;
use uuid::Uuid;

use crate::state::{
    board::CardId,
    rules::{self, MoveError, ResolutionOutcome, SelectionResult},
    session::{PendingSelection, PlayerId, Session},
};

/// Turn progress of a session as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    /// The turn owner has not flipped anything yet.
    AwaitingFirst,
    /// One card is face up.
    PendingOne(CardId),
    /// Two cards are face up and wait for resolution.
    PendingTwo(CardId, CardId),
    /// The session is over.
    Completed,
}

/// Events that can be applied to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `actor` flips `card_id`.
    Select {
        /// Player issuing the move.
        actor: PlayerId,
        /// Card to flip.
        card_id: CardId,
    },
    /// Resolve the pending pair.
    Resolve,
}

/// What a planned mutation does once committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEffect {
    /// A card was flipped.
    Selected(SelectionResult),
    /// A pair was resolved.
    Resolved(ResolutionOutcome),
}

/// Errors that can occur when planning a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A mutation is already pending and must be applied or aborted.
    #[error("a mutation is already pending")]
    AlreadyPending,
    /// The turn engine refused the move.
    #[error(transparent)]
    Rejected(#[from] MoveError),
}

/// Errors that can occur when applying a planned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// No mutation is currently pending.
    #[error("no mutation is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending plan {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Session version changed since the plan was created.
    #[error("session version changed (expected {expected}, got {actual})")]
    VersionMismatch {
        /// Version the plan will produce.
        expected: u64,
        /// Version the session would reach now.
        actual: u64,
    },
}

/// Errors that can occur when aborting a planned mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// No mutation is currently pending.
    #[error("no mutation is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending plan {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned mutation.
pub type PlanId = Uuid;

/// A validated mutation that has not been committed yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase before the mutation.
    pub from: TurnPhase,
    /// Phase after the mutation.
    pub to: TurnPhase,
    /// Event that triggered this mutation.
    pub event: SessionEvent,
    /// Session version after applying this mutation.
    pub version_next: u64,
    /// Candidate session to persist before applying.
    pub session: Session,
    /// Effect reported to the caller.
    pub effect: PlanEffect,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
    selection: PendingSelection,
}

/// Per-session state machine: the committed session, its pending selection and at most
/// one planned mutation.
///
/// Mutations are computed on a copy. The committed session only changes in
/// [`SessionMachine::apply`], so aborting a plan is a rollback to the last durable state.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    session: Session,
    selection: PendingSelection,
    pending: Option<Plan>,
}

impl SessionMachine {
    /// Wrap a committed session, rebuilding its pending selection from the board.
    pub fn new(session: Session) -> Self {
        let selection = PendingSelection::from_board(&session.board);
        Self {
            session,
            selection,
            pending: None,
        }
    }

    /// Last committed session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Cards flipped since the last resolution.
    pub fn selection(&self) -> &PendingSelection {
        &self.selection
    }

    /// Whether a plan awaits apply or abort.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Inspect the current turn phase.
    pub fn phase(&self) -> TurnPhase {
        phase_of(&self.session, &self.selection)
    }

    /// Validate `event` against a copy of the session and remember the resulting plan.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let mut session = self.session.clone();
        let mut selection = self.selection.clone();
        let effect = match &event {
            SessionEvent::Select { actor, card_id } => PlanEffect::Selected(rules::select_card(
                &mut session,
                &mut selection,
                *actor,
                *card_id,
            )?),
            SessionEvent::Resolve => {
                PlanEffect::Resolved(rules::resolve_pair(&mut session, &mut selection)?)
            }
        };

        let version_next = self.session.version + 1;
        session.version = version_next;
        session.updated_at = SystemTime::now();

        let from = self.phase();
        let to = phase_of(&session, &selection);
        let plan = Plan {
            id: Uuid::new_v4(),
            from,
            to,
            event,
            version_next,
            session,
            effect,
            pending_since: Instant::now(),
            selection,
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Commit a planned mutation, returning the new session.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<Session, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.session.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.session.version + 1,
            });
        }

        self.session = plan.session;
        self.selection = plan.selection;

        Ok(self.session.clone())
    }

    /// Drop a planned mutation, leaving the committed session untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }
}

fn phase_of(session: &Session, selection: &PendingSelection) -> TurnPhase {
    if !session.is_active() {
        return TurnPhase::Completed;
    }
    match *selection.ids() {
        [] => TurnPhase::AwaitingFirst,
        [first] => TurnPhase::PendingOne(first),
        [first, second, ..] => TurnPhase::PendingTwo(first, second),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        board::{Board, Card},
        rules::{InvalidMoveReason, PairResult},
        session::Seat,
    };

    fn machine() -> (SessionMachine, PlayerId, PlayerId) {
        let tokens = ["fr", "fr", "de", "de", "ch", "white"];
        let cards = tokens
            .iter()
            .enumerate()
            .map(|(index, token)| Card {
                id: index as CardId,
                token: token.to_string(),
                revealed: false,
                matched: false,
                position: index as u8,
            })
            .collect();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let session = Session::new(a, b, Board::from_parts(cards, "ch", "white"), Seat::A);
        (SessionMachine::new(session), a, b)
    }

    fn apply(sm: &mut SessionMachine, event: SessionEvent) -> Session {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_phase_awaits_first_card() {
        let (sm, _, _) = machine();
        assert_eq!(sm.phase(), TurnPhase::AwaitingFirst);
    }

    #[test]
    fn select_select_resolve_walks_the_phases() {
        let (mut sm, a, _) = machine();

        let plan = sm.plan(SessionEvent::Select { actor: a, card_id: 0 }).unwrap();
        assert_eq!(plan.from, TurnPhase::AwaitingFirst);
        assert_eq!(plan.to, TurnPhase::PendingOne(0));
        sm.apply(plan.id).unwrap();

        let session = apply(&mut sm, SessionEvent::Select { actor: a, card_id: 1 });
        assert_eq!(sm.phase(), TurnPhase::PendingTwo(0, 1));
        assert_eq!(session.version, 2);
        assert_eq!(session.last_actor, Some(a));

        let plan = sm.plan(SessionEvent::Resolve).unwrap();
        assert!(matches!(
            plan.effect,
            PlanEffect::Resolved(ResolutionOutcome {
                result: PairResult::Match { .. },
                ..
            })
        ));
        let session = sm.apply(plan.id).unwrap();
        assert_eq!(sm.phase(), TurnPhase::AwaitingFirst);
        assert_eq!(session.version, 3);
        assert_eq!(session.matches_a, vec!["fr".to_string()]);
    }

    #[test]
    fn completing_the_board_reaches_completed() {
        let (mut sm, a, _) = machine();
        for card_id in [0, 1] {
            apply(&mut sm, SessionEvent::Select { actor: a, card_id });
        }
        apply(&mut sm, SessionEvent::Resolve);
        for card_id in [2, 3] {
            apply(&mut sm, SessionEvent::Select { actor: a, card_id });
        }
        let plan = sm.plan(SessionEvent::Resolve).unwrap();
        assert_eq!(plan.to, TurnPhase::Completed);
        let session = sm.apply(plan.id).unwrap();
        assert_eq!(session.winner, Some(a));
    }

    #[test]
    fn rejected_move_leaves_no_pending_plan() {
        let (mut sm, _, b) = machine();
        let err = sm
            .plan(SessionEvent::Select { actor: b, card_id: 0 })
            .unwrap_err();
        assert_eq!(err, PlanError::Rejected(MoveError::NotYourTurn));
        assert!(!sm.has_pending());
    }

    #[test]
    fn second_plan_is_refused_while_one_is_pending() {
        let (mut sm, a, _) = machine();
        sm.plan(SessionEvent::Select { actor: a, card_id: 0 }).unwrap();
        let err = sm
            .plan(SessionEvent::Select { actor: a, card_id: 1 })
            .unwrap_err();
        assert_eq!(err, PlanError::AlreadyPending);
    }

    #[test]
    fn abort_rolls_back_to_committed_session() {
        let (mut sm, a, _) = machine();
        let before = sm.session().clone();

        let plan = sm.plan(SessionEvent::Select { actor: a, card_id: 0 }).unwrap();
        assert!(plan.session.board.card(0).unwrap().revealed);
        sm.abort(plan.id).unwrap();

        assert!(!sm.has_pending());
        assert_eq!(sm.session(), &before);
        assert!(sm.selection().is_empty());
    }

    #[test]
    fn apply_with_wrong_id_keeps_the_plan() {
        let (mut sm, a, _) = machine();
        let plan = sm.plan(SessionEvent::Select { actor: a, card_id: 0 }).unwrap();

        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert!(sm.has_pending());
        sm.apply(plan.id).unwrap();
    }

    #[test]
    fn resolve_without_pair_is_rejected() {
        let (mut sm, _, _) = machine();
        let err = sm.plan(SessionEvent::Resolve).unwrap_err();
        assert_eq!(
            err,
            PlanError::Rejected(MoveError::from(InvalidMoveReason::MalformedPending(0)))
        );
    }

    #[test]
    fn abort_without_plan_fails() {
        let (mut sm, _, _) = machine();
        assert_eq!(sm.abort(Uuid::new_v4()), Err(AbortError::NoPending));
    }
}
