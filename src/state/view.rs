//! Observer-side view of a session: an optimistic shadow copy reconciled against
//! the patches broadcast by the coordinator.

use crate::{
    dto::session::SessionPatch,
    state::{board::CardId, session::PlayerId},
};

/// What [`SessionView::reconcile`] did with an incoming patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The patch replaced the local view; the client must render it.
    Adopted,
    /// The patch echoes a local move the view already shows.
    Confirmed,
    /// The patch is older than the local view and was dropped.
    IgnoredStale,
}

/// Shadow copy of a session held on behalf of one player.
#[derive(Debug, Clone)]
pub struct SessionView {
    identity: PlayerId,
    shadow: Option<SessionPatch>,
    /// Local flips not yet echoed back, oldest first.
    unconfirmed: Vec<CardId>,
}

impl SessionView {
    /// Empty view for `identity`.
    pub fn new(identity: PlayerId) -> Self {
        Self {
            identity,
            shadow: None,
            unconfirmed: Vec::new(),
        }
    }

    /// Player the view belongs to.
    pub fn identity(&self) -> PlayerId {
        self.identity
    }

    /// Current local state, if any patch has been received.
    pub fn shadow(&self) -> Option<&SessionPatch> {
        self.shadow.as_ref()
    }

    /// Flip `card_id` locally before the coordinator confirms it.
    ///
    /// Returns `false` when there is nothing to flip (no state yet, unknown card, card
    /// already face up or claimed, or session over).
    pub fn apply_optimistic(&mut self, card_id: CardId) -> bool {
        let flipped = match self.shadow.as_mut() {
            Some(shadow) if shadow.is_active() => shadow.reveal(card_id),
            _ => false,
        };
        if flipped {
            self.unconfirmed.push(card_id);
        }
        flipped
    }

    /// Local flips still waiting for their echo.
    pub fn unconfirmed(&self) -> &[CardId] {
        &self.unconfirmed
    }

    /// Fold an authoritative patch into the view.
    ///
    /// A patch tagged with this view's identity is an echo of a local move. It never
    /// replaces a strictly newer local state, and it counts as a confirmation when the
    /// local view already shows its content, possibly with further unconfirmed flips on
    /// top; those flips stay visible. Foreign patches replace the whole view unless they
    /// are older than it.
    pub fn reconcile(&mut self, patch: &SessionPatch) -> Reconciliation {
        let Some(local) = self.shadow.as_ref() else {
            self.adopt(patch);
            return Reconciliation::Adopted;
        };

        if local.session_id != patch.session_id {
            self.adopt(patch);
            return Reconciliation::Adopted;
        }

        if patch.version < local.version {
            return Reconciliation::IgnoredStale;
        }

        if patch.last_actor != Some(self.identity) {
            self.adopt(patch);
            return Reconciliation::Adopted;
        }

        let mut replayed = patch.clone();
        let pending: Vec<CardId> = self
            .unconfirmed
            .iter()
            .copied()
            .filter(|card_id| replayed.reveal(*card_id))
            .collect();

        if !same_game_state(local, &replayed) {
            self.adopt(patch);
            return Reconciliation::Adopted;
        }

        self.shadow = Some(replayed);
        self.unconfirmed = pending;
        Reconciliation::Confirmed
    }

    /// Reset the view to the last durable snapshot after a rejected local move.
    pub fn rollback(&mut self, durable: SessionPatch) {
        self.shadow = Some(durable);
        self.unconfirmed.clear();
    }

    fn adopt(&mut self, patch: &SessionPatch) {
        self.shadow = Some(patch.clone());
        self.unconfirmed.clear();
    }
}

fn same_game_state(left: &SessionPatch, right: &SessionPatch) -> bool {
    left.board == right.board
        && left.turn_owner == right.turn_owner
        && left.matches_a == right.matches_a
        && left.matches_b == right.matches_b
        && left.status == right.status
        && left.winner == right.winner
}
