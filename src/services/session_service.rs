use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{models::SessionEntity, session_store::SessionStore},
    dto::session::{CreateSessionRequest, SessionPatch},
    error::ServiceError,
    state::{
        Admission, Committed, SessionHandle, SharedState,
        board::CardId,
        rules::{self, InvalidMoveReason, MoveError, Outcome, PairResult, ResolutionOutcome},
        session::{PlayerId, Session, SessionId},
        session_machine::{PlanEffect, SessionEvent, TurnPhase},
    },
};

const RESOLVE_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(200);
const RESOLVE_RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Open a session between two players on a freshly shuffled board.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionPatch, ServiceError> {
    let CreateSessionRequest { player_a, player_b } = request;
    if player_a == player_b {
        return Err(ServiceError::InvalidInput(
            "a session requires two different players".into(),
        ));
    }

    let store = state.require_session_store().await?;
    for player in [player_a, player_b] {
        if let Some(existing) = bounded(state, store.find_active_session(player)).await?? {
            return Err(ServiceError::Conflict(format!(
                "player `{player}` is already playing session `{}`",
                existing.id
            )));
        }
    }

    let session = Session::start(player_a, player_b, state.config().catalog());
    bounded(state, store.create_session(SessionEntity::from(&session))).await??;

    let handle = state.install_session(session);
    let patch = handle.patch().await;
    info!(
        session_id = %patch.session_id,
        %player_a,
        %player_b,
        first = %patch.turn_owner,
        "session created"
    );
    Ok(patch)
}

/// Coordinator of session `id`, loading it from storage when it is not live yet.
pub async fn load_session(
    state: &SharedState,
    id: SessionId,
) -> Result<Arc<SessionHandle>, ServiceError> {
    if let Some(handle) = state.session(id) {
        return Ok(handle);
    }

    let store = state.require_session_store().await?;
    let Some(entity) = bounded(state, store.find_session(id)).await?? else {
        return Err(ServiceError::NotFound(format!("session `{id}` not found")));
    };

    let version = entity.version;
    let handle = state.install_session(entity.into());
    info!(session_id = %id, version, "session loaded from storage");

    if matches!(handle.phase().await, TurnPhase::PendingTwo(..)) {
        schedule_resolution(state, Arc::clone(&handle));
    }

    Ok(handle)
}

/// Latest committed snapshot of session `id`.
pub async fn get_session(state: &SharedState, id: SessionId) -> Result<SessionPatch, ServiceError> {
    let handle = load_session(state, id).await?;
    Ok(handle.patch().await)
}

/// Flip `card_id` on behalf of `actor`, persist the reveal and broadcast it.
///
/// When the flip completes a pair, resolution is scheduled after the reveal delay.
pub async fn apply_move(
    state: &SharedState,
    session_id: SessionId,
    actor: PlayerId,
    card_id: CardId,
) -> Result<SessionPatch, ServiceError> {
    let handle = load_session(state, session_id).await?;
    if handle.is_resolving() {
        let rejection = handle.busy_rejection(actor).await;
        debug!(session_id = %session_id, %actor, card_id, %rejection, "move rejected during resolution");
        return Err(rejection.into());
    }

    let store = state.require_session_store().await?;
    let result = handle
        .run_mutation(
            SessionEvent::Select { actor, card_id },
            Admission::RejectIfBusy,
            |candidate| persist(store, candidate),
        )
        .await;

    match result {
        Ok(Committed { effect, patch, .. }) => {
            info!(session_id = %session_id, %actor, card_id, version = patch.version, "card revealed");
            if let PlanEffect::Selected(selection) = effect {
                if selection.pair_complete {
                    schedule_resolution(state, handle);
                }
            }
            Ok(patch)
        }
        Err(err @ ServiceError::Move(MoveError::InvalidMove(InvalidMoveReason::SelectionFull))) => {
            warn!(session_id = %session_id, "found an unresolved pair; scheduling resolution");
            schedule_resolution(state, handle);
            Err(err)
        }
        Err(err) => {
            debug!(session_id = %session_id, %actor, card_id, error = %err, "move rejected");
            resync_after(state, &handle, &err).await;
            Err(err)
        }
    }
}

/// Resolve the pending pair of `handle` after the reveal delay, unless a resolution is
/// already outstanding.
pub fn schedule_resolution(state: &SharedState, handle: Arc<SessionHandle>) {
    let Some(guard) = handle.begin_resolving() else {
        debug!(session_id = %handle.id(), "resolution already scheduled");
        return;
    };

    let state = Arc::clone(state);
    tokio::spawn(async move {
        let config = state.config();
        let handle = guard.handle();
        let session_id = handle.id();
        sleep(config.reveal_delay()).await;

        let attempts = config.resolve_attempts();
        let mut delay = RESOLVE_RETRY_INITIAL_DELAY;
        for attempt in 1..=attempts {
            match resolve_pending(&state, handle).await {
                Ok(outcome) => {
                    log_resolution(session_id, &outcome);
                    break;
                }
                Err(ServiceError::Move(reason)) => {
                    debug!(session_id = %session_id, %reason, "nothing to resolve");
                    break;
                }
                Err(err) if attempt < attempts => {
                    warn!(session_id = %session_id, attempt, error = %err, "pair resolution failed; retrying");
                    resync_after(&state, handle, &err).await;
                    sleep(delay).await;
                    delay = (delay * 2).min(RESOLVE_RETRY_MAX_DELAY);
                }
                Err(err) => {
                    error!(
                        session_id = %session_id,
                        attempts,
                        error = %err,
                        "pair resolution failed; the next move will retry"
                    );
                    resync_after(&state, handle, &err).await;
                }
            }
        }

        drop(guard);
    });
}

async fn resolve_pending(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
) -> Result<ResolutionOutcome, ServiceError> {
    let store = state.require_session_store().await?;
    let committed = handle
        .run_mutation(SessionEvent::Resolve, Admission::Wait, |candidate| {
            persist(store, candidate)
        })
        .await?;

    match committed.effect {
        PlanEffect::Resolved(outcome) => Ok(outcome),
        PlanEffect::Selected(_) => Err(ServiceError::InvalidState(
            "resolution committed a card selection".into(),
        )),
    }
}

/// Reload `handle` from storage after a write whose outcome is unknown.
///
/// A timed out or conflicting write may have landed, leaving storage ahead of memory.
async fn resync_after(state: &SharedState, handle: &Arc<SessionHandle>, err: &ServiceError) {
    if !matches!(err, ServiceError::Timeout | ServiceError::Conflict(_)) {
        return;
    }

    let session_id = handle.id();
    let stored = match state.require_session_store().await {
        Ok(store) => bounded(state, store.find_session(session_id))
            .await
            .and_then(|found| found),
        Err(err) => Err(err),
    };

    match stored {
        Ok(Some(entity)) => {
            let Some(patch) = handle.resync(entity.into()).await else {
                return;
            };
            info!(session_id = %session_id, version = patch.version, "session resynchronized from storage");
            if matches!(handle.phase().await, TurnPhase::PendingTwo(..)) {
                schedule_resolution(state, Arc::clone(handle));
            }
        }
        Ok(None) => warn!(session_id = %session_id, "session missing from storage during resync"),
        Err(err) => warn!(session_id = %session_id, error = %err, "session resync failed"),
    }
}

fn log_resolution(session_id: SessionId, outcome: &ResolutionOutcome) {
    let [first, second] = outcome.cards;
    match &outcome.result {
        PairResult::Match { token } => {
            info!(session_id = %session_id, first, second, token = %token, "pair matched")
        }
        PairResult::Mismatch => {
            info!(session_id = %session_id, first, second, next = %outcome.turn_owner, "pair mismatched; turn passes")
        }
    }
    if let Some(standing) = outcome.completed {
        info!(session_id = %session_id, ?standing, "session completed");
    }
}

/// Result of a completed session for `viewer`.
pub async fn outcome(
    state: &SharedState,
    id: SessionId,
    viewer: PlayerId,
) -> Result<Outcome, ServiceError> {
    let session = load_session(state, id).await?.session().await;
    if !session.has_player(viewer) {
        return Err(ServiceError::NotFound(format!(
            "player `{viewer}` does not take part in session `{id}`"
        )));
    }

    rules::outcome_for(&session, viewer)
        .ok_or_else(|| ServiceError::InvalidState(format!("session `{id}` is still active")))
}

/// Active session `player` takes part in.
pub async fn find_active_session(
    state: &SharedState,
    player: Uuid,
) -> Result<SessionPatch, ServiceError> {
    let store = state.require_session_store().await?;
    let Some(entity) = bounded(state, store.find_active_session(player)).await?? else {
        return Err(ServiceError::NotFound(format!(
            "player `{player}` has no active session"
        )));
    };
    get_session(state, entity.id).await
}

/// Forget a finished session once its last observer left.
pub async fn release_session(state: &SharedState, handle: Arc<SessionHandle>) {
    let id = handle.id();
    let finished = !handle.session().await.is_active();
    drop(handle);

    if finished && state.evict_session(id) {
        debug!(session_id = %id, "evicted finished session");
    }
}

async fn persist(store: Arc<dyn SessionStore>, candidate: Session) -> Result<(), ServiceError> {
    let expected_version = candidate.version.saturating_sub(1);
    store
        .save_session(SessionEntity::from(&candidate), expected_version)
        .await
        .map_err(ServiceError::from)
}

/// Run a storage call under the configured transition timeout.
async fn bounded<T, F>(
    state: &SharedState,
    call: F,
) -> Result<Result<T, ServiceError>, ServiceError>
where
    F: Future<Output = Result<T, crate::dao::storage::StorageError>>,
{
    let mapped = async move { call.await.map_err(ServiceError::from) };
    match state.config().transition_timeout() {
        Some(limit) => timeout(limit, mapped).await.map_err(|_| ServiceError::Timeout),
        None => Ok(mapped.await),
    }
}
