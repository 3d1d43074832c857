use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Mutex, OwnedMutexGuard, RwLock, broadcast},
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    dto::session::SessionPatch,
    error::ServiceError,
    state::{
        feed::PatchFeed,
        rules::{InvalidMoveReason, MoveError},
        session::{PendingSelection, PlayerId, Session, SessionId},
        session_machine::{Plan, PlanEffect, PlanId, SessionEvent, SessionMachine, TurnPhase},
    },
};

/// How a mutation behaves when another one holds the session gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queue behind the current holder.
    Wait,
    /// Fail immediately with the move rejection matching the caller.
    RejectIfBusy,
}

/// Result of a mutation that was persisted and applied.
#[derive(Debug, Clone)]
pub struct Committed {
    /// What the mutation did.
    pub effect: PlanEffect,
    /// Session after the mutation.
    pub session: Session,
    /// Patch broadcast to observers.
    pub patch: SessionPatch,
}

/// Coordinator for one live session: its state machine, the gate serializing
/// mutations, the resolving flag and the patch feed.
pub struct SessionHandle {
    id: SessionId,
    machine: RwLock<SessionMachine>,
    gate: Arc<Mutex<()>>,
    resolving: AtomicBool,
    feed: PatchFeed,
    transition_timeout: Option<Duration>,
}

impl SessionHandle {
    /// Wrap a committed session.
    pub fn new(session: Session, feed_capacity: usize, transition_timeout: Option<Duration>) -> Self {
        Self {
            id: session.id,
            machine: RwLock::new(SessionMachine::new(session)),
            gate: Arc::new(Mutex::new(())),
            resolving: AtomicBool::new(false),
            feed: PatchFeed::new(feed_capacity),
            transition_timeout,
        }
    }

    /// Identifier of the coordinated session.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Copy of the last committed session.
    pub async fn session(&self) -> Session {
        self.machine.read().await.session().clone()
    }

    /// Patch describing the last committed session.
    pub async fn patch(&self) -> SessionPatch {
        SessionPatch::from(self.machine.read().await.session())
    }

    /// Cards flipped since the last resolution.
    pub async fn selection(&self) -> PendingSelection {
        self.machine.read().await.selection().clone()
    }

    /// Current turn phase.
    pub async fn phase(&self) -> TurnPhase {
        self.machine.read().await.phase()
    }

    /// Subscribe to patches committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionPatch> {
        self.feed.subscribe()
    }

    /// Number of connected observers.
    pub fn subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }

    /// Whether a pair resolution is outstanding.
    pub fn is_resolving(&self) -> bool {
        self.resolving.load(Ordering::Acquire)
    }

    /// Raise the resolving flag; `None` when a resolution is already outstanding.
    pub fn begin_resolving(self: &Arc<Self>) -> Option<ResolvingGuard> {
        self.resolving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ResolvingGuard {
                handle: Arc::clone(self),
            })
    }

    /// Rejection returned to `actor` while the session cannot take their move.
    pub async fn busy_rejection(&self, actor: PlayerId) -> MoveError {
        let machine = self.machine.read().await;
        let session = machine.session();
        if !session.is_active() {
            MoveError::GameNotActive
        } else if session.turn_owner != actor {
            MoveError::NotYourTurn
        } else {
            MoveError::from(InvalidMoveReason::MoveInProgress)
        }
    }

    /// Plan `event`, run `persist` on the candidate session, then apply or abort the plan.
    ///
    /// The mutation runs on its own task, which owns the gate until the plan is applied
    /// or aborted; dropping the returned future does not cancel it. The patch is
    /// published before the gate is released so subscribers observe commits in version
    /// order.
    pub async fn run_mutation<F, Fut>(
        self: &Arc<Self>,
        event: SessionEvent,
        admission: Admission,
        persist: F,
    ) -> Result<Committed, ServiceError>
    where
        F: FnOnce(Session) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let gate = self.enter(&event, admission).await?;
        let handle = Arc::clone(self);
        let task = tokio::spawn(async move {
            let committed = handle.commit(event, persist).await;
            drop(gate);
            committed
        });

        task.await.map_err(|err| {
            ServiceError::InvalidState(format!("session mutation task failed: {err}"))
        })?
    }

    /// Replace the live state with `stored` when storage holds a newer version.
    ///
    /// Returns the published patch, or `None` when `stored` is not ahead of memory.
    pub async fn resync(&self, stored: Session) -> Option<SessionPatch> {
        let _gate = self.gate.lock().await;
        let mut machine = self.machine.write().await;
        if stored.id != self.id
            || machine.has_pending()
            || stored.version <= machine.session().version
        {
            return None;
        }

        let from = machine.session().version;
        *machine = SessionMachine::new(stored);
        let patch = SessionPatch::from(machine.session());
        drop(machine);

        self.feed.publish(patch.clone());
        debug!(session_id = %self.id, from, to = patch.version, "session replaced by stored snapshot");
        Some(patch)
    }

    async fn commit<F, Fut>(&self, event: SessionEvent, persist: F) -> Result<Committed, ServiceError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let Plan {
            id: plan_id,
            session: candidate,
            effect,
            from,
            to,
            pending_since,
            ..
        } = self.machine.write().await.plan(event.clone())?;

        let work = persist(candidate);
        let outcome = match self.transition_timeout {
            Some(limit) => timeout(limit, work)
                .await
                .unwrap_or(Err(ServiceError::Timeout)),
            None => work.await,
        };

        if let Err(err) = outcome {
            let reason = match err {
                ServiceError::Timeout => "timeout",
                _ => "persistence failure",
            };
            self.abort(plan_id, &event, reason).await;
            return Err(err);
        }

        let session = self.machine.write().await.apply(plan_id)?;
        let patch = SessionPatch::from(&session);
        self.feed.publish(patch.clone());
        debug!(
            session_id = %self.id,
            version = session.version,
            ?from,
            ?to,
            elapsed_ms = pending_since.elapsed().as_millis() as u64,
            "session mutation committed"
        );

        Ok(Committed {
            effect,
            session,
            patch,
        })
    }

    async fn enter(
        &self,
        event: &SessionEvent,
        admission: Admission,
    ) -> Result<OwnedMutexGuard<()>, ServiceError> {
        match admission {
            Admission::Wait => Ok(Arc::clone(&self.gate).lock_owned().await),
            Admission::RejectIfBusy => match Arc::clone(&self.gate).try_lock_owned() {
                Ok(gate) => Ok(gate),
                Err(_) => {
                    let rejection = match event {
                        SessionEvent::Select { actor, .. } => self.busy_rejection(*actor).await,
                        SessionEvent::Resolve => {
                            MoveError::from(InvalidMoveReason::MoveInProgress)
                        }
                    };
                    Err(rejection.into())
                }
            },
        }
    }

    async fn abort(&self, plan_id: PlanId, event: &SessionEvent, reason: &'static str) {
        if let Err(abort_err) = self.machine.write().await.abort(plan_id) {
            warn!(
                session_id = %self.id,
                event = ?event,
                plan_id = %plan_id,
                error = ?abort_err,
                "failed to abort session mutation after {reason}"
            );
        }
    }
}

/// Holds the resolving flag of a session; dropping it clears the flag.
pub struct ResolvingGuard {
    handle: Arc<SessionHandle>,
}

impl ResolvingGuard {
    /// Session the guard belongs to.
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        self.handle.resolving.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::{
        board::{Board, Card, CardId},
        session::Seat,
    };

    fn handle() -> (Arc<SessionHandle>, PlayerId, PlayerId) {
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
        (
            Arc::new(SessionHandle::new(session, 8, Some(Duration::from_secs(1)))),
            a,
            b,
        )
    }

    async fn persisted(_: Session) -> Result<(), ServiceError> {
        Ok(())
    }

    #[tokio::test]
    async fn committed_mutation_is_broadcast() {
        let (handle, a, _) = handle();
        let mut rx = handle.subscribe();

        let committed = handle
            .run_mutation(
                SessionEvent::Select { actor: a, card_id: 0 },
                Admission::RejectIfBusy,
                persisted,
            )
            .await
            .unwrap();

        assert_eq!(committed.session.version, 1);
        let patch = rx.recv().await.unwrap();
        assert_eq!(patch, committed.patch);
        assert_eq!(patch.last_actor, Some(a));
        assert_eq!(handle.phase().await, TurnPhase::PendingOne(0));
    }

    #[tokio::test]
    async fn failed_persistence_rolls_back() {
        let (handle, a, _) = handle();
        let before = handle.session().await;
        let mut rx = handle.subscribe();

        let err = handle
            .run_mutation(
                SessionEvent::Select { actor: a, card_id: 0 },
                Admission::Wait,
                |_| async { Err(ServiceError::Degraded) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Degraded));
        assert_eq!(handle.session().await, before);
        assert!(handle.selection().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_persistence_times_out_and_rolls_back() {
        let (handle, a, _) = handle();
        let handle = Arc::new(SessionHandle::new(
            handle.session().await,
            8,
            Some(Duration::from_millis(10)),
        ));

        let err = handle
            .run_mutation(
                SessionEvent::Select { actor: a, card_id: 0 },
                Admission::Wait,
                |_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Timeout));
        assert_eq!(handle.session().await.version, 0);
    }

    #[tokio::test]
    async fn cancelled_caller_does_not_strand_the_plan() {
        let (handle, a, _) = handle();

        let caller = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                handle
                    .run_mutation(
                        SessionEvent::Select { actor: a, card_id: 0 },
                        Admission::RejectIfBusy,
                        |_| async {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                            Ok(())
                        },
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();
        let _ = caller.await;

        let committed = timeout(
            Duration::from_secs(3),
            handle.run_mutation(
                SessionEvent::Select { actor: a, card_id: 2 },
                Admission::Wait,
                persisted,
            ),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(committed.session.version, 1);
        assert_eq!(handle.phase().await, TurnPhase::PendingOne(2));
    }

    #[tokio::test]
    async fn cancelled_caller_still_commits() {
        let (handle, a, _) = handle();
        let mut rx = handle.subscribe();

        let caller = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                handle
                    .run_mutation(
                        SessionEvent::Select { actor: a, card_id: 0 },
                        Admission::RejectIfBusy,
                        |_| async {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(())
                        },
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();

        let patch = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patch.version, 1);
        assert_eq!(handle.phase().await, TurnPhase::PendingOne(0));
    }

    #[tokio::test]
    async fn resync_adopts_only_newer_stored_state() {
        let (handle, a, _) = handle();
        let mut rx = handle.subscribe();

        let mut ahead = SessionMachine::new(handle.session().await);
        let plan = ahead
            .plan(SessionEvent::Select { actor: a, card_id: 0 })
            .unwrap();
        let stored = ahead.apply(plan.id).unwrap();

        let patch = handle.resync(stored.clone()).await.unwrap();
        assert_eq!(patch.version, 1);
        assert_eq!(rx.recv().await.unwrap(), patch);
        assert_eq!(handle.phase().await, TurnPhase::PendingOne(0));

        assert!(handle.resync(stored).await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_owner_is_rejected_without_mutation() {
        let (handle, _, b) = handle();

        let err = handle
            .run_mutation(
                SessionEvent::Select { actor: b, card_id: 0 },
                Admission::RejectIfBusy,
                persisted,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Move(MoveError::NotYourTurn)));
        assert_eq!(handle.session().await.version, 0);
    }

    #[tokio::test]
    async fn busy_gate_rejects_instead_of_queueing() {
        let (handle, a, b) = handle();
        let _gate = handle.gate.lock().await;

        let err = handle
            .run_mutation(
                SessionEvent::Select { actor: a, card_id: 0 },
                Admission::RejectIfBusy,
                persisted,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Move(MoveError::InvalidMove(InvalidMoveReason::MoveInProgress))
        ));

        let err = handle
            .run_mutation(
                SessionEvent::Select { actor: b, card_id: 0 },
                Admission::RejectIfBusy,
                persisted,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Move(MoveError::NotYourTurn)));
    }

    #[tokio::test]
    async fn resolving_guard_is_exclusive_and_released_on_drop() {
        let (handle, _, _) = handle();

        let guard = handle.begin_resolving().unwrap();
        assert!(handle.is_resolving());
        assert!(handle.begin_resolving().is_none());

        drop(guard);
        assert!(!handle.is_resolving());
        assert!(handle.begin_resolving().is_some());
    }

    #[tokio::test]
    async fn resolving_guard_is_released_when_task_is_cancelled() {
        let (handle, _, _) = handle();
        let guard = handle.begin_resolving().unwrap();

        let task = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        task.abort();
        let _ = task.await;

        assert!(!handle.is_resolving());
    }
}
