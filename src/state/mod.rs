pub mod board;
mod feed;
pub mod handle;
pub mod rules;
pub mod session;
pub mod session_machine;
pub mod view;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::session_store::SessionStore,
    error::ServiceError,
    state::session::{Session, SessionId},
};

pub use self::feed::PatchFeed;
pub use self::handle::{Admission, Committed, ResolvingGuard, SessionHandle};
pub use self::session_machine::{AbortError, ApplyError, Plan, PlanError, PlanId};

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, the storage handle and the registry of
/// live sessions.
pub struct AppState {
    config: Arc<AppConfig>,
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            session_store: RwLock::new(None),
            sessions: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current session store, or [`ServiceError::Degraded`] when storage is down.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Live coordinator of session `id`, if it is loaded.
    pub fn session(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Register a committed session, returning the already loaded coordinator when
    /// another request won the race.
    pub fn install_session(&self, session: Session) -> Arc<SessionHandle> {
        let config = &self.config;
        self.sessions
            .entry(session.id)
            .or_insert_with(|| {
                Arc::new(SessionHandle::new(
                    session,
                    config.feed_capacity(),
                    config.transition_timeout(),
                ))
            })
            .clone()
    }

    /// Drop the coordinator of a finished session nobody observes anymore.
    pub fn evict_session(&self, id: SessionId) -> bool {
        self.sessions
            .remove_if(&id, |_, handle| {
                Arc::strong_count(handle) == 1 && handle.subscriber_count() == 0
            })
            .is_some()
    }

    /// Number of loaded sessions.
    pub fn loaded_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        dao::session_store::memory::MemorySessionStore,
        state::{
            board::{self, TokenCatalog},
            session::Seat,
        },
    };

    fn session() -> Session {
        Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            board::generate(&TokenCatalog::default()),
            Seat::A,
        )
    }

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_session_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_session_store().await.is_ok());

        state.clear_session_store().await;
        assert!(state.is_degraded());
    }

    #[test]
    fn install_keeps_the_first_coordinator() {
        let state = AppState::new(AppConfig::default());
        let session = session();

        let first = state.install_session(session.clone());
        let mut newer = session.clone();
        newer.version = 9;
        let second = state.install_session(newer);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.loaded_sessions(), 1);
    }

    #[test]
    fn eviction_spares_observed_sessions() {
        let state = AppState::new(AppConfig::default());
        let session = session();
        let id = session.id;

        let handle = state.install_session(session);
        assert!(!state.evict_session(id));

        drop(handle);
        assert!(state.evict_session(id));
        assert!(state.session(id).is_none());
    }
}
