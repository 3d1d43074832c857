//! Process-local session store, used when no database is configured and in tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::SessionEntity,
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Session store keeping every snapshot in a concurrent map.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, session: SessionEntity) -> StorageResult<()> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists { id: session.id }),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    fn save(&self, session: SessionEntity, expected_version: u64) -> StorageResult<()> {
        let id = session.id;
        let Some(mut stored) = self.sessions.get_mut(&id) else {
            return Err(StorageError::VersionConflict {
                id,
                expected: expected_version,
                actual: None,
            });
        };

        if stored.version != expected_version {
            return Err(StorageError::VersionConflict {
                id,
                expected: expected_version,
                actual: Some(stored.version),
            });
        }

        *stored = session;
        Ok(())
    }

    fn find_active(&self, player: Uuid) -> Option<SessionEntity> {
        self.sessions
            .iter()
            .filter(|entry| entry.is_active() && entry.has_player(player))
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone())
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.create(session);
        Box::pin(async move { result })
    }

    fn save_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.save(session, expected_version);
        Box::pin(async move { result })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self.sessions.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn find_active_session(
        &self,
        player: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self.find_active(player);
        Box::pin(async move { Ok(found) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::SessionStatusEntity,
        state::{
            board::{self, TokenCatalog},
            session::{Seat, Session},
        },
    };

    fn entity() -> SessionEntity {
        let session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            board::generate(&TokenCatalog::default()),
            Seat::A,
        );
        SessionEntity::from(&session)
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = MemorySessionStore::new();
        let session = entity();
        store.create_session(session.clone()).await.unwrap();

        let found = store.find_session(session.id).await.unwrap();
        assert_eq!(found, Some(session.clone()));

        let err = store.create_session(session).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn save_requires_expected_version() {
        let store = MemorySessionStore::new();
        let mut session = entity();
        store.create_session(session.clone()).await.unwrap();

        session.version = 1;
        store.save_session(session.clone(), 0).await.unwrap();

        let mut stale = session.clone();
        stale.version = 1;
        stale.turn_owner = stale.player_b;
        let err = store.save_session(stale, 0).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict {
                expected: 0,
                actual: Some(1),
                ..
            }
        ));

        let stored = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn save_of_unknown_session_conflicts() {
        let store = MemorySessionStore::new();
        let err = store.save_session(entity(), 0).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict { actual: None, .. }
        ));
    }

    #[tokio::test]
    async fn active_session_lookup_ignores_completed_ones() {
        let store = MemorySessionStore::new();
        let mut done = entity();
        let player = done.player_a;
        done.status = SessionStatusEntity::Completed;
        store.create_session(done).await.unwrap();

        assert_eq!(store.find_active_session(player).await.unwrap(), None);

        let mut live = entity();
        live.player_b = player;
        store.create_session(live.clone()).await.unwrap();

        let found = store.find_active_session(player).await.unwrap().unwrap();
        assert_eq!(found.id, live.id);
    }
}
