#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::SessionEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for game sessions.
///
/// Writes are compare-and-swap: [`SessionStore::save_session`] only succeeds when the
/// stored record is still at `expected_version`, so the authoritative copy never regresses.
pub trait SessionStore: Send + Sync {
    /// Insert a brand new session; fails with `AlreadyExists` when the id is taken.
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a session whose stored version equals `expected_version`.
    fn save_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Active session `player` takes part in, if any.
    fn find_active_session(
        &self,
        player: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
