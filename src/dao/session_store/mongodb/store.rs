use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{MongoSessionDocument, active_for_player, doc_id, doc_id_at_version, stored_version},
};
use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

const SESSION_COLLECTION_NAME: &str = "sessions";

/// MongoDB-backed [`SessionStore`]; the connection can be swapped on reconnect.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let indexes = [
            ("player_a_status_idx", "player_a,status", doc! { "player_a": 1, "status": 1 }),
            ("player_b_status_idx", "player_b,status", doc! { "player_b": 1, "status": 1 }),
        ];

        for (name, index, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            collection
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: SESSION_COLLECTION_NAME,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn create_session(&self, session: SessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document = MongoSessionDocument::try_from(session)?;
        self.collection()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                if is_duplicate_key(&source) {
                    MongoDaoError::DuplicateSession { id }
                } else {
                    MongoDaoError::InsertSession { id, source }
                }
            })?;
        Ok(())
    }

    async fn save_session(&self, session: SessionEntity, expected_version: u64) -> MongoResult<()> {
        let id = session.id;
        let filter = doc_id_at_version(id, stored_version(expected_version)?);
        let document = MongoSessionDocument::try_from(session)?;

        let result = self
            .collection()
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionConflict {
                id,
                expected: expected_version,
            });
        }
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_active_session(&self, player: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .collection()
            .await
            .find_one(active_for_player(player))
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|source| MongoDaoError::FindActive { player, source })?;
        Ok(document.map(Into::into))
    }
}

impl SessionStore for MongoSessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_session(session).await.map_err(Into::into) })
    }

    fn save_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_session(session, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn find_active_session(
        &self,
        player: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_active_session(player).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
