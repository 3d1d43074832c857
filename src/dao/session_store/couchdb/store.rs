use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchSessionDocument, FindResponse, active_for_player, session_doc_id},
};

const FIND_PATH: &str = "_find";

/// CouchDB-backed [`SessionStore`] talking to the HTTP API with `reqwest`.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSessionStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth: config
                .credentials
                .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass))),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: database.clone(),
                action: "query",
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Database {
                        database: database.clone(),
                        action: "create",
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document and return the response status; only transport errors fail here.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<StatusCode>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;
        Ok(response.status())
    }

    async fn create_session(&self, session: SessionEntity) -> CouchResult<()> {
        let id = session.id;
        let doc_id = session_doc_id(id);
        let document = CouchSessionDocument::new(session, None);

        match self.put_document(&doc_id, &document).await? {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::DuplicateSession { id }),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id,
                status,
            }),
        }
    }

    async fn save_session(&self, session: SessionEntity, expected_version: u64) -> CouchResult<()> {
        let id = session.id;
        let doc_id = session_doc_id(id);

        let Some(existing) = self.get_document::<CouchSessionDocument>(&doc_id).await? else {
            return Err(CouchDaoError::VersionConflict {
                id,
                expected: expected_version,
                actual: None,
            });
        };
        if existing.session.version != expected_version {
            return Err(CouchDaoError::VersionConflict {
                id,
                expected: expected_version,
                actual: Some(existing.session.version),
            });
        }

        // The revision guards the window between the read and the write.
        let document = CouchSessionDocument::new(session, existing.rev);
        match self.put_document(&doc_id, &document).await? {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::VersionConflict {
                id,
                expected: expected_version,
                actual: None,
            }),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id,
                status,
            }),
        }
    }

    async fn find_session(&self, id: Uuid) -> CouchResult<Option<SessionEntity>> {
        let document = self
            .get_document::<CouchSessionDocument>(&session_doc_id(id))
            .await?;
        Ok(document.map(|doc| doc.session))
    }

    async fn find_active_session(&self, player: Uuid) -> CouchResult<Option<SessionEntity>> {
        let response = self
            .request(Method::POST, FIND_PATH)
            .json(&active_for_player(player))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND_PATH.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND_PATH.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<FindResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: FIND_PATH.to_string(),
                source,
            }
        })?;

        Ok(payload
            .docs
            .into_iter()
            .map(|doc| doc.session)
            .max_by_key(|session| session.created_at))
    }

    async fn health_check(&self) -> CouchResult<()> {
        let url = self.database_url();
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            })
        }
    }
}

impl SessionStore for CouchSessionStore {
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
        Box::pin(async move { store.health_check().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
