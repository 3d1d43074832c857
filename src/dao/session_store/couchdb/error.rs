use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures of the CouchDB session store.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build the CouchDB HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// Reaching the database itself failed (`action` is "query" or "create").
    #[error("failed to {action} CouchDB database `{database}`")]
    Database {
        database: String,
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB database `{database}` answered {status}")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A document with the session id is already stored.
    #[error("session `{id}` already exists")]
    DuplicateSession { id: Uuid },
    /// The stored document is not at the version the write expects, or its revision moved.
    #[error("session `{id}` is not at version {expected} (stored: {actual:?})")]
    VersionConflict {
        id: Uuid,
        expected: u64,
        actual: Option<u64>,
    },
}
