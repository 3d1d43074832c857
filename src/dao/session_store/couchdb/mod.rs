mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchSessionStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::VersionConflict {
                id,
                expected,
                actual,
            } => StorageError::VersionConflict {
                id,
                expected,
                actual,
            },
            CouchDaoError::DuplicateSession { id } => StorageError::AlreadyExists { id },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
