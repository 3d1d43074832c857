use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const URI_VAR: &str = "MONGO_URI";
const DATABASE_VAR: &str = "MONGO_DB";
const DEFAULT_DATABASE: &str = "flag_duel";
const APP_NAME: &str = "flag-duel-back";

/// Where the session collection lives.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`; sessions go to `database`, or `flag_duel` when unset or blank.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());

        let database_name = database
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DATABASE)
            .to_owned();

        Ok(Self {
            options,
            database_name,
        })
    }

    pub async fn from_env() -> MongoResult<Self> {
        let uri =
            std::env::var(URI_VAR).map_err(|_| MongoDaoError::MissingEnvVar { var: URI_VAR })?;
        let database = std::env::var(DATABASE_VAR).ok();
        Self::from_uri(&uri, database.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_database_falls_back_to_default() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", Some("  "))
            .await
            .unwrap();
        assert_eq!(config.database_name, DEFAULT_DATABASE);
        assert_eq!(config.options.app_name.as_deref(), Some(APP_NAME));

        let named = MongoConfig::from_uri("mongodb://localhost:27017/?appName=ops", Some("duels"))
            .await
            .unwrap();
        assert_eq!(named.database_name, "duels");
        assert_eq!(named.options.app_name.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected() {
        let err = MongoConfig::from_uri("postgres://localhost", None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MongoDaoError::InvalidUri { .. }));
    }
}
