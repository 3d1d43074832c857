use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::SessionEntity;

pub const SESSION_PREFIX: &str = "session::";

/// Session stored as a single CouchDB document; `_rev` carries CouchDB's own revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub session: SessionEntity,
}

impl CouchSessionDocument {
    pub fn new(session: SessionEntity, rev: Option<String>) -> Self {
        Self {
            id: session_doc_id(session.id),
            rev,
            session,
        }
    }
}

/// Response of the `_find` endpoint.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<CouchSessionDocument>,
}

pub fn session_doc_id(id: Uuid) -> String {
    format!("{SESSION_PREFIX}{id}")
}

/// Mango query selecting the active sessions `player` sits in.
pub fn active_for_player(player: Uuid) -> serde_json::Value {
    serde_json::json!({
        "selector": {
            "_id": { "$gt": SESSION_PREFIX },
            "status": "active",
            "$or": [
                { "player_a": player },
                { "player_b": player },
            ],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        board::{self, TokenCatalog},
        session::{Seat, Session},
    };

    #[test]
    fn document_flattens_the_entity_next_to_couch_metadata() {
        let session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            board::generate(&TokenCatalog::default()),
            Seat::B,
        );
        let entity = SessionEntity::from(&session);
        let doc = CouchSessionDocument::new(entity.clone(), Some("1-abc".into()));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], format!("session::{}", session.id));
        assert_eq!(json["_rev"], "1-abc");
        assert_eq!(json["status"], "active");
        assert_eq!(json["version"], 0);

        let parsed: CouchSessionDocument = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.session, entity);
    }
}
