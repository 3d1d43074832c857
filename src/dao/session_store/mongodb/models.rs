use mongodb::bson::{DateTime, Document, Uuid as BsonUuid, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{CardEntity, SessionEntity, SessionStatusEntity};

use super::error::MongoDaoError;

/// Session document stored in the `sessions` collection.
///
/// Identifiers are stored as BSON binary UUIDs and the version as a 64-bit integer so
/// the compare-and-swap filter can match on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: BsonUuid,
    player_a: BsonUuid,
    player_b: BsonUuid,
    turn_owner: BsonUuid,
    cards: Vec<CardEntity>,
    singleton_token: String,
    neutral_token: String,
    matches_a: Vec<String>,
    matches_b: Vec<String>,
    status: SessionStatusEntity,
    winner: Option<BsonUuid>,
    last_actor: Option<BsonUuid>,
    version: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl TryFrom<SessionEntity> for MongoSessionDocument {
    type Error = MongoDaoError;

    fn try_from(value: SessionEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: bson_uuid(value.id),
            player_a: bson_uuid(value.player_a),
            player_b: bson_uuid(value.player_b),
            turn_owner: bson_uuid(value.turn_owner),
            cards: value.cards,
            singleton_token: value.singleton_token,
            neutral_token: value.neutral_token,
            matches_a: value.matches_a,
            matches_b: value.matches_b,
            status: value.status,
            winner: value.winner.map(bson_uuid),
            last_actor: value.last_actor.map(bson_uuid),
            version: stored_version(value.version)?,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        })
    }
}

impl From<MongoSessionDocument> for SessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            id: plain_uuid(value.id),
            player_a: plain_uuid(value.player_a),
            player_b: plain_uuid(value.player_b),
            turn_owner: plain_uuid(value.turn_owner),
            cards: value.cards,
            singleton_token: value.singleton_token,
            neutral_token: value.neutral_token,
            matches_a: value.matches_a,
            matches_b: value.matches_b,
            status: value.status,
            winner: value.winner.map(plain_uuid),
            last_actor: value.last_actor.map(plain_uuid),
            version: value.version.max(0) as u64,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

pub fn bson_uuid(id: Uuid) -> BsonUuid {
    BsonUuid::from_bytes(id.into_bytes())
}

fn plain_uuid(id: BsonUuid) -> Uuid {
    Uuid::from_bytes(id.bytes())
}

pub fn stored_version(version: u64) -> Result<i64, MongoDaoError> {
    i64::try_from(version).map_err(|_| MongoDaoError::VersionOutOfRange(version))
}

pub fn doc_id(id: Uuid) -> Document {
    doc! { "_id": bson_uuid(id) }
}

/// Filter matching `id` only while it is still stored at `version`.
pub fn doc_id_at_version(id: Uuid, version: i64) -> Document {
    doc! { "_id": bson_uuid(id), "version": version }
}

/// Filter matching the active sessions `player` sits in.
pub fn active_for_player(player: Uuid) -> Document {
    doc! {
        "status": "active",
        "$or": [
            { "player_a": bson_uuid(player) },
            { "player_b": bson_uuid(player) },
        ],
    }
}
