use crate::protocol::{NetComponentId, NetEntityId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BindError {
    #[error("Value encode error: {0}")]
    Encode(String),

    #[error("Value decode error: {0}")]
    Decode(String),

    #[error("Malformed update for entity {net_entity_id}")]
    MalformedUpdate { net_entity_id: NetEntityId },

    #[error("Update addressed to entity {actual}, bound entity is {expected}")]
    EntityMismatch {
        expected: NetEntityId,
        actual: NetEntityId,
    },

    #[error("No multiplayer component with id {0}")]
    UnknownComponent(NetComponentId),

    #[error("Entity {0} has not been pre-initialized")]
    NotInitialized(NetEntityId),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, BindError>;
