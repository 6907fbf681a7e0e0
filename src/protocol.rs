use crate::role::{NetEntityRole, RpcDeliveryType};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a replicated entity, identical on every host.
pub type NetEntityId = u64;
/// Hosting framework's local entity identifier.
pub type EntityId = u64;
/// Stable per-type multiplayer component identifier. Its natural order is the
/// serialization order of an entity's components.
pub type NetComponentId = u16;
pub type RpcIndex = u16;
pub type HostId = u32;
pub type ConnectionId = u32;

pub const INVALID_NET_ENTITY_ID: NetEntityId = NetEntityId::MAX;

/// Identity of the prefab entity a networked entity was spawned from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefabEntityId {
    pub prefab_name: String,
    pub entity_offset: u32,
}

impl PrefabEntityId {
    pub fn new(prefab_name: impl Into<String>, entity_offset: u32) -> Self {
        Self {
            prefab_name: prefab_name.into(),
            entity_offset,
        }
    }
}

impl fmt::Display for PrefabEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.prefab_name, self.entity_offset)
    }
}

/// Pairs the network identity of an entity with its local handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkEntityHandle {
    pub net_entity_id: NetEntityId,
    pub entity_id: EntityId,
}

impl NetworkEntityHandle {
    pub fn new(net_entity_id: NetEntityId, entity_id: EntityId) -> Self {
        Self {
            net_entity_id,
            entity_id,
        }
    }

    pub fn invalid() -> Self {
        Self {
            net_entity_id: INVALID_NET_ENTITY_ID,
            entity_id: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.net_entity_id != INVALID_NET_ENTITY_ID
    }
}

impl Default for NetworkEntityHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Lifecycle states reported by the hosting framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Constructed,
    Init,
    Activating,
    Active,
    Deactivating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntityRpcMessage {
    pub delivery_type: RpcDeliveryType,
    pub net_entity_id: NetEntityId,
    pub component_id: NetComponentId,
    pub rpc_index: RpcIndex,
    pub payload: Bytes,
}

impl NetworkEntityRpcMessage {
    pub fn new(
        delivery_type: RpcDeliveryType,
        net_entity_id: NetEntityId,
        component_id: NetComponentId,
        rpc_index: RpcIndex,
        payload: Bytes,
    ) -> Self {
        Self {
            delivery_type,
            net_entity_id,
            component_id,
            rpc_index,
            payload,
        }
    }

    pub fn set_delivery_type(&mut self, delivery_type: RpcDeliveryType) {
        self.delivery_type = delivery_type;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateKind {
    /// Bits dirtied since the last flush.
    Delta = 0,
    /// Every bit dirtied since the entity was created on the sending host.
    Baseline = 1,
}

/// Property changes for one entity. `data` holds the record header followed
/// by the values of every slot the header marks dirty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntityUpdateMessage {
    pub net_entity_id: NetEntityId,
    pub role: NetEntityRole,
    pub kind: UpdateKind,
    pub prefab_entity_id: Option<PrefabEntityId>,
    pub data: Bytes,
}

impl NetworkEntityUpdateMessage {
    pub fn delta(net_entity_id: NetEntityId, role: NetEntityRole, data: Bytes) -> Self {
        Self {
            net_entity_id,
            role,
            kind: UpdateKind::Delta,
            prefab_entity_id: None,
            data,
        }
    }

    pub fn baseline(
        net_entity_id: NetEntityId,
        role: NetEntityRole,
        prefab_entity_id: PrefabEntityId,
        data: Bytes,
    ) -> Self {
        Self {
            net_entity_id,
            role,
            kind: UpdateKind::Baseline,
            prefab_entity_id: Some(prefab_entity_id),
            data,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.kind == UpdateKind::Baseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_validity() {
        assert!(!NetworkEntityHandle::default().is_valid());
        assert!(NetworkEntityHandle::new(7, 1).is_valid());
    }

    #[test]
    fn test_rpc_delivery_retag() {
        let mut message = NetworkEntityRpcMessage::new(
            RpcDeliveryType::AuthorityToClient,
            3,
            10,
            0,
            Bytes::from_static(b"hit"),
        );
        message.set_delivery_type(RpcDeliveryType::ServerToAuthority);

        assert_eq!(message.delivery_type, RpcDeliveryType::ServerToAuthority);
        assert_eq!(message.payload.as_ref(), b"hit");
    }

    #[test]
    fn test_baseline_carries_prefab() {
        let message = NetworkEntityUpdateMessage::baseline(
            1,
            NetEntityRole::Server,
            PrefabEntityId::new("ship", 2),
            Bytes::new(),
        );

        assert!(message.is_baseline());
        assert_eq!(message.prefab_entity_id.unwrap().to_string(), "ship#2");
    }
}
