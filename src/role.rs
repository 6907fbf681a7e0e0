use serde::{Deserialize, Serialize};
use std::fmt;

/// Network role of an entity on the local host.
///
/// `Server` and `Authority` own authoritative data, `Client` and `Autonomous`
/// receive it. The controlled roles (`Authority`, `Autonomous`) are only
/// reachable from their uncontrolled counterpart by constructing controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NetEntityRole {
    Client = 0,
    Autonomous = 1,
    Server = 2,
    Authority = 3,
}

impl NetEntityRole {
    pub fn has_controller(self) -> bool {
        network_role_has_controller(self)
    }

    pub fn is_server_side(self) -> bool {
        matches!(self, NetEntityRole::Server | NetEntityRole::Authority)
    }

    /// The role reached by constructing controllers, `None` if already controlled.
    pub fn controlled(self) -> Option<NetEntityRole> {
        match self {
            NetEntityRole::Server => Some(NetEntityRole::Authority),
            NetEntityRole::Client => Some(NetEntityRole::Autonomous),
            NetEntityRole::Authority | NetEntityRole::Autonomous => None,
        }
    }

    /// The role reached by destructing controllers, `None` if not controlled.
    pub fn uncontrolled(self) -> Option<NetEntityRole> {
        match self {
            NetEntityRole::Authority => Some(NetEntityRole::Server),
            NetEntityRole::Autonomous => Some(NetEntityRole::Client),
            NetEntityRole::Server | NetEntityRole::Client => None,
        }
    }
}

impl fmt::Display for NetEntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetEntityRole::Client => "Client",
            NetEntityRole::Autonomous => "Autonomous",
            NetEntityRole::Server => "Server",
            NetEntityRole::Authority => "Authority",
        };
        f.write_str(name)
    }
}

pub fn network_role_has_controller(role: NetEntityRole) -> bool {
    matches!(role, NetEntityRole::Authority | NetEntityRole::Autonomous)
}

/// Whether a controller transition is part of a migration to another
/// authoritative host rather than entity creation or destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityIsMigrating {
    False,
    True,
}

impl From<bool> for EntityIsMigrating {
    fn from(migrating: bool) -> Self {
        if migrating {
            EntityIsMigrating::True
        } else {
            EntityIsMigrating::False
        }
    }
}

impl From<EntityIsMigrating> for bool {
    fn from(migrating: EntityIsMigrating) -> Self {
        migrating == EntityIsMigrating::True
    }
}

/// Directional RPC channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RpcDeliveryType {
    AuthorityToClient = 0,
    AuthorityToAutonomous = 1,
    AutonomousToAuthority = 2,
    ServerToAuthority = 3,
}

impl RpcDeliveryType {
    pub const ALL: [RpcDeliveryType; 4] = [
        RpcDeliveryType::AuthorityToClient,
        RpcDeliveryType::AuthorityToAutonomous,
        RpcDeliveryType::AutonomousToAuthority,
        RpcDeliveryType::ServerToAuthority,
    ];

    /// Whether an entity in `role` may originate an RPC on this channel.
    pub fn can_send_from(self, role: NetEntityRole) -> bool {
        match self {
            RpcDeliveryType::AuthorityToClient | RpcDeliveryType::AuthorityToAutonomous => {
                role == NetEntityRole::Authority
            }
            RpcDeliveryType::AutonomousToAuthority => role == NetEntityRole::Autonomous,
            // A server proxy forwards to the authority; on the authority itself the
            // message is looped back locally.
            RpcDeliveryType::ServerToAuthority => role.is_server_side(),
        }
    }

    /// Whether an entity in `role` is a valid receiver on this channel.
    pub fn is_received_by(self, role: NetEntityRole) -> bool {
        match self {
            RpcDeliveryType::AuthorityToClient => !role.is_server_side(),
            RpcDeliveryType::AuthorityToAutonomous => role == NetEntityRole::Autonomous,
            RpcDeliveryType::AutonomousToAuthority | RpcDeliveryType::ServerToAuthority => {
                role == NetEntityRole::Authority
            }
        }
    }
}
