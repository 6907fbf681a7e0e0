pub mod protocol;
pub mod role;
pub mod record;
pub mod serialization;
pub mod event;
pub mod input;
pub mod property;
pub mod component;
pub mod controller;
pub mod manager;
pub mod net_bind;
pub mod error;
pub mod debug;

#[cfg(test)]
mod testing;

pub use protocol::{
    EntityId, NetEntityId, NetComponentId, RpcIndex, HostId, ConnectionId,
    PrefabEntityId, NetworkEntityHandle, EntityState,
    NetworkEntityRpcMessage, NetworkEntityUpdateMessage, UpdateKind,
};

pub use role::{
    NetEntityRole, EntityIsMigrating, RpcDeliveryType,
    network_role_has_controller,
};

pub use record::{
    ReplicationRecord, ReplicationDirection, RecordSlot,
};

pub use serialization::{
    Serializer, SerializerMode, BinaryFormat,
    ByteWriter, ByteReader, MessageCodec,
};

pub use event::{
    Event, EventHandler,
};

pub use input::{
    NetworkInput, ComponentInput, Aabb,
};

pub use property::{
    NetworkProperty, PropertyRegistrar, Predictability,
};

pub use component::{
    MultiplayerComponent, HostEntity, DeclaredEntity, ComponentSet,
};

pub use controller::MultiplayerController;

pub use manager::{
    NetworkEntityManager, LocalEntityManager, ControllerActivation, ManagerStats,
};

pub use net_bind::{
    NetBind, NetBindConfig, EntityMigration,
};

pub use error::{
    BindError, Result,
};
