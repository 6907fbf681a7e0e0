use crate::component::{ComponentSet, HostEntity, MultiplayerComponent};
use crate::controller;
use crate::debug;
use crate::error::{BindError, Result};
use crate::event::{Event, EventHandler};
use crate::input::{Aabb, ComponentInput, NetworkInput};
use crate::manager::NetworkEntityManager;
use crate::property::PropertyRegistrar;
use crate::protocol::{
    ConnectionId, EntityState, HostId, NetComponentId, NetEntityId, NetworkEntityHandle,
    NetworkEntityRpcMessage, NetworkEntityUpdateMessage, PrefabEntityId, RpcIndex,
    INVALID_NET_ENTITY_ID,
};
use crate::record::ReplicationRecord;
use crate::role::{EntityIsMigrating, NetEntityRole, RpcDeliveryType};
use crate::serialization::{BinaryFormat, ByteReader, ByteWriter, Serializer, SerializerMode};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub use crate::protocol::UpdateKind;

#[derive(Debug, Clone)]
pub struct NetBindConfig {
    pub value_format: BinaryFormat,
    pub max_slots_per_direction: usize,
    pub notify_local_changes: bool,
}

impl Default for NetBindConfig {
    fn default() -> Self {
        Self {
            value_format: BinaryFormat::Bincode,
            max_slots_per_direction: 1024,
            notify_local_changes: true,
        }
    }
}

impl NetBindConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_format(mut self, format: BinaryFormat) -> Self {
        self.value_format = format;
        self
    }

    pub fn with_max_slots_per_direction(mut self, max_slots: usize) -> Self {
        self.max_slots_per_direction = max_slots;
        self
    }

    pub fn with_local_change_notification(mut self, enabled: bool) -> Self {
        self.notify_local_changes = enabled;
        self
    }
}

/// Payload of the migration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMigration {
    pub handle: NetworkEntityHandle,
    pub host_id: HostId,
    pub connection_id: ConnectionId,
}

/// Network binding of one entity.
///
/// Owns the entity's role, its multiplayer components and the replication
/// records shared by them:
///
/// - `current_record`: slots dirtied since the last per-tick fold
/// - `total_record`: every slot dirtied since the entity was created on this host
/// - `predictable_record`: slots the autonomous role may predict
/// - `local_notification_record`: local changes awaiting change callbacks
///
/// Bindings are created through [`NetBind::new`], which hands back a shared
/// cell so the manager's per-tick callbacks can reach the binding.
pub struct NetBind {
    config: NetBindConfig,
    manager: Rc<dyn NetworkEntityManager>,

    net_entity_role: NetEntityRole,
    net_entity_id: NetEntityId,
    prefab_entity_id: PrefabEntityId,
    net_entity_handle: NetworkEntityHandle,
    components: ComponentSet,

    current_record: ReplicationRecord,
    total_record: ReplicationRecord,
    predictable_record: ReplicationRecord,
    local_notification_record: ReplicationRecord,

    send_authority_to_client_rpc_event: Event<NetworkEntityRpcMessage>,
    send_authority_to_autonomous_rpc_event: Event<NetworkEntityRpcMessage>,
    send_server_to_authority_rpc_event: Event<NetworkEntityRpcMessage>,
    send_autonomous_to_authority_rpc_event: Event<NetworkEntityRpcMessage>,

    entity_stop_event: Event<NetworkEntityHandle>,
    dirtied_event: Event<ReplicationRecord>,
    entity_migration_event: Event<EntityMigration>,

    handle_local_server_rpc_message: EventHandler<NetworkEntityRpcMessage>,
    handle_marked_dirty: Rc<EventHandler<()>>,
    handle_notify_changes: Rc<EventHandler<()>>,

    initialized: bool,
    needs_to_be_stopped: bool,
    is_processing_input: bool,
    waiting_for_active: bool,
    is_active: bool,
}

/// Runs `f` on the binding behind `weak`, unless it is gone or already
/// borrowed. Returns false only when the borrow failed.
fn with_bind(weak: &Weak<RefCell<NetBind>>, what: &str, f: impl FnOnce(&mut NetBind)) -> bool {
    let Some(bind) = weak.upgrade() else {
        return true;
    };
    let ran = match bind.try_borrow_mut() {
        Ok(mut bind) => {
            f(&mut *bind);
            true
        }
        Err(_) => {
            log::warn!("Deferring {} for a binding that is already borrowed", what);
            false
        }
    };
    ran
}

/// Builds a once-per-tick handler running `run` on the binding. A tick that
/// finds the binding borrowed reconnects the handler through `subscribe`, so
/// the work moves to the next tick.
fn per_tick_handler(
    weak: &Weak<RefCell<NetBind>>,
    manager: &Rc<dyn NetworkEntityManager>,
    what: &'static str,
    run: fn(&mut NetBind),
    subscribe: fn(&dyn NetworkEntityManager, &EventHandler<()>),
) -> Rc<EventHandler<()>> {
    let bind = weak.clone();
    let manager = Rc::downgrade(manager);
    Rc::new_cyclic(|handler: &Weak<EventHandler<()>>| {
        let handler = handler.clone();
        EventHandler::new(move |_: &()| {
            if with_bind(&bind, what, run) {
                return;
            }
            if let (Some(manager), Some(handler)) = (manager.upgrade(), handler.upgrade()) {
                subscribe(&*manager, &handler);
            }
        })
    })
}

impl NetBind {
    pub fn new(manager: Rc<dyn NetworkEntityManager>, config: NetBindConfig) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|weak: &Weak<RefCell<NetBind>>| {
            let loopback = Rc::clone(&manager);
            let handle_local_server_rpc_message = EventHandler::new(move |message: &NetworkEntityRpcMessage| {
                let mut message = message.clone();
                message.set_delivery_type(RpcDeliveryType::ServerToAuthority);
                loopback.handle_local_rpc_message(message);
            });

            let handle_marked_dirty = per_tick_handler(
                weak,
                &manager,
                "dirty fold",
                NetBind::handle_marked_dirty,
                |manager, handler| manager.add_entity_marked_dirty_handler(handler),
            );
            let handle_notify_changes = per_tick_handler(
                weak,
                &manager,
                "local change notification",
                NetBind::notify_local_changes,
                |manager, handler| manager.add_entity_notify_changes_handler(handler),
            );

            RefCell::new(NetBind {
                config,
                manager,
                net_entity_role: NetEntityRole::Client,
                net_entity_id: INVALID_NET_ENTITY_ID,
                prefab_entity_id: PrefabEntityId::default(),
                net_entity_handle: NetworkEntityHandle::invalid(),
                components: ComponentSet::new(Vec::new()),
                current_record: ReplicationRecord::new(NetEntityRole::Server),
                total_record: ReplicationRecord::new(NetEntityRole::Server),
                predictable_record: ReplicationRecord::new(NetEntityRole::Autonomous),
                local_notification_record: ReplicationRecord::new(NetEntityRole::Server),
                send_authority_to_client_rpc_event: Event::new(),
                send_authority_to_autonomous_rpc_event: Event::new(),
                send_server_to_authority_rpc_event: Event::new(),
                send_autonomous_to_authority_rpc_event: Event::new(),
                entity_stop_event: Event::new(),
                dirtied_event: Event::new(),
                entity_migration_event: Event::new(),
                handle_local_server_rpc_message,
                handle_marked_dirty,
                handle_notify_changes,
                initialized: false,
                needs_to_be_stopped: false,
                is_processing_input: false,
                waiting_for_active: false,
                is_active: false,
            })
        })
    }

    /// Binds `entity` to the network. Registers it with the manager, takes
    /// over its multiplayer components and lets each of them attach its
    /// properties in serialization order.
    pub fn pre_init(
        &mut self,
        entity: &mut dyn HostEntity,
        prefab_entity_id: PrefabEntityId,
        net_entity_id: NetEntityId,
        net_entity_role: NetEntityRole,
    ) {
        assert!(
            !self.initialized,
            "Entity {} pre-initialized twice (already bound as {})",
            entity.entity_id(),
            self.net_entity_id
        );
        self.initialized = true;

        self.net_entity_role = net_entity_role;
        self.net_entity_id = net_entity_id;
        self.prefab_entity_id = prefab_entity_id;
        self.net_entity_handle = self
            .manager
            .add_entity_to_entity_map(net_entity_id, entity.entity_id());
        self.components = ComponentSet::new(entity.take_multiplayer_components());

        self.network_attach();

        log::debug!(
            "Bound entity {} as net entity {} ({}, prefab {}, {} components)",
            entity.entity_id(),
            net_entity_id,
            net_entity_role,
            self.prefab_entity_id,
            self.components.len()
        );
    }

    fn network_attach(&mut self) {
        let mut next_index = [0u16; 3];
        let current = &mut self.current_record;
        let predictable = &mut self.predictable_record;
        self.components.for_each_serialized(|component| {
            let mut registrar = PropertyRegistrar::new(
                component.net_component_id(),
                &mut next_index,
                current,
                predictable,
            );
            component.network_attach(&mut registrar);
        });
        self.total_record = self.current_record.clone();
        debug::log_record("Attached", &self.total_record);
    }

    pub fn net_entity_role(&self) -> NetEntityRole {
        self.net_entity_role
    }

    pub fn is_authority(&self) -> bool {
        self.net_entity_role == NetEntityRole::Authority
    }

    pub fn has_controller(&self) -> bool {
        self.net_entity_role.has_controller()
    }

    pub fn net_entity_id(&self) -> NetEntityId {
        self.net_entity_id
    }

    pub fn prefab_entity_id(&self) -> &PrefabEntityId {
        &self.prefab_entity_id
    }

    pub fn entity_handle(&self) -> NetworkEntityHandle {
        self.net_entity_handle
    }

    pub fn config(&self) -> &NetBindConfig {
        &self.config
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    pub fn component<C: MultiplayerComponent>(&self, component_id: NetComponentId) -> Option<&C> {
        self.components.get(component_id)?.as_any().downcast_ref::<C>()
    }

    /// Runs a local mutation against one component. Whatever `f` marks in the
    /// current record is scheduled for the next per-tick fold.
    pub fn modify_component<C, R>(
        &mut self,
        component_id: NetComponentId,
        f: impl FnOnce(&mut C, &mut ReplicationRecord) -> R,
    ) -> Result<R>
    where
        C: MultiplayerComponent,
    {
        let component = self
            .components
            .get_mut(component_id)
            .and_then(|component| component.as_any_mut().downcast_mut::<C>())
            .ok_or(BindError::UnknownComponent(component_id))?;

        let result = f(component, &mut self.current_record);
        if self.current_record.has_changes() {
            self.mark_dirty();
        }
        Ok(result)
    }

    pub fn current_record(&self) -> &ReplicationRecord {
        &self.current_record
    }

    pub fn total_record(&self) -> &ReplicationRecord {
        &self.total_record
    }

    pub fn predictable_record(&self) -> &ReplicationRecord {
        &self.predictable_record
    }

    pub fn is_processing_input(&self) -> bool {
        self.is_processing_input
    }

    pub fn construct_controllers(&mut self) {
        self.net_entity_role = controller::construct_controllers(self.net_entity_role, &mut self.components);
    }

    pub fn destruct_controllers(&mut self) {
        self.net_entity_role = controller::destruct_controllers(self.net_entity_role, &mut self.components);
    }

    pub fn activate_controllers(&mut self, migrating: EntityIsMigrating) {
        controller::activate_controllers(&mut self.components, migrating);
        if self.is_authority() {
            self.connect_local_server_rpc_handler();
        }
        self.manager
            .notify_controllers_activated(self.net_entity_handle, migrating);
        log::debug!(
            "Activated controllers of net entity {} (migrating: {:?})",
            self.net_entity_id,
            migrating
        );
    }

    pub fn deactivate_controllers(&mut self, migrating: EntityIsMigrating) {
        self.handle_local_server_rpc_message.disconnect();
        controller::deactivate_controllers(&mut self.components, migrating);
        self.components.clear_input_ordering();
        self.manager
            .notify_controllers_deactivated(self.net_entity_handle, migrating);
        log::debug!(
            "Deactivated controllers of net entity {} (migrating: {:?})",
            self.net_entity_id,
            migrating
        );
    }

    /// Host lifecycle: the entity is activating. Controllers activate right
    /// away when the entity is already `Active`, otherwise once
    /// [`on_entity_state_changed`] reports it.
    ///
    /// [`on_entity_state_changed`]: NetBind::on_entity_state_changed
    pub fn activate(&mut self, entity_state: EntityState) {
        self.needs_to_be_stopped = true;
        self.is_active = true;

        if self.is_authority() {
            self.connect_local_server_rpc_handler();
        }

        if self.has_controller() {
            if entity_state == EntityState::Active {
                self.activate_controllers(EntityIsMigrating::False);
            } else {
                self.waiting_for_active = true;
            }
        }
    }

    pub fn on_entity_state_changed(&mut self, old_state: EntityState, new_state: EntityState) {
        if !self.waiting_for_active || new_state != EntityState::Active {
            return;
        }
        log::trace!(
            "Net entity {} went {:?} -> {:?}",
            self.net_entity_id,
            old_state,
            new_state
        );
        self.waiting_for_active = false;
        if self.has_controller() {
            self.activate_controllers(EntityIsMigrating::False);
        }
    }

    /// Host lifecycle: the entity is going away. [`stop_entity`] must have
    /// run first.
    ///
    /// [`stop_entity`]: NetBind::stop_entity
    pub fn deactivate(&mut self) {
        assert!(
            !self.needs_to_be_stopped,
            "Net entity {} appears to have been destroyed without being stopped",
            self.net_entity_id
        );

        self.handle_local_server_rpc_message.disconnect();
        self.handle_marked_dirty.disconnect();
        self.handle_notify_changes.disconnect();

        let was_waiting = std::mem::replace(&mut self.waiting_for_active, false);
        if self.is_active && self.has_controller() && !was_waiting {
            self.deactivate_controllers(EntityIsMigrating::False);
        }
        self.is_active = false;
        log::debug!("Deactivated net entity {}", self.net_entity_id);
    }

    /// Signals the stop event. Only the first call after activation signals.
    pub fn stop_entity(&mut self) {
        if self.needs_to_be_stopped {
            self.needs_to_be_stopped = false;
            log::debug!("Stopping net entity {}", self.net_entity_id);
            self.entity_stop_event.signal(&self.net_entity_handle);
        }
    }

    pub fn notify_migration(&mut self, host_id: HostId, connection_id: ConnectionId) {
        log::debug!(
            "Net entity {} migrating to host {} (connection {})",
            self.net_entity_id,
            host_id,
            connection_id
        );
        self.entity_migration_event.signal(&EntityMigration {
            handle: self.net_entity_handle,
            host_id,
            connection_id,
        });
    }

    pub fn add_entity_stop_event_handler(&self, handler: &EventHandler<NetworkEntityHandle>) {
        handler.connect(&self.entity_stop_event);
    }

    /// The handler receives the current record right before it is folded.
    pub fn add_entity_dirtied_event_handler(&self, handler: &EventHandler<ReplicationRecord>) {
        handler.connect(&self.dirtied_event);
    }

    pub fn add_entity_migration_event_handler(&self, handler: &EventHandler<EntityMigration>) {
        handler.connect(&self.entity_migration_event);
    }

    pub fn send_authority_to_client_rpc_event(&self) -> &Event<NetworkEntityRpcMessage> {
        &self.send_authority_to_client_rpc_event
    }

    pub fn send_authority_to_autonomous_rpc_event(&self) -> &Event<NetworkEntityRpcMessage> {
        &self.send_authority_to_autonomous_rpc_event
    }

    pub fn send_server_to_authority_rpc_event(&self) -> &Event<NetworkEntityRpcMessage> {
        &self.send_server_to_authority_rpc_event
    }

    pub fn send_autonomous_to_authority_rpc_event(&self) -> &Event<NetworkEntityRpcMessage> {
        &self.send_autonomous_to_authority_rpc_event
    }

    fn rpc_event(&self, delivery_type: RpcDeliveryType) -> &Event<NetworkEntityRpcMessage> {
        match delivery_type {
            RpcDeliveryType::AuthorityToClient => &self.send_authority_to_client_rpc_event,
            RpcDeliveryType::AuthorityToAutonomous => &self.send_authority_to_autonomous_rpc_event,
            RpcDeliveryType::ServerToAuthority => &self.send_server_to_authority_rpc_event,
            RpcDeliveryType::AutonomousToAuthority => &self.send_autonomous_to_authority_rpc_event,
        }
    }

    fn connect_local_server_rpc_handler(&self) {
        if !self.handle_local_server_rpc_message.is_connected() {
            self.handle_local_server_rpc_message
                .connect(&self.send_server_to_authority_rpc_event);
        }
    }

    pub fn send_rpc(
        &self,
        delivery_type: RpcDeliveryType,
        component_id: NetComponentId,
        rpc_index: RpcIndex,
        payload: Bytes,
    ) {
        assert!(
            delivery_type.can_send_from(self.net_entity_role),
            "Net entity {} with role {} cannot send {:?} RPCs",
            self.net_entity_id,
            self.net_entity_role,
            delivery_type
        );
        let message = NetworkEntityRpcMessage::new(
            delivery_type,
            self.net_entity_id,
            component_id,
            rpc_index,
            payload,
        );
        debug::log_rpc("Outgoing", &message);
        self.rpc_event(delivery_type).signal(&message);
    }

    /// Routes an RPC to its target component. Returns false when the entity
    /// has no such component or no longer holds a role that receives the
    /// channel, both routine after removals or migration.
    pub fn handle_rpc_message(&mut self, remote_role: NetEntityRole, message: &mut NetworkEntityRpcMessage) -> bool {
        if !message.delivery_type.is_received_by(self.net_entity_role) {
            log::debug!(
                "Dropping {:?} RPC {} for net entity {} in role {}",
                message.delivery_type,
                message.rpc_index,
                self.net_entity_id,
                self.net_entity_role
            );
            return false;
        }

        match self.components.get_mut(message.component_id) {
            Some(component) => component.handle_rpc_message(remote_role, message),
            None => {
                log::debug!(
                    "Dropping RPC {} for missing component {} on net entity {}",
                    message.rpc_index,
                    message.component_id,
                    self.net_entity_id
                );
                false
            }
        }
    }

    pub fn create_input(&mut self, input: &mut NetworkInput, delta_time: f32) {
        assert!(
            self.has_controller(),
            "Incorrect network role for input creation ({})",
            self.net_entity_role
        );
        self.components.for_each_input_ordered(|component| {
            if let Some(controller) = component.controller_mut() {
                controller.create_input(input, delta_time);
            }
        });
    }

    pub fn process_input(&mut self, input: &mut NetworkInput, delta_time: f32) {
        assert!(
            self.has_controller(),
            "Incorrect network role for input processing ({})",
            self.net_entity_role
        );
        self.is_processing_input = true;
        self.components.for_each_input_ordered(|component| {
            if let Some(controller) = component.controller_mut() {
                controller.process_input(input, delta_time);
            }
        });
        self.is_processing_input = false;
    }

    /// Union of the rewind volumes the controllers need to process `input`.
    pub fn rewind_bounds_for_input(&self, input: &NetworkInput, delta_time: f32) -> Aabb {
        assert!(
            self.is_authority(),
            "Incorrect network role for computing rewind bounds ({})",
            self.net_entity_role
        );
        let mut bounds = Aabb::null();
        self.components.for_each_input_ordered_ref(|component| {
            if let Some(controller) = component.controller() {
                let component_bounds = controller.rewind_bounds_for_input(input, delta_time);
                if component_bounds.is_valid() {
                    bounds.add_aabb(&component_bounds);
                }
            }
        });
        bounds
    }

    pub fn allocate_component_inputs(&self) -> Vec<ComponentInput> {
        let mut inputs = Vec::new();
        self.components.for_each_input_ordered_ref(|component| {
            if let Some(input) = component.controller().and_then(|controller| controller.allocate_input()) {
                inputs.push(input);
            }
        });
        inputs
    }

    /// Schedules a fold of the current record on the manager's next tick.
    /// Calling this repeatedly within one tick subscribes only once.
    pub fn mark_dirty(&mut self) {
        if !self.handle_marked_dirty.is_connected() {
            self.manager
                .add_entity_marked_dirty_handler(&self.handle_marked_dirty);
        }
    }

    fn handle_marked_dirty(&mut self) {
        self.dirtied_event.signal(&self.current_record);

        if self.has_controller() && self.config.notify_local_changes {
            self.local_notification_record.append(&self.current_record);
            if !self.handle_notify_changes.is_connected() {
                self.manager
                    .add_entity_notify_changes_handler(&self.handle_notify_changes);
            }
        }

        self.total_record.append(&self.current_record);
        self.current_record.clear();
        log::trace!("Net entity {} folded: {}", self.net_entity_id, self.total_record);
    }

    /// Fires change callbacks for every local change collected since the
    /// last notification.
    pub fn notify_local_changes(&mut self) {
        let record = &mut self.local_notification_record;
        record.reset_consumed_bits();
        self.components
            .for_each_serialized(|component| component.notify_state_delta_changes(record));
        record.clear();
    }

    pub fn fill_replication_record(&self, record: &mut ReplicationRecord) {
        if self.current_record.has_changes() {
            record.append(&self.current_record);
        }
    }

    /// Everything a host taking over this entity needs: the total record plus
    /// changes not yet folded into it.
    pub fn fill_total_replication_record(&self, record: &mut ReplicationRecord) {
        record.append(&self.total_record);
        self.fill_replication_record(record);
    }

    pub fn serialize_state_delta_message(
        &mut self,
        record: &mut ReplicationRecord,
        serializer: &mut dyn Serializer,
    ) -> bool {
        self.components.for_each_serialized(|component| {
            if serializer.is_valid() {
                component.serialize_state_delta(record, serializer);
            }
        });
        serializer.is_valid()
    }

    pub fn notify_state_delta_changes(&mut self, record: &mut ReplicationRecord) {
        self.components
            .for_each_serialized(|component| component.notify_state_delta_changes(record));
    }

    /// Moves a record header and the values of every slot it marks through
    /// `serializer`. Receiving on a Server role re-marks the reconciled
    /// changes dirty so they replicate onward.
    pub fn handle_property_change_message(&mut self, serializer: &mut dyn Serializer, notify_changes: bool) -> bool {
        let role = self.net_entity_role;
        let receiving_on_server =
            serializer.mode() == SerializerMode::WriteToObject && role == NetEntityRole::Server;

        let mut record = ReplicationRecord::new(role);
        if !record.serialize(serializer, self.config.max_slots_per_direction) {
            log::warn!("Malformed replication header for net entity {}", self.net_entity_id);
            return false;
        }

        if !self.validate_property_data(&record, serializer) {
            log::warn!("Malformed property data for net entity {}", self.net_entity_id);
            return false;
        }

        // Claimed bits join the total before reconciliation drops any of them.
        if receiving_on_server {
            self.total_record.append(&record);
        }

        self.serialize_state_delta_message(&mut record, serializer);
        if !serializer.is_valid() {
            log::warn!("Malformed property data for net entity {}", self.net_entity_id);
            return false;
        }

        record.reset_consumed_bits();
        if notify_changes {
            self.notify_state_delta_changes(&mut record);
        }

        if receiving_on_server {
            self.current_record.append(&record);
            self.mark_dirty();
        }
        true
    }

    /// Decodes every value `record` marks without applying any of them, then
    /// rewinds. Serializers that cannot replay skip the check.
    fn validate_property_data(&mut self, record: &ReplicationRecord, serializer: &mut dyn Serializer) -> bool {
        if serializer.mode() != SerializerMode::WriteToObject || !serializer.begin_validation() {
            return serializer.is_valid();
        }
        let mut staged = record.clone();
        staged.reset_consumed_bits();
        self.serialize_state_delta_message(&mut staged, serializer);
        serializer.end_validation();
        serializer.is_valid()
    }

    /// Moves the predictable slots through `serializer` without touching the
    /// predictable ledger. Reading notifies for every corrected value.
    pub fn serialize_entity_correction(&mut self, serializer: &mut dyn Serializer) -> bool {
        let mut record = self.predictable_record.clone();
        record.reset_consumed_bits();
        if !self.validate_property_data(&record, serializer) {
            log::warn!("Malformed correction for net entity {}", self.net_entity_id);
            return false;
        }

        self.serialize_state_delta_message(&mut record, serializer);
        if serializer.is_valid() && serializer.mode() == SerializerMode::WriteToObject {
            record.reset_consumed_bits();
            self.notify_state_delta_changes(&mut record);
        }
        serializer.is_valid()
    }

    /// Builds an update for an observer in `remote_role`: the unflushed
    /// changes, or for a baseline everything dirtied since creation.
    pub fn write_update(&mut self, remote_role: NetEntityRole, kind: UpdateKind) -> Result<NetworkEntityUpdateMessage> {
        let mut record = ReplicationRecord::new(remote_role);
        match kind {
            UpdateKind::Delta => self.fill_replication_record(&mut record),
            UpdateKind::Baseline => self.fill_total_replication_record(&mut record),
        }
        self.write_record_update(record, kind)
    }

    /// Builds an update from a record accumulated by the caller, typically
    /// from the dirtied event. The record's role selects the directions sent.
    pub fn write_record_update(
        &mut self,
        mut record: ReplicationRecord,
        kind: UpdateKind,
    ) -> Result<NetworkEntityUpdateMessage> {
        if !self.initialized {
            return Err(BindError::NotInitialized(self.net_entity_id));
        }

        let mut writer = ByteWriter::new(self.config.value_format);
        let written = record.serialize(&mut writer, self.config.max_slots_per_direction)
            && self.serialize_state_delta_message(&mut record, &mut writer);
        if !written {
            return Err(BindError::Encode(format!(
                "state delta of net entity {}",
                self.net_entity_id
            )));
        }

        let role = record.role();
        let data = writer.into_bytes();
        let message = match kind {
            UpdateKind::Delta => NetworkEntityUpdateMessage::delta(self.net_entity_id, role, data),
            UpdateKind::Baseline => NetworkEntityUpdateMessage::baseline(
                self.net_entity_id,
                role,
                self.prefab_entity_id.clone(),
                data,
            ),
        };
        debug::log_update("Outgoing", &message);
        Ok(message)
    }

    /// Applies a received update through [`handle_property_change_message`].
    ///
    /// [`handle_property_change_message`]: NetBind::handle_property_change_message
    pub fn apply_update(&mut self, message: &NetworkEntityUpdateMessage, notify_changes: bool) -> Result<()> {
        if !self.initialized {
            return Err(BindError::NotInitialized(self.net_entity_id));
        }
        if message.net_entity_id != self.net_entity_id {
            return Err(BindError::EntityMismatch {
                expected: self.net_entity_id,
                actual: message.net_entity_id,
            });
        }
        debug::log_update("Incoming", message);

        if message.role != self.net_entity_role {
            log::warn!(
                "Update for net entity {} was written for {}, local role is {}",
                self.net_entity_id,
                message.role,
                self.net_entity_role
            );
            return Err(BindError::MalformedUpdate {
                net_entity_id: self.net_entity_id,
            });
        }

        let mut reader = ByteReader::new(self.config.value_format, message.data.clone());
        if self.handle_property_change_message(&mut reader, notify_changes) {
            Ok(())
        } else {
            Err(BindError::MalformedUpdate {
                net_entity_id: self.net_entity_id,
            })
        }
    }
}

impl Drop for NetBind {
    fn drop(&mut self) {
        if self.is_active && !std::thread::panicking() {
            panic!(
                "Net entity {} dropped while active; stop and deactivate it first",
                self.net_entity_id
            );
        }
    }
}
