use crate::event::{Event, EventHandler};
use crate::protocol::{EntityId, HostId, NetEntityId, NetworkEntityHandle, NetworkEntityRpcMessage};
use crate::role::EntityIsMigrating;
use ahash::AHashMap;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Services a binding needs from the owner of all networked entities on a host.
pub trait NetworkEntityManager {
    fn add_entity_to_entity_map(&self, net_entity_id: NetEntityId, entity_id: EntityId) -> NetworkEntityHandle;

    /// Connects `handler` to the once-per-tick "entities marked dirty" signal.
    fn add_entity_marked_dirty_handler(&self, handler: &EventHandler<()>);

    /// Connects `handler` to the once-per-tick "notify local changes" signal.
    fn add_entity_notify_changes_handler(&self, handler: &EventHandler<()>);

    fn notify_controllers_activated(&self, handle: NetworkEntityHandle, migrating: EntityIsMigrating);
    fn notify_controllers_deactivated(&self, handle: NetworkEntityHandle, migrating: EntityIsMigrating);

    /// Delivers an RPC that never left this host.
    fn handle_local_rpc_message(&self, message: NetworkEntityRpcMessage);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerActivation {
    pub handle: NetworkEntityHandle,
    pub migrating: EntityIsMigrating,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub tick_count: u64,
    pub dirty_entities_processed: u64,
    pub notifications_processed: u64,
    pub local_rpc_count: u64,
    pub controller_activations: u64,
    pub controller_deactivations: u64,
}

/// In-process manager for a single host. [`update`] runs one tick: every
/// entity marked dirty since the last tick folds its records, then every
/// entity with pending local changes notifies its components.
///
/// [`update`]: LocalEntityManager::update
pub struct LocalEntityManager {
    host_id: HostId,
    entity_map: RefCell<AHashMap<NetEntityId, EntityId>>,
    on_entity_marked_dirty: Event<()>,
    on_entity_notify_changes: Event<()>,
    on_controllers_changed: Event<ControllerActivation>,
    local_rpc_queue: RefCell<VecDeque<NetworkEntityRpcMessage>>,
    stats: Cell<ManagerStats>,
}

impl LocalEntityManager {
    pub fn new(host_id: HostId) -> Self {
        Self {
            host_id,
            entity_map: RefCell::new(AHashMap::new()),
            on_entity_marked_dirty: Event::new(),
            on_entity_notify_changes: Event::new(),
            on_controllers_changed: Event::new(),
            local_rpc_queue: RefCell::new(VecDeque::new()),
            stats: Cell::new(ManagerStats::default()),
        }
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    pub fn update(&self) {
        let dirty = self.on_entity_marked_dirty.handler_count() as u64;
        self.on_entity_marked_dirty.signal_and_disconnect(&());

        let notify = self.on_entity_notify_changes.handler_count() as u64;
        self.on_entity_notify_changes.signal_and_disconnect(&());

        self.update_stats(|stats| {
            stats.tick_count += 1;
            stats.dirty_entities_processed += dirty;
            stats.notifications_processed += notify;
        });
        log::trace!(
            "Host {} tick: {} dirty entities, {} notifications",
            self.host_id,
            dirty,
            notify
        );
    }

    pub fn pending_dirty_entities(&self) -> usize {
        self.on_entity_marked_dirty.handler_count()
    }

    pub fn entity_id(&self, net_entity_id: NetEntityId) -> Option<EntityId> {
        self.entity_map.borrow().get(&net_entity_id).copied()
    }

    pub fn remove_entity_from_entity_map(&self, net_entity_id: NetEntityId) -> Option<EntityId> {
        self.entity_map.borrow_mut().remove(&net_entity_id)
    }

    pub fn entity_count(&self) -> usize {
        self.entity_map.borrow().len()
    }

    pub fn add_controllers_changed_handler(&self, handler: &EventHandler<ControllerActivation>) {
        handler.connect(&self.on_controllers_changed);
    }

    pub fn take_local_rpc_messages(&self) -> Vec<NetworkEntityRpcMessage> {
        self.local_rpc_queue.borrow_mut().drain(..).collect()
    }

    pub fn get_stats(&self) -> ManagerStats {
        self.stats.get()
    }

    fn update_stats(&self, f: impl FnOnce(&mut ManagerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl NetworkEntityManager for LocalEntityManager {
    fn add_entity_to_entity_map(&self, net_entity_id: NetEntityId, entity_id: EntityId) -> NetworkEntityHandle {
        if let Some(previous) = self.entity_map.borrow_mut().insert(net_entity_id, entity_id) {
            log::warn!(
                "Net entity {} remapped from entity {} to {}",
                net_entity_id,
                previous,
                entity_id
            );
        }
        NetworkEntityHandle::new(net_entity_id, entity_id)
    }

    fn add_entity_marked_dirty_handler(&self, handler: &EventHandler<()>) {
        handler.connect(&self.on_entity_marked_dirty);
    }

    fn add_entity_notify_changes_handler(&self, handler: &EventHandler<()>) {
        handler.connect(&self.on_entity_notify_changes);
    }

    fn notify_controllers_activated(&self, handle: NetworkEntityHandle, migrating: EntityIsMigrating) {
        self.update_stats(|stats| stats.controller_activations += 1);
        self.on_controllers_changed.signal(&ControllerActivation {
            handle,
            migrating,
            active: true,
        });
    }

    fn notify_controllers_deactivated(&self, handle: NetworkEntityHandle, migrating: EntityIsMigrating) {
        self.update_stats(|stats| stats.controller_deactivations += 1);
        self.on_controllers_changed.signal(&ControllerActivation {
            handle,
            migrating,
            active: false,
        });
    }

    fn handle_local_rpc_message(&self, message: NetworkEntityRpcMessage) {
        self.update_stats(|stats| stats.local_rpc_count += 1);
        self.local_rpc_queue.borrow_mut().push_back(message);
    }
}
