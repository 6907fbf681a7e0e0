use crate::controller::MultiplayerController;
use crate::property::PropertyRegistrar;
use crate::protocol::{EntityId, NetComponentId, NetworkEntityRpcMessage};
use crate::record::ReplicationRecord;
use crate::role::NetEntityRole;
use crate::serialization::Serializer;
use std::any::Any;
use std::collections::BTreeMap;

/// Typed access to a component behind `dyn MultiplayerComponent`.
pub trait ComponentAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> ComponentAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Capability contract of every networked gameplay component.
pub trait MultiplayerComponent: ComponentAny {
    /// Stable per-type identifier; must be identical on every host.
    fn net_component_id(&self) -> NetComponentId;

    /// Claims record slots for the component's properties.
    fn network_attach(&mut self, registrar: &mut PropertyRegistrar<'_>);

    /// Writes or reads every property whose slot is dirty in `record`.
    /// Received data may be read twice: first with
    /// [`Serializer::is_validating`] set, where nothing may be applied.
    fn serialize_state_delta(
        &mut self,
        record: &mut ReplicationRecord,
        serializer: &mut dyn Serializer,
    ) -> bool;

    /// Fires change callbacks for every property whose slot is dirty in `record`.
    fn notify_state_delta_changes(&mut self, record: &mut ReplicationRecord);

    fn handle_rpc_message(
        &mut self,
        remote_role: NetEntityRole,
        message: &mut NetworkEntityRpcMessage,
    ) -> bool;

    fn construct_controller(&mut self);
    fn destruct_controller(&mut self);
    fn controller(&self) -> Option<&dyn MultiplayerController>;
    fn controller_mut(&mut self) -> Option<&mut dyn MultiplayerController>;
}

/// The hosting framework's view of an entity being bound to the network.
pub trait HostEntity {
    fn entity_id(&self) -> EntityId;

    /// Hands over the entity's multiplayer components in declared order.
    fn take_multiplayer_components(&mut self) -> Vec<Box<dyn MultiplayerComponent>>;
}

/// A host entity assembled directly from a component list.
pub struct DeclaredEntity {
    pub entity_id: EntityId,
    pub components: Vec<Box<dyn MultiplayerComponent>>,
}

impl DeclaredEntity {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: impl MultiplayerComponent) -> Self {
        self.components.push(Box::new(component));
        self
    }
}

impl HostEntity for DeclaredEntity {
    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn take_multiplayer_components(&mut self) -> Vec<Box<dyn MultiplayerComponent>> {
        std::mem::take(&mut self.components)
    }
}

/// The multiplayer components of one entity with their three orderings:
/// declared (dependency) order, serialization order (sorted by component id)
/// and input order (stable-sorted by controller priority).
pub struct ComponentSet {
    declared: Vec<Box<dyn MultiplayerComponent>>,
    by_id: BTreeMap<NetComponentId, usize>,
    serialization: Vec<usize>,
    input: Vec<usize>,
}

impl ComponentSet {
    pub fn new(declared: Vec<Box<dyn MultiplayerComponent>>) -> Self {
        let mut by_id = BTreeMap::new();
        for (index, component) in declared.iter().enumerate() {
            let previous = by_id.insert(component.net_component_id(), index);
            assert!(
                previous.is_none(),
                "Duplicate multiplayer component id {} on one entity",
                component.net_component_id()
            );
        }
        let serialization = by_id.values().copied().collect();

        Self {
            declared,
            by_id,
            serialization,
            input: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    pub fn contains(&self, component_id: NetComponentId) -> bool {
        self.by_id.contains_key(&component_id)
    }

    pub fn get(&self, component_id: NetComponentId) -> Option<&dyn MultiplayerComponent> {
        let index = *self.by_id.get(&component_id)?;
        Some(self.declared[index].as_ref())
    }

    pub fn get_mut(&mut self, component_id: NetComponentId) -> Option<&mut dyn MultiplayerComponent> {
        let index = *self.by_id.get(&component_id)?;
        Some(self.declared[index].as_mut())
    }

    pub fn declared_ids(&self) -> Vec<NetComponentId> {
        self.declared.iter().map(|c| c.net_component_id()).collect()
    }

    pub fn serialization_ids(&self) -> Vec<NetComponentId> {
        self.by_id.keys().copied().collect()
    }

    pub fn input_ids(&self) -> Vec<NetComponentId> {
        self.input
            .iter()
            .map(|index| self.declared[*index].net_component_id())
            .collect()
    }

    pub fn for_each_declared(&mut self, mut f: impl FnMut(&mut dyn MultiplayerComponent)) {
        for component in self.declared.iter_mut() {
            f(component.as_mut());
        }
    }

    pub fn for_each_declared_rev(&mut self, mut f: impl FnMut(&mut dyn MultiplayerComponent)) {
        for component in self.declared.iter_mut().rev() {
            f(component.as_mut());
        }
    }

    pub fn for_each_serialized(&mut self, mut f: impl FnMut(&mut dyn MultiplayerComponent)) {
        for index in &self.serialization {
            f(self.declared[*index].as_mut());
        }
    }

    pub fn for_each_input_ordered(&mut self, mut f: impl FnMut(&mut dyn MultiplayerComponent)) {
        for index in &self.input {
            f(self.declared[*index].as_mut());
        }
    }

    pub fn for_each_input_ordered_ref(&self, mut f: impl FnMut(&dyn MultiplayerComponent)) {
        for index in &self.input {
            f(self.declared[*index].as_ref());
        }
    }

    /// Rebuilds the input order: declared order, stable-sorted by each
    /// controller's input priority. Components without a controller take no
    /// input and are left out.
    pub fn determine_input_ordering(&mut self) {
        let declared = &self.declared;
        self.input = (0..declared.len())
            .filter(|index| declared[*index].controller().is_some())
            .collect();
        self.input.sort_by_key(|index| {
            declared[*index]
                .controller()
                .map(|controller| controller.input_order())
                .unwrap_or(i32::MAX)
        });
    }

    pub fn clear_input_ordering(&mut self) {
        self.input.clear();
    }
}
