use crate::component::MultiplayerComponent;
use crate::controller::MultiplayerController;
use crate::input::{Aabb, ComponentInput, NetworkInput};
use crate::property::{NetworkProperty, Predictability, PropertyRegistrar};
use crate::protocol::{NetComponentId, NetworkEntityRpcMessage};
use crate::record::{ReplicationDirection, ReplicationRecord};
use crate::role::{EntityIsMigrating, NetEntityRole};
use crate::serialization::Serializer;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared, ordered log of component and controller callbacks.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct TestController {
    name: String,
    journal: Journal,
    input_order: i32,
    component_id: NetComponentId,
    bounds: Option<Aabb>,
}

impl MultiplayerController for TestController {
    fn input_order(&self) -> i32 {
        self.input_order
    }

    fn on_activate(&mut self, migrating: EntityIsMigrating) {
        self.journal
            .record(format!("activate {} {}", self.name, bool::from(migrating)));
    }

    fn on_deactivate(&mut self, migrating: EntityIsMigrating) {
        self.journal
            .record(format!("deactivate {} {}", self.name, bool::from(migrating)));
    }

    fn create_input(&mut self, _input: &mut NetworkInput, _delta_time: f32) {
        self.journal.record(format!("create_input {}", self.name));
    }

    fn process_input(&mut self, _input: &mut NetworkInput, _delta_time: f32) {
        self.journal.record(format!("process_input {}", self.name));
    }

    fn allocate_input(&self) -> Option<ComponentInput> {
        Some(ComponentInput::new(self.component_id))
    }

    fn rewind_bounds_for_input(&self, _input: &NetworkInput, _delta_time: f32) -> Aabb {
        self.bounds.unwrap_or_else(Aabb::null)
    }
}

/// Component with one client-visible and one predictable autonomous property.
pub struct TestComponent {
    id: NetComponentId,
    name: String,
    journal: Journal,
    input_order: i32,
    bounds: Option<Aabb>,
    controller: Option<TestController>,
    pub health: NetworkProperty<u32>,
    pub aim: NetworkProperty<f32>,
}

impl TestComponent {
    pub fn new(id: NetComponentId, journal: &Journal) -> Self {
        Self {
            id,
            name: format!("C{}", id),
            journal: journal.clone(),
            input_order: 0,
            bounds: None,
            controller: None,
            health: NetworkProperty::new(100),
            aim: NetworkProperty::new(0.0),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_input_order(mut self, input_order: i32) -> Self {
        self.input_order = input_order;
        self
    }

    pub fn with_bounds(mut self, bounds: Aabb) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl MultiplayerComponent for TestComponent {
    fn net_component_id(&self) -> NetComponentId {
        self.id
    }

    fn network_attach(&mut self, registrar: &mut PropertyRegistrar<'_>) {
        self.health.attach(
            registrar,
            ReplicationDirection::AuthorityToClient,
            Predictability::Unpredictable,
        );
        self.aim.attach(
            registrar,
            ReplicationDirection::AuthorityToAutonomous,
            Predictability::Predictable,
        );
        self.journal.record(format!("attach {}", self.name));
    }

    fn serialize_state_delta(
        &mut self,
        record: &mut ReplicationRecord,
        serializer: &mut dyn Serializer,
    ) -> bool {
        self.health.serialize(record, serializer, "health")
            && self.aim.serialize(record, serializer, "aim")
    }

    fn notify_state_delta_changes(&mut self, record: &mut ReplicationRecord) {
        if self.health.changed(record) {
            self.journal
                .record(format!("changed {} health {}", self.name, self.health.get()));
        }
        if self.aim.changed(record) {
            self.journal
                .record(format!("changed {} aim {}", self.name, self.aim.get()));
        }
    }

    fn handle_rpc_message(
        &mut self,
        remote_role: NetEntityRole,
        message: &mut NetworkEntityRpcMessage,
    ) -> bool {
        self.journal.record(format!(
            "rpc {} {} from {}",
            self.name, message.rpc_index, remote_role
        ));
        true
    }

    fn construct_controller(&mut self) {
        self.journal.record(format!("construct {}", self.name));
        self.controller = Some(TestController {
            name: self.name.clone(),
            journal: self.journal.clone(),
            input_order: self.input_order,
            component_id: self.id,
            bounds: self.bounds,
        });
    }

    fn destruct_controller(&mut self) {
        self.journal.record(format!("destruct {}", self.name));
        self.controller = None;
    }

    fn controller(&self) -> Option<&dyn MultiplayerController> {
        self.controller
            .as_ref()
            .map(|controller| controller as &dyn MultiplayerController)
    }

    fn controller_mut(&mut self) -> Option<&mut dyn MultiplayerController> {
        self.controller
            .as_mut()
            .map(|controller| controller as &mut dyn MultiplayerController)
    }
}
