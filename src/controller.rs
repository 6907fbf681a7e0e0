//! Controller lifecycle.
//!
//! Controllers exist only while an entity holds a controlled role. They are
//! constructed and activated in declared component order and destructed and
//! deactivated in reverse, so a component declared after its dependency
//! always sees that dependency's controller alive.

use crate::component::ComponentSet;
use crate::input::{Aabb, ComponentInput, NetworkInput};
use crate::role::{EntityIsMigrating, NetEntityRole};

pub trait MultiplayerController {
    /// Priority in the input order; lower runs first.
    fn input_order(&self) -> i32 {
        0
    }

    fn on_activate(&mut self, migrating: EntityIsMigrating);
    fn on_deactivate(&mut self, migrating: EntityIsMigrating);

    fn create_input(&mut self, _input: &mut NetworkInput, _delta_time: f32) {}
    fn process_input(&mut self, _input: &mut NetworkInput, _delta_time: f32) {}

    fn allocate_input(&self) -> Option<ComponentInput> {
        None
    }

    fn rewind_bounds_for_input(&self, _input: &NetworkInput, _delta_time: f32) -> Aabb {
        Aabb::null()
    }
}

/// Server becomes Authority, Client becomes Autonomous. Constructing on an
/// already controlled role is a contract violation.
pub fn construct_controllers(role: NetEntityRole, components: &mut ComponentSet) -> NetEntityRole {
    let controlled = match role.controlled() {
        Some(controlled) => controlled,
        None => panic!("Controller already constructed (role {})", role),
    };

    components.for_each_declared(|component| component.construct_controller());
    log::debug!("Constructed controllers: {} -> {}", role, controlled);
    controlled
}

/// Inverse of [`construct_controllers`].
pub fn destruct_controllers(role: NetEntityRole, components: &mut ComponentSet) -> NetEntityRole {
    let uncontrolled = match role.uncontrolled() {
        Some(uncontrolled) => uncontrolled,
        None => panic!("Controllers already destructed (role {})", role),
    };

    components.for_each_declared_rev(|component| component.destruct_controller());
    log::debug!("Destructed controllers: {} -> {}", role, uncontrolled);
    uncontrolled
}

pub fn activate_controllers(components: &mut ComponentSet, migrating: EntityIsMigrating) {
    components.for_each_declared(|component| {
        if let Some(controller) = component.controller_mut() {
            controller.on_activate(migrating);
        }
    });
    components.determine_input_ordering();
}

pub fn deactivate_controllers(components: &mut ComponentSet, migrating: EntityIsMigrating) {
    components.for_each_declared_rev(|component| {
        if let Some(controller) = component.controller_mut() {
            controller.on_deactivate(migrating);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::MultiplayerComponent;
    use crate::testing::{Journal, TestComponent};

    fn declared(journal: &Journal) -> ComponentSet {
        ComponentSet::new(vec![
            Box::new(TestComponent::new(1, journal).named("A")) as Box<dyn MultiplayerComponent>,
            Box::new(TestComponent::new(2, journal).named("B")),
            Box::new(TestComponent::new(3, journal).named("C")),
        ])
    }

    #[test]
    fn test_construct_destruct_restores_role() {
        let journal = Journal::default();
        let mut components = declared(&journal);

        let role = construct_controllers(NetEntityRole::Server, &mut components);
        assert_eq!(role, NetEntityRole::Authority);
        assert_eq!(destruct_controllers(role, &mut components), NetEntityRole::Server);

        let role = construct_controllers(NetEntityRole::Client, &mut components);
        assert_eq!(role, NetEntityRole::Autonomous);
        assert_eq!(destruct_controllers(role, &mut components), NetEntityRole::Client);
    }

    #[test]
    fn test_construct_and_destruct_walk_opposite_orders() {
        let journal = Journal::default();
        let mut components = declared(&journal);

        let role = construct_controllers(NetEntityRole::Server, &mut components);
        destruct_controllers(role, &mut components);

        assert_eq!(
            journal.entries(),
            vec![
                "construct A", "construct B", "construct C",
                "destruct C", "destruct B", "destruct A",
            ]
        );
    }

    #[test]
    fn test_activation_is_reverse_of_deactivation() {
        let journal = Journal::default();
        let mut components = declared(&journal);
        construct_controllers(NetEntityRole::Client, &mut components);
        journal.clear();

        activate_controllers(&mut components, EntityIsMigrating::False);
        deactivate_controllers(&mut components, EntityIsMigrating::True);

        assert_eq!(
            journal.entries(),
            vec![
                "activate A false", "activate B false", "activate C false",
                "deactivate C true", "deactivate B true", "deactivate A true",
            ]
        );
    }

    #[test]
    fn test_activation_recomputes_input_order() {
        let journal = Journal::default();
        let mut components = ComponentSet::new(vec![
            Box::new(TestComponent::new(1, &journal).with_input_order(5)) as Box<dyn MultiplayerComponent>,
            Box::new(TestComponent::new(2, &journal).with_input_order(5)),
            Box::new(TestComponent::new(3, &journal).with_input_order(3)),
        ]);
        construct_controllers(NetEntityRole::Server, &mut components);

        activate_controllers(&mut components, EntityIsMigrating::False);
        assert_eq!(components.input_ids(), vec![3, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "Controller already constructed")]
    fn test_double_construct_is_fatal() {
        let journal = Journal::default();
        let mut components = declared(&journal);
        let role = construct_controllers(NetEntityRole::Server, &mut components);
        construct_controllers(role, &mut components);
    }

    #[test]
    #[should_panic(expected = "Controllers already destructed")]
    fn test_double_destruct_is_fatal() {
        let journal = Journal::default();
        let mut components = declared(&journal);
        destruct_controllers(NetEntityRole::Client, &mut components);
    }
}
