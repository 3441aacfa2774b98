//! Deferred structural mutations.
//!
//! Systems must not spawn, despawn, or change an entity's component set
//! while a query over the same world is running. They push commands into a
//! [`CommandBuffer`] instead, and the tick loop applies the buffer once all
//! queries for the tick have finished.

use std::collections::VecDeque;

use tracing::{debug, warn};
use vehicle_component::{Component, ComponentKind, ComponentValue, ComponentValues, EntityId};

use crate::error::WorldError;
use crate::prototype::PrototypeRegistry;
use crate::vehicle::VehicleId;
use crate::world::World;

/// One queued mutation.
#[derive(Debug)]
pub enum Command {
    /// Spawn from a named prototype.
    Spawn {
        prototype: String,
        overrides: ComponentValues,
    },
    /// Spawn with an explicit component set.
    SpawnWith(ComponentValues),
    /// Spawn every element of a named prototype as one vehicle.
    SpawnVehicle {
        prototype: String,
        overrides: ComponentValues,
    },
    Despawn(EntityId),
    /// Despawn every element of a vehicle.
    DespawnVehicle(VehicleId),
    Insert {
        entity: EntityId,
        kind: ComponentKind,
        value: Box<dyn ComponentValue>,
    },
    Remove {
        entity: EntityId,
        kind: ComponentKind,
    },
}

/// FIFO queue of [`Command`]s.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: VecDeque<Command>,
}

impl CommandBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    pub fn spawn(&mut self, prototype: impl Into<String>, overrides: ComponentValues) {
        self.push(Command::Spawn {
            prototype: prototype.into(),
            overrides,
        });
    }

    pub fn spawn_with(&mut self, values: ComponentValues) {
        self.push(Command::SpawnWith(values));
    }

    pub fn despawn(&mut self, entity: EntityId) {
        self.push(Command::Despawn(entity));
    }

    pub fn spawn_vehicle(&mut self, prototype: impl Into<String>, overrides: ComponentValues) {
        self.push(Command::SpawnVehicle {
            prototype: prototype.into(),
            overrides,
        });
    }

    pub fn despawn_vehicle(&mut self, vehicle: VehicleId) {
        self.push(Command::DespawnVehicle(vehicle));
    }

    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) {
        self.push(Command::Insert {
            entity,
            kind: T::kind(),
            value: Box::new(value),
        });
    }

    pub fn remove<T: Component>(&mut self, entity: EntityId) {
        self.remove_kind(entity, T::kind());
    }

    pub fn remove_kind(&mut self, entity: EntityId, kind: ComponentKind) {
        self.push(Command::Remove { entity, kind });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every queued command, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.commands.drain(..)
    }
}

/// Outcome of [`World::apply`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Commands that took effect.
    pub applied: usize,
    /// Commands skipped because their entity no longer exists.
    pub stale: usize,
    /// Entities created, in command order.
    pub spawned: Vec<EntityId>,
    /// Vehicles created, in command order.
    pub vehicles: Vec<VehicleId>,
    /// Every other failure, in command order.
    pub errors: Vec<WorldError>,
}

impl ApplyReport {
    /// Returns `true` if no command failed for a reason other than a stale
    /// entity.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl World {
    /// Apply and empty `buffer` in FIFO order.
    ///
    /// A command targeting an entity or vehicle despawned earlier (in this
    /// buffer or before) is counted as stale and skipped. Other failures are collected
    /// and do not stop the remaining commands.
    pub fn apply(&mut self, buffer: &mut CommandBuffer, prototypes: &PrototypeRegistry) -> ApplyReport {
        let mut report = ApplyReport::default();
        for command in buffer.drain() {
            let result = match command {
                Command::Spawn {
                    prototype,
                    overrides,
                } => prototypes
                    .spawn(self, &prototype, overrides)
                    .map(|id| report.spawned.push(id)),
                Command::SpawnWith(values) => self.spawn(values).map(|id| report.spawned.push(id)),
                Command::SpawnVehicle {
                    prototype,
                    overrides,
                } => prototypes
                    .spawn_vehicle(self, &prototype, overrides)
                    .map(|id| report.vehicles.push(id)),
                Command::Despawn(entity) => self.despawn(entity),
                Command::DespawnVehicle(vehicle) => self.despawn_vehicle(vehicle).map(|_| ()),
                Command::Insert {
                    entity,
                    kind,
                    value,
                } => self.insert_dyn(entity, kind, value),
                Command::Remove { entity, kind } => self.remove_dyn(entity, kind).map(|_| ()),
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(err) if err.is_stale() => report.stale += 1,
                Err(err) => {
                    warn!(error = %err, "command failed");
                    report.errors.push(err);
                }
            }
        }

        debug!(
            applied = report.applied,
            stale = report.stale,
            failed = report.errors.len(),
            "applied command buffer"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use vehicle_component::Signature;

    use super::*;
    use crate::testing::{Fuel, Health, Seats, test_registry};
    use crate::vehicle::ElementSpec;

    fn setup() -> (World, PrototypeRegistry) {
        let registry = test_registry();
        let mut prototypes = PrototypeRegistry::new(registry.clone());
        prototypes
            .register(
                "drum",
                Signature::new([Fuel::kind()]),
                ComponentValues::new().with(Fuel(50.0)),
            )
            .unwrap();
        prototypes
            .register_vehicle(
                "bus",
                vec![
                    ElementSpec {
                        name: "chassis".to_string(),
                        parent: None,
                        values: ComponentValues::new().with(Health(40)),
                    },
                    ElementSpec {
                        name: "cabin".to_string(),
                        parent: Some("chassis".to_string()),
                        values: ComponentValues::new().with(Seats::new(12)),
                    },
                ],
            )
            .unwrap();
        (World::new(registry), prototypes)
    }

    #[test]
    fn test_buffer_is_fifo() {
        let mut buffer = CommandBuffer::new();
        buffer.spawn_with(ComponentValues::new());
        buffer.despawn(EntityId::new(0, 0));
        let order: Vec<_> = buffer
            .drain()
            .map(|command| matches!(command, Command::SpawnWith(_)))
            .collect();
        assert_eq!(order, vec![true, false]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_apply_spawns_and_mutates() {
        let (mut world, prototypes) = setup();
        let id = world.spawn(ComponentValues::new().with(Health(10))).unwrap();

        let mut buffer = CommandBuffer::new();
        buffer.spawn("drum", ComponentValues::new());
        buffer.spawn_with(ComponentValues::new().with(Health(1)));
        buffer.insert(id, Fuel(3.0));
        buffer.remove::<Health>(id);
        assert_eq!(buffer.len(), 4);

        let report = world.apply(&mut buffer, &prototypes);
        assert!(buffer.is_empty());
        assert!(report.is_clean());
        assert_eq!(report.applied, 4);
        assert_eq!(report.spawned.len(), 2);
        assert_eq!(world.get::<Fuel>(report.spawned[0]).unwrap(), &Fuel(50.0));
        assert_eq!(world.get::<Fuel>(id).unwrap(), &Fuel(3.0));
        assert!(!world.has(id, Health::kind()));
    }

    #[test]
    fn test_apply_skips_stale_entities() {
        let (mut world, prototypes) = setup();
        let id = world.spawn(ComponentValues::new().with(Health(10))).unwrap();

        let mut buffer = CommandBuffer::new();
        buffer.despawn(id);
        buffer.insert(id, Fuel(1.0));
        buffer.despawn(id);

        let report = world.apply(&mut buffer, &prototypes);
        assert_eq!(report.applied, 1);
        assert_eq!(report.stale, 2);
        assert!(report.is_clean());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_apply_collects_errors_and_continues() {
        let (mut world, prototypes) = setup();
        let mut buffer = CommandBuffer::new();
        buffer.spawn("tank", ComponentValues::new());
        buffer.spawn("drum", ComponentValues::new());

        let report = world.apply(&mut buffer, &prototypes);
        assert_eq!(report.applied, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], WorldError::UnknownPrototype(_)));
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_deferred_despawn_during_query() {
        let (mut world, prototypes) = setup();
        for value in [0, 5, 0, 7] {
            world.spawn(ComponentValues::new().with(Health(value))).unwrap();
        }

        let mut buffer = CommandBuffer::new();
        for (entity, health) in world.query::<(EntityId, &Health)>().unwrap() {
            if health.0 == 0 {
                buffer.despawn(entity);
            }
        }
        world.apply(&mut buffer, &prototypes);

        let mut left: Vec<i32> = world.query::<&Health>().unwrap().map(|h| h.0).collect();
        left.sort();
        assert_eq!(left, vec![5, 7]);
    }

    #[test]
    fn test_vehicle_commands() {
        let (mut world, prototypes) = setup();
        let mut buffer = CommandBuffer::new();
        buffer.spawn_vehicle("bus", ComponentValues::new());
        buffer.spawn_vehicle("drum", ComponentValues::new());

        let report = world.apply(&mut buffer, &prototypes);
        assert!(report.is_clean());
        assert_eq!(report.applied, 2);
        assert_eq!(report.vehicles.len(), 2);
        assert_eq!(world.entity_count(), 3);

        let bus = world.vehicle(report.vehicles[0]).unwrap();
        let chassis = bus.element("chassis").unwrap();
        let cabin = bus.element("cabin").unwrap();
        assert_eq!(bus.parent(cabin), Some(chassis));
        assert_eq!(world.get::<Seats>(cabin).unwrap(), &Seats::new(12));

        buffer.despawn_vehicle(report.vehicles[0]);
        buffer.despawn_vehicle(report.vehicles[0]);
        let second = world.apply(&mut buffer, &prototypes);
        assert_eq!(second.applied, 1);
        assert_eq!(second.stale, 1);
        assert!(second.is_clean());
        assert_eq!(world.entity_count(), 1);
        assert!(!world.is_alive(chassis));
        assert!(!world.is_alive(cabin));
        assert_eq!(world.vehicle_count(), 1);
    }
}
