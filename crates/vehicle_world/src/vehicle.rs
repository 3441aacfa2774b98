//! Vehicles: trees of elements spawned and removed as one unit.
//!
//! Each element is an ordinary entity with its own component set, for
//! example a hull, a turret mounted on the hull and a barrel on the turret.
//! Parent links between elements form a forest. [`VehiclePrototype`] keeps
//! its elements depth-sorted (every parent before its children), and every
//! spawned [`Vehicle`] keeps the same order, so removing elements back to
//! front always removes children first.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vehicle_component::{ComponentValues, EcsError, EntityId, Signature};

use crate::error::{ConfigError, WorldError};
use crate::prototype::Prototype;
use crate::world::World;

/// Identifies a spawned vehicle. Ids are never reused within one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vehicle({})", self.0)
    }
}

/// One element as written in a prototype file, before sorting.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub name: String,
    /// Name of the parent element; `None` for a root.
    pub parent: Option<String>,
    pub values: ComponentValues,
}

/// A named tree of element prototypes.
#[derive(Debug, Clone)]
pub struct VehiclePrototype {
    name: String,
    elements: Vec<Prototype>,
    parents: Vec<Option<usize>>,
    depths: Vec<usize>,
}

impl VehiclePrototype {
    /// A vehicle made of one root element.
    #[must_use]
    pub fn single(prototype: Prototype) -> Self {
        Self {
            name: prototype.name().to_string(),
            elements: vec![prototype],
            parents: vec![None],
            depths: vec![0],
        }
    }

    /// Build a prototype from elements in any order, each paired with the
    /// name of its parent. Elements at the same depth keep their given
    /// order.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidVehicle`] for an empty element list, a
    /// duplicate element name, an unknown parent, or a parent cycle.
    pub fn from_elements(
        name: impl Into<String>,
        elements: Vec<(Prototype, Option<String>)>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let count = elements.len();
        if count == 0 {
            return Err(invalid(&name, "a vehicle needs at least one element"));
        }

        let mut index_of = HashMap::with_capacity(count);
        for (index, (element, _)) in elements.iter().enumerate() {
            if index_of.insert(element.name(), index).is_some() {
                return Err(invalid(
                    &name,
                    format_args!("duplicate element `{}`", element.name()),
                ));
            }
        }

        let mut parents = Vec::with_capacity(count);
        for (element, parent) in &elements {
            let parent = match parent {
                Some(parent) => Some(*index_of.get(parent.as_str()).ok_or_else(|| {
                    invalid(
                        &name,
                        format_args!("element `{}` has unknown parent `{parent}`", element.name()),
                    )
                })?),
                None => None,
            };
            parents.push(parent);
        }

        // A walk up the tree longer than the element count means a cycle.
        let mut depths = Vec::with_capacity(count);
        for (index, (element, _)) in elements.iter().enumerate() {
            let mut depth = 0;
            let mut cursor = parents[index];
            while let Some(parent) = cursor {
                depth += 1;
                if depth > count {
                    return Err(invalid(
                        &name,
                        format_args!("element `{}` is part of a parent cycle", element.name()),
                    ));
                }
                cursor = parents[parent];
            }
            depths.push(depth);
        }

        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by_key(|&index| depths[index]);
        let mut sorted_index = vec![0; count];
        for (sorted, &original) in order.iter().enumerate() {
            sorted_index[original] = sorted;
        }

        let mut slots: Vec<Option<Prototype>> =
            elements.into_iter().map(|(element, _)| Some(element)).collect();
        Ok(Self {
            elements: order
                .iter()
                .filter_map(|&original| slots[original].take())
                .collect(),
            parents: order
                .iter()
                .map(|&original| parents[original].map(|parent| sorted_index[parent]))
                .collect(),
            depths: order.iter().map(|&original| depths[original]).collect(),
            name,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element prototypes, depth-sorted.
    #[must_use]
    pub fn elements(&self) -> &[Prototype] {
        &self.elements
    }

    #[must_use]
    pub fn element(&self, name: &str) -> Option<&Prototype> {
        self.elements.iter().find(|element| element.name() == name)
    }

    /// Index of the parent of element `index`.
    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents.get(index).copied().flatten()
    }

    #[must_use]
    pub fn depth(&self, index: usize) -> usize {
        self.depths.get(index).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.depths.iter().copied().max().unwrap_or(0)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(index, _)| index)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(move |(_, parent)| **parent == Some(index))
            .map(|(child, _)| child)
    }

    /// Every kind used by any element.
    #[must_use]
    pub fn signature(&self) -> Signature {
        Signature::new(
            self.elements
                .iter()
                .flat_map(|element| element.signature().iter()),
        )
    }

    /// Component values for every element, depth-sorted. Each override
    /// applies to every element whose signature has its kind.
    ///
    /// # Errors
    ///
    /// [`EcsError::SignatureMismatch`] if an override's kind is in no
    /// element.
    pub fn instantiate(&self, overrides: ComponentValues) -> Result<Vec<ComponentValues>, EcsError> {
        let signature = self.signature();
        let extra = overrides.signature();
        if !signature.is_superset_of(&extra) {
            return Err(EcsError::SignatureMismatch {
                expected: signature,
                found: extra,
            });
        }
        self.elements
            .iter()
            .map(|element| {
                let own = overrides
                    .iter()
                    .filter(|(kind, _)| element.signature().contains(*kind))
                    .map(|(kind, value)| (kind, value.clone_value()))
                    .collect();
                element.instantiate(own)
            })
            .collect()
    }
}

fn invalid(vehicle: &str, message: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidVehicle {
        vehicle: vehicle.to_string(),
        message: message.to_string(),
    }
}

/// One spawned element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleElement {
    pub name: String,
    pub entity: EntityId,
    /// Position of the parent in [`Vehicle::elements`].
    pub parent: Option<usize>,
}

/// A spawned vehicle: its elements in depth order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    id: VehicleId,
    prototype: String,
    elements: Vec<VehicleElement>,
}

impl Vehicle {
    #[must_use]
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Name of the prototype it was spawned from.
    #[must_use]
    pub fn prototype(&self) -> &str {
        &self.prototype
    }

    #[must_use]
    pub fn elements(&self) -> &[VehicleElement] {
        &self.elements
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.elements.iter().map(|element| element.entity)
    }

    pub fn roots(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.elements
            .iter()
            .filter(|element| element.parent.is_none())
            .map(|element| element.entity)
    }

    /// Entity of the element called `name`.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<EntityId> {
        self.elements
            .iter()
            .find(|element| element.name == name)
            .map(|element| element.entity)
    }

    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        let parent = self.elements[self.position(entity)?].parent?;
        self.elements.get(parent).map(|element| element.entity)
    }

    #[must_use]
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        let Some(position) = self.position(entity) else {
            return Vec::new();
        };
        self.elements
            .iter()
            .filter(|element| element.parent == Some(position))
            .map(|element| element.entity)
            .collect()
    }

    fn position(&self, entity: EntityId) -> Option<usize> {
        self.elements.iter().position(|element| element.entity == entity)
    }

    /// Drop one element. Its children become roots.
    fn detach(&mut self, entity: EntityId) -> bool {
        let Some(removed) = self.position(entity) else {
            return false;
        };
        self.elements.remove(removed);
        for element in &mut self.elements {
            element.parent = match element.parent {
                Some(parent) if parent == removed => None,
                Some(parent) if parent > removed => Some(parent - 1),
                other => other,
            };
        }
        true
    }
}

/// Every live vehicle in a world, and which vehicle owns each element.
#[derive(Debug, Default)]
pub struct VehicleTable {
    vehicles: BTreeMap<VehicleId, Vehicle>,
    owners: HashMap<EntityId, VehicleId>,
    next: u64,
}

impl VehicleTable {
    #[must_use]
    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    /// The vehicle `entity` is an element of.
    #[must_use]
    pub fn vehicle_of(&self, entity: EntityId) -> Option<VehicleId> {
        self.owners.get(&entity).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Vehicles in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub(crate) fn insert(&mut self, prototype: String, elements: Vec<VehicleElement>) -> VehicleId {
        let id = VehicleId(self.next);
        self.next += 1;
        for element in &elements {
            self.owners.insert(element.entity, id);
        }
        self.vehicles.insert(
            id,
            Vehicle {
                id,
                prototype,
                elements,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: VehicleId) -> Option<Vehicle> {
        let vehicle = self.vehicles.remove(&id)?;
        for entity in vehicle.entities() {
            self.owners.remove(&entity);
        }
        Some(vehicle)
    }

    /// Forget a despawned element. A vehicle left with no elements is removed.
    pub(crate) fn detach(&mut self, entity: EntityId) {
        let Some(id) = self.owners.remove(&entity) else {
            return;
        };
        let emptied = self.vehicles.get_mut(&id).is_some_and(|vehicle| {
            vehicle.detach(entity);
            vehicle.is_empty()
        });
        if emptied {
            self.vehicles.remove(&id);
        }
    }

    /// Drop every vehicle. The id counter keeps running so old ids stay stale.
    pub(crate) fn clear(&mut self) {
        self.vehicles.clear();
        self.owners.clear();
    }
}

impl World {
    /// Spawn every element of `prototype`, parents first. On failure the
    /// elements spawned so far are removed again.
    ///
    /// # Errors
    ///
    /// An override outside every element's signature, or any
    /// [`World::spawn`] error.
    pub fn spawn_vehicle(
        &mut self,
        prototype: &VehiclePrototype,
        overrides: ComponentValues,
    ) -> Result<VehicleId, WorldError> {
        let values = prototype.instantiate(overrides)?;
        let mut elements: Vec<VehicleElement> = Vec::with_capacity(values.len());
        for (index, (element, values)) in prototype.elements().iter().zip(values).enumerate() {
            match self.spawn(values) {
                Ok(entity) => elements.push(VehicleElement {
                    name: element.name().to_string(),
                    entity,
                    parent: prototype.parent(index),
                }),
                Err(err) => {
                    for spawned in elements.iter().rev() {
                        self.despawn(spawned.entity)?;
                    }
                    return Err(err);
                }
            }
        }

        let count = elements.len();
        let id = self
            .vehicles_mut()
            .insert(prototype.name().to_string(), elements);
        debug!(vehicle = %id, prototype = prototype.name(), elements = count, "spawned vehicle");
        Ok(id)
    }

    /// Despawn every element of a vehicle, children before parents. Returns
    /// the number of elements removed.
    ///
    /// # Errors
    ///
    /// [`WorldError::StaleVehicle`] if the vehicle no longer exists.
    pub fn despawn_vehicle(&mut self, id: VehicleId) -> Result<usize, WorldError> {
        let vehicle = self
            .vehicles_mut()
            .remove(id)
            .ok_or(WorldError::StaleVehicle(id))?;
        for element in vehicle.elements().iter().rev() {
            self.despawn(element.entity)?;
        }
        debug!(vehicle = %id, elements = vehicle.len(), "despawned vehicle");
        Ok(vehicle.len())
    }

    /// # Errors
    ///
    /// [`WorldError::StaleVehicle`] if the vehicle no longer exists.
    pub fn vehicle(&self, id: VehicleId) -> Result<&Vehicle, WorldError> {
        self.vehicles().get(id).ok_or(WorldError::StaleVehicle(id))
    }

    #[must_use]
    pub fn vehicle_of(&self, entity: EntityId) -> Option<VehicleId> {
        self.vehicles().vehicle_of(entity)
    }

    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.vehicles().len()
    }
}
