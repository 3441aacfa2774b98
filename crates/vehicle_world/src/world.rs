//! The [`World`]: archetype storage and the entity table kept in lockstep.
//!
//! Every structural change goes through here so that each row move or
//! removal is followed by the matching entity-table update before the call
//! returns. Outside code never sees a state where the two disagree.

use std::sync::Arc;

use tracing::debug;
use vehicle_component::{
    ArchetypeHandle, ArchetypeStore, Component, ComponentKind, ComponentRegistry, ComponentValue,
    ComponentValues, DynamicQueryIter, DynamicQueryIterMut, EcsError, EntityId, EntityLocation,
    EntityTable, QueryData, QueryIter, QueryIterMut, ReadOnlyQueryData, Signature,
    DEFAULT_MAX_ENTITIES,
};

use crate::error::WorldError;
use crate::vehicle::VehicleTable;

/// Row count of one archetype, as reported by [`World::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeStats {
    pub handle: ArchetypeHandle,
    pub signature: Signature,
    pub rows: usize,
}

/// Aggregate storage statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldStats {
    pub entities: usize,
    pub vehicles: usize,
    pub archetypes: Vec<ArchetypeStats>,
}

/// The canonical entity and component state.
#[derive(Debug)]
pub struct World {
    registry: Arc<ComponentRegistry>,
    store: ArchetypeStore,
    entities: EntityTable,
    vehicles: VehicleTable,
}

impl World {
    /// Create an empty world with the default entity capacity.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self::with_capacity(registry, DEFAULT_MAX_ENTITIES)
    }

    /// Create an empty world holding at most `max_entities` live entities.
    #[must_use]
    pub fn with_capacity(registry: Arc<ComponentRegistry>, max_entities: usize) -> Self {
        Self {
            store: ArchetypeStore::new(Arc::clone(&registry)),
            registry,
            entities: EntityTable::new(max_entities),
            vehicles: VehicleTable::default(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &ArchetypeStore {
        &self.store
    }

    #[must_use]
    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    #[must_use]
    pub fn vehicles(&self) -> &VehicleTable {
        &self.vehicles
    }

    pub(crate) fn vehicles_mut(&mut self) -> &mut VehicleTable {
        &mut self.vehicles
    }

    /// Spawn an entity with exactly `values` as its components.
    ///
    /// # Errors
    ///
    /// [`EcsError::CapacityExceeded`], [`EcsError::UnknownKind`], or
    /// [`EcsError::ComponentTypeMismatch`]. Nothing is allocated on error.
    pub fn spawn(&mut self, values: ComponentValues) -> Result<EntityId, WorldError> {
        let id = self.entities.allocate()?;
        self.place(id, values)
    }

    /// Spawn at a specific entity index, or at any free index if that one is
    /// taken. Used when restoring snapshots.
    pub(crate) fn spawn_at(
        &mut self,
        index: u32,
        values: ComponentValues,
    ) -> Result<EntityId, WorldError> {
        let id = match self.entities.allocate_at(index) {
            Ok(id) => id,
            Err(EcsError::IndexInUse(_)) => self.entities.allocate()?,
            Err(err) => return Err(err.into()),
        };
        self.place(id, values)
    }

    fn place(&mut self, id: EntityId, values: ComponentValues) -> Result<EntityId, WorldError> {
        let signature = values.signature();
        let stored = self.store.get_or_create(&signature).and_then(|handle| {
            let row = self.store.insert_row(handle, id, values)?;
            Ok((handle, row))
        });
        match stored {
            Ok((handle, row)) => {
                self.entities
                    .set_location(id, EntityLocation::new(handle, row))?;
                debug!(entity = %id, archetype = %handle, row, "spawned entity");
                Ok(id)
            }
            Err(err) => {
                self.entities.free(id)?;
                Err(err.into())
            }
        }
    }

    /// Destroy an entity. Its id becomes stale. If it belongs to a vehicle
    /// its children there become roots.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn despawn(&mut self, id: EntityId) -> Result<(), WorldError> {
        let location = self.entities.get_location(id)?;
        let displaced = self.store.remove_row(location.archetype, location.row)?;
        if let Some(moved) = displaced {
            self.entities.set_location(moved, location)?;
        }
        self.entities.free(id)?;
        self.vehicles.detach(id);
        debug!(entity = %id, "despawned entity");
        Ok(())
    }

    /// Move `id` to the archetype for `to_signature`, filling added kinds
    /// from `added` or the registry defaults.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] plus the errors of
    /// [`ArchetypeStore::move_row`].
    pub fn change_signature(
        &mut self,
        id: EntityId,
        to_signature: &Signature,
        added: ComponentValues,
    ) -> Result<(), WorldError> {
        let location = self.entities.get_location(id)?;
        let moved = self
            .store
            .move_row(location.archetype, location.row, to_signature, added)?;
        if let Some(displaced) = moved.displaced {
            self.entities.set_location(displaced, location)?;
        }
        self.entities
            .set_location(id, EntityLocation::new(moved.handle, moved.row))?;
        Ok(())
    }

    /// Add or overwrite one component.
    ///
    /// # Errors
    ///
    /// See [`change_signature`](Self::change_signature).
    pub fn insert<T: Component>(&mut self, id: EntityId, value: T) -> Result<(), WorldError> {
        self.insert_dyn(id, T::kind(), Box::new(value))
    }

    /// Type-erased [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// See [`change_signature`](Self::change_signature).
    pub fn insert_dyn(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
        value: Box<dyn ComponentValue>,
    ) -> Result<(), WorldError> {
        let to_signature = self.signature(id)?.with(kind);
        let mut added = ComponentValues::new();
        added.insert(kind, value);
        self.change_signature(id, &to_signature, added)
    }

    /// Add a component with its registered default value. Does nothing if
    /// the entity already has it.
    ///
    /// # Errors
    ///
    /// See [`change_signature`](Self::change_signature).
    pub fn insert_default(&mut self, id: EntityId, kind: ComponentKind) -> Result<(), WorldError> {
        let signature = self.signature(id)?;
        if signature.contains(kind) {
            return Ok(());
        }
        let to_signature = signature.with(kind);
        self.change_signature(id, &to_signature, ComponentValues::new())
    }

    /// Remove one component. Returns `false` if the entity did not have it.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn remove<T: Component>(&mut self, id: EntityId) -> Result<bool, WorldError> {
        self.remove_dyn(id, T::kind())
    }

    /// Type-erased [`remove`](Self::remove).
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn remove_dyn(&mut self, id: EntityId, kind: ComponentKind) -> Result<bool, WorldError> {
        let signature = self.signature(id)?;
        if !signature.contains(kind) {
            return Ok(false);
        }
        let to_signature = signature.without(kind);
        self.change_signature(id, &to_signature, ComponentValues::new())?;
        Ok(true)
    }

    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn location(&self, id: EntityId) -> Result<EntityLocation, WorldError> {
        Ok(self.entities.get_location(id)?)
    }

    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id)
    }

    /// The entity's current component set.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn signature(&self, id: EntityId) -> Result<&Signature, WorldError> {
        let location = self.entities.get_location(id)?;
        Ok(self.store.get(location.archetype)?.signature())
    }

    /// Returns `true` if `id` is live and has `kind`.
    #[must_use]
    pub fn has(&self, id: EntityId, kind: ComponentKind) -> bool {
        self.signature(id)
            .is_ok_and(|signature| signature.contains(kind))
    }

    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or [`EcsError::MissingComponent`].
    pub fn get_dyn(&self, id: EntityId, kind: ComponentKind) -> Result<&dyn ComponentValue, WorldError> {
        let location = self.entities.get_location(id)?;
        self.store
            .get(location.archetype)?
            .get(kind, location.row)
            .ok_or(WorldError::Ecs(EcsError::MissingComponent { entity: id, kind }))
    }

    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or [`EcsError::MissingComponent`].
    pub fn get_dyn_mut(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
    ) -> Result<&mut dyn ComponentValue, WorldError> {
        let location = self.entities.get_location(id)?;
        self.store
            .get_mut(location.archetype)?
            .get_mut(kind, location.row)
            .ok_or(WorldError::Ecs(EcsError::MissingComponent { entity: id, kind }))
    }

    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], [`EcsError::MissingComponent`], or
    /// [`EcsError::ComponentTypeMismatch`] if `T` is not the type registered
    /// under its kind.
    pub fn get<T: Component>(&self, id: EntityId) -> Result<&T, WorldError> {
        let value = self.get_dyn(id, T::kind())?;
        let found = value.value_type_name();
        value.downcast_ref::<T>().ok_or_else(|| type_mismatch::<T>(found))
    }

    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn get_mut<T: Component>(&mut self, id: EntityId) -> Result<&mut T, WorldError> {
        let value = self.get_dyn_mut(id, T::kind())?;
        let found = value.value_type_name();
        value.downcast_mut::<T>().ok_or_else(|| type_mismatch::<T>(found))
    }

    /// Clone every component of `id`.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn components(&self, id: EntityId) -> Result<ComponentValues, WorldError> {
        let location = self.entities.get_location(id)?;
        let archetype = self.store.get(location.archetype)?;
        Ok(archetype
            .signature()
            .iter()
            .filter_map(|kind| {
                archetype
                    .get(kind, location.row)
                    .map(|value| (kind, value.clone_value()))
            })
            .collect())
    }

    /// See [`ArchetypeStore::query`].
    ///
    /// # Errors
    ///
    /// Unknown, mistyped, or duplicate kinds in `Q`.
    pub fn query<Q: ReadOnlyQueryData>(&self) -> Result<QueryIter<'_, Q>, WorldError> {
        Ok(self.store.query::<Q>()?)
    }

    /// See [`ArchetypeStore::query_mut`].
    ///
    /// # Errors
    ///
    /// Unknown, mistyped, or duplicate kinds in `Q`.
    pub fn query_mut<Q: QueryData>(&mut self) -> Result<QueryIterMut<'_, Q>, WorldError> {
        Ok(self.store.query_mut::<Q>()?)
    }

    /// See [`ArchetypeStore::query_kinds`].
    ///
    /// # Errors
    ///
    /// Unknown or duplicate kinds.
    pub fn query_kinds(&self, kinds: &[ComponentKind]) -> Result<DynamicQueryIter<'_>, WorldError> {
        Ok(self.store.query_kinds(kinds)?)
    }

    /// See [`ArchetypeStore::query_kinds_mut`].
    ///
    /// # Errors
    ///
    /// Unknown or duplicate kinds.
    pub fn query_kinds_mut(
        &mut self,
        kinds: &[ComponentKind],
    ) -> Result<DynamicQueryIterMut<'_>, WorldError> {
        Ok(self.store.query_kinds_mut(kinds)?)
    }

    /// Despawn everything. Archetypes are kept; all old ids become stale.
    pub fn clear(&mut self) {
        let count = self.entities.len();
        self.store.clear();
        self.entities.clear();
        self.vehicles.clear();
        debug!(count, "cleared world");
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            entities: self.entities.len(),
            vehicles: self.vehicles.len(),
            archetypes: self
                .store
                .iter()
                .map(|archetype| ArchetypeStats {
                    handle: archetype.handle(),
                    signature: archetype.signature().clone(),
                    rows: archetype.len(),
                })
                .collect(),
        }
    }
}

fn type_mismatch<T: Component>(found: &'static str) -> WorldError {
    WorldError::Ecs(EcsError::ComponentTypeMismatch {
        kind: T::kind(),
        expected: std::any::type_name::<T>(),
        found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fuel, Health, Seats, test_world};

    fn health_only(value: i32) -> ComponentValues {
        ComponentValues::new().with(Health(value))
    }

    #[test]
    fn test_spawn_and_get() {
        let mut world = test_world();
        let id = world.spawn(health_only(70)).unwrap();
        assert_eq!(world.get::<Health>(id).unwrap(), &Health(70));
        assert!(world.has(id, Health::kind()));
        assert!(!world.has(id, Fuel::kind()));
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_get_missing_component() {
        let mut world = test_world();
        let id = world.spawn(health_only(1)).unwrap();
        assert!(matches!(
            world.get::<Fuel>(id),
            Err(WorldError::Ecs(EcsError::MissingComponent { .. }))
        ));
    }

    #[test]
    fn test_spawn_failure_frees_id() {
        let mut world = test_world();
        let mut values = ComponentValues::new();
        values.insert(Health::kind(), Box::new(Fuel(1.0)));
        assert!(world.spawn(values).is_err());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_despawn_fixes_displaced_location() {
        let mut world = test_world();
        let a = world.spawn(health_only(1)).unwrap();
        let b = world.spawn(health_only(2)).unwrap();
        let c = world.spawn(health_only(3)).unwrap();

        world.despawn(b).unwrap();

        assert!(world.get::<Health>(b).unwrap_err().is_stale());
        assert_eq!(world.location(a).unwrap().row, 0);
        assert_eq!(world.location(c).unwrap().row, 1);
        assert_eq!(world.get::<Health>(c).unwrap(), &Health(3));
    }

    #[test]
    fn test_despawn_twice_is_stale() {
        let mut world = test_world();
        let id = world.spawn(health_only(1)).unwrap();
        world.despawn(id).unwrap();
        assert!(world.despawn(id).unwrap_err().is_stale());
    }

    #[test]
    fn test_insert_moves_archetype_with_default() {
        let mut world = test_world();
        let id = world.spawn(health_only(100)).unwrap();
        world.insert_default(id, Fuel::kind()).unwrap();
        assert_eq!(world.get::<Fuel>(id).unwrap(), &Fuel(0.0));
        assert_eq!(world.get::<Health>(id).unwrap(), &Health(100));
        assert_eq!(world.archetype_count(), 2);
    }

    #[test]
    fn test_insert_overwrites_existing_value() {
        let mut world = test_world();
        let id = world.spawn(health_only(100)).unwrap();
        world.insert(id, Health(5)).unwrap();
        assert_eq!(world.get::<Health>(id).unwrap(), &Health(5));
        assert_eq!(world.archetype_count(), 1);
    }

    #[test]
    fn test_remove_component() {
        let mut world = test_world();
        let id = world
            .spawn(ComponentValues::new().with(Health(1)).with(Fuel(2.0)))
            .unwrap();
        assert!(world.remove::<Fuel>(id).unwrap());
        assert!(!world.remove::<Fuel>(id).unwrap());
        assert!(!world.has(id, Fuel::kind()));
        assert_eq!(world.get::<Health>(id).unwrap(), &Health(1));
    }

    #[test]
    fn test_move_updates_displaced_entity() {
        let mut world = test_world();
        let a = world.spawn(health_only(1)).unwrap();
        let b = world.spawn(health_only(2)).unwrap();
        world.insert(a, Fuel(9.0)).unwrap();

        // `b` was swapped into row 0 of the health-only archetype.
        let location = world.location(b).unwrap();
        assert_eq!(location.row, 0);
        assert_eq!(world.get::<Health>(b).unwrap(), &Health(2));
        assert_eq!(world.get::<Fuel>(a).unwrap(), &Fuel(9.0));
    }

    #[test]
    fn test_get_mut_writes_through() {
        let mut world = test_world();
        let id = world.spawn(health_only(1)).unwrap();
        world.get_mut::<Health>(id).unwrap().0 = 42;
        assert_eq!(world.get::<Health>(id).unwrap(), &Health(42));
    }

    #[test]
    fn test_components_clones_all_values() {
        let mut world = test_world();
        let id = world
            .spawn(ComponentValues::new().with(Health(3)).with(Seats::new(2)))
            .unwrap();
        let values = world.components(id).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get_as::<Seats>(), Some(&Seats::new(2)));
    }

    #[test]
    fn test_capacity_exceeded() {
        let registry = crate::testing::test_registry();
        let mut world = World::with_capacity(registry, 1);
        world.spawn(health_only(1)).unwrap();
        assert!(matches!(
            world.spawn(health_only(2)),
            Err(WorldError::Ecs(EcsError::CapacityExceeded(1)))
        ));
    }

    #[test]
    fn test_clear() {
        let mut world = test_world();
        let id = world.spawn(health_only(1)).unwrap();
        world.spawn(ComponentValues::new().with(Fuel(1.0))).unwrap();
        world.clear();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.archetype_count(), 2);
        assert!(!world.is_alive(id));
        assert_eq!(world.query::<&Health>().unwrap().count(), 0);
    }

    #[test]
    fn test_stats() {
        let mut world = test_world();
        world.spawn(health_only(1)).unwrap();
        world.spawn(health_only(2)).unwrap();
        world.spawn(ComponentValues::new().with(Fuel(1.0))).unwrap();
        let stats = world.stats();
        assert_eq!(stats.entities, 3);
        let rows: Vec<usize> = stats.archetypes.iter().map(|a| a.rows).collect();
        assert_eq!(rows, vec![2, 1]);
    }
}
