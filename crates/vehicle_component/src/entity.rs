//! Entity identifiers and the entity table.
//!
//! An [`EntityId`] is an index plus a generation counter. When an entity is
//! freed its slot's generation is bumped and the index goes onto a free list,
//! so an old id can never be confused with a later entity reusing the index.
//!
//! The [`EntityTable`] is the only place identity is translated into a
//! storage position ([`EntityLocation`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeHandle;
use crate::error::EcsError;

/// Default maximum number of live entities.
pub const DEFAULT_MAX_ENTITIES: usize = 10_000;

/// A generation-tagged entity identifier.
///
/// Entities are pure identifiers; components attached to them give them
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The storage slot index. Stable for the entity's lifetime.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single `u64` (generation in the high half).
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Where an entity's row lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    pub archetype: ArchetypeHandle,
    pub row: usize,
}

impl EntityLocation {
    #[must_use]
    pub const fn new(archetype: ArchetypeHandle, row: usize) -> Self {
        Self { archetype, row }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    alive: bool,
    location: Option<EntityLocation>,
}

/// Maps entity ids to storage locations and recycles indices.
#[derive(Debug)]
pub struct EntityTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    capacity: usize,
}

impl EntityTable {
    /// A table holding at most `capacity` live entities.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            capacity,
        }
    }

    /// Allocate an id, reusing a freed index when one is available.
    ///
    /// # Errors
    ///
    /// [`EcsError::CapacityExceeded`] if the table is full.
    pub fn allocate(&mut self) -> Result<EntityId, EcsError> {
        if self.live >= self.capacity {
            return Err(EcsError::CapacityExceeded(self.capacity));
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| EcsError::CapacityExceeded(self.capacity))?;
                self.slots.push(Slot {
                    generation: 0,
                    alive: false,
                    location: None,
                });
                index
            }
        };
        Ok(self.claim(index))
    }

    /// Allocate a specific index, used when restoring snapshots so entities
    /// keep their stable index. The generation is whatever the slot holds.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexOutOfRange`] if `index` is not below the capacity,
    /// [`EcsError::IndexInUse`] if the index is live, or
    /// [`EcsError::CapacityExceeded`] if the table is full.
    pub fn allocate_at(&mut self, index: u32) -> Result<EntityId, EcsError> {
        let wanted = index as usize;
        if wanted >= self.capacity {
            return Err(EcsError::IndexOutOfRange {
                index,
                capacity: self.capacity,
            });
        }
        if self.live >= self.capacity {
            return Err(EcsError::CapacityExceeded(self.capacity));
        }
        if let Some(slot) = self.slots.get(wanted) {
            if slot.alive {
                return Err(EcsError::IndexInUse(index));
            }
            self.free.retain(|&free| free != index);
        } else {
            // Indices skipped over become free for later allocations.
            for skipped in self.slots.len()..wanted {
                self.free.push(skipped as u32);
            }
            self.slots.resize(
                wanted + 1,
                Slot {
                    generation: 0,
                    alive: false,
                    location: None,
                },
            );
        }
        Ok(self.claim(index))
    }

    fn claim(&mut self, index: u32) -> EntityId {
        let slot = &mut self.slots[index as usize];
        slot.alive = true;
        slot.location = None;
        self.live += 1;
        EntityId::new(index, slot.generation)
    }

    fn slot(&self, id: EntityId) -> Result<&Slot, EcsError> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.alive && slot.generation == id.generation => Ok(slot),
            _ => Err(EcsError::StaleEntity(id)),
        }
    }

    fn slot_mut(&mut self, id: EntityId) -> Result<&mut Slot, EcsError> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.alive && slot.generation == id.generation => Ok(slot),
            _ => Err(EcsError::StaleEntity(id)),
        }
    }

    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn set_location(&mut self, id: EntityId, location: EntityLocation) -> Result<(), EcsError> {
        self.slot_mut(id)?.location = Some(location);
        Ok(())
    }

    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` was freed (even if its index has
    /// been reallocated), or [`EcsError::Unplaced`] if it never received a
    /// location.
    pub fn get_location(&self, id: EntityId) -> Result<EntityLocation, EcsError> {
        self.slot(id)?.location.ok_or(EcsError::Unplaced(id))
    }

    /// Free `id`: bump its slot's generation and recycle the index.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if `id` is not live.
    pub fn free(&mut self, id: EntityId) -> Result<(), EcsError> {
        let slot = self.slot_mut(id)?;
        slot.alive = false;
        slot.location = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(())
    }

    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slot(id).is_ok()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live ids in index order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| EntityId::new(index as u32, slot.generation))
    }

    /// Free every live entity. Old ids all become stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.alive {
                slot.alive = false;
                slot.location = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
        self.live = 0;
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTITIES)
    }
}
