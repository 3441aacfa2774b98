//! Archetype definitions and storage.
//!
//! An archetype is a unique set of component kinds. Entities sharing the same
//! set are stored together in one [`Archetype`]: one dense column per kind
//! plus a parallel list of entity ids, so that row `i` of every column
//! belongs to `entities[i]`.
//!
//! Archetypes are created on demand by the [`ArchetypeStore`] and are never
//! destroyed, only emptied. Rows are removed with swap-with-last compaction;
//! every operation that moves a row reports which entity was displaced so the
//! [`EntityTable`](crate::entity::EntityTable) can be updated.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::{Component, ComponentKind, ComponentValue, ComponentValues};
use crate::entity::EntityId;
use crate::error::EcsError;
use crate::registry::ComponentRegistry;

/// A canonical (sorted, deduplicated) set of component kinds.
///
/// Two signatures built from the same kinds in any order compare equal, so
/// insertion order can never produce duplicate archetypes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<ComponentKind>", into = "Vec<ComponentKind>")]
pub struct Signature(Vec<ComponentKind>);

impl Signature {
    #[must_use]
    pub fn new(kinds: impl IntoIterator<Item = ComponentKind>) -> Self {
        let mut kinds: Vec<_> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        Self(kinds)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Kinds in canonical order.
    #[must_use]
    pub fn kinds(&self) -> &[ComponentKind] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.0.binary_search(&kind).is_ok()
    }

    /// Column index of `kind` in an archetype with this signature.
    #[must_use]
    pub fn position(&self, kind: ComponentKind) -> Option<usize> {
        self.0.binary_search(&kind).ok()
    }

    /// Returns `true` if every kind in `other` is also in `self`.
    #[must_use]
    pub fn is_superset_of(&self, other: &Signature) -> bool {
        let mut mine = self.0.iter();
        other.0.iter().all(|wanted| mine.any(|kind| kind == wanted))
    }

    /// This signature plus `kind`.
    #[must_use]
    pub fn with(&self, kind: ComponentKind) -> Self {
        let mut kinds = self.0.clone();
        if let Err(pos) = kinds.binary_search(&kind) {
            kinds.insert(pos, kind);
        }
        Self(kinds)
    }

    /// This signature minus `kind`.
    #[must_use]
    pub fn without(&self, kind: ComponentKind) -> Self {
        Self(self.0.iter().copied().filter(|k| *k != kind).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<ComponentKind>> for Signature {
    fn from(kinds: Vec<ComponentKind>) -> Self {
        Self::new(kinds)
    }
}

impl From<Signature> for Vec<ComponentKind> {
    fn from(signature: Signature) -> Self {
        signature.0
    }
}

impl FromIterator<ComponentKind> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{kind}")?;
        }
        f.write_str("]")
    }
}

/// Index of an archetype in its store, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeHandle(pub usize);

impl fmt::Display for ArchetypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Archetype({})", self.0)
    }
}

/// A dense, growable column of values of a single component kind.
///
/// Implemented by [`TypedColumn<T>`]; the archetype only sees `dyn Column`.
pub trait Column: Send + Sync + fmt::Debug {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `value` can be pushed into this column.
    fn accepts(&self, value: &dyn ComponentValue) -> bool;

    /// Append a value, handing it back if it has the wrong type.
    fn push(&mut self, value: Box<dyn ComponentValue>) -> Result<(), Box<dyn ComponentValue>>;

    /// Overwrite the value at `row`, returning the old value. Returns `None`
    /// and drops `value` if it has the wrong type or `row` is out of bounds.
    fn replace(
        &mut self,
        row: usize,
        value: Box<dyn ComponentValue>,
    ) -> Option<Box<dyn ComponentValue>>;

    /// Remove the value at `row`, moving the last value into its place.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds; callers check bounds first.
    fn swap_remove(&mut self, row: usize) -> Box<dyn ComponentValue>;

    fn get(&self, row: usize) -> Option<&dyn ComponentValue>;

    fn get_mut(&mut self, row: usize) -> Option<&mut dyn ComponentValue>;

    fn iter(&self) -> Box<dyn Iterator<Item = &dyn ComponentValue> + '_>;

    fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut dyn ComponentValue> + '_>;

    fn clear(&mut self);

    /// Name of the stored value type.
    fn value_type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Column storage for values of type `T`, laid out contiguously.
#[derive(Debug)]
pub struct TypedColumn<T> {
    data: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Component> Default for TypedColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> Column for TypedColumn<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn accepts(&self, value: &dyn ComponentValue) -> bool {
        value.is::<T>()
    }

    fn push(&mut self, value: Box<dyn ComponentValue>) -> Result<(), Box<dyn ComponentValue>> {
        if !value.is::<T>() {
            return Err(value);
        }
        if let Some(value) = value.downcast::<T>() {
            self.data.push(value);
        }
        Ok(())
    }

    fn replace(
        &mut self,
        row: usize,
        value: Box<dyn ComponentValue>,
    ) -> Option<Box<dyn ComponentValue>> {
        let slot = self.data.get_mut(row)?;
        let value = value.downcast::<T>()?;
        Some(Box::new(std::mem::replace(slot, value)))
    }

    fn swap_remove(&mut self, row: usize) -> Box<dyn ComponentValue> {
        Box::new(self.data.swap_remove(row))
    }

    fn get(&self, row: usize) -> Option<&dyn ComponentValue> {
        self.data.get(row).map(|value| value as &dyn ComponentValue)
    }

    fn get_mut(&mut self, row: usize) -> Option<&mut dyn ComponentValue> {
        self.data
            .get_mut(row)
            .map(|value| value as &mut dyn ComponentValue)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &dyn ComponentValue> + '_> {
        Box::new(self.data.iter().map(|value| value as &dyn ComponentValue))
    }

    fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut dyn ComponentValue> + '_> {
        Box::new(
            self.data
                .iter_mut()
                .map(|value| value as &mut dyn ComponentValue),
        )
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Dense storage for every entity with exactly one signature.
///
/// Data is stored in struct-of-arrays layout: one [`Column`] per kind, in
/// signature order, with entity ids in a parallel vector. All columns always
/// have the same length as `entities`.
#[derive(Debug)]
pub struct Archetype {
    handle: ArchetypeHandle,
    signature: Signature,
    entities: Vec<EntityId>,
    columns: Vec<Box<dyn Column>>,
}

impl Archetype {
    fn new(handle: ArchetypeHandle, signature: Signature, columns: Vec<Box<dyn Column>>) -> Self {
        Self {
            handle,
            signature,
            entities: Vec::new(),
            columns,
        }
    }

    #[must_use]
    pub fn handle(&self) -> ArchetypeHandle {
        self.handle
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity ids in row order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    #[must_use]
    pub fn entity_at(&self, row: usize) -> Option<EntityId> {
        self.entities.get(row).copied()
    }

    #[must_use]
    pub fn has_component(&self, kind: ComponentKind) -> bool {
        self.signature.contains(kind)
    }

    #[must_use]
    pub fn column(&self, kind: ComponentKind) -> Option<&dyn Column> {
        let index = self.signature.position(kind)?;
        self.columns.get(index).map(|column| &**column)
    }

    #[must_use]
    pub fn column_mut(&mut self, kind: ComponentKind) -> Option<&mut dyn Column> {
        let index = self.signature.position(kind)?;
        match self.columns.get_mut(index) {
            Some(column) => Some(&mut **column),
            None => None,
        }
    }

    /// The values of `T` in row order, if this archetype stores `T`.
    #[must_use]
    pub fn typed_column<T: Component>(&self) -> Option<&[T]> {
        self.column(T::kind())?
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .map(TypedColumn::as_slice)
    }

    #[must_use]
    pub fn get(&self, kind: ComponentKind, row: usize) -> Option<&dyn ComponentValue> {
        self.column(kind)?.get(row)
    }

    #[must_use]
    pub fn get_mut(&mut self, kind: ComponentKind, row: usize) -> Option<&mut dyn ComponentValue> {
        self.column_mut(kind)?.get_mut(row)
    }

    pub(crate) fn columns(&self) -> &[Box<dyn Column>] {
        &self.columns
    }

    /// Split the archetype into independently borrowable column slots.
    pub(crate) fn slots(&mut self) -> ColumnSlots<'_> {
        ColumnSlots {
            signature: &self.signature,
            entities: &self.entities,
            slots: self.columns.iter_mut().map(Some).collect(),
        }
    }

    fn check_row(&self, row: usize) -> Result<(), EcsError> {
        if row < self.len() {
            Ok(())
        } else {
            Err(EcsError::RowOutOfBounds {
                archetype: self.handle,
                row,
                len: self.len(),
            })
        }
    }

    /// Append a row. `values` must match the signature exactly and every
    /// value must have its column's type; nothing is written otherwise.
    fn push_row(&mut self, entity: EntityId, values: ComponentValues) -> Result<usize, EcsError> {
        let found = values.signature();
        if found != self.signature {
            return Err(EcsError::SignatureMismatch {
                expected: self.signature.clone(),
                found,
            });
        }
        for ((kind, value), column) in values.iter().zip(&self.columns) {
            if !column.accepts(value) {
                return Err(EcsError::ComponentTypeMismatch {
                    kind,
                    expected: column.value_type_name(),
                    found: value.value_type_name(),
                });
            }
        }

        let row = self.entities.len();
        for ((_, value), column) in values.into_iter().zip(&mut self.columns) {
            // Types were checked above, so the push cannot hand the value back.
            let _ = column.push(value);
        }
        self.entities.push(entity);
        Ok(row)
    }

    /// Swap-remove a row, returning its values and the entity that was moved
    /// into `row` (if `row` was not already last).
    fn take_row(&mut self, row: usize) -> Result<(ComponentValues, Option<EntityId>), EcsError> {
        self.check_row(row)?;
        let values = self
            .signature
            .iter()
            .zip(&mut self.columns)
            .map(|(kind, column)| (kind, column.swap_remove(row)))
            .collect();
        self.entities.swap_remove(row);
        Ok((values, self.entities.get(row).copied()))
    }

    fn clear(&mut self) {
        self.entities.clear();
        for column in &mut self.columns {
            column.clear();
        }
    }
}

/// Disjoint mutable access to the columns of one archetype.
///
/// Each column can be taken at most once, which lets a query hold mutable
/// references to several columns of the same archetype at the same time.
pub struct ColumnSlots<'w> {
    signature: &'w Signature,
    entities: &'w [EntityId],
    slots: Vec<Option<&'w mut Box<dyn Column>>>,
}

impl<'w> ColumnSlots<'w> {
    /// Take the column for `kind`. Returns `None` if the archetype lacks the
    /// kind or the column was already taken.
    pub fn take(&mut self, kind: ComponentKind) -> Option<&'w mut Box<dyn Column>> {
        let index = self.signature.position(kind)?;
        self.slots.get_mut(index)?.take()
    }

    #[must_use]
    pub fn entities(&self) -> &'w [EntityId] {
        self.entities
    }
}

/// Result of [`ArchetypeStore::move_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovedRow {
    /// The archetype the row now lives in.
    pub handle: ArchetypeHandle,
    /// The row's new index.
    pub row: usize,
    /// The entity swapped into the vacated source row, if any.
    pub displaced: Option<EntityId>,
}

/// Owner of every archetype.
///
/// Holds a signature → handle index for O(1) lookup and a cache of query
/// matches keyed by the requested kind set. The cache is cleared whenever a
/// new archetype is created.
#[derive(Debug)]
pub struct ArchetypeStore {
    registry: Arc<ComponentRegistry>,
    archetypes: Vec<Archetype>,
    index: HashMap<Signature, ArchetypeHandle>,
    matches: DashMap<Signature, Arc<[ArchetypeHandle]>>,
}

impl ArchetypeStore {
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            archetypes: Vec::new(),
            index: HashMap::new(),
            matches: DashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Return the archetype for `signature`, creating it if needed.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownKind`] if the signature names an unregistered kind.
    pub fn get_or_create(&mut self, signature: &Signature) -> Result<ArchetypeHandle, EcsError> {
        if let Some(&handle) = self.index.get(signature) {
            return Ok(handle);
        }

        let columns = signature
            .iter()
            .map(|kind| self.registry.lookup(kind).map(|meta| meta.new_column()))
            .collect::<Result<Vec<_>, _>>()?;

        let handle = ArchetypeHandle(self.archetypes.len());
        self.archetypes
            .push(Archetype::new(handle, signature.clone(), columns));
        self.index.insert(signature.clone(), handle);
        self.matches.clear();

        debug!(%handle, %signature, "created archetype");
        Ok(handle)
    }

    /// Look up an existing archetype by signature.
    #[must_use]
    pub fn find(&self, signature: &Signature) -> Option<ArchetypeHandle> {
        self.index.get(signature).copied()
    }

    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] for a handle from another store.
    pub fn get(&self, handle: ArchetypeHandle) -> Result<&Archetype, EcsError> {
        self.archetypes
            .get(handle.0)
            .ok_or(EcsError::UnknownArchetype(handle))
    }

    /// # Errors
    ///
    /// [`EcsError::UnknownArchetype`] for a handle from another store.
    pub fn get_mut(&mut self, handle: ArchetypeHandle) -> Result<&mut Archetype, EcsError> {
        self.archetypes
            .get_mut(handle.0)
            .ok_or(EcsError::UnknownArchetype(handle))
    }

    /// Append a row for `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::SignatureMismatch`] if `values` do not cover exactly the
    /// archetype's signature, or [`EcsError::ComponentTypeMismatch`] if a
    /// value has the wrong concrete type.
    pub fn insert_row(
        &mut self,
        handle: ArchetypeHandle,
        entity: EntityId,
        values: ComponentValues,
    ) -> Result<usize, EcsError> {
        self.get_mut(handle)?.push_row(entity, values)
    }

    /// Remove a row with swap-with-last compaction.
    ///
    /// Returns the entity that now occupies `row`, whose location must be
    /// updated by the caller, or `None` if `row` was the last row.
    ///
    /// # Errors
    ///
    /// [`EcsError::RowOutOfBounds`] if the row does not exist.
    pub fn remove_row(
        &mut self,
        handle: ArchetypeHandle,
        row: usize,
    ) -> Result<Option<EntityId>, EcsError> {
        let (_, displaced) = self.get_mut(handle)?.take_row(row)?;
        Ok(displaced)
    }

    /// Move a row to the archetype for `to_signature`.
    ///
    /// Surviving values are carried over, values for kinds not in
    /// `to_signature` are dropped, and added kinds take their value from
    /// `added` or else from the registry default. Values in `added` for kinds
    /// the row already has replace the carried-over value. The source row is
    /// removed with swap compaction; [`MovedRow::displaced`] names the entity
    /// that filled the hole.
    ///
    /// # Errors
    ///
    /// [`EcsError::SignatureMismatch`] if `added` contains kinds outside
    /// `to_signature`, plus the errors of [`get_or_create`](Self::get_or_create)
    /// and type mismatches. On error the store is unchanged, except that the
    /// destination archetype may have been created.
    pub fn move_row(
        &mut self,
        from: ArchetypeHandle,
        row: usize,
        to_signature: &Signature,
        added: ComponentValues,
    ) -> Result<MovedRow, EcsError> {
        self.get(from)?.check_row(row)?;

        let extra = added.signature();
        if !to_signature.is_superset_of(&extra) {
            return Err(EcsError::SignatureMismatch {
                expected: to_signature.clone(),
                found: extra,
            });
        }
        for (kind, value) in added.iter() {
            self.registry.lookup(kind)?.check(value)?;
        }

        let to = self.get_or_create(to_signature)?;
        if to == from {
            let archetype = self.get_mut(from)?;
            for (kind, value) in added {
                if let Some(column) = archetype.column_mut(kind) {
                    // Types were checked against the registry above.
                    let _ = column.replace(row, value);
                }
            }
            return Ok(MovedRow {
                handle: from,
                row,
                displaced: None,
            });
        }

        let mut values = ComponentValues::new();
        for kind in to_signature.iter() {
            if !added.contains(kind) && !self.get(from)?.has_component(kind) {
                values.insert(kind, self.registry.lookup(kind)?.default_value());
            }
        }

        let source = self.get_mut(from)?;
        let entity = source.entities[row];
        let (carried, displaced) = source.take_row(row)?;
        for (kind, value) in carried {
            if to_signature.contains(kind) && !added.contains(kind) {
                values.insert(kind, value);
            }
        }
        values.merge(added);

        let new_row = self.get_mut(to)?.push_row(entity, values)?;
        Ok(MovedRow {
            handle: to,
            row: new_row,
            displaced,
        })
    }

    /// Archetypes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    pub(crate) fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Total number of rows across all archetypes.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.archetypes.iter().map(Archetype::len).sum()
    }

    /// Handles of every archetype whose signature is a superset of `kinds`,
    /// in creation order. Results are cached per kind set.
    #[must_use]
    pub fn matching(&self, kinds: &Signature) -> Arc<[ArchetypeHandle]> {
        if let Some(hit) = self.matches.get(kinds) {
            return Arc::clone(hit.value());
        }
        let found: Arc<[ArchetypeHandle]> = self
            .archetypes
            .iter()
            .filter(|archetype| archetype.signature.is_superset_of(kinds))
            .map(Archetype::handle)
            .collect();
        self.matches.insert(kinds.clone(), Arc::clone(&found));
        found
    }

    /// Empty every archetype. Archetypes themselves are kept.
    pub fn clear(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear();
        }
    }
}
