//! Query engine: iterate every row whose archetype holds a set of kinds.
//!
//! Two flavours are provided:
//!
//! - **Typed** queries over a [`QueryData`] parameter: `&T`, `&mut T`,
//!   [`EntityId`], or tuples of those up to eight elements. Column downcasts
//!   happen once per archetype, so rows are yielded straight from the column
//!   slices.
//! - **Dynamic** queries over a runtime list of [`ComponentKind`]s, yielding
//!   [`ComponentTuple`] / [`ComponentTupleMut`] views of erased values.
//!
//! Matching archetypes are those whose signature is a superset of the
//! requested kinds. Iteration visits archetypes in creation order and rows in
//! storage order. Iterators borrow the store, so structural changes cannot
//! happen while one is alive; queue them in a command buffer instead.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::archetype::{
    Archetype, ArchetypeHandle, ArchetypeStore, Column, ColumnSlots, Signature, TypedColumn,
};
use crate::component::{Component, ComponentKind, ComponentValue};
use crate::entity::EntityId;
use crate::error::EcsError;
use crate::registry::ComponentRegistry;

/// Data that can be fetched per row by a typed query.
pub trait QueryData {
    /// What one row yields.
    type Item<'w>;

    /// Per-archetype row iterator.
    type Fetch<'w>: Iterator<Item = Self::Item<'w>>;

    /// Append the component kinds this parameter reads or writes.
    fn push_kinds(kinds: &mut Vec<ComponentKind>);

    /// Check that every kind is registered with the expected Rust type.
    fn validate(registry: &ComponentRegistry) -> Result<(), EcsError>;

    /// Build a row iterator from exclusively borrowed columns.
    fn fetch_mut<'w>(slots: &mut ColumnSlots<'w>) -> Option<Self::Fetch<'w>>;
}

/// [`QueryData`] that only reads, so it can be fetched from a shared borrow.
pub trait ReadOnlyQueryData: QueryData {
    fn fetch<'w>(archetype: &'w Archetype) -> Option<Self::Fetch<'w>>;
}

fn check_registered_type<T: Component>(registry: &ComponentRegistry) -> Result<(), EcsError> {
    let meta = registry.lookup(T::kind())?;
    if meta.default.is::<T>() {
        Ok(())
    } else {
        Err(EcsError::ComponentTypeMismatch {
            kind: T::kind(),
            expected: meta.default.value_type_name(),
            found: std::any::type_name::<T>(),
        })
    }
}

impl<T: Component> QueryData for &T {
    type Item<'w> = &'w T;
    type Fetch<'w> = std::slice::Iter<'w, T>;

    fn push_kinds(kinds: &mut Vec<ComponentKind>) {
        kinds.push(T::kind());
    }

    fn validate(registry: &ComponentRegistry) -> Result<(), EcsError> {
        check_registered_type::<T>(registry)
    }

    fn fetch_mut<'w>(slots: &mut ColumnSlots<'w>) -> Option<Self::Fetch<'w>> {
        let column: &'w Box<dyn Column> = slots.take(T::kind())?;
        column
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .map(|column| column.as_slice().iter())
    }
}

impl<T: Component> ReadOnlyQueryData for &T {
    fn fetch<'w>(archetype: &'w Archetype) -> Option<Self::Fetch<'w>> {
        archetype.typed_column::<T>().map(<[T]>::iter)
    }
}

impl<T: Component> QueryData for &mut T {
    type Item<'w> = &'w mut T;
    type Fetch<'w> = std::slice::IterMut<'w, T>;

    fn push_kinds(kinds: &mut Vec<ComponentKind>) {
        kinds.push(T::kind());
    }

    fn validate(registry: &ComponentRegistry) -> Result<(), EcsError> {
        check_registered_type::<T>(registry)
    }

    fn fetch_mut<'w>(slots: &mut ColumnSlots<'w>) -> Option<Self::Fetch<'w>> {
        slots
            .take(T::kind())?
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .map(|column| column.as_mut_slice().iter_mut())
    }
}

impl QueryData for EntityId {
    type Item<'w> = EntityId;
    type Fetch<'w> = std::iter::Copied<std::slice::Iter<'w, EntityId>>;

    fn push_kinds(_kinds: &mut Vec<ComponentKind>) {}

    fn validate(_registry: &ComponentRegistry) -> Result<(), EcsError> {
        Ok(())
    }

    fn fetch_mut<'w>(slots: &mut ColumnSlots<'w>) -> Option<Self::Fetch<'w>> {
        Some(slots.entities().iter().copied())
    }
}

impl ReadOnlyQueryData for EntityId {
    fn fetch<'w>(archetype: &'w Archetype) -> Option<Self::Fetch<'w>> {
        Some(archetype.entities().iter().copied())
    }
}

/// Zips the per-element fetches of a tuple query in lockstep.
pub struct TupleFetch<F>(F);

macro_rules! impl_query_tuple {
    ($($name:ident),+) => {
        impl<$($name: QueryData),+> QueryData for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);
            type Fetch<'w> = TupleFetch<($($name::Fetch<'w>,)+)>;

            fn push_kinds(kinds: &mut Vec<ComponentKind>) {
                $($name::push_kinds(kinds);)+
            }

            fn validate(registry: &ComponentRegistry) -> Result<(), EcsError> {
                $($name::validate(registry)?;)+
                Ok(())
            }

            fn fetch_mut<'w>(slots: &mut ColumnSlots<'w>) -> Option<Self::Fetch<'w>> {
                Some(TupleFetch(($($name::fetch_mut(slots)?,)+)))
            }
        }

        impl<$($name: ReadOnlyQueryData),+> ReadOnlyQueryData for ($($name,)+) {
            fn fetch<'w>(archetype: &'w Archetype) -> Option<Self::Fetch<'w>> {
                Some(TupleFetch(($($name::fetch(archetype)?,)+)))
            }
        }

        #[allow(non_snake_case)]
        impl<$($name: Iterator),+> Iterator for TupleFetch<($($name,)+)> {
            type Item = ($($name::Item,)+);

            fn next(&mut self) -> Option<Self::Item> {
                let ($($name,)+) = &mut self.0;
                Some(($($name.next()?,)+))
            }
        }
    };
}

impl_query_tuple!(A);
impl_query_tuple!(A, B);
impl_query_tuple!(A, B, C);
impl_query_tuple!(A, B, C, D);
impl_query_tuple!(A, B, C, D, E);
impl_query_tuple!(A, B, C, D, E, F);
impl_query_tuple!(A, B, C, D, E, F, G);
impl_query_tuple!(A, B, C, D, E, F, G, H);

/// Validate a requested kind list and turn it into a match key.
fn query_signature(
    registry: &ComponentRegistry,
    kinds: &[ComponentKind],
) -> Result<Signature, EcsError> {
    let mut sorted = kinds.to_vec();
    sorted.sort_unstable();
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(EcsError::DuplicateQueryKind(pair[0]));
    }
    for &kind in kinds {
        registry.lookup(kind)?;
    }
    Ok(sorted.into_iter().collect())
}

/// Shared-borrow iterator over a typed query.
pub struct QueryIter<'w, Q: ReadOnlyQueryData> {
    archetypes: &'w [Archetype],
    matches: Arc<[ArchetypeHandle]>,
    next: usize,
    current: Option<Q::Fetch<'w>>,
}

impl<'w, Q: ReadOnlyQueryData> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.as_mut().and_then(Iterator::next) {
                return Some(item);
            }
            let handle = *self.matches.get(self.next)?;
            self.next += 1;
            self.current = self.archetypes.get(handle.0).and_then(|a| Q::fetch(a));
        }
    }
}

/// Exclusive-borrow iterator over a typed query.
pub struct QueryIterMut<'w, Q: QueryData> {
    archetypes: std::slice::IterMut<'w, Archetype>,
    matches: Arc<[ArchetypeHandle]>,
    current: Option<Q::Fetch<'w>>,
}

impl<'w, Q: QueryData> Iterator for QueryIterMut<'w, Q> {
    type Item = Q::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.as_mut().and_then(Iterator::next) {
                return Some(item);
            }
            let archetype = self.archetypes.next()?;
            // Handles are assigned in creation order, so `matches` is sorted.
            self.current = if self.matches.binary_search(&archetype.handle()).is_ok() {
                Q::fetch_mut(&mut archetype.slots())
            } else {
                None
            };
        }
    }
}

/// One row of a dynamic query: the entity plus erased references to the
/// requested components, in request order.
#[derive(Debug)]
pub struct ComponentTuple<'w> {
    entity: EntityId,
    values: Vec<(ComponentKind, &'w dyn ComponentValue)>,
}

impl<'w> ComponentTuple<'w> {
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at position `index` of the requested kind list.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'w dyn ComponentValue> {
        self.values.get(index).map(|(_, value)| *value)
    }

    #[must_use]
    pub fn get_kind(&self, kind: ComponentKind) -> Option<&'w dyn ComponentValue> {
        self.values
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, value)| *value)
    }

    #[must_use]
    pub fn get_as<T: Component>(&self) -> Option<&'w T> {
        self.get_kind(T::kind())?.downcast_ref::<T>()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, &'w dyn ComponentValue)> + '_ {
        self.values.iter().copied()
    }
}

/// One row of a mutable dynamic query.
#[derive(Debug)]
pub struct ComponentTupleMut<'w> {
    entity: EntityId,
    values: Vec<(ComponentKind, &'w mut dyn ComponentValue)>,
}

impl ComponentTupleMut<'_> {
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&dyn ComponentValue> {
        self.values.get(index).map(|(_, value)| &**value)
    }

    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut dyn ComponentValue> {
        match self.values.get_mut(index) {
            Some((_, value)) => Some(&mut **value),
            None => None,
        }
    }

    #[must_use]
    pub fn get_as<T: Component>(&self) -> Option<&T> {
        let (_, value) = self.values.iter().find(|(kind, _)| *kind == T::kind())?;
        value.downcast_ref::<T>()
    }

    #[must_use]
    pub fn get_mut_as<T: Component>(&mut self) -> Option<&mut T> {
        let (_, value) = self
            .values
            .iter_mut()
            .find(|(kind, _)| *kind == T::kind())?;
        value.downcast_mut::<T>()
    }
}

type ValueIter<'w> = Box<dyn Iterator<Item = &'w dyn ComponentValue> + 'w>;
type ValueIterMut<'w> = Box<dyn Iterator<Item = &'w mut dyn ComponentValue> + 'w>;

/// Shared-borrow iterator over a dynamic query.
pub struct DynamicQueryIter<'w> {
    archetypes: &'w [Archetype],
    kinds: Vec<ComponentKind>,
    matches: Arc<[ArchetypeHandle]>,
    next: usize,
    entities: std::slice::Iter<'w, EntityId>,
    columns: Vec<ValueIter<'w>>,
}

impl<'w> DynamicQueryIter<'w> {
    fn open(&mut self, archetype: &'w Archetype) {
        self.entities = archetype.entities().iter();
        self.columns = self
            .kinds
            .iter()
            .filter_map(|&kind| archetype.column(kind).map(|column| column.iter()))
            .collect();
    }
}

impl<'w> Iterator for DynamicQueryIter<'w> {
    type Item = ComponentTuple<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(&entity) = self.entities.next() {
                let values = self
                    .kinds
                    .iter()
                    .zip(self.columns.iter_mut())
                    .map(|(&kind, column)| column.next().map(|value| (kind, value)))
                    .collect::<Option<Vec<_>>>()?;
                return Some(ComponentTuple { entity, values });
            }
            let handle = *self.matches.get(self.next)?;
            self.next += 1;
            let archetypes = self.archetypes;
            if let Some(archetype) = archetypes.get(handle.0) {
                self.open(archetype);
            }
        }
    }
}

/// Exclusive-borrow iterator over a dynamic query.
pub struct DynamicQueryIterMut<'w> {
    archetypes: std::slice::IterMut<'w, Archetype>,
    kinds: Vec<ComponentKind>,
    matches: Arc<[ArchetypeHandle]>,
    entities: std::slice::Iter<'w, EntityId>,
    columns: Vec<ValueIterMut<'w>>,
}

impl<'w> Iterator for DynamicQueryIterMut<'w> {
    type Item = ComponentTupleMut<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(&entity) = self.entities.next() {
                let values = self
                    .kinds
                    .iter()
                    .zip(self.columns.iter_mut())
                    .map(|(&kind, column)| column.next().map(|value| (kind, value)))
                    .collect::<Option<Vec<_>>>()?;
                return Some(ComponentTupleMut { entity, values });
            }
            let archetype = self.archetypes.next()?;
            if self.matches.binary_search(&archetype.handle()).is_err() {
                continue;
            }
            let mut slots = archetype.slots();
            self.entities = slots.entities().iter();
            self.columns = self
                .kinds
                .iter()
                .filter_map(|&kind| slots.take(kind).map(|column| column.iter_mut()))
                .collect();
        }
    }
}

impl ArchetypeStore {
    /// Iterate every row holding the components named by `Q`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownKind`] or [`EcsError::ComponentTypeMismatch`] if
    /// `Q` names a kind that is unregistered or registered with another type,
    /// and [`EcsError::DuplicateQueryKind`] if a kind appears twice.
    pub fn query<Q: ReadOnlyQueryData>(&self) -> Result<QueryIter<'_, Q>, EcsError> {
        let matches = self.typed_matches::<Q>()?;
        Ok(QueryIter {
            archetypes: self.archetypes(),
            matches,
            next: 0,
            current: None,
        })
    }

    /// Like [`query`](Self::query), but `Q` may contain `&mut T`.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn query_mut<Q: QueryData>(&mut self) -> Result<QueryIterMut<'_, Q>, EcsError> {
        let matches = self.typed_matches::<Q>()?;
        Ok(QueryIterMut {
            archetypes: self.archetypes_mut().iter_mut(),
            matches,
            current: None,
        })
    }

    fn typed_matches<Q: QueryData>(&self) -> Result<Arc<[ArchetypeHandle]>, EcsError> {
        let mut kinds = Vec::new();
        Q::push_kinds(&mut kinds);
        let signature = query_signature(self.registry(), &kinds)?;
        Q::validate(self.registry())?;
        Ok(self.matching(&signature))
    }

    /// Iterate every row holding all of `kinds`, yielding erased views in
    /// the order `kinds` lists them.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownKind`] or [`EcsError::DuplicateQueryKind`].
    pub fn query_kinds(&self, kinds: &[ComponentKind]) -> Result<DynamicQueryIter<'_>, EcsError> {
        let signature = query_signature(self.registry(), kinds)?;
        Ok(DynamicQueryIter {
            archetypes: self.archetypes(),
            kinds: kinds.to_vec(),
            matches: self.matching(&signature),
            next: 0,
            entities: [].iter(),
            columns: Vec::new(),
        })
    }

    /// Mutable counterpart of [`query_kinds`](Self::query_kinds).
    ///
    /// # Errors
    ///
    /// Same as [`query_kinds`](Self::query_kinds).
    pub fn query_kinds_mut(
        &mut self,
        kinds: &[ComponentKind],
    ) -> Result<DynamicQueryIterMut<'_>, EcsError> {
        let signature = query_signature(self.registry(), kinds)?;
        let matches = self.matching(&signature);
        Ok(DynamicQueryIterMut {
            archetypes: self.archetypes_mut().iter_mut(),
            kinds: kinds.to_vec(),
            matches,
            entities: [].iter(),
            columns: Vec::new(),
        })
    }
}

/// A typed query bound to a store, for callers that want to count or
/// restart without holding an iterator.
pub struct QueryState<Q> {
    kinds: Signature,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: QueryData> QueryState<Q> {
    /// # Errors
    ///
    /// Same as [`ArchetypeStore::query`].
    pub fn new(registry: &ComponentRegistry) -> Result<Self, EcsError> {
        let mut kinds = Vec::new();
        Q::push_kinds(&mut kinds);
        let kinds = query_signature(registry, &kinds)?;
        Q::validate(registry)?;
        Ok(Self {
            kinds,
            _marker: PhantomData,
        })
    }

    /// The requested kinds as a canonical signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.kinds
    }

    /// Number of rows the query would yield right now.
    #[must_use]
    pub fn count(&self, store: &ArchetypeStore) -> usize {
        store
            .matching(&self.kinds)
            .iter()
            .filter_map(|&handle| store.get(handle).ok())
            .map(Archetype::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentValues;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health(i32);

    impl Component for Health {
        fn type_name() -> &'static str {
            "health"
        }
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Fuel(f32);

    impl Component for Fuel {
        fn type_name() -> &'static str {
            "fuel"
        }
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Seats(u8);

    impl Component for Seats {
        fn type_name() -> &'static str {
            "seats"
        }
    }

    /// Store with [health], [health, fuel] and [fuel, seats] archetypes.
    fn populated_store() -> ArchetypeStore {
        let mut registry = ComponentRegistry::new();
        registry.register_component(Health(100)).unwrap();
        registry.register_component(Fuel(0.0)).unwrap();
        registry.register_component(Seats(1)).unwrap();
        let mut store = ArchetypeStore::new(Arc::new(registry));

        let h = store.get_or_create(&Signature::new([Health::kind()])).unwrap();
        let hf = store
            .get_or_create(&Signature::new([Health::kind(), Fuel::kind()]))
            .unwrap();
        let fs = store
            .get_or_create(&Signature::new([Fuel::kind(), Seats::kind()]))
            .unwrap();

        store
            .insert_row(h, EntityId::new(0, 0), ComponentValues::new().with(Health(10)))
            .unwrap();
        store
            .insert_row(
                hf,
                EntityId::new(1, 0),
                ComponentValues::new().with(Health(20)).with(Fuel(2.0)),
            )
            .unwrap();
        store
            .insert_row(
                hf,
                EntityId::new(2, 0),
                ComponentValues::new().with(Health(30)).with(Fuel(3.0)),
            )
            .unwrap();
        store
            .insert_row(
                fs,
                EntityId::new(3, 0),
                ComponentValues::new().with(Fuel(4.0)).with(Seats(2)),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_query_single_kind_spans_archetypes() {
        let store = populated_store();
        let health: Vec<i32> = store.query::<&Health>().unwrap().map(|h| h.0).collect();
        assert_eq!(health, vec![10, 20, 30]);
    }

    #[test]
    fn test_query_tuple_matches_superset_only() {
        let store = populated_store();
        let rows: Vec<(EntityId, i32, f32)> = store
            .query::<(EntityId, &Health, &Fuel)>()
            .unwrap()
            .map(|(e, h, f)| (e, h.0, f.0))
            .collect();
        assert_eq!(
            rows,
            vec![(EntityId::new(1, 0), 20, 2.0), (EntityId::new(2, 0), 30, 3.0)]
        );
    }

    #[test]
    fn test_query_mut_writes_in_place() {
        let mut store = populated_store();
        for (health, fuel) in store.query_mut::<(&mut Health, &Fuel)>().unwrap() {
            health.0 += fuel.0 as i32;
        }
        let health: Vec<i32> = store.query::<&Health>().unwrap().map(|h| h.0).collect();
        assert_eq!(health, vec![10, 22, 33]);
    }

    #[test]
    fn test_query_mut_two_mutable_columns() {
        let mut store = populated_store();
        for (fuel, seats) in store.query_mut::<(&mut Fuel, &mut Seats)>().unwrap() {
            fuel.0 = 0.0;
            seats.0 = 9;
        }
        let rows: Vec<(f32, u8)> = store
            .query::<(&Fuel, &Seats)>()
            .unwrap()
            .map(|(f, s)| (f.0, s.0))
            .collect();
        assert_eq!(rows, vec![(0.0, 9)]);
    }

    #[test]
    fn test_query_rejects_duplicate_kind() {
        let mut store = populated_store();
        assert!(matches!(
            store.query_mut::<(&mut Health, &Health)>().err(),
            Some(EcsError::DuplicateQueryKind(_))
        ));
        assert!(matches!(
            store.query_kinds(&[Fuel::kind(), Fuel::kind()]).err(),
            Some(EcsError::DuplicateQueryKind(_))
        ));
    }

    #[test]
    fn test_query_rejects_unregistered_kind() {
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        struct Wings;

        impl Component for Wings {
            fn type_name() -> &'static str {
                "wings"
            }
        }

        let store = populated_store();
        assert!(matches!(
            store.query::<&Wings>().err(),
            Some(EcsError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_query_rejects_type_registered_under_other_name() {
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        struct Impostor(u64);

        impl Component for Impostor {
            fn type_name() -> &'static str {
                "health"
            }
        }

        let store = populated_store();
        assert!(matches!(
            store.query::<&Impostor>().err(),
            Some(EcsError::ComponentTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_query_empty_store_yields_nothing() {
        let mut registry = ComponentRegistry::new();
        registry.register_component(Health(100)).unwrap();
        let store = ArchetypeStore::new(Arc::new(registry));
        assert_eq!(store.query::<&Health>().unwrap().count(), 0);
    }

    #[test]
    fn test_dynamic_query_in_request_order() {
        let store = populated_store();
        let rows: Vec<_> = store
            .query_kinds(&[Fuel::kind(), Health::kind()])
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity(), EntityId::new(1, 0));
        assert_eq!(rows[0].get(0).and_then(|v| v.downcast_ref::<Fuel>()), Some(&Fuel(2.0)));
        assert_eq!(rows[0].get_as::<Health>(), Some(&Health(20)));
        assert_eq!(rows[1].get_as::<Fuel>(), Some(&Fuel(3.0)));
    }

    #[test]
    fn test_dynamic_query_mut() {
        let mut store = populated_store();
        for mut row in store.query_kinds_mut(&[Fuel::kind()]).unwrap() {
            row.get_mut_as::<Fuel>().unwrap().0 *= 10.0;
        }
        let fuel: Vec<f32> = store.query::<&Fuel>().unwrap().map(|f| f.0).collect();
        assert_eq!(fuel, vec![20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_entity_only_query_visits_every_row() {
        let store = populated_store();
        let ids: Vec<u32> = store.query::<EntityId>().unwrap().map(EntityId::index).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_query_sees_archetypes_created_after_first_use() {
        let mut store = populated_store();
        assert_eq!(store.query::<&Seats>().unwrap().count(), 1);
        let hs = store
            .get_or_create(&Signature::new([Health::kind(), Seats::kind()]))
            .unwrap();
        store
            .insert_row(
                hs,
                EntityId::new(4, 0),
                ComponentValues::new().with(Health(1)).with(Seats(5)),
            )
            .unwrap();
        assert_eq!(store.query::<&Seats>().unwrap().count(), 2);
    }

    #[test]
    fn test_query_state_count() {
        let store = populated_store();
        let state = QueryState::<(&Health, &Fuel)>::new(store.registry()).unwrap();
        assert_eq!(state.count(&store), 2);
        assert_eq!(state.signature().len(), 2);
    }
}
