//! Core [`Component`] trait, component kinds, and type-erased values.
//!
//! Every piece of data stored in the ECS must implement [`Component`]. The
//! storage core never sees concrete types directly: values travel as boxed
//! [`ComponentValue`] trait objects and are persisted through a
//! [`ComponentCodec`] looked up in the
//! [`ComponentRegistry`](crate::registry::ComponentRegistry).
//!
//! ## Stable Kind Identity
//!
//! [`ComponentKind`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. The same name always yields the same
//! kind, across processes and restarts, so persisted snapshots remain valid
//! between runs.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::archetype::{Column, Signature, TypedColumn};
use crate::config::{self, FieldError};
use crate::error::CodecError;

/// Identifier of a component kind, derived from its name with FNV-1a 64-bit.
///
/// Kinds are totally ordered; that order is the canonical order used for
/// archetype signatures and serialised component sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentKind(pub u64);

impl ComponentKind {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentKind`] for a component name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// The kind of a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The core component trait.
///
/// Components are plain data payloads. They must be serialisable so the
/// snapshot layer can persist them, cloneable so prototypes can stamp out
/// copies, and `Send + Sync` so read-only queries may run on worker threads.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use vehicle_component::Component;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Fuel {
///     current: f64,
///     max: f64,
/// }
///
/// impl Component for Fuel {
///     fn type_name() -> &'static str { "fuel" }
/// }
/// ```
pub trait Component: Send + Sync + 'static + Clone + fmt::Debug + Serialize + DeserializeOwned {
    /// Name of this component kind. Also the section name used in
    /// prototype configuration files.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentKind`] for this component.
    fn kind() -> ComponentKind {
        ComponentKind::from_name(Self::type_name())
    }

    /// Build a value from its prototype configuration table.
    ///
    /// Snapshots always go through plain serde; override this to fill
    /// optional fields or reject tuning values the component cannot run with.
    fn from_config(value: toml::Value) -> Result<Self, FieldError> {
        config::decode(value)
    }
}

/// Object-safe view of a component value with its concrete type erased.
///
/// Implemented for every [`Component`]; the storage core only handles
/// `Box<dyn ComponentValue>` and `&dyn ComponentValue`.
pub trait ComponentValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_value(&self) -> Box<dyn ComponentValue>;
    /// In-memory size of the value, in bytes.
    fn value_size(&self) -> usize;
    fn value_type_name(&self) -> &'static str;
    /// An empty column able to store values of this concrete type.
    fn new_column(&self) -> Box<dyn Column>;
}

impl<T: Component> ComponentValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_value(&self) -> Box<dyn ComponentValue> {
        Box::new(self.clone())
    }

    fn value_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn new_column(&self) -> Box<dyn Column> {
        Box::new(TypedColumn::<T>::new())
    }
}

impl dyn ComponentValue {
    /// Returns `true` if the erased value is a `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// The [`TypeId`] of the concrete value.
    #[must_use]
    pub fn value_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    #[must_use]
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Unbox into a concrete `T`, or `None` if the value has another type.
    #[must_use]
    pub fn downcast<T: Component>(self: Box<Self>) -> Option<T> {
        self.into_any().downcast::<T>().ok().map(|value| *value)
    }
}

impl Clone for Box<dyn ComponentValue> {
    fn clone(&self) -> Self {
        self.clone_value()
    }
}

/// Converts component values to and from their persisted representation.
///
/// A codec is registered alongside each component kind. It is also the
/// component's configuration parser: the fields a component accepts in a
/// prototype file are exactly the fields its codec can deserialize.
pub trait ComponentCodec: Send + Sync {
    /// Encode one value. Fails if the value is not of the codec's type.
    fn encode(&self, value: &dyn ComponentValue) -> Result<Vec<u8>, CodecError>;

    /// Decode one value from bytes produced by [`encode`](Self::encode).
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn ComponentValue>, CodecError>;

    /// Build a value from a configuration table.
    fn decode_config(&self, table: toml::Value) -> Result<Box<dyn ComponentValue>, CodecError>;
}

/// The default codec: MessagePack (named fields) via `rmp-serde`, and serde
/// deserialization from TOML for configuration.
pub struct MessagePackCodec<T>(PhantomData<fn() -> T>);

impl<T> MessagePackCodec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for MessagePackCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentCodec for MessagePackCodec<T> {
    fn encode(&self, value: &dyn ComponentValue) -> Result<Vec<u8>, CodecError> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| CodecError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: value.value_type_name(),
            })?;
        Ok(rmp_serde::to_vec_named(typed)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn ComponentValue>, CodecError> {
        let value: T = rmp_serde::from_slice(bytes)?;
        Ok(Box::new(value))
    }

    fn decode_config(&self, table: toml::Value) -> Result<Box<dyn ComponentValue>, CodecError> {
        let value = T::from_config(table)?;
        Ok(Box::new(value))
    }
}

/// A set of component values keyed by kind, kept in canonical kind order.
///
/// This is the unit handed to archetype row insertion: its
/// [`signature`](Self::signature) must equal the target archetype's.
#[derive(Debug, Clone, Default)]
pub struct ComponentValues {
    values: BTreeMap<ComponentKind, Box<dyn ComponentValue>>,
}

impl ComponentValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style typed insert.
    #[must_use]
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.insert(T::kind(), Box::new(value));
        self
    }

    /// Insert a value, returning the previous value for that kind.
    pub fn insert(
        &mut self,
        kind: ComponentKind,
        value: Box<dyn ComponentValue>,
    ) -> Option<Box<dyn ComponentValue>> {
        self.values.insert(kind, value)
    }

    pub fn remove(&mut self, kind: ComponentKind) -> Option<Box<dyn ComponentValue>> {
        self.values.remove(&kind)
    }

    #[must_use]
    pub fn get(&self, kind: ComponentKind) -> Option<&dyn ComponentValue> {
        self.values.get(&kind).map(|value| &**value)
    }

    #[must_use]
    pub fn get_as<T: Component>(&self) -> Option<&T> {
        self.get(T::kind())?.downcast_ref::<T>()
    }

    #[must_use]
    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.values.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The set of kinds present.
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.values.keys().copied().collect()
    }

    /// Kinds in canonical order.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.values.keys().copied()
    }

    /// Overlay `other` on top of `self`; `other` wins per kind.
    pub fn merge(&mut self, other: ComponentValues) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, &dyn ComponentValue)> + '_ {
        self.values.iter().map(|(kind, value)| (*kind, &**value))
    }
}

impl IntoIterator for ComponentValues {
    type Item = (ComponentKind, Box<dyn ComponentValue>);
    type IntoIter = std::collections::btree_map::IntoIter<ComponentKind, Box<dyn ComponentValue>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl FromIterator<(ComponentKind, Box<dyn ComponentValue>)> for ComponentValues {
    fn from_iter<I: IntoIterator<Item = (ComponentKind, Box<dyn ComponentValue>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "health"
        }
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Fuel(f32);

    impl Component for Fuel {
        fn type_name() -> &'static str {
            "fuel"
        }
    }

    #[test]
    fn test_component_kind_is_stable() {
        assert_eq!(Health::kind(), Health::kind());
        assert_eq!(Health::kind(), ComponentKind::from_name("health"));
        assert_eq!(ComponentKind::of::<Health>(), Health::kind());
    }

    #[test]
    fn test_component_kind_differs_between_types() {
        assert_ne!(Health::kind(), Fuel::kind());
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64-bit of empty string is the offset basis itself.
        assert_eq!(
            ComponentKind::from_name(""),
            ComponentKind(0xcbf2_9ce4_8422_2325)
        );
        // Published test vector for "a".
        assert_eq!(
            ComponentKind::from_name("a"),
            ComponentKind(0xaf63_dc4c_8601_ec8c)
        );
    }

    #[test]
    fn test_erased_value_downcast() {
        let value: Box<dyn ComponentValue> = Box::new(Fuel(3.5));
        assert!(value.is::<Fuel>());
        assert!(!value.is::<Health>());
        assert_eq!(value.downcast_ref::<Fuel>(), Some(&Fuel(3.5)));
        assert_eq!(value.value_size(), std::mem::size_of::<Fuel>());
        assert_eq!(value.downcast::<Fuel>(), Some(Fuel(3.5)));
    }

    #[test]
    fn test_boxed_value_clone_is_deep() {
        let mut original: Box<dyn ComponentValue> = Box::new(Fuel(1.0));
        let copy = original.clone();
        original.downcast_mut::<Fuel>().unwrap().0 = 9.0;
        assert_eq!(copy.downcast_ref::<Fuel>(), Some(&Fuel(1.0)));
    }

    #[test]
    fn test_msgpack_codec_roundtrip() {
        let codec = MessagePackCodec::<Health>::new();
        let health = Health {
            current: 80.0,
            max: 100.0,
        };
        let bytes = codec.encode(&health).unwrap();
        let restored = codec.decode(&bytes).unwrap();
        assert_eq!(restored.downcast_ref::<Health>(), Some(&health));
    }

    #[test]
    fn test_msgpack_codec_rejects_wrong_type() {
        let codec = MessagePackCodec::<Health>::new();
        let err = codec.encode(&Fuel(1.0)).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_codec_decodes_config_table() {
        let codec = MessagePackCodec::<Health>::new();
        let table: toml::Value = toml::from_str("current = 5.0\nmax = 10.0\nextra = 1").unwrap();
        let value = codec.decode_config(table).unwrap();
        assert_eq!(
            value.downcast_ref::<Health>(),
            Some(&Health {
                current: 5.0,
                max: 10.0
            })
        );

        let table: toml::Value = toml::from_str("current = 5.0").unwrap();
        assert!(matches!(
            codec.decode_config(table),
            Err(CodecError::Config(FieldError::Missing("max")))
        ));
    }

    #[test]
    fn test_component_values_are_canonically_ordered() {
        let a = ComponentValues::new().with(Fuel(1.0)).with(Health {
            current: 1.0,
            max: 1.0,
        });
        let b = ComponentValues::new()
            .with(Health {
                current: 1.0,
                max: 1.0,
            })
            .with(Fuel(1.0));
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.kinds().collect::<Vec<_>>(), b.kinds().collect::<Vec<_>>());
    }

    #[test]
    fn test_component_values_merge_overrides() {
        let mut base = ComponentValues::new().with(Fuel(1.0));
        base.merge(ComponentValues::new().with(Fuel(2.0)));
        assert_eq!(base.len(), 1);
        assert_eq!(base.get_as::<Fuel>(), Some(&Fuel(2.0)));
    }
}
