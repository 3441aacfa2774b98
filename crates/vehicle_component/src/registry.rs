//! Component registry: the catalog of every component kind in the process.
//!
//! The registry is populated once at startup and is read-only afterwards.
//! It is an ordinary value, usually shared as `Arc<ComponentRegistry>`, so
//! tests can build isolated registries side by side.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::archetype::Column;
use crate::component::{Component, ComponentCodec, ComponentKind, ComponentValue, MessagePackCodec};
use crate::error::EcsError;

/// Storage shape of one component kind.
pub struct ComponentMeta {
    /// The kind this entry describes.
    pub kind: ComponentKind,
    /// Human-readable name, also the configuration section name.
    pub name: String,
    /// Declared size of one value in bytes.
    pub size: usize,
    /// Value used when an entity gains this component without an explicit value.
    pub default: Box<dyn ComponentValue>,
    /// Persistence and configuration codec.
    pub codec: Box<dyn ComponentCodec>,
}

impl ComponentMeta {
    /// Metadata for a Rust component type, using the MessagePack codec.
    #[must_use]
    pub fn of<T: Component>(default: T) -> Self {
        Self {
            kind: T::kind(),
            name: T::type_name().to_string(),
            size: std::mem::size_of::<T>(),
            default: Box::new(default),
            codec: Box::new(MessagePackCodec::<T>::new()),
        }
    }

    /// A fresh copy of the default value.
    #[must_use]
    pub fn default_value(&self) -> Box<dyn ComponentValue> {
        self.default.clone_value()
    }

    /// An empty column for this kind's concrete type.
    #[must_use]
    pub fn new_column(&self) -> Box<dyn Column> {
        self.default.new_column()
    }

    /// Returns `true` if `value` has the concrete type registered for this kind.
    #[must_use]
    pub fn accepts(&self, value: &dyn ComponentValue) -> bool {
        value.value_type_id() == self.default.value_type_id()
    }

    /// Fails with [`EcsError::ComponentTypeMismatch`] unless [`accepts`](Self::accepts).
    pub fn check(&self, value: &dyn ComponentValue) -> Result<(), EcsError> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(EcsError::ComponentTypeMismatch {
                kind: self.kind,
                expected: self.default.value_type_name(),
                found: value.value_type_name(),
            })
        }
    }
}

impl fmt::Debug for ComponentMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentMeta")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

/// Registry of all component kinds known to the engine.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    metas: HashMap<ComponentKind, ComponentMeta>,
    names: HashMap<String, ComponentKind>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component kind from its parts.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateKind`] if `kind` is already registered, or
    /// [`EcsError::DuplicateName`] if `name` is taken by another kind.
    pub fn register(
        &mut self,
        kind: ComponentKind,
        name: impl Into<String>,
        size: usize,
        default: Box<dyn ComponentValue>,
        codec: Box<dyn ComponentCodec>,
    ) -> Result<(), EcsError> {
        let name = name.into();
        if self.metas.contains_key(&kind) {
            return Err(EcsError::DuplicateKind(kind));
        }
        if self.names.contains_key(&name) {
            return Err(EcsError::DuplicateName(name));
        }

        debug!(%kind, name = %name, size, "registered component kind");
        self.names.insert(name.clone(), kind);
        self.metas.insert(
            kind,
            ComponentMeta {
                kind,
                name,
                size,
                default,
                codec,
            },
        );
        Ok(())
    }

    /// Register a Rust component type with its default value.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_component<T: Component>(&mut self, default: T) -> Result<ComponentKind, EcsError> {
        let meta = ComponentMeta::of(default);
        let kind = meta.kind;
        self.register(kind, meta.name, meta.size, meta.default, meta.codec)?;
        Ok(kind)
    }

    /// Look up the metadata for a kind.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownKind`] if the kind was never registered.
    pub fn lookup(&self, kind: ComponentKind) -> Result<&ComponentMeta, EcsError> {
        self.metas.get(&kind).ok_or(EcsError::UnknownKind(kind))
    }

    /// Resolve a component name (as used in configuration) to its kind.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponentName`] if no kind has that name.
    pub fn kind_by_name(&self, name: &str) -> Result<ComponentKind, EcsError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::UnknownComponentName(name.to_string()))
    }

    /// Metadata for a component name, if one is registered.
    #[must_use]
    pub fn meta_by_name(&self, name: &str) -> Option<&ComponentMeta> {
        self.names.get(name).and_then(|kind| self.metas.get(kind))
    }

    #[must_use]
    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.metas.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    /// All metadata entries in canonical kind order.
    #[must_use]
    pub fn metas(&self) -> Vec<&ComponentMeta> {
        let mut metas: Vec<_> = self.metas.values().collect();
        metas.sort_by_key(|meta| meta.kind);
        metas
    }
}
