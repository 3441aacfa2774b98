//! # vehicle_component
//!
//! The storage core of the vehicle ECS: what a component is, how component
//! kinds are registered, and how entities are laid out in archetype tables.
//!
//! This crate provides:
//!
//! - [`Component`] trait and [`ComponentKind`]: stable, name-derived kinds.
//! - [`ComponentRegistry`]: per-kind size, default value and codec.
//! - [`ArchetypeStore`]: SoA storage grouped by component set, with
//!   swap-remove compaction.
//! - [`EntityTable`]: generation-tagged ids and their storage locations.
//! - Typed and dynamic queries ([`QueryData`], [`ComponentTuple`]).

pub mod archetype;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;

pub use archetype::{
    Archetype, ArchetypeHandle, ArchetypeStore, Column, MovedRow, Signature, TypedColumn,
};
pub use component::{
    Component, ComponentCodec, ComponentKind, ComponentValue, ComponentValues, MessagePackCodec,
};
pub use config::FieldError;
pub use entity::{DEFAULT_MAX_ENTITIES, EntityId, EntityLocation, EntityTable};
pub use error::{CodecError, EcsError};
pub use query::{
    ComponentTuple, ComponentTupleMut, DynamicQueryIter, DynamicQueryIterMut, QueryData,
    QueryIter, QueryIterMut, QueryState, ReadOnlyQueryData,
};
pub use registry::{ComponentMeta, ComponentRegistry};
