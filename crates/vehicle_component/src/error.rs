//! Storage-core error types.

use crate::archetype::{ArchetypeHandle, Signature};
use crate::component::ComponentKind;
use crate::config::FieldError;
use crate::entity::EntityId;

/// Errors raised by the registry, archetype store, entity table, and queries.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A component kind was registered twice.
    #[error("component kind {0} is already registered")]
    DuplicateKind(ComponentKind),

    /// Two kinds were registered under the same name.
    #[error("component name `{0}` is already registered")]
    DuplicateName(String),

    /// A component kind was used without being registered.
    #[error("unknown component kind {0}")]
    UnknownKind(ComponentKind),

    /// A component name did not resolve to a registered kind.
    #[error("unknown component `{0}`")]
    UnknownComponentName(String),

    /// Row values did not cover exactly the archetype's signature.
    #[error("signature mismatch: expected {expected}, found {found}")]
    SignatureMismatch {
        expected: Signature,
        found: Signature,
    },

    /// The entity was destroyed (its index may since have been reused).
    #[error("stale entity {0}")]
    StaleEntity(EntityId),

    /// The entity is allocated but was never given a storage location.
    #[error("entity {0} has no storage location")]
    Unplaced(EntityId),

    /// An explicit index was requested that is currently occupied.
    #[error("entity index {0} is already in use")]
    IndexInUse(u32),

    /// An explicit index lies outside the table's capacity.
    #[error("entity index {index} is outside capacity {capacity}")]
    IndexOutOfRange { index: u32, capacity: usize },

    #[error("unknown archetype {0}")]
    UnknownArchetype(ArchetypeHandle),

    #[error("row {row} out of bounds for archetype {archetype} ({len} rows)")]
    RowOutOfBounds {
        archetype: ArchetypeHandle,
        row: usize,
        len: usize,
    },

    /// A value's concrete type does not match the type registered for its kind.
    #[error("value for component {kind} has type `{found}`, expected `{expected}`")]
    ComponentTypeMismatch {
        kind: ComponentKind,
        expected: &'static str,
        found: &'static str,
    },

    #[error("component {0} requested more than once in a query")]
    DuplicateQueryKind(ComponentKind),

    #[error("entity {entity} has no component {kind}")]
    MissingComponent {
        entity: EntityId,
        kind: ComponentKind,
    },

    /// The entity table is full.
    #[error("entity capacity of {0} exceeded")]
    CapacityExceeded(usize),
}

impl EcsError {
    /// Stale identifiers are recoverable: callers treat the entity as gone.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleEntity(_))
    }
}

/// Errors produced by a [`ComponentCodec`](crate::component::ComponentCodec).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid component configuration: {0}")]
    Config(#[from] FieldError),

    #[error("codec for `{expected}` was given a `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}
