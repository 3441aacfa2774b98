//! World-level error types.

use std::path::PathBuf;

use vehicle_component::{CodecError, ComponentKind, EcsError};

use crate::vehicle::VehicleId;

/// Errors raised by the world, prototypes, and snapshots.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error("unknown prototype `{0}`")]
    UnknownPrototype(String),

    #[error("prototype `{0}` is already registered")]
    DuplicatePrototype(String),

    #[error("stale vehicle {0}")]
    StaleVehicle(VehicleId),

    /// Persisted bytes for a kind do not decode to a value of the registered
    /// shape. Fatal for the affected record only.
    #[error("codec mismatch for component {kind}: {reason}")]
    CodecMismatch { kind: ComponentKind, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl WorldError {
    /// Returns `true` for errors meaning "this entity or vehicle no longer
    /// exists".
    #[must_use]
    pub fn is_stale(&self) -> bool {
        match self {
            Self::Ecs(err) => err.is_stale(),
            Self::StaleVehicle(_) => true,
            _ => false,
        }
    }

    pub(crate) fn codec(kind: ComponentKind, err: CodecError) -> Self {
        Self::CodecMismatch {
            kind,
            reason: err.to_string(),
        }
    }
}

/// Malformed or missing configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("component `{component}` is missing required field `{field}`")]
    MissingField { component: String, field: String },

    #[error("invalid configuration for component `{component}`: {message}")]
    InvalidComponent { component: String, message: String },

    #[error("prototype `{0}` must be a table")]
    InvalidPrototype(String),

    #[error("invalid vehicle `{vehicle}`: {message}")]
    InvalidVehicle { vehicle: String, message: String },
}

/// Snapshot file I/O and format failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("JSON snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}
