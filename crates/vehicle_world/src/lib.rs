//! # vehicle_world
//!
//! Ties the storage core together into a running simulation.
//!
//! This crate provides:
//!
//! - [`World`]: archetype storage and the entity table, updated in lockstep.
//! - [`PrototypeRegistry`]: named spawn templates loaded from TOML.
//! - Vehicles: trees of linked entities spawned and despawned as one.
//! - [`CommandBuffer`]: structural changes deferred until queries finish.
//! - Snapshots: per-entity `(kind, bytes)` records saved as MessagePack or
//!   JSON.
//! - [`EngineConfig`] and [`TickLoop`]: configuration and the fixed-rate
//!   loop that drives systems and periodic saves.

pub mod command;
pub mod config;
pub mod error;
pub mod prototype;
pub mod snapshot;
pub mod tick;
pub mod vehicle;
pub mod world;

#[cfg(test)]
mod testing;

pub use command::{ApplyReport, Command, CommandBuffer};
pub use config::{
    EngineConfig, PathConfig, PrototypeDef, SaveConfig, StorageConfig, parse_prototypes,
};
pub use error::{ConfigError, SnapshotError, WorldError};
pub use prototype::{Prototype, PrototypeRegistry};
pub use snapshot::{
    ComponentBlob, EntityRecord, LoadReport, SNAPSHOT_VERSION, Snapshot, SnapshotFormat,
    backup_path, deserialize, load_snapshot, save_snapshot, serialize, write_backup,
};
pub use tick::{System, TickConfig, TickLoop};
pub use vehicle::{
    ElementSpec, Vehicle, VehicleElement, VehicleId, VehiclePrototype, VehicleTable,
};
pub use world::{ArchetypeStats, World, WorldStats};
