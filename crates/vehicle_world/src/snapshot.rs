//! Serialization layer and snapshot files.
//!
//! An entity serializes to its stable index, its signature, and one
//! `(kind, bytes)` blob per component in canonical kind order, produced by
//! the component's registered codec. Serialization only reads storage.
//! Restoring hands decoded values to the world's normal spawn path, so rows
//! are only ever created through the archetype store.
//!
//! Vehicles are stored as their element trees, with each element naming the
//! entity index it was saved under. Restoring relinks them to whatever ids
//! those records were given; vehicle ids themselves are not preserved.
//!
//! Snapshot files are written atomically: the bytes go to a sibling
//! `*.tmp` file which is then renamed over the target.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vehicle_component::{
    ComponentKind, ComponentRegistry, ComponentValues, EcsError, EntityId, EntityLocation,
    Signature,
};

use crate::error::{SnapshotError, WorldError};
use crate::vehicle::{Vehicle, VehicleElement};
use crate::world::World;

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk encoding of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapshotFormat {
    #[default]
    #[serde(rename = "msgpack")]
    MessagePack,
    #[serde(rename = "json")]
    Json,
}

impl SnapshotFormat {
    /// Conventional file extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::MessagePack => "msgpack",
            Self::Json => "json",
        }
    }
}

/// One component's persisted bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentBlob {
    pub kind: ComponentKind,
    pub bytes: Vec<u8>,
}

/// One persisted entity. The generation is not stored; restored entities
/// get whatever generation their slot currently has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub index: u32,
    pub signature: Signature,
    pub components: Vec<ComponentBlob>,
}

/// One persisted vehicle element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub name: String,
    /// [`EntityRecord::index`] of the element's entity.
    pub index: u32,
    /// Position of the parent in [`VehicleRecord::elements`].
    pub parent: Option<usize>,
}

/// One persisted vehicle, elements parents first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub prototype: String,
    pub elements: Vec<ElementRecord>,
}

impl From<&Vehicle> for VehicleRecord {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            prototype: vehicle.prototype().to_string(),
            elements: vehicle
                .elements()
                .iter()
                .map(|element| ElementRecord {
                    name: element.name.clone(),
                    index: element.entity.index(),
                    parent: element.parent,
                })
                .collect(),
        }
    }
}

/// A full world snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Tick at which the snapshot was taken.
    pub tick: u64,
    pub records: Vec<EntityRecord>,
    #[serde(default)]
    pub vehicles: Vec<VehicleRecord>,
}

impl Snapshot {
    /// # Errors
    ///
    /// Encoder failures.
    pub fn to_bytes(&self, format: SnapshotFormat, pretty: bool) -> Result<Vec<u8>, SnapshotError> {
        Ok(match format {
            SnapshotFormat::MessagePack => rmp_serde::to_vec_named(self)?,
            SnapshotFormat::Json if pretty => serde_json::to_vec_pretty(self)?,
            SnapshotFormat::Json => serde_json::to_vec(self)?,
        })
    }

    /// # Errors
    ///
    /// Decoder failures, or [`SnapshotError::Version`] for an unknown layout.
    pub fn from_bytes(format: SnapshotFormat, bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = match format {
            SnapshotFormat::MessagePack => rmp_serde::from_slice(bytes)?,
            SnapshotFormat::Json => serde_json::from_slice(bytes)?,
        };
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

/// Outcome of restoring a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Tick the snapshot was taken at; 0 when there was nothing to load.
    pub tick: u64,
    pub restored: usize,
    /// Records dropped because they failed to decode or referenced unknown
    /// kinds.
    pub skipped: usize,
    /// Vehicles relinked with at least one element.
    pub vehicles: usize,
}

/// Encode the components at `location`, in canonical kind order.
///
/// # Errors
///
/// [`EcsError::UnknownArchetype`] / [`EcsError::RowOutOfBounds`] for a bad
/// location, or [`WorldError::CodecMismatch`] if a codec rejects a value.
pub fn serialize(world: &World, location: EntityLocation) -> Result<Vec<ComponentBlob>, WorldError> {
    let archetype = world.store().get(location.archetype)?;
    if location.row >= archetype.len() {
        return Err(EcsError::RowOutOfBounds {
            archetype: location.archetype,
            row: location.row,
            len: archetype.len(),
        }
        .into());
    }

    archetype
        .signature()
        .iter()
        .map(|kind| -> Result<ComponentBlob, WorldError> {
            let meta = world.registry().lookup(kind)?;
            let value = archetype
                .get(kind, location.row)
                .ok_or(EcsError::UnknownKind(kind))?;
            let bytes = meta
                .codec
                .encode(value)
                .map_err(|err| WorldError::codec(kind, err))?;
            Ok(ComponentBlob { kind, bytes })
        })
        .collect()
}

/// Decode blobs produced by [`serialize`] back into component values.
///
/// # Errors
///
/// [`EcsError::UnknownKind`] for an unregistered kind,
/// [`EcsError::SignatureMismatch`] if the blob count differs from the
/// signature, and [`WorldError::CodecMismatch`] if a blob is out of order,
/// fails to decode, or decodes to a value whose size differs from the
/// registered size.
pub fn deserialize(
    registry: &ComponentRegistry,
    signature: &Signature,
    blobs: &[ComponentBlob],
) -> Result<ComponentValues, WorldError> {
    if blobs.len() != signature.len() {
        return Err(EcsError::SignatureMismatch {
            expected: signature.clone(),
            found: Signature::new(blobs.iter().map(|blob| blob.kind)),
        }
        .into());
    }

    let mut values = ComponentValues::new();
    for (expected, blob) in signature.iter().zip(blobs) {
        if blob.kind != expected {
            return Err(WorldError::CodecMismatch {
                kind: blob.kind,
                reason: format!("expected component {expected} at this position"),
            });
        }
        let meta = registry.lookup(blob.kind)?;
        let value = meta
            .codec
            .decode(&blob.bytes)
            .map_err(|err| WorldError::codec(blob.kind, err))?;
        if value.value_size() != meta.size {
            return Err(WorldError::CodecMismatch {
                kind: blob.kind,
                reason: format!(
                    "decoded size {} differs from registered size {}",
                    value.value_size(),
                    meta.size
                ),
            });
        }
        values.insert(blob.kind, value);
    }
    Ok(values)
}

impl World {
    /// Persist one entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] or [`serialize`] errors.
    pub fn serialize_entity(&self, id: EntityId) -> Result<EntityRecord, WorldError> {
        let location = self.location(id)?;
        Ok(EntityRecord {
            index: id.index(),
            signature: self.signature(id)?.clone(),
            components: serialize(self, location)?,
        })
    }

    /// Persist every entity, archetype by archetype in row order.
    ///
    /// # Errors
    ///
    /// [`serialize`] errors.
    pub fn snapshot(&self, tick: u64) -> Result<Snapshot, WorldError> {
        let mut records = Vec::with_capacity(self.entity_count());
        for archetype in self.store().iter() {
            for (row, entity) in archetype.entities().iter().enumerate() {
                records.push(EntityRecord {
                    index: entity.index(),
                    signature: archetype.signature().clone(),
                    components: serialize(self, EntityLocation::new(archetype.handle(), row))?,
                });
            }
        }
        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            tick,
            records,
            vehicles: self.vehicles().iter().map(VehicleRecord::from).collect(),
        })
    }

    /// Spawn every record of `snapshot`. Records that fail to decode or name
    /// unknown kinds are skipped and counted; the rest are restored. Entities
    /// keep their index when it is free.
    ///
    /// Vehicles are then relinked. An element whose record was skipped is
    /// dropped and its children become roots; a vehicle with no element left
    /// is dropped.
    pub fn restore(&mut self, snapshot: &Snapshot) -> LoadReport {
        let mut report = LoadReport {
            tick: snapshot.tick,
            ..LoadReport::default()
        };
        let mut restored_ids: HashMap<u32, EntityId> = HashMap::new();
        for record in &snapshot.records {
            let restored = deserialize(self.registry(), &record.signature, &record.components)
                .and_then(|values| self.spawn_at(record.index, values));
            match restored {
                Ok(id) => {
                    restored_ids.entry(record.index).or_insert(id);
                    report.restored += 1;
                }
                Err(err) => {
                    warn!(index = record.index, error = %err, "skipping snapshot record");
                    report.skipped += 1;
                }
            }
        }

        let mut claimed: HashSet<EntityId> = HashSet::new();
        for record in &snapshot.vehicles {
            let elements = relink(record, &restored_ids, &mut claimed);
            if elements.is_empty() {
                warn!(prototype = %record.prototype, "dropping vehicle with no restored elements");
                continue;
            }
            if elements.len() < record.elements.len() {
                warn!(
                    prototype = %record.prototype,
                    lost = record.elements.len() - elements.len(),
                    "vehicle restored without some elements"
                );
            }
            self.vehicles_mut().insert(record.prototype.clone(), elements);
            report.vehicles += 1;
        }
        report
    }
}

/// Map a vehicle record's elements onto restored entities. Elements whose
/// entity is missing or already owned are dropped.
fn relink(
    record: &VehicleRecord,
    restored_ids: &HashMap<u32, EntityId>,
    claimed: &mut HashSet<EntityId>,
) -> Vec<VehicleElement> {
    let mut positions: Vec<Option<usize>> = Vec::with_capacity(record.elements.len());
    let mut elements = Vec::new();
    for (index, element) in record.elements.iter().enumerate() {
        let entity = restored_ids
            .get(&element.index)
            .copied()
            .filter(|entity| claimed.insert(*entity));
        let Some(entity) = entity else {
            positions.push(None);
            continue;
        };
        // Parents always precede children; anything else is treated as a root.
        let parent = element
            .parent
            .filter(|parent| *parent < index)
            .and_then(|parent| positions[parent]);
        positions.push(Some(elements.len()));
        elements.push(VehicleElement {
            name: element.name.clone(),
            entity,
            parent,
        });
    }
    elements
}

/// Write a snapshot of `world` to `path` atomically. Returns the number of
/// records written.
///
/// # Errors
///
/// [`serialize`] errors and [`SnapshotError`]s.
pub fn save_snapshot(
    world: &World,
    tick: u64,
    path: &Path,
    format: SnapshotFormat,
    pretty: bool,
) -> Result<usize, WorldError> {
    let snapshot = world.snapshot(tick)?;
    let bytes = snapshot.to_bytes(format, pretty)?;
    write_atomic(path, &bytes)?;
    info!(path = %path.display(), tick, records = snapshot.records.len(), "saved snapshot");
    Ok(snapshot.records.len())
}

/// Restore a snapshot file into `world`. A missing file is treated as an
/// empty snapshot.
///
/// # Errors
///
/// I/O errors other than "not found", and undecodable files.
pub fn load_snapshot(
    world: &mut World,
    path: &Path,
    format: SnapshotFormat,
) -> Result<LoadReport, WorldError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(LoadReport::default());
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };
    let snapshot = Snapshot::from_bytes(format, &bytes)?;
    let report = world.restore(&snapshot);
    info!(
        path = %path.display(),
        tick = snapshot.tick,
        restored = report.restored,
        skipped = report.skipped,
        "loaded snapshot"
    );
    Ok(report)
}

/// Path of the backup taken at `tick`.
#[must_use]
pub fn backup_path(dir: &Path, tick: u64, format: SnapshotFormat) -> PathBuf {
    dir.join(format!("save_{tick:010}.{}", format.extension()))
}

/// Write a backup snapshot into `dir`, named after `tick`.
///
/// # Errors
///
/// Same as [`save_snapshot`].
pub fn write_backup(
    world: &World,
    tick: u64,
    dir: &Path,
    format: SnapshotFormat,
    pretty: bool,
) -> Result<PathBuf, WorldError> {
    let path = backup_path(dir, tick, format);
    save_snapshot(world, tick, &path, format, pretty)?;
    Ok(path)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let io_error = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
