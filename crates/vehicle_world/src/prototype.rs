//! Prototypes: named templates for spawning entities.
//!
//! A [`Prototype`] fixes a signature and a default value for every kind in
//! it. A [`VehiclePrototype`] is a tree of them, one per element. Both are
//! registered once at load time and never change; they own no live
//! entities. The two share one namespace.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use vehicle_component::{ComponentRegistry, ComponentValues, EcsError, EntityId, Signature};

use crate::config::{self, PrototypeDef, parse_prototypes};
use crate::error::{ConfigError, WorldError};
use crate::vehicle::{ElementSpec, VehicleId, VehiclePrototype};
use crate::world::World;

/// A named, immutable spawn template.
#[derive(Debug, Clone)]
pub struct Prototype {
    name: String,
    signature: Signature,
    defaults: ComponentValues,
}

impl Prototype {
    /// Check `defaults` against `signature` and fill the missing kinds from
    /// the registry.
    fn build(
        registry: &ComponentRegistry,
        name: String,
        signature: Signature,
        defaults: ComponentValues,
    ) -> Result<Self, WorldError> {
        let given = defaults.signature();
        if !signature.is_superset_of(&given) {
            return Err(EcsError::SignatureMismatch {
                expected: signature,
                found: given,
            }
            .into());
        }
        for (kind, value) in defaults.iter() {
            registry.lookup(kind)?.check(value)?;
        }

        let mut filled = ComponentValues::new();
        for kind in signature.iter() {
            if !defaults.contains(kind) {
                filled.insert(kind, registry.lookup(kind)?.default_value());
            }
        }
        filled.merge(defaults);
        Ok(Self {
            name,
            signature,
            defaults: filled,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// One value per kind in the signature.
    #[must_use]
    pub fn defaults(&self) -> &ComponentValues {
        &self.defaults
    }

    /// The defaults with `overrides` laid over them.
    ///
    /// # Errors
    ///
    /// [`EcsError::SignatureMismatch`] if `overrides` names a kind outside
    /// the prototype's signature.
    pub fn instantiate(&self, overrides: ComponentValues) -> Result<ComponentValues, EcsError> {
        let extra = overrides.signature();
        if !self.signature.is_superset_of(&extra) {
            return Err(EcsError::SignatureMismatch {
                expected: self.signature.clone(),
                found: extra,
            });
        }
        let mut values = self.defaults.clone();
        values.merge(overrides);
        Ok(values)
    }
}

/// All prototypes, by name.
#[derive(Debug)]
pub struct PrototypeRegistry {
    registry: Arc<ComponentRegistry>,
    prototypes: BTreeMap<String, Prototype>,
    vehicles: BTreeMap<String, VehiclePrototype>,
}

impl PrototypeRegistry {
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            prototypes: BTreeMap::new(),
            vehicles: BTreeMap::new(),
        }
    }

    /// Register a prototype. Kinds in `signature` without a value in
    /// `defaults` take the registry default.
    ///
    /// # Errors
    ///
    /// [`WorldError::DuplicatePrototype`], [`EcsError::UnknownKind`],
    /// [`EcsError::ComponentTypeMismatch`], or
    /// [`EcsError::SignatureMismatch`] if `defaults` has kinds outside
    /// `signature`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
        defaults: ComponentValues,
    ) -> Result<(), WorldError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(WorldError::DuplicatePrototype(name));
        }

        let prototype = Prototype::build(&self.registry, name.clone(), signature, defaults)?;
        debug!(prototype = %name, signature = %prototype.signature, "registered prototype");
        self.prototypes.insert(name, prototype);
        Ok(())
    }

    /// Register a multi-element vehicle. Each element's signature is the set
    /// of kinds in its values.
    ///
    /// # Errors
    ///
    /// [`WorldError::DuplicatePrototype`], element value errors as for
    /// [`register`](Self::register), or [`ConfigError::InvalidVehicle`] if
    /// the elements do not form a tree.
    pub fn register_vehicle(
        &mut self,
        name: impl Into<String>,
        elements: Vec<ElementSpec>,
    ) -> Result<(), WorldError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(WorldError::DuplicatePrototype(name));
        }

        let elements = elements
            .into_iter()
            .map(|element| {
                let signature = element.values.signature();
                let prototype =
                    Prototype::build(&self.registry, element.name, signature, element.values)?;
                Ok((prototype, element.parent))
            })
            .collect::<Result<Vec<_>, WorldError>>()?;
        let vehicle = VehiclePrototype::from_elements(name.clone(), elements)?;

        debug!(prototype = %name, elements = vehicle.len(), depth = vehicle.max_depth(), "registered vehicle prototype");
        self.vehicles.insert(name, vehicle);
        Ok(())
    }

    /// # Errors
    ///
    /// [`WorldError::UnknownPrototype`] if no prototype has that name.
    /// A single-element prototype.
    ///
    /// # Errors
    ///
    /// [`WorldError::UnknownPrototype`] if no such prototype exists.
    pub fn get(&self, name: &str) -> Result<&Prototype, WorldError> {
        self.prototypes
            .get(name)
            .ok_or_else(|| WorldError::UnknownPrototype(name.to_string()))
    }

    /// A multi-element vehicle prototype.
    ///
    /// # Errors
    ///
    /// [`WorldError::UnknownPrototype`] if no such vehicle prototype exists.
    pub fn vehicle(&self, name: &str) -> Result<&VehiclePrototype, WorldError> {
        self.vehicles
            .get(name)
            .ok_or_else(|| WorldError::UnknownPrototype(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.contains_key(name) || self.vehicles.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prototypes.len() + self.vehicles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty() && self.vehicles.is_empty()
    }

    /// Every prototype name, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = self
            .prototypes
            .keys()
            .chain(self.vehicles.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.into_iter()
    }

    /// Spawn an entity from a prototype, with `overrides` replacing the
    /// defaults per kind. For a vehicle prototype the whole vehicle is
    /// spawned and its first root element is returned.
    ///
    /// # Errors
    ///
    /// [`WorldError::UnknownPrototype`], an override outside the
    /// prototype's signature, or any [`World::spawn`] error.
    pub fn spawn(
        &self,
        world: &mut World,
        name: &str,
        overrides: ComponentValues,
    ) -> Result<EntityId, WorldError> {
        if let Some(vehicle) = self.vehicles.get(name) {
            let id = world.spawn_vehicle(vehicle, overrides)?;
            return world
                .vehicle(id)?
                .roots()
                .next()
                .ok_or(WorldError::StaleVehicle(id));
        }
        let values = self.get(name)?.instantiate(overrides)?;
        world.spawn(values)
    }

    /// Spawn a vehicle. A single-element prototype becomes a vehicle with
    /// one element.
    ///
    /// # Errors
    ///
    /// As for [`spawn`](Self::spawn).
    pub fn spawn_vehicle(
        &self,
        world: &mut World,
        name: &str,
        overrides: ComponentValues,
    ) -> Result<VehicleId, WorldError> {
        match self.vehicles.get(name) {
            Some(vehicle) => world.spawn_vehicle(vehicle, overrides),
            None => {
                let single = VehiclePrototype::single(self.get(name)?.clone());
                world.spawn_vehicle(&single, overrides)
            }
        }
    }

    /// Register every prototype in a TOML document. Returns how many were
    /// added.
    ///
    /// # Errors
    ///
    /// Configuration errors, or a registration error such as a duplicate
    /// name.
    pub fn load_toml_str(&mut self, source: &str) -> Result<usize, WorldError> {
        let parsed = parse_prototypes(&self.registry, source)?;
        let count = parsed.len();
        for (name, definition) in parsed {
            match definition {
                PrototypeDef::Single(values) => {
                    let signature = values.signature();
                    self.register(name, signature, values)?;
                }
                PrototypeDef::Vehicle(elements) => self.register_vehicle(name, elements)?,
            }
        }
        Ok(count)
    }

    /// # Errors
    ///
    /// [`ConfigError::Io`] plus the errors of
    /// [`load_toml_str`](Self::load_toml_str).
    pub fn load_file(&mut self, path: &Path) -> Result<usize, WorldError> {
        let source = config::read_to_string(path)?;
        let count = self.load_toml_str(&source)?;
        info!(path = %path.display(), count, "loaded prototypes");
        Ok(count)
    }

    /// Load every `*.toml` file in `dir`, in file-name order. A path that
    /// is a file is loaded on its own.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the directory cannot be read, plus the errors
    /// of [`load_file`](Self::load_file).
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, WorldError> {
        if dir.is_file() {
            return self.load_file(dir);
        }

        let io_error = |source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                files.push(path);
            }
        }
        files.sort();

        let mut count = 0;
        for path in &files {
            count += self.load_file(path)?;
        }
        Ok(count)
    }
}
