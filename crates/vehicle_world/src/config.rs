//! TOML configuration: engine settings and prototype documents.
//!
//! ## Engine settings
//!
//! ```toml
//! [tick]
//! rate = 20.0
//! max_ticks = 0        # 0 = run forever
//!
//! [storage]
//! max_entities = 10000
//!
//! [paths]
//! prototypes = "vehicle"
//! save = "save.msgpack"
//! backup = "backup"
//!
//! [save]
//! period = 200
//! backup_period = 18000
//! format = "msgpack"   # or "json"
//! pretty = false
//! ```
//!
//! Every field is optional. Relative paths are resolved against the
//! directory holding the configuration file.
//!
//! ## Prototype documents
//!
//! A document is either a single prototype, identified by a top-level
//! `name` string, or a set of prototypes with one table each:
//!
//! ```toml
//! [jeep.health]
//! current = 60.0
//! max = 60.0
//!
//! [jeep.fuel]
//! max = 40.0
//! ```
//!
//! Inside a prototype, every sub-table named after a registered component is
//! decoded through that component's codec. An empty table takes the
//! registered default. `name`, `parent` and `elements` are reserved; other
//! unknown keys are logged and ignored.
//!
//! A prototype with an `elements` array is a vehicle. Each element is a
//! prototype of its own with an optional `name` (default `element_<i>`) and
//! an optional `parent` naming another element:
//!
//! ```toml
//! [[tank.elements]]
//! name = "hull"
//! [tank.elements.health]
//!
//! [[tank.elements]]
//! name = "turret"
//! parent = "hull"
//! [tank.elements.gun_barrel]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use vehicle_component::{
    CodecError, ComponentRegistry, ComponentValues, DEFAULT_MAX_ENTITIES, FieldError,
};

use crate::error::ConfigError;
use crate::snapshot::SnapshotFormat;
use crate::tick::TickConfig;
use crate::vehicle::ElementSpec;

/// Key reserved for the prototype's display name.
const NAME_KEY: &str = "name";
const PARENT_KEY: &str = "parent";
const ELEMENTS_KEY: &str = "elements";

/// One parsed prototype definition.
#[derive(Debug, Clone)]
pub enum PrototypeDef {
    /// A single entity.
    Single(ComponentValues),
    /// A tree of linked entities.
    Vehicle(Vec<ElementSpec>),
}

impl PrototypeDef {
    #[must_use]
    pub fn single(&self) -> Option<&ComponentValues> {
        match self {
            Self::Single(values) => Some(values),
            Self::Vehicle(_) => None,
        }
    }

    #[must_use]
    pub fn elements(&self) -> &[ElementSpec] {
        match self {
            Self::Single(_) => &[],
            Self::Vehicle(elements) => elements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum number of live entities.
    pub max_entities: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_entities: DEFAULT_MAX_ENTITIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Prototype file or directory of `*.toml` prototype files.
    pub prototypes: PathBuf,
    /// Snapshot written on every save.
    pub save: PathBuf,
    /// Directory for periodic backup snapshots.
    pub backup: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            prototypes: PathBuf::from("vehicle"),
            save: PathBuf::from("save.msgpack"),
            backup: PathBuf::from("backup"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Ticks between saves (0 disables periodic saving).
    pub period: u64,
    /// Ticks between backups (0 disables backups).
    pub backup_period: u64,
    pub format: SnapshotFormat,
    /// Pretty-print JSON snapshots.
    pub pretty: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            period: 200,
            backup_period: 18_000,
            format: SnapshotFormat::MessagePack,
            pretty: false,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick: TickConfig,
    pub storage: StorageConfig,
    pub paths: PathConfig,
    pub save: SaveConfig,
}

impl EngineConfig {
    /// Parse a configuration document. Paths are left as written.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or mistyped fields.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load a configuration file and resolve its paths against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = read_to_string(path)?;
        let mut config = Self::from_toml_str(&source)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.paths.prototypes,
            &mut self.paths.save,
            &mut self.paths.backup,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

pub(crate) fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a prototype document into `(name, definition)` pairs, sorted by
/// name.
///
/// # Errors
///
/// [`ConfigError::Parse`] on malformed TOML,
/// [`ConfigError::InvalidPrototype`] if a top-level entry is not a table,
/// [`ConfigError::InvalidVehicle`] for a malformed `elements` array, and
/// [`ConfigError::MissingField`] / [`ConfigError::InvalidComponent`] if a
/// component section does not decode.
pub fn parse_prototypes(
    registry: &ComponentRegistry,
    source: &str,
) -> Result<Vec<(String, PrototypeDef)>, ConfigError> {
    let document: toml::Table = toml::from_str(source)?;

    if let Some(toml::Value::String(name)) = document.get(NAME_KEY) {
        let definition = parse_definition(registry, name, &document)?;
        return Ok(vec![(name.clone(), definition)]);
    }

    document
        .iter()
        .map(|(name, value)| match value {
            toml::Value::Table(table) => {
                Ok((name.clone(), parse_definition(registry, name, table)?))
            }
            _ => Err(ConfigError::InvalidPrototype(name.clone())),
        })
        .collect()
}

fn parse_definition(
    registry: &ComponentRegistry,
    prototype: &str,
    table: &toml::Table,
) -> Result<PrototypeDef, ConfigError> {
    let Some(elements) = table.get(ELEMENTS_KEY) else {
        return Ok(PrototypeDef::Single(parse_components(registry, prototype, table)?));
    };
    let toml::Value::Array(elements) = elements else {
        return Err(vehicle_error(prototype, "`elements` must be an array of tables"));
    };

    if let Some(key) = table.keys().find(|key| !is_reserved(key)) {
        warn!(prototype, component = %key, "ignoring component outside `elements`");
    }

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let toml::Value::Table(element) = element else {
                return Err(vehicle_error(
                    prototype,
                    format_args!("element {index} is not a table"),
                ));
            };
            let name = match element.get(NAME_KEY) {
                None => format!("element_{index}"),
                Some(toml::Value::String(name)) => name.clone(),
                Some(_) => {
                    return Err(vehicle_error(
                        prototype,
                        format_args!("element {index} has a non-string name"),
                    ));
                }
            };
            let parent = match element.get(PARENT_KEY) {
                None => None,
                Some(toml::Value::String(parent)) => Some(parent.clone()),
                Some(_) => {
                    return Err(vehicle_error(
                        prototype,
                        format_args!("element `{name}` has a non-string parent"),
                    ));
                }
            };
            let values = parse_components(registry, prototype, element)?;
            Ok(ElementSpec {
                name,
                parent,
                values,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(PrototypeDef::Vehicle)
}

fn is_reserved(key: &str) -> bool {
    matches!(key, NAME_KEY | PARENT_KEY | ELEMENTS_KEY)
}

fn vehicle_error(vehicle: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidVehicle {
        vehicle: vehicle.to_string(),
        message: message.to_string(),
    }
}

fn parse_components(
    registry: &ComponentRegistry,
    prototype: &str,
    table: &toml::Table,
) -> Result<ComponentValues, ConfigError> {
    let mut values = ComponentValues::new();
    for (key, section) in table {
        if is_reserved(key) {
            continue;
        }
        let Some(meta) = registry.meta_by_name(key) else {
            warn!(prototype, component = %key, "ignoring unknown component in prototype");
            continue;
        };

        let value = match section {
            toml::Value::Table(fields) if fields.is_empty() => meta.default_value(),
            toml::Value::Table(_) => meta
                .codec
                .decode_config(section.clone())
                .map_err(|err| component_error(key, err))?,
            _ => {
                return Err(ConfigError::InvalidComponent {
                    component: key.clone(),
                    message: "expected a table".to_string(),
                });
            }
        };
        values.insert(meta.kind, value);
    }
    Ok(values)
}

fn component_error(component: &str, err: CodecError) -> ConfigError {
    match err {
        CodecError::Config(FieldError::Missing(field)) => ConfigError::MissingField {
            component: component.to_string(),
            field: field.to_string(),
        },
        CodecError::Config(FieldError::Invalid(message)) => ConfigError::InvalidComponent {
            component: component.to_string(),
            message,
        },
        other => ConfigError::InvalidComponent {
            component: component.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fuel, Health, Seats, test_registry};

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.storage.max_entities, 10_000);
        assert_eq!(config.save.format, SnapshotFormat::MessagePack);
    }

    #[test]
    fn test_engine_config_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [tick]
            rate = 50.0
            max_ticks = 10

            [storage]
            max_entities = 64

            [save]
            period = 5
            format = "json"
            pretty = true
            unknown_key = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.tick.tick_rate, 50.0);
        assert_eq!(config.tick.max_ticks, 10);
        assert_eq!(config.storage.max_entities, 64);
        assert_eq!(config.save.period, 5);
        assert_eq!(config.save.backup_period, 18_000);
        assert_eq!(config.save.format, SnapshotFormat::Json);
        assert!(config.save.pretty);
    }

    #[test]
    fn test_engine_config_rejects_bad_format() {
        let err = EngineConfig::from_toml_str("[save]\nformat = \"xml\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let mut config = EngineConfig::default();
        config.paths.backup = PathBuf::from("/abs/backup");
        config.resolve_paths(Path::new("/srv/vehicles"));
        assert_eq!(config.paths.save, PathBuf::from("/srv/vehicles/save.msgpack"));
        assert_eq!(config.paths.backup, PathBuf::from("/abs/backup"));
    }

    #[test]
    fn test_parse_prototype_tables() {
        let registry = test_registry();
        let prototypes = parse_prototypes(
            &registry,
            r#"
            [jeep]
            name = "Jeep"
            [jeep.health]
            [jeep.seats]
            count = 4

            [drum]
            fuel = 25.0
            "#,
        );
        // `fuel = 25.0` is not a table.
        assert!(matches!(
            prototypes,
            Err(ConfigError::InvalidComponent { ref component, .. }) if component == "fuel"
        ));

        let prototypes = parse_prototypes(
            &registry,
            r#"
            [jeep]
            name = "Jeep"
            [jeep.health]
            [jeep.seats]
            count = 4
            "#,
        )
        .unwrap();
        assert_eq!(prototypes.len(), 1);
        let (name, definition) = &prototypes[0];
        assert_eq!(name, "jeep");
        let values = definition.single().unwrap();
        assert_eq!(values.get_as::<Health>(), Some(&Health(100)));
        assert_eq!(values.get_as::<Seats>(), Some(&Seats::new(4)));
        assert!(values.get_as::<Fuel>().is_none());
    }

    #[test]
    fn test_parse_single_prototype_document() {
        let registry = test_registry();
        let prototypes = parse_prototypes(
            &registry,
            r#"
            name = "barrel"
            [fuel]
            "#,
        )
        .unwrap();
        assert_eq!(prototypes.len(), 1);
        assert_eq!(prototypes[0].0, "barrel");
        assert_eq!(prototypes[0].1.single().unwrap().get_as::<Fuel>(), Some(&Fuel(0.0)));
    }

    #[test]
    fn test_unknown_component_is_ignored() {
        let registry = test_registry();
        let prototypes = parse_prototypes(
            &registry,
            r#"
            [boat.health]
            [boat.propeller]
            blades = 3
            "#,
        )
        .unwrap();
        assert_eq!(prototypes[0].1.single().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_required_field_names_component_and_field() {
        let registry = test_registry();
        let err = parse_prototypes(
            &registry,
            r#"
            [bus.seats]
            occupied = 2
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::MissingField { component, field } => {
                assert_eq!(component, "seats");
                assert_eq!(field, "count");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let registry = test_registry();
        let prototypes = parse_prototypes(
            &registry,
            r#"
            [bus.seats]
            count = 8
            color = "red"
            "#,
        )
        .unwrap();
        assert_eq!(prototypes[0].1.single().unwrap().get_as::<Seats>(), Some(&Seats::new(8)));
    }

    #[test]
    fn test_mistyped_field_is_invalid_component() {
        let registry = test_registry();
        let err = parse_prototypes(
            &registry,
            r#"
            [bus.seats]
            count = "eight"
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidComponent { ref component, .. } if component == "seats"
        ));
    }

    #[test]
    fn test_parse_vehicle_elements() {
        let registry = test_registry();
        let prototypes = parse_prototypes(
            &registry,
            r#"
            [tank]
            [[tank.elements]]
            name = "hull"
            [tank.elements.health]
            [tank.elements.fuel]

            [[tank.elements]]
            parent = "hull"
            [tank.elements.seats]
            count = 1
            "#,
        )
        .unwrap();
        let (name, definition) = &prototypes[0];
        assert_eq!(name, "tank");
        assert!(definition.single().is_none());

        let elements = definition.elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].name, "hull");
        assert_eq!(elements[0].parent, None);
        assert_eq!(elements[0].values.len(), 2);
        assert_eq!(elements[1].name, "element_1");
        assert_eq!(elements[1].parent.as_deref(), Some("hull"));
        assert_eq!(elements[1].values.get_as::<Seats>(), Some(&Seats::new(1)));
    }

    #[test]
    fn test_malformed_elements_are_rejected() {
        let registry = test_registry();
        let err = parse_prototypes(&registry, "[tank]\nelements = 3").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVehicle { ref vehicle, .. } if vehicle == "tank"));

        let err = parse_prototypes(&registry, "[tank]\nelements = [{ parent = 1 }]").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVehicle { .. }));
    }
}
