//! # vehicle_components
//!
//! Concrete vehicle component payloads. The storage core treats these as
//! opaque values; this crate only defines their data, defaults, and a few
//! helpers used by systems.
//!
//! Every type implements [`Component`](vehicle_component::Component) with a
//! snake_case type name, which is also its section name in prototype files.

pub mod movement;
pub mod seats;
pub mod status;
pub mod transform;
pub mod weapon;

pub use glam::DVec3;

pub use movement::{Airplane, LandMovementControls, ShipMovementControls, Steering};
pub use seats::Seats;
pub use status::{Fuel, Gravity, Health};
pub use transform::Transform;
pub use weapon::{ControlStyle, GunBarrel};

use vehicle_component::{ComponentRegistry, EcsError};

/// Register every component in this crate with its default value.
///
/// # Errors
///
/// [`EcsError::DuplicateKind`] / [`EcsError::DuplicateName`] if any of them
/// is already registered.
pub fn register_all(registry: &mut ComponentRegistry) -> Result<(), EcsError> {
    registry.register_component(Transform::default())?;
    registry.register_component(Health::default())?;
    registry.register_component(Fuel::default())?;
    registry.register_component(Gravity::default())?;
    registry.register_component(Seats::default())?;
    registry.register_component(GunBarrel::default())?;
    registry.register_component(LandMovementControls::default())?;
    registry.register_component(ShipMovementControls::default())?;
    registry.register_component(Airplane::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use vehicle_component::Component;

    use super::*;

    #[test]
    fn test_register_all() {
        let mut registry = ComponentRegistry::new();
        register_all(&mut registry).unwrap();
        assert_eq!(registry.len(), 9);
        assert_eq!(
            registry.kind_by_name("land_movement_controls").unwrap(),
            LandMovementControls::kind()
        );
        let meta = registry.lookup(Health::kind()).unwrap();
        assert_eq!(meta.size, std::mem::size_of::<Health>());
    }

    #[test]
    fn test_register_all_twice_fails() {
        let mut registry = ComponentRegistry::new();
        register_all(&mut registry).unwrap();
        assert!(matches!(
            register_all(&mut registry),
            Err(EcsError::DuplicateKind(_))
        ));
    }

    #[test]
    fn test_codec_roundtrip_through_registry() {
        let mut registry = ComponentRegistry::new();
        register_all(&mut registry).unwrap();
        let meta = registry.lookup(GunBarrel::kind()).unwrap();
        let barrel = GunBarrel {
            yaw: 42.0,
            control_pitch: ControlStyle::Wasd,
            ..GunBarrel::default()
        };
        let bytes = meta.codec.encode(&barrel).unwrap();
        let decoded = meta.codec.decode(&bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<GunBarrel>(), Some(&barrel));
    }
}
