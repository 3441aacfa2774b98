//! Health, fuel, and gravity.

use serde::{Deserialize, Serialize};
use vehicle_component::{Component, FieldError, config};

/// Hit points. `current` is clamped to `[0, max]` when built or read from a
/// prototype; snapshots store whatever the value holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f64,
    pub max: f64,
}

/// Fuel tank. Clamped like [`Health`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fuel {
    pub current: f64,
    pub max: f64,
}

/// Configuration shape shared by [`Health`] and [`Fuel`]. A missing
/// `current` starts full.
#[derive(Deserialize)]
struct Gauge {
    current: Option<f64>,
    max: f64,
}

impl Gauge {
    fn clamped(self) -> (f64, f64) {
        let max = self.max.max(0.0);
        (self.current.unwrap_or(max).clamp(0.0, max), max)
    }
}

impl Health {
    #[must_use]
    pub fn new(current: f64, max: f64) -> Self {
        Gauge {
            current: Some(current),
            max,
        }
        .into()
    }

    #[must_use]
    pub fn full(max: f64) -> Self {
        Self::new(max, max)
    }

    /// Subtract `amount`, stopping at zero. Returns `true` once depleted.
    pub fn damage(&mut self, amount: f64) -> bool {
        self.current = (self.current - amount).max(0.0);
        self.current <= 0.0
    }

    pub fn repair(&mut self, amount: f64) {
        self.current = (self.current + amount).min(self.max);
    }
}

impl From<Gauge> for Health {
    fn from(gauge: Gauge) -> Self {
        let (current, max) = gauge.clamped();
        Self { current, max }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::full(100.0)
    }
}

impl Component for Health {
    fn type_name() -> &'static str {
        "health"
    }

    fn from_config(value: toml::Value) -> Result<Self, FieldError> {
        Ok(config::decode::<Gauge>(value)?.into())
    }
}

impl Fuel {
    #[must_use]
    pub fn new(current: f64, max: f64) -> Self {
        Gauge {
            current: Some(current),
            max,
        }
        .into()
    }

    /// Burn up to `amount`. Returns how much was actually consumed.
    pub fn consume(&mut self, amount: f64) -> f64 {
        let used = amount.clamp(0.0, self.current);
        self.current -= used;
        used
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current <= 0.0
    }
}

impl From<Gauge> for Fuel {
    fn from(gauge: Gauge) -> Self {
        let (current, max) = gauge.clamped();
        Self { current, max }
    }
}

impl Default for Fuel {
    fn default() -> Self {
        Self::new(0.0, 100.0)
    }
}

impl Component for Fuel {
    fn type_name() -> &'static str {
        "fuel"
    }

    fn from_config(value: toml::Value) -> Result<Self, FieldError> {
        Ok(config::decode::<Gauge>(value)?.into())
    }
}

/// Makes a stationary element fall when the block below it is open.
///
/// Not meant to be combined with a movement controller, which applies its
/// own gravity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gravity {
    /// Rough footprint; above 1 the check samples a five point cross.
    pub area: u32,
    /// Ticks between gravity checks.
    pub delay: u32,
}

impl Default for Gravity {
    fn default() -> Self {
        Self { area: 1, delay: 1 }
    }
}

impl Component for Gravity {
    fn type_name() -> &'static str {
        "gravity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_is_clamped() {
        assert_eq!(Health::new(150.0, 100.0).current, 100.0);
        assert_eq!(Health::new(-5.0, 100.0).current, 0.0);
    }

    #[test]
    fn test_health_damage_and_repair() {
        let mut health = Health::full(20.0);
        assert!(!health.damage(15.0));
        health.repair(100.0);
        assert_eq!(health.current, 20.0);
        assert!(health.damage(25.0));
        assert_eq!(health.current, 0.0);
    }

    #[test]
    fn test_fuel_consume() {
        let mut fuel = Fuel::new(1.0, 10.0);
        assert_eq!(fuel.consume(0.25), 0.25);
        assert_eq!(fuel.consume(5.0), 0.75);
        assert!(fuel.is_empty());
    }

    fn table(source: &str) -> toml::Value {
        toml::Value::Table(toml::from_str(source).unwrap())
    }

    #[test]
    fn test_gauge_from_config() {
        let health = Health::from_config(table("max = 60.0")).unwrap();
        assert_eq!(health, Health::full(60.0));

        let fuel = Fuel::from_config(table("current = 80.0\nmax = 40.0")).unwrap();
        assert_eq!(fuel, Fuel::new(40.0, 40.0));

        let err = Health::from_config(table("current = 1.0")).unwrap_err();
        assert_eq!(err, FieldError::Missing("max"));
    }

    #[test]
    fn test_out_of_range_value_survives_roundtrip() {
        let mut health = Health::full(100.0);
        health.current = 150.0;
        let bytes = rmp_serde::to_vec_named(&health).unwrap();
        let restored: Health = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(restored.current.to_bits(), 150.0_f64.to_bits());
        assert_eq!(restored, health);

        let fuel = Fuel {
            current: -2.5,
            max: 10.0,
        };
        let bytes = rmp_serde::to_vec_named(&fuel).unwrap();
        assert_eq!(rmp_serde::from_slice::<Fuel>(&bytes).unwrap(), fuel);
    }

    #[test]
    fn test_gravity_defaults() {
        let gravity: Gravity = toml::from_str("delay = 4").unwrap();
        assert_eq!(gravity, Gravity { area: 1, delay: 4 });
    }

    #[test]
    fn test_serialization_roundtrip() {
        let fuel = Fuel::new(12.5, 40.0);
        let bytes = rmp_serde::to_vec_named(&fuel).unwrap();
        let restored: Fuel = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(fuel, restored);
    }
}
