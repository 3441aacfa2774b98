//! Aimable weapons.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use vehicle_component::Component;

/// How a seated player drives one rotation axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStyle {
    #[default]
    None,
    /// Follows the player's view direction.
    Mouse,
    /// Driven by movement keys.
    Wasd,
}

/// A single rotating gun barrel, e.g. a cannon or mortar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GunBarrel {
    /// Barrel pivot relative to the element's transform.
    pub barrel_offset: DVec3,
    pub pitch_min: f64,
    pub pitch_max: f64,
    pub seat_controller: u32,
    pub control_yaw: ControlStyle,
    pub control_pitch: ControlStyle,
    /// Degrees per tick.
    pub yaw_rotation_speed: f64,
    /// Degrees per tick.
    pub pitch_rotation_speed: f64,
    /// Seat mounted when the barrel is interacted with.
    pub seat_to_mount: Option<u32>,
    pub yaw: f64,
    pub pitch: f64,
}

impl Default for GunBarrel {
    fn default() -> Self {
        Self {
            barrel_offset: DVec3::new(0.0, 1.0, 0.0),
            pitch_min: -15.0,
            pitch_max: 15.0,
            seat_controller: 0,
            control_yaw: ControlStyle::None,
            control_pitch: ControlStyle::None,
            yaw_rotation_speed: 1.0,
            pitch_rotation_speed: 0.5,
            seat_to_mount: None,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

impl GunBarrel {
    /// Rotate toward `(yaw, pitch)` by at most the configured speeds.
    /// Pitch is kept within `[pitch_min, pitch_max]`.
    pub fn aim(&mut self, yaw: f64, pitch: f64) {
        let yaw_delta = (yaw - self.yaw + 180.0).rem_euclid(360.0) - 180.0;
        self.yaw = (self.yaw
            + yaw_delta.clamp(-self.yaw_rotation_speed, self.yaw_rotation_speed))
        .rem_euclid(360.0);

        let target = pitch.clamp(self.pitch_min, self.pitch_max);
        let pitch_delta = target - self.pitch;
        self.pitch += pitch_delta.clamp(-self.pitch_rotation_speed, self.pitch_rotation_speed);
    }
}

impl Component for GunBarrel {
    fn type_name() -> &'static str {
        "gun_barrel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aim_is_rate_limited() {
        let mut barrel = GunBarrel::default();
        barrel.aim(10.0, 10.0);
        assert_eq!(barrel.yaw, 1.0);
        assert_eq!(barrel.pitch, 0.5);
    }

    #[test]
    fn test_aim_takes_short_way_round() {
        let mut barrel = GunBarrel {
            yaw: 359.5,
            ..GunBarrel::default()
        };
        barrel.aim(0.25, 0.0);
        assert_eq!(barrel.yaw, 0.25);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut barrel = GunBarrel {
            pitch_rotation_speed: 90.0,
            ..GunBarrel::default()
        };
        barrel.aim(0.0, -60.0);
        assert_eq!(barrel.pitch, -15.0);
    }

    #[test]
    fn test_from_config() {
        let barrel: GunBarrel = toml::from_str(
            r#"
            barrel_offset = [0.0, 2.0, 0.5]
            control_yaw = "mouse"
            seat_to_mount = 0
            "#,
        )
        .unwrap();
        assert_eq!(barrel.barrel_offset, DVec3::new(0.0, 2.0, 0.5));
        assert_eq!(barrel.control_yaw, ControlStyle::Mouse);
        assert_eq!(barrel.control_pitch, ControlStyle::None);
        assert_eq!(barrel.seat_to_mount, Some(0));
    }
}
