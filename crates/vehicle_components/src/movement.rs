//! Movement controllers for land vehicles, ships, and airplanes.
//!
//! Speeds are in blocks per tick and rotation speeds in degrees per tick.
//! `speed` and the rotation speeds are runtime state; everything else is
//! tuning read from prototype files.

use serde::{Deserialize, Serialize};
use vehicle_component::{Component, FieldError, config};

/// Driver input for one tick, each axis in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Steering {
    pub throttle: f64,
    pub turn: f64,
}

/// Cars, tanks, and other ground vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandMovementControls {
    pub acceleration: f64,
    pub deceleration_multiplier: f64,
    pub speed_max_forward: f64,
    pub speed_max_reverse: f64,
    pub yaw_rotation_acceleration: f64,
    pub yaw_rotation_deceleration_multiplier: f64,
    pub yaw_rotation_speed_max: f64,
    /// Local `[x, y, z]` points tested for ground contact.
    pub contact_points: Vec<[f64; 3]>,
    pub speed: f64,
    pub yaw_rotation_speed: f64,
}

impl Default for LandMovementControls {
    fn default() -> Self {
        Self {
            acceleration: 0.05,
            deceleration_multiplier: 0.8,
            speed_max_forward: 0.4,
            speed_max_reverse: 0.3,
            yaw_rotation_acceleration: 0.02,
            yaw_rotation_deceleration_multiplier: 0.5,
            yaw_rotation_speed_max: 2.0,
            contact_points: vec![[0.0, 0.0, 0.0]],
            speed: 0.0,
            yaw_rotation_speed: 0.0,
        }
    }
}

impl LandMovementControls {
    /// Advance speed and yaw rate by one tick of `input`. Returns
    /// `(distance, yaw_delta)` to apply to the transform.
    pub fn step(&mut self, input: Steering) -> (f64, f64) {
        let speed = approach(
            self.speed,
            input.throttle,
            self.acceleration,
            self.deceleration_multiplier,
        );
        self.speed = bound(speed, self.speed_max_reverse, self.speed_max_forward);
        let yaw = approach(
            self.yaw_rotation_speed,
            input.turn,
            self.yaw_rotation_acceleration,
            self.yaw_rotation_deceleration_multiplier,
        );
        self.yaw_rotation_speed = bound(yaw, self.yaw_rotation_speed_max, self.yaw_rotation_speed_max);
        (self.speed, self.yaw_rotation_speed)
    }

    /// Reject limits `step` cannot work with.
    ///
    /// # Errors
    ///
    /// [`FieldError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), FieldError> {
        non_negative("speed_max_forward", self.speed_max_forward)?;
        non_negative("speed_max_reverse", self.speed_max_reverse)?;
        non_negative("yaw_rotation_speed_max", self.yaw_rotation_speed_max)
    }
}

impl Component for LandMovementControls {
    fn type_name() -> &'static str {
        "land_movement_controls"
    }

    fn from_config(value: toml::Value) -> Result<Self, FieldError> {
        let controls: Self = config::decode(value)?;
        controls.validate()?;
        Ok(controls)
    }
}

/// Boats. Slow down sharply when beached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipMovementControls {
    /// Seat index whose passenger steers.
    pub seat_controller: u32,
    pub acceleration: f64,
    pub deceleration_multiplier: f64,
    pub speed_max_forward: f64,
    pub speed_max_reverse: f64,
    /// Speed cap while out of water.
    pub speed_grounded: f64,
    pub yaw_rotation_acceleration: f64,
    pub yaw_rotation_deceleration_multiplier: f64,
    pub yaw_rotation_speed_max: f64,
    /// Minimum speed needed before the ship can turn.
    pub yaw_rotation_effective_speed: f64,
    pub collision_cooldown_ticks: u32,
    pub min_collision_speed: f64,
    pub speed: f64,
    pub yaw_rotation_speed: f64,
}

impl Default for ShipMovementControls {
    fn default() -> Self {
        Self {
            seat_controller: 0,
            acceleration: 0.02,
            deceleration_multiplier: 0.8,
            speed_max_forward: 0.4,
            speed_max_reverse: 0.3,
            speed_grounded: 0.05,
            yaw_rotation_acceleration: 0.1,
            yaw_rotation_deceleration_multiplier: 0.5,
            yaw_rotation_speed_max: 2.0,
            yaw_rotation_effective_speed: 0.1,
            collision_cooldown_ticks: 60,
            min_collision_speed: 0.2,
            speed: 0.0,
            yaw_rotation_speed: 0.0,
        }
    }
}

impl ShipMovementControls {
    /// Like [`LandMovementControls::step`], with the grounded speed cap
    /// applied when `in_water` is false.
    pub fn step(&mut self, input: Steering, in_water: bool) -> (f64, f64) {
        let (forward, reverse) = if in_water {
            (self.speed_max_forward, self.speed_max_reverse)
        } else {
            (self.speed_grounded, self.speed_grounded)
        };
        let speed = approach(
            self.speed,
            input.throttle,
            self.acceleration,
            self.deceleration_multiplier,
        );
        self.speed = bound(speed, reverse, forward);

        let turn = if self.speed.abs() >= self.yaw_rotation_effective_speed {
            input.turn
        } else {
            0.0
        };
        let yaw = approach(
            self.yaw_rotation_speed,
            turn,
            self.yaw_rotation_acceleration,
            self.yaw_rotation_deceleration_multiplier,
        );
        self.yaw_rotation_speed = bound(yaw, self.yaw_rotation_speed_max, self.yaw_rotation_speed_max);
        (self.speed, self.yaw_rotation_speed)
    }

    /// # Errors
    ///
    /// [`FieldError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), FieldError> {
        non_negative("speed_max_forward", self.speed_max_forward)?;
        non_negative("speed_max_reverse", self.speed_max_reverse)?;
        non_negative("speed_grounded", self.speed_grounded)?;
        non_negative("yaw_rotation_speed_max", self.yaw_rotation_speed_max)
    }
}

impl Component for ShipMovementControls {
    fn type_name() -> &'static str {
        "ship_movement_controls"
    }

    fn from_config(value: toml::Value) -> Result<Self, FieldError> {
        let controls: Self = config::decode(value)?;
        controls.validate()?;
        Ok(controls)
    }
}

/// Fixed-wing aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Airplane {
    pub seat_controller: u32,
    pub speed_fast: f64,
    pub speed_steady: f64,
    pub speed_slow: f64,
    /// Below this the plane stalls and descends.
    pub speed_fly_min: f64,
    pub speed_liftoff: f64,
    pub acceleration: f64,
    pub deceleration: f64,
    pub ground_acceleration: f64,
    pub ground_deceleration: f64,
    pub yaw_acceleration: f64,
    pub yaw_speed_max: f64,
    pub yaw_speed_on_ground: f64,
    pub pitch_acceleration: f64,
    pub pitch_speed_max: f64,
    pub pitch_max: f64,
    pub pitch_min: f64,
    pub roll_rad_per_yaw_speed: f64,
    pub ground_pitch: f64,
    /// Landings steeper than this count as crashes.
    pub safe_landing_pitch: f64,
    pub y_height_max: f64,
    /// Health at or below which the plane no longer responds.
    pub health_controllable: f64,
    pub health_damage_per_crash: f64,
    pub firerate: u32,
    pub speed: f64,
    pub yaw_rotation_speed: f64,
    pub pitch_rotation_speed: f64,
}

impl Default for Airplane {
    fn default() -> Self {
        Self {
            seat_controller: 0,
            speed_fast: 1.6,
            speed_steady: 1.2,
            speed_slow: 0.8,
            speed_fly_min: 0.7,
            speed_liftoff: 1.0,
            acceleration: 0.02,
            deceleration: 0.02,
            ground_acceleration: 0.02,
            ground_deceleration: 0.02,
            yaw_acceleration: 0.05,
            yaw_speed_max: 1.0,
            yaw_speed_on_ground: 1.0,
            pitch_acceleration: 0.05,
            pitch_speed_max: 1.0,
            pitch_max: 50.0,
            pitch_min: -80.0,
            roll_rad_per_yaw_speed: 0.7,
            ground_pitch: 20.0,
            safe_landing_pitch: -30.0,
            y_height_max: 300.0,
            health_controllable: 2.0,
            health_damage_per_crash: 15.0,
            firerate: 1,
            speed: 0.0,
            yaw_rotation_speed: 0.0,
            pitch_rotation_speed: 0.0,
        }
    }
}

impl Airplane {
    #[must_use]
    pub fn is_stalling(&self) -> bool {
        self.speed < self.speed_fly_min
    }

    #[must_use]
    pub fn can_lift_off(&self) -> bool {
        self.speed >= self.speed_liftoff
    }

    /// Whether touching down at `pitch` degrees is a crash.
    #[must_use]
    pub fn is_crash_landing(&self, pitch: f64) -> bool {
        pitch < self.safe_landing_pitch
    }
}

impl Component for Airplane {
    fn type_name() -> &'static str {
        "airplane"
    }
}

/// Push `current` by `acceleration` in the direction of `input`, or scale it
/// by `decay` when there is no input.
fn approach(current: f64, input: f64, acceleration: f64, decay: f64) -> f64 {
    if input == 0.0 {
        let next = current * decay;
        if next.abs() < 1e-4 { 0.0 } else { next }
    } else {
        current + input.signum() * acceleration
    }
}

/// Limit `value` to `[-reverse, forward]`. Never panics, even when a
/// limit is negative or NaN.
fn bound(value: f64, reverse: f64, forward: f64) -> f64 {
    value.min(forward).max(-reverse)
}

fn non_negative(field: &str, value: f64) -> Result<(), FieldError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(FieldError::invalid(format_args!(
            "`{field}` must be zero or more, found {value}"
        )))
    }
}
