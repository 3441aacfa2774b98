//! Vehicle element placement.
//!
//! [`Transform`] holds an element's world position and heading. Vehicles are
//! rigid bodies, so there is no scale.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use vehicle_component::Component;

/// World position plus yaw and pitch in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    /// Offset from the parent element.
    pub offset: DVec3,
    pub position: DVec3,
    pub yaw: f64,
    pub pitch: f64,
    /// Set by movement whenever the position changes.
    #[serde(skip)]
    pub dirty: bool,
}

impl Transform {
    pub const ORIGIN: Self = Self {
        offset: DVec3::ZERO,
        position: DVec3::ZERO,
        yaw: 0.0,
        pitch: 0.0,
        dirty: false,
    };

    #[must_use]
    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::ORIGIN
        }
    }

    /// Unit vector along the heading in the horizontal plane. Yaw 0 faces +z
    /// and yaw grows clockwise seen from above.
    #[must_use]
    pub fn forward(&self) -> DVec3 {
        let (sin, cos) = self.yaw.to_radians().sin_cos();
        DVec3::new(-sin, 0.0, cos)
    }

    /// Rotate `local` by the current yaw into world space, relative to the
    /// position.
    #[must_use]
    pub fn local_to_world(&self, local: DVec3) -> DVec3 {
        let (sin, cos) = self.yaw.to_radians().sin_cos();
        self.position
            + DVec3::new(
                cos * local.x - sin * local.z,
                local.y,
                sin * local.x + cos * local.z,
            )
    }

    /// Move `distance` along the heading.
    pub fn advance(&mut self, distance: f64) {
        if distance != 0.0 {
            self.position += self.forward() * distance;
            self.dirty = true;
        }
    }

    /// Add `delta` degrees of yaw, wrapped to `[0, 360)`.
    pub fn turn(&mut self, delta: f64) {
        self.yaw = (self.yaw + delta).rem_euclid(360.0);
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl Component for Transform {
    fn type_name() -> &'static str {
        "transform"
    }
}
