//! Passenger seats.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use vehicle_component::Component;

use crate::transform::Transform;

/// Seats on a vehicle element, with one local offset per seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seats {
    pub count: u32,
    /// Local seat positions. Seats past the end of this list sit at the
    /// element's origin.
    pub offsets: Vec<DVec3>,
    /// Passenger id per occupied seat.
    pub passengers: Vec<Option<u64>>,
}

impl Seats {
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            count,
            offsets: vec![DVec3::ZERO; count as usize],
            passengers: vec![None; count as usize],
        }
    }

    /// World position of seat `index`, or `None` if there is no such seat.
    #[must_use]
    pub fn seat_position(&self, index: u32, transform: &Transform) -> Option<DVec3> {
        if index >= self.count {
            return None;
        }
        let offset = self
            .offsets
            .get(index as usize)
            .copied()
            .unwrap_or(DVec3::ZERO);
        Some(transform.local_to_world(offset))
    }

    /// Put `passenger` in the first free seat. Returns the seat index.
    pub fn mount(&mut self, passenger: u64) -> Option<u32> {
        self.passengers.resize(self.count as usize, None);
        let index = self.passengers.iter().position(Option::is_none)?;
        self.passengers[index] = Some(passenger);
        u32::try_from(index).ok()
    }

    /// Remove `passenger` from whichever seat they occupy.
    pub fn dismount(&mut self, passenger: u64) -> Option<u32> {
        let index = self
            .passengers
            .iter()
            .position(|seat| *seat == Some(passenger))?;
        self.passengers[index] = None;
        u32::try_from(index).ok()
    }

    #[must_use]
    pub fn occupied(&self) -> usize {
        self.passengers.iter().filter(|seat| seat.is_some()).count()
    }
}

impl Default for Seats {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Component for Seats {
    fn type_name() -> &'static str {
        "seats"
    }
}
