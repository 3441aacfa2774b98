//! Small fixture components for unit tests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vehicle_component::{Component, ComponentRegistry};

use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health(pub i32);

impl Component for Health {
    fn type_name() -> &'static str {
        "health"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fuel(pub f32);

impl Component for Fuel {
    fn type_name() -> &'static str {
        "fuel"
    }
}

/// `count` is required in configuration; `occupied` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seats {
    pub count: u8,
    #[serde(default)]
    pub occupied: u8,
}

impl Seats {
    pub fn new(count: u8) -> Self {
        Self { count, occupied: 0 }
    }
}

impl Component for Seats {
    fn type_name() -> &'static str {
        "seats"
    }
}

pub fn test_registry() -> Arc<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    registry.register_component(Health(100)).unwrap();
    registry.register_component(Fuel(0.0)).unwrap();
    registry.register_component(Seats::new(1)).unwrap();
    Arc::new(registry)
}

pub fn test_world() -> World {
    World::new(test_registry())
}
