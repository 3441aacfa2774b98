//! Built-in per-tick systems.
//!
//! Player input arrives from outside the engine; without it these systems
//! only let vehicles coast, burn fuel while moving, and clear out wrecks.
//! A wrecked element takes its whole vehicle with it.
//! Queries cannot fail here because every kind they name is registered by
//! `vehicle_components::register_all`.

use std::collections::BTreeSet;

use tracing::debug;
use vehicle_component::EntityId;
use vehicle_components::{
    Fuel, Health, LandMovementControls, ShipMovementControls, Steering, Transform,
};
use vehicle_world::{CommandBuffer, TickLoop, World};

/// Register every built-in system, in execution order.
pub fn install(tick_loop: &mut TickLoop) {
    tick_loop.add_system("land_movement", land_movement);
    tick_loop.add_system("ship_movement", ship_movement);
    tick_loop.add_system("fuel", fuel);
    tick_loop.add_system("wrecks", wrecks);
}

pub fn land_movement(world: &mut World, _: &mut CommandBuffer, _dt: f64) {
    let Ok(query) = world.query_mut::<(&mut Transform, &mut LandMovementControls)>() else {
        return;
    };
    for (transform, controls) in query {
        let (distance, yaw) = controls.step(Steering::default());
        transform.dirty = false;
        transform.turn(yaw);
        transform.advance(distance);
    }
}

pub fn ship_movement(world: &mut World, _: &mut CommandBuffer, _dt: f64) {
    let Ok(query) = world.query_mut::<(&mut Transform, &mut ShipMovementControls)>() else {
        return;
    };
    for (transform, controls) in query {
        let (distance, yaw) = controls.step(Steering::default(), true);
        transform.dirty = false;
        transform.turn(yaw);
        transform.advance(distance);
    }
}

/// Vehicles that moved this tick burn fuel in proportion to their speed.
pub fn fuel(world: &mut World, _: &mut CommandBuffer, _dt: f64) {
    if let Ok(query) = world.query_mut::<(&Transform, &LandMovementControls, &mut Fuel)>() {
        for (transform, controls, fuel) in query {
            if transform.dirty {
                fuel.consume(controls.speed.abs());
            }
        }
    }
    if let Ok(query) = world.query_mut::<(&Transform, &ShipMovementControls, &mut Fuel)>() {
        for (transform, controls, fuel) in query {
            if transform.dirty {
                fuel.consume(controls.speed.abs());
            }
        }
    }
}

/// Queue every entity with no health left for despawning, along with the
/// rest of its vehicle.
pub fn wrecks(world: &mut World, commands: &mut CommandBuffer, _dt: f64) {
    let Ok(query) = world.query::<(EntityId, &Health)>() else {
        return;
    };
    let mut wrecked = BTreeSet::new();
    for (entity, health) in query {
        if health.current > 0.0 {
            continue;
        }
        match world.vehicle_of(entity) {
            Some(vehicle) => {
                if wrecked.insert(vehicle) {
                    debug!(%entity, %vehicle, "vehicle destroyed");
                    commands.despawn_vehicle(vehicle);
                }
            }
            None => {
                debug!(%entity, "entity destroyed");
                commands.despawn(entity);
            }
        }
    }
}
