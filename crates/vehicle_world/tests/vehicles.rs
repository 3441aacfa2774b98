//! Vehicle prototypes loaded from TOML and driven through the tick loop.

use std::sync::Arc;

use vehicle_component::{Component, ComponentRegistry, ComponentValues, EntityId};
use vehicle_components::{
    DVec3, Fuel, GunBarrel, Health, LandMovementControls, Seats, Steering, Transform,
};
use vehicle_world::{
    CommandBuffer, ConfigError, PrototypeRegistry, TickConfig, TickLoop, World, WorldError,
};

const PROTOTYPES: &str = r#"
[jeep]
name = "Jeep"

[jeep.transform]
[jeep.health]
max = 60.0

[jeep.fuel]
current = 20.0
max = 40.0

[jeep.seats]
count = 4
offsets = [[0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]]

[jeep.land_movement_controls]
speed_max_forward = 0.5

[mortar.transform]
[mortar.gun_barrel]
pitch_min = -5.0
pitch_max = 60.0
control_pitch = "wasd"
"#;

fn registry() -> Arc<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    vehicle_components::register_all(&mut registry).unwrap();
    Arc::new(registry)
}

fn prototypes(registry: &Arc<ComponentRegistry>) -> PrototypeRegistry {
    let mut prototypes = PrototypeRegistry::new(Arc::clone(registry));
    assert_eq!(prototypes.load_toml_str(PROTOTYPES).unwrap(), 2);
    prototypes
}

#[test]
fn test_load_vehicle_prototypes() {
    let registry = registry();
    let prototypes = prototypes(&registry);

    let jeep = prototypes.get("jeep").unwrap();
    assert_eq!(jeep.signature().len(), 5);
    assert_eq!(jeep.defaults().get_as::<Health>(), Some(&Health::full(60.0)));
    assert_eq!(jeep.defaults().get_as::<Fuel>(), Some(&Fuel::new(20.0, 40.0)));
    let controls = jeep.defaults().get_as::<LandMovementControls>().unwrap();
    assert_eq!(controls.speed_max_forward, 0.5);
    assert_eq!(controls.acceleration, 0.05);

    let mortar = prototypes.get("mortar").unwrap();
    let barrel = mortar.defaults().get_as::<GunBarrel>().unwrap();
    assert_eq!(barrel.pitch_max, 60.0);
    assert_eq!(barrel.barrel_offset, DVec3::new(0.0, 1.0, 0.0));
}

#[test]
fn test_health_without_max_is_missing_field() {
    let registry = registry();
    let mut prototypes = PrototypeRegistry::new(registry);
    let err = prototypes
        .load_toml_str("[tank.health]\ncurrent = 10.0\n")
        .unwrap_err();
    match err {
        WorldError::Config(ConfigError::MissingField { component, field }) => {
            assert_eq!(component, "health");
            assert_eq!(field, "max");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_drive_jeeps_through_tick_loop() {
    let registry = registry();
    let prototypes = prototypes(&registry);
    let mut world = World::new(Arc::clone(&registry));
    let driven = prototypes
        .spawn(
            &mut world,
            "jeep",
            ComponentValues::new().with(Transform::from_position(DVec3::new(0.0, 64.0, 0.0))),
        )
        .unwrap();
    let parked = prototypes
        .spawn(&mut world, "jeep", ComponentValues::new())
        .unwrap();

    let mut tick_loop = TickLoop::new(TickConfig::default(), world, prototypes);
    tick_loop.add_system("drive", move |world, _, _| {
        for (entity, transform, controls, fuel) in world
            .query_mut::<(EntityId, &mut Transform, &mut LandMovementControls, &mut Fuel)>()
            .unwrap()
        {
            let throttle = if entity == driven && !fuel.is_empty() { 1.0 } else { 0.0 };
            let (distance, yaw) = controls.step(Steering { throttle, turn: 0.0 });
            transform.turn(yaw);
            transform.advance(distance);
            fuel.consume(distance.abs());
        }
    });
    tick_loop.add_system("wreck", |world, commands, _| {
        for (entity, health) in world.query::<(EntityId, &Health)>().unwrap() {
            if health.current <= 0.0 {
                commands.despawn(entity);
            }
        }
    });

    for _ in 0..10 {
        tick_loop.tick(0.05);
    }

    let world = tick_loop.world();
    let moved = world.get::<Transform>(driven).unwrap();
    assert!(moved.position.z > 2.0);
    assert!(world.get::<Fuel>(driven).unwrap().current < 20.0);
    assert_eq!(world.get::<Transform>(parked).unwrap().position, DVec3::ZERO);

    // Wreck one jeep; it is removed at the end of the next tick.
    tick_loop.world_mut().get_mut::<Health>(parked).unwrap().damage(1000.0);
    tick_loop.tick(0.05);
    assert!(!tick_loop.world().is_alive(parked));
    assert!(tick_loop.world().is_alive(driven));
}

#[test]
fn test_seat_positions_follow_transform() {
    let registry = registry();
    let prototypes = prototypes(&registry);
    let mut world = World::new(registry);
    let jeep = prototypes
        .spawn(
            &mut world,
            "jeep",
            ComponentValues::new().with(Transform::from_position(DVec3::new(10.0, 0.0, 10.0))),
        )
        .unwrap();

    let (transform, seats) = world
        .query::<(&Transform, &Seats)>()
        .unwrap()
        .next()
        .unwrap();
    assert_eq!(
        seats.seat_position(0, transform),
        Some(DVec3::new(10.5, 0.5, 10.5))
    );
    assert!(world.has(jeep, Seats::kind()));
}

const TANK: &str = r#"
name = "tank"

[[elements]]
name = "hull"
[elements.transform]
[elements.health]
max = 300.0

[[elements]]
name = "gun"
parent = "turret"
[elements.gun_barrel]
pitch_max = 25.0

[[elements]]
name = "turret"
parent = "hull"
[elements.transform]
offset = [0.0, 1.4, 0.0]
[elements.health]
max = 150.0
"#;

#[test]
fn test_multi_element_vehicle_spawns_linked_and_despawns_whole() {
    let registry = registry();
    let mut prototypes = PrototypeRegistry::new(Arc::clone(&registry));
    assert_eq!(prototypes.load_toml_str(TANK).unwrap(), 1);
    let mut world = World::new(registry);
    world
        .spawn(ComponentValues::new().with(Health::full(10.0)))
        .unwrap();

    let mut commands = CommandBuffer::new();
    commands.spawn_vehicle("tank", ComponentValues::new());
    let report = world.apply(&mut commands, &prototypes);
    assert!(report.is_clean());
    assert_eq!(world.entity_count(), 4);

    let tank = report.vehicles[0];
    let vehicle = world.vehicle(tank).unwrap();
    let names: Vec<&str> = vehicle.elements().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["hull", "turret", "gun"]);
    let hull = vehicle.element("hull").unwrap();
    let turret = vehicle.element("turret").unwrap();
    let gun = vehicle.element("gun").unwrap();
    assert_eq!(vehicle.parent(turret), Some(hull));
    assert_eq!(vehicle.parent(gun), Some(turret));
    assert_eq!(vehicle.children(hull), vec![turret]);
    assert_eq!(world.get::<Health>(turret).unwrap(), &Health::full(150.0));
    assert_eq!(world.get::<GunBarrel>(gun).unwrap().pitch_max, 25.0);
    assert_eq!(world.vehicle_of(gun), Some(tank));

    commands.despawn_vehicle(tank);
    let report = world.apply(&mut commands, &prototypes);
    assert_eq!(report.applied, 1);
    for entity in [hull, turret, gun] {
        assert!(!world.is_alive(entity));
    }
    assert_eq!(world.entity_count(), 1);
    assert!(matches!(world.vehicle(tank), Err(WorldError::StaleVehicle(_))));
}

#[test]
fn test_out_of_range_health_survives_snapshot() {
    let registry = registry();
    let mut world = World::new(Arc::clone(&registry));
    let id = world
        .spawn(ComponentValues::new().with(Health::full(100.0)))
        .unwrap();
    world.get_mut::<Health>(id).unwrap().current = 150.0;

    let snapshot = world.snapshot(1).unwrap();
    let mut restored = World::new(registry);
    assert_eq!(restored.restore(&snapshot).restored, 1);
    let health = restored.query::<&Health>().unwrap().next().unwrap();
    assert_eq!(health.current.to_bits(), 150.0f64.to_bits());
    assert_eq!(health.max, 100.0);
}
