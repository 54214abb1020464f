use approx::{assert_abs_diff_eq, assert_relative_eq};
use rigidcore::{
    BodyHandle, CollisionAgent, ContactEventKind, FlatTerrain, HeightFieldTerrain, ImpulseResolver,
    Material, MaterialId, MaterialPair, MaterialRegistry, MaterialTable, NoTerrain, PhysicsError,
    PhysicsWorld, Pose, RigidBody, Shape, ShapeFlags, SimulationConfig, Vec3, WarmStart,
};

const DT: f32 = 1.0 / 60.0;

fn registry() -> MaterialRegistry {
    MaterialRegistry::new(MaterialTable::with_default_material())
}

fn world_with(config: SimulationConfig, materials: MaterialRegistry) -> PhysicsWorld {
    PhysicsWorld::new(config, materials).unwrap()
}

/// Registers a frictionless material with the given normal elasticity as id 1.
fn bouncy(materials: &MaterialRegistry, elasticity: f32) -> MaterialId {
    let material = Material::builder(MaterialId(1))
        .friction(0.0, 0.0)
        .rolling_friction(0.0)
        .elasticity(elasticity, 0.0, 0.0)
        .build()
        .unwrap();
    materials.register(material).unwrap()
}

fn ground(world: &mut PhysicsWorld, material: MaterialId) -> BodyHandle {
    let plane = Shape::plane(Vec3::Y, 0.0).unwrap().with_material(material);
    let body = RigidBody::fixed(plane, Pose::IDENTITY, world.materials()).unwrap();
    world.add_body(body).unwrap()
}

fn slab(world: &mut PhysicsWorld) -> BodyHandle {
    let shape = Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)).unwrap();
    let body = RigidBody::fixed(shape, Pose::from_position(Vec3::new(0.0, -0.5, 0.0)), world.materials())
        .unwrap();
    world.add_body(body).unwrap()
}

fn ball(world: &PhysicsWorld, radius: f32, position: Vec3, material: MaterialId) -> RigidBody {
    let shape = Shape::sphere(radius).unwrap().with_material(material);
    RigidBody::dynamic(shape, Pose::from_position(position), world.materials())
        .unwrap()
        .with_damping(0.0, 0.0)
}

fn zero_damping(config: SimulationConfig) -> SimulationConfig {
    SimulationConfig {
        linear_damping: 0.0,
        angular_damping: 0.0,
        ..config
    }
}

#[test]
fn test_energy_is_lost_below_unit_elasticity() {
    for (elasticity, lossless) in [(1.0, true), (0.3, false)] {
        let materials = registry();
        let mut world = world_with(zero_damping(SimulationConfig::zero_gravity()), materials.clone());
        let material = bouncy(&materials, elasticity);
        ground(&mut world, material);
        let body = ball(&world, 0.5, Vec3::new(0.0, 1.0, 0.0), material)
            .with_velocity(Vec3::new(0.0, -5.0, 0.0), Vec3::ZERO);
        let handle = world.add_body(body).unwrap();

        let before = world.body(handle).unwrap().kinetic_energy();
        for _ in 0..30 {
            world.step(&NoTerrain, DT);
        }
        let body = world.body(handle).unwrap();
        assert!(body.linear_velocity().y > 0.0, "ball should have bounced");

        let after = body.kinetic_energy();
        if lossless {
            assert_relative_eq!(after, before, max_relative = 1e-4);
        } else {
            assert!(after < before * 0.5, "elasticity {elasticity}: {after} vs {before}");
        }
    }
}

#[test]
fn test_restitution_scales_the_approach_speed() {
    let gravity = SimulationConfig::default().gravity.y.abs();
    for drop_height in [3.0, 6.0] {
        let materials = registry();
        let mut world = world_with(zero_damping(SimulationConfig::default()), materials.clone());
        let material = bouncy(&materials, 0.5);
        ground(&mut world, material);

        // Unit radius at density 3 / (4 pi) weighs exactly one.
        let density = 3.0 / (4.0 * std::f32::consts::PI);
        let unit = Material::builder(MaterialId(2))
            .density(density)
            .friction(0.0, 0.0)
            .rolling_friction(0.0)
            .elasticity(0.5, 0.0, 0.0)
            .build()
            .unwrap();
        let unit = materials.register(unit).unwrap();
        let body = ball(&world, 1.0, Vec3::new(0.0, drop_height, 0.0), unit);
        assert_relative_eq!(body.mass(), 1.0, max_relative = 1e-5);
        let handle = world.add_body(body).unwrap();

        let mut bounce = None;
        for _ in 0..600 {
            let before = world.body(handle).unwrap().linear_velocity().y;
            world.step(&NoTerrain, DT);
            let after = world.body(handle).unwrap().linear_velocity().y;
            if after > 0.0 {
                bounce = Some((before, after));
                break;
            }
        }
        let (before, after) = bounce.expect("ball never bounced");
        // The step adds gravity before resolving, so the approach speed
        // includes one more g * dt.
        let approach = before.abs() + gravity * DT;
        assert_relative_eq!(after, 0.5 * approach, max_relative = 1e-3);
    }
}

#[test]
fn test_slow_impacts_still_bounce() {
    for speed in [4.0, 0.4, 0.1] {
        let materials = registry();
        let mut world = world_with(zero_damping(SimulationConfig::zero_gravity()), materials.clone());
        let material = bouncy(&materials, 0.5);
        ground(&mut world, material);
        let body = ball(&world, 0.5, Vec3::new(0.0, 0.499, 0.0), material)
            .with_velocity(Vec3::new(0.0, -speed, 0.0), Vec3::ZERO);
        let handle = world.add_body(body).unwrap();

        world.step(&NoTerrain, DT);
        let rebound = world.body(handle).unwrap().linear_velocity().y;
        assert_relative_eq!(rebound, 0.5 * speed, max_relative = 1e-4);
    }
}

#[test]
fn test_huge_static_box_steps_normally() {
    let mut world = world_with(SimulationConfig::zero_gravity(), registry());
    let huge = RigidBody::fixed(Shape::cuboid(Vec3::splat(1.0e7)).unwrap(), Pose::IDENTITY, world.materials())
        .unwrap();
    world.add_body(huge).unwrap();
    let inside = ball(&world, 0.5, Vec3::new(3.0, 2.0, 1.0), MaterialId::DEFAULT);
    world.add_body(inside).unwrap();
    let outside = ball(&world, 0.5, Vec3::new(3.0e7, 0.0, 0.0), MaterialId::DEFAULT);
    world.add_body(outside).unwrap();

    let report = world.step(&NoTerrain, DT);
    assert_eq!(report.metrics.candidate_pairs, 1);
    assert_eq!(report.metrics.manifolds, 1);
}

fn box_on_slab(velocity: Vec3) -> (RigidBody, RigidBody, rigidcore::ContactManifold) {
    let materials = registry();
    let slab = RigidBody::fixed(
        Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)).unwrap(),
        Pose::from_position(Vec3::new(0.0, -0.5, 0.0)),
        &materials,
    )
    .unwrap();
    let body = RigidBody::dynamic(
        Shape::cuboid(Vec3::splat(0.5)).unwrap(),
        Pose::from_position(Vec3::new(0.0, 0.499, 0.0)),
        &materials,
    )
    .unwrap()
    .with_velocity(velocity, Vec3::ZERO);
    let manifold = CollisionAgent::detect(
        slab.shape(),
        slab.pose(),
        body.shape(),
        body.pose(),
        &mut WarmStart::default(),
    )
    .unwrap();
    assert_eq!(manifold.len(), 4);
    assert_abs_diff_eq!(manifold.normal().y, 1.0, epsilon = 1e-5);
    (slab, body, manifold)
}

fn friction(static_friction: f32, dynamic_friction: f32) -> MaterialPair {
    MaterialPair {
        static_friction,
        dynamic_friction,
        ..MaterialPair::frictionless(0.0)
    }
}

#[test]
fn test_static_friction_holds_a_slow_box() {
    let (mut slab, mut body, manifold) = box_on_slab(Vec3::new(0.02, -0.2, 0.0));
    let resolver = ImpulseResolver {
        iterations: 20,
        ..ImpulseResolver::default()
    };
    resolver.resolve_pair(&mut slab, &mut body, &manifold, friction(0.9, 0.7));

    let velocity = body.linear_velocity();
    assert!(velocity.x.abs() < 5e-3, "box still slides at {}", velocity.x);
    assert!(velocity.y.abs() < 5e-3, "box still sinks at {}", velocity.y);
}

#[test]
fn test_dynamic_friction_bounds_the_sliding_impulse() {
    let (mut slab, mut body, manifold) = box_on_slab(Vec3::new(2.0, -0.2, 0.0));
    let resolver = ImpulseResolver {
        iterations: 20,
        ..ImpulseResolver::default()
    };
    let (metrics, ..) = resolver.resolve_pair(&mut slab, &mut body, &manifold, friction(0.5, 0.5));

    assert!(metrics.normal_impulse_sum > 0.0);
    assert_relative_eq!(
        metrics.tangent_impulse_sum,
        0.5 * metrics.normal_impulse_sum,
        max_relative = 1e-3
    );
    let slowdown = 2.0 - body.linear_velocity().x;
    assert!(slowdown > 0.05 && slowdown < 0.25, "slowdown {slowdown}");
    assert!(slowdown <= metrics.tangent_impulse_sum / body.mass() + 1e-4);
}

#[test]
fn test_force_work_matches_kinetic_energy_change() {
    let mut world = world_with(zero_damping(SimulationConfig::zero_gravity()), registry());
    let body = ball(&world, 0.5, Vec3::ZERO, MaterialId::DEFAULT)
        .with_velocity(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO);
    let handle = world.add_body(body).unwrap();

    let force = Vec3::new(0.5, 0.0, 0.0);
    let before = world.body(handle).unwrap();
    let (energy_before, velocity) = (before.kinetic_energy(), before.linear_velocity());
    world.body_mut(handle).unwrap().apply_force(force);
    world.step(&NoTerrain, DT);

    let gained = world.body(handle).unwrap().kinetic_energy() - energy_before;
    assert_relative_eq!(gained, force.dot(velocity) * DT, max_relative = 1e-2);
}

#[test]
fn test_contact_events_begin_continue_end() {
    let materials = registry();
    let mut world = world_with(zero_damping(SimulationConfig::zero_gravity()), materials.clone());
    let sticky = Material::builder(MaterialId(1))
        .elasticity(0.0, 0.0, 0.0)
        .build()
        .unwrap();
    let sticky = materials.register(sticky).unwrap();
    let left = ball(&world, 0.5, Vec3::new(-1.0, 0.0, 0.0), sticky).with_velocity(Vec3::X, Vec3::ZERO);
    let left = world.add_body(left).unwrap();
    let right = ball(&world, 0.5, Vec3::new(1.0, 0.0, 0.0), sticky).with_velocity(Vec3::NEG_X, Vec3::ZERO);
    let right = world.add_body(right).unwrap();

    let kind_of = |world: &mut PhysicsWorld| {
        let report = world.step(&NoTerrain, DT);
        assert!(report.events.len() <= 1);
        report.events.first().map(|event| {
            assert_eq!((event.a, event.b), (left, right));
            event.kind
        })
    };

    let mut began = false;
    for _ in 0..60 {
        if let Some(kind) = kind_of(&mut world) {
            assert_eq!(kind, ContactEventKind::Begin);
            began = true;
            break;
        }
    }
    assert!(began, "spheres never met");

    for _ in 0..5 {
        assert_eq!(kind_of(&mut world), Some(ContactEventKind::Continue));
        assert!(world.is_touching(left, right));
    }

    world.body_mut(left).unwrap().set_velocity(Vec3::new(-2.0, 0.0, 0.0), Vec3::ZERO);
    world.body_mut(right).unwrap().set_velocity(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
    let mut ended = false;
    for _ in 0..10 {
        match kind_of(&mut world) {
            Some(ContactEventKind::End) => {
                ended = true;
                break;
            }
            Some(ContactEventKind::Continue) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(ended, "separation never reported");
    assert!(!world.is_touching(left, right));
    assert_eq!(kind_of(&mut world), None);
}

#[test]
fn test_resting_body_sleeps_and_is_woken_by_impact() {
    let config = SimulationConfig {
        sleep_frames: 10,
        ..SimulationConfig::default()
    };
    let mut world = world_with(config, registry());
    slab(&mut world);
    let resting = ball(&world, 0.5, Vec3::new(0.0, 0.499, 0.0), MaterialId::DEFAULT);
    let resting = world.add_body(resting).unwrap();

    let mut slept = false;
    for _ in 0..300 {
        world.step(&NoTerrain, DT);
        if world.body(resting).unwrap().is_sleeping() {
            slept = true;
            break;
        }
    }
    assert!(slept, "ball never fell asleep");
    let height = world.body(resting).unwrap().pose().position.y;
    assert_abs_diff_eq!(height, 0.5, epsilon = 0.05);

    // Sleepers stay put while nothing touches them.
    for _ in 0..10 {
        world.step(&NoTerrain, DT);
    }
    assert!(world.body(resting).unwrap().is_sleeping());
    assert_eq!(world.body(resting).unwrap().pose().position.y, height);

    let falling = ball(&world, 0.5, Vec3::new(0.2, 2.0, 0.0), MaterialId::DEFAULT);
    world.add_body(falling).unwrap();
    let mut woken = false;
    for _ in 0..120 {
        let report = world.step(&NoTerrain, DT);
        if report.metrics.woken_bodies > 0 {
            woken = true;
            break;
        }
    }
    assert!(woken, "impact did not wake the sleeper");
    assert!(!world.body(resting).unwrap().is_sleeping());
}

#[test]
fn test_removed_handles_stay_invalid() {
    let mut world = world_with(SimulationConfig::zero_gravity(), registry());
    let first = world
        .add_body(ball(&world, 0.5, Vec3::ZERO, MaterialId::DEFAULT))
        .unwrap();
    let neighbour = world
        .add_body(ball(&world, 0.5, Vec3::new(0.8, 0.0, 0.0), MaterialId::DEFAULT))
        .unwrap();
    world.step(&NoTerrain, DT);
    assert!(world.is_touching(first, neighbour));

    assert!(world.remove_body(first).is_some());
    assert!(world.body(first).is_none());
    assert!(world.remove_body(first).is_none());
    assert!(!world.is_touching(first, neighbour));
    assert!(matches!(
        world.detect_pair(first, neighbour),
        Err(PhysicsError::InvalidSettings { .. })
    ));

    let reused = world
        .add_body(ball(&world, 0.5, Vec3::new(5.0, 0.0, 0.0), MaterialId::DEFAULT))
        .unwrap();
    assert_eq!(reused.index(), first.index());
    assert_ne!(reused, first);
    assert!(world.body(first).is_none());
    assert!(world.body(reused).is_some());

    let report = world.step(&NoTerrain, DT);
    assert!(report.events.is_empty());
}

#[test]
fn test_unsupported_pairs_do_not_stop_the_step() {
    let mut world = world_with(SimulationConfig::zero_gravity(), registry());
    let capsule = RigidBody::dynamic(Shape::capsule(0.5, 0.5).unwrap(), Pose::IDENTITY, world.materials())
        .unwrap();
    let boxed = RigidBody::dynamic(
        Shape::cuboid(Vec3::splat(0.5)).unwrap(),
        Pose::from_position(Vec3::new(0.6, 0.0, 0.0)),
        world.materials(),
    )
    .unwrap();
    let capsule = world.add_body(capsule).unwrap();
    let boxed = world.add_body(boxed).unwrap();

    for _ in 0..3 {
        let report = world.step(&NoTerrain, DT);
        assert_eq!(report.metrics.candidate_pairs, 1);
        assert_eq!(report.metrics.manifolds, 0);
        assert!(report.events.is_empty());
    }
    assert!(matches!(
        world.detect_pair(capsule, boxed),
        Err(PhysicsError::UnsupportedShapePair { .. })
    ));
}

#[test]
fn test_box_settles_on_flat_terrain() {
    let mut world = world_with(SimulationConfig::default(), registry());
    let body = RigidBody::dynamic(
        Shape::cuboid(Vec3::splat(0.5)).unwrap(),
        Pose::from_position(Vec3::new(0.0, 1.0, 0.0)),
        world.materials(),
    )
    .unwrap();
    let handle = world.add_body(body).unwrap();
    let terrain = FlatTerrain::horizontal(0.0, MaterialId::DEFAULT);

    let mut touched = false;
    for _ in 0..240 {
        touched |= world.step(&terrain, DT).metrics.terrain_contacts > 0;
    }
    assert!(touched);
    let body = world.body(handle).unwrap();
    assert_abs_diff_eq!(body.pose().position.y, 0.5, epsilon = 0.05);
    assert!(body.linear_velocity().length() < 0.1);
}

#[test]
fn test_height_field_supports_and_flags_opt_out() {
    let mut world = world_with(SimulationConfig::default(), registry());
    let supported = world
        .add_body(ball(&world, 0.5, Vec3::new(0.0, 2.0, 0.0), MaterialId::DEFAULT))
        .unwrap();
    let ghost = RigidBody::dynamic(
        Shape::sphere(0.5).unwrap().with_flags(ShapeFlags::NO_TERRAIN),
        Pose::from_position(Vec3::new(10.0, 2.0, 0.0)),
        world.materials(),
    )
    .unwrap();
    let ghost = world.add_body(ghost).unwrap();
    let terrain = HeightFieldTerrain::new(|_x: f32, _z: f32| 1.0, MaterialId::DEFAULT);

    for _ in 0..180 {
        world.step(&terrain, DT);
    }
    assert_abs_diff_eq!(world.body(supported).unwrap().pose().position.y, 1.5, epsilon = 0.05);
    assert!(world.body(ghost).unwrap().pose().position.y < 0.0);
}

#[test]
fn test_config_round_trips_through_json() {
    let config = SimulationConfig {
        solver_iterations: 12,
        gravity: Vec3::new(0.0, -3.7, 0.0),
        ..SimulationConfig::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let parsed: SimulationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    let partial: SimulationConfig = serde_json::from_str(r#"{ "sleep_frames": 5 }"#).unwrap();
    assert_eq!(partial.sleep_frames, 5);
    assert_eq!(partial.time_step, SimulationConfig::default().time_step);

    let bad: SimulationConfig = serde_json::from_str(r#"{ "cache_capacity": 1000 }"#).unwrap();
    assert!(matches!(
        PhysicsWorld::new(bad, registry()),
        Err(PhysicsError::InvalidSettings { .. })
    ));
}
