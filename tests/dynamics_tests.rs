use approx::{assert_abs_diff_eq, assert_relative_eq};
use rigidcore::{
    BodyHandle, CombinePolicy, DragForce, ForceRegistry, HeightFieldTerrain, Integrator,
    MaterialId, MaterialRegistry, MaterialTable, MixingMode, NoTerrain, PhysicsEngine,
    PhysicsWorld, Pose, RadialGravity, RigidBody, Shape, SimulationConfig, SpatialVec,
    SpringForce, Terrain, TerrainSample, TerrainTriangle, TriangleSoupTerrain, UniformGravity,
    Vec3,
};

const DT: f32 = 1.0 / 60.0;

fn world(config: SimulationConfig) -> PhysicsWorld {
    PhysicsWorld::new(config, MaterialRegistry::new(MaterialTable::with_default_material())).unwrap()
}

fn add_ball(world: &mut PhysicsWorld, position: Vec3) -> BodyHandle {
    let body = RigidBody::dynamic(
        Shape::sphere(0.5).unwrap(),
        Pose::from_position(position),
        world.materials(),
    )
    .unwrap()
    .with_damping(0.0, 0.0);
    world.add_body(body).unwrap()
}

#[test]
fn test_radial_gravity_pulls_towards_its_center() {
    let mut world = world(SimulationConfig::zero_gravity())
        .with_integrator(Integrator::new(RadialGravity::new(Vec3::ZERO, 10.0)));
    let handle = add_ball(&mut world, Vec3::new(5.0, 0.0, 0.0));

    world.step(&NoTerrain, DT);
    let velocity = world.body(handle).unwrap().linear_velocity();
    assert_relative_eq!(velocity.x, -10.0 / 25.0 * DT, max_relative = 1e-4);
    assert_abs_diff_eq!(velocity.y, 0.0, epsilon = 1e-7);
}

#[test]
fn test_targeted_spring_moves_only_its_body() {
    let mut world = world(SimulationConfig::zero_gravity());
    let pulled = add_ball(&mut world, Vec3::ZERO);
    let bystander = add_ball(&mut world, Vec3::new(10.0, 0.0, 0.0));
    world.integrator_mut().forces_mut().add_force_to(
        pulled,
        SpringForce {
            anchor: Vec3::new(0.0, 2.0, 0.0),
            rest_length: 0.0,
            spring_constant: 5.0,
            damping: 0.0,
        },
    );

    world.step(&NoTerrain, DT);
    let pulled_body = world.body(pulled).unwrap();
    let expected = 5.0 * 2.0 / pulled_body.mass() * DT;
    assert_relative_eq!(pulled_body.linear_velocity().y, expected, max_relative = 1e-4);
    assert_eq!(world.body(bystander).unwrap().linear_velocity(), Vec3::ZERO);

    world.remove_body(pulled);
    assert!(world.integrator().forces().is_empty());
}

#[test]
fn test_drag_registered_up_front_slows_every_body() {
    let config = SimulationConfig::zero_gravity();
    let mut forces = ForceRegistry::new();
    forces.add_force(DragForce {
        drag_coefficient: 0.5,
    });
    let mut world = world(config).with_integrator(Integrator::from_config(&config).with_forces(forces));
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let handle = add_ball(&mut world, Vec3::new(i as f32 * 3.0, 0.0, 0.0));
            world.body_mut(handle).unwrap().set_velocity(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO);
            handle
        })
        .collect();

    for _ in 0..10 {
        world.step(&NoTerrain, DT);
    }
    for handle in handles {
        let speed = world.body(handle).unwrap().linear_velocity().z;
        assert!(speed > 0.0 && speed < 4.0, "speed {speed}");
    }
}

#[test]
fn test_gravity_can_be_scaled_and_replaced() {
    let mut world = world(SimulationConfig::default());
    let floating = RigidBody::dynamic(Shape::sphere(0.5).unwrap(), Pose::IDENTITY, world.materials())
        .unwrap()
        .with_gravity_scale(0.0);
    let floating = world.add_body(floating).unwrap();
    let falling = add_ball(&mut world, Vec3::new(5.0, 0.0, 0.0));

    world.step(&NoTerrain, DT);
    assert_eq!(world.body(floating).unwrap().linear_velocity(), Vec3::ZERO);
    assert!(world.body(falling).unwrap().linear_velocity().y < 0.0);

    world.integrator_mut().set_gravity(UniformGravity::new(Vec3::new(2.0, 0.0, 0.0)));
    let before = world.body(falling).unwrap().linear_velocity();
    world.step(&NoTerrain, DT);
    let after = world.body(falling).unwrap().linear_velocity();
    assert_relative_eq!(after.x - before.x, 2.0 * DT, max_relative = 1e-4);
    assert_eq!(after.y, before.y);
}

#[test]
fn test_torques_spin_bodies_and_are_consumed_by_the_step() {
    let mut world = world(SimulationConfig::zero_gravity());
    let spun = add_ball(&mut world, Vec3::ZERO);
    let pushed = add_ball(&mut world, Vec3::new(5.0, 0.0, 0.0));

    {
        let body = world.body_mut(spun).unwrap();
        body.apply_torque(Vec3::Y);
        assert_eq!(body.accumulated_torque(), Vec3::Y);
    }
    world
        .body_mut(pushed)
        .unwrap()
        .apply_force_at_point(Vec3::X, Vec3::new(5.0, 0.5, 0.0));

    world.step(&NoTerrain, DT);
    let spun = world.body(spun).unwrap();
    assert!(spun.angular_velocity().y > 0.0);
    assert_eq!(spun.accumulated_torque(), Vec3::ZERO);
    assert_eq!(spun.linear_velocity(), Vec3::ZERO);

    let pushed = world.body(pushed).unwrap();
    assert!(pushed.linear_velocity().x > 0.0);
    // Pushing above the centre along +X spins about -Z.
    assert!(pushed.angular_velocity().z < 0.0);
}

#[test]
fn test_setting_momentum_wakes_a_sleeper() {
    let mut world = world(SimulationConfig::zero_gravity());
    let handle = add_ball(&mut world, Vec3::ZERO);
    let body = world.body_mut(handle).unwrap();
    body.put_to_sleep();
    assert!(body.is_sleeping());

    body.set_momentum(SpatialVec::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)));
    assert!(!body.is_sleeping());
    world.step(&NoTerrain, DT);
    assert!(world.body(handle).unwrap().pose().position.z > 0.0);
}

#[test]
fn test_world_exposes_its_pipeline() {
    let mut world = world(SimulationConfig::zero_gravity());
    assert_eq!(world.broadphase_name(), "uniform-grid");
    world.dynamics_mut().resolver.iterations = 2;

    add_ball(&mut world, Vec3::ZERO);
    add_ball(&mut world, Vec3::new(0.9, 0.0, 0.0));
    world.step(&NoTerrain, DT);
    assert_eq!(world.cached_pairs(), 1);
    assert_eq!(world.cache_stats().misses, 1);

    let world = world.with_broadphase(rigidcore::SweepAndPrune::new());
    assert_eq!(world.broadphase_name(), "sweep-and-prune");

    let mut engine = PhysicsEngine::new(world);
    let late = RigidBody::dynamic(
        Shape::sphere(0.25).unwrap(),
        Pose::from_position(Vec3::new(0.0, 5.0, 0.0)),
        engine.world().materials(),
    )
    .unwrap();
    let late = engine.world_mut().add_body(late).unwrap();
    assert_eq!(engine.world().body_count(), 3);
    assert!(engine.world().body(late).is_some());
}

#[test]
fn test_height_field_slope_normal() {
    let terrain = HeightFieldTerrain::new(|x: f32, _z: f32| 0.5 * x, MaterialId::DEFAULT).with_step(0.1);
    let normal = terrain.normal_at(2.0, -1.0);
    let expected = Vec3::new(-0.5, 1.0, 0.0).normalize();
    assert_abs_diff_eq!(normal.x, expected.x, epsilon = 1e-4);
    assert_abs_diff_eq!(normal.y, expected.y, epsilon = 1e-4);
    assert_abs_diff_eq!(terrain.height_at(2.0, 7.0), 1.0, epsilon = 1e-6);
}

#[test]
fn test_triangle_soup_thickness_limits_deep_contacts() {
    let triangle = TerrainTriangle {
        vertices: [
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ],
        material: MaterialId::DEFAULT,
    };
    let sample = [TerrainSample::new(Vec3::new(0.0, -0.6, 0.0), 0.2)];
    let count = |terrain: &TriangleSoupTerrain| {
        let mut hits = 0;
        terrain.collide_spheres(&sample, &mut |_| {
            hits += 1;
            true
        });
        hits
    };

    let thin = TriangleSoupTerrain::new(vec![triangle], 1.0).unwrap();
    assert_eq!(count(&thin), 0);
    let thick = TriangleSoupTerrain::new(vec![triangle], 1.0).unwrap().with_thickness(1.0);
    assert_eq!(count(&thick), 1);
    assert_eq!(thick.triangles().len(), 1);
}

#[test]
fn test_combine_policy_is_configurable() {
    let policy = CombinePolicy {
        friction: MixingMode::Average,
        elasticity: MixingMode::Max,
    };
    let materials = MaterialRegistry::new(MaterialTable::with_default_material().with_policy(policy));
    let ice = materials.register(rigidcore::Material::ice(MaterialId(1))).unwrap();
    let rubber = materials.register(rigidcore::Material::rubber(MaterialId(2))).unwrap();

    let pair = materials.pair(ice, rubber).unwrap();
    assert_relative_eq!(pair.static_friction, 0.5 * (0.05 + 1.2), max_relative = 1e-6);
    assert_relative_eq!(pair.elasticity_normal, 0.8, max_relative = 1e-6);
}

#[test]
fn test_bounding_radius_encloses_the_shape() {
    let cuboid = Shape::cuboid(Vec3::new(1.0, 2.0, 2.0)).unwrap();
    assert_relative_eq!(cuboid.bounding_radius(), 3.0, max_relative = 1e-6);
    let capsule = Shape::capsule(0.5, 1.0).unwrap();
    assert_relative_eq!(capsule.bounding_radius(), 1.5, max_relative = 1e-6);
}
