use rigidcore::*;

fn main() -> PhysicsResult<()> {
    let materials = MaterialRegistry::new(MaterialTable::with_default_material());
    let rubber = materials.register(Material::rubber(MaterialId(1)))?;
    let world = PhysicsWorld::new(SimulationConfig::default(), materials)?;
    let mut engine = PhysicsEngine::new(world)
        .with_terrain(FlatTerrain::horizontal(0.0, MaterialId::DEFAULT))
        .with_max_steps_per_update(60);

    let ball = RigidBody::dynamic(
        Shape::sphere(0.5)?.with_material(rubber),
        Pose::from_position(Vec3::new(0.0, 3.0, 0.0)),
        engine.world().materials(),
    )?;
    let ball = engine.add_body(ball)?;

    let crate_box = RigidBody::dynamic(
        Shape::cuboid(Vec3::splat(0.4))?,
        Pose::from_position(Vec3::new(0.2, 5.0, 0.0)),
        engine.world().materials(),
    )?;
    let crate_box = engine.add_body(crate_box)?;

    for second in 0..4 {
        for report in engine.update(1.0) {
            for event in &report.events {
                println!("frame {}: {:?} {:?} / {:?}", report.metrics.frame, event.kind, event.a, event.b);
            }
        }
        for handle in [ball, crate_box] {
            if let Some(body) = engine.world().body(handle) {
                println!(
                    "t={}s {:?}: position {:?}, sleeping {}",
                    second + 1,
                    handle,
                    body.pose().position,
                    body.is_sleeping()
                );
            }
        }
    }
    Ok(())
}
