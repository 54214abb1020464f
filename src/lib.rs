//! Rigidcore – a rigid-body collision and impulse core for Rust.
//!
//! Shapes, materials and bodies are built fallibly up front; the world then
//! steps them through broad phase, cached narrow-phase dispatch, sequential
//! impulse resolution and semi-implicit integration, with terrain supplied
//! by the caller through the [`Terrain`] trait.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    BroadPhase, CollisionAgent, CollisionCache, ContactManifold, ContactPoint, FlatTerrain,
    HeightFieldTerrain, NoTerrain, PairKey, SweepAndPrune, Terrain, TerrainContact,
    TerrainSample, TerrainTriangle, TriangleSoupTerrain, UniformGrid, WarmStart,
};
pub use config::SimulationConfig;
pub use core::{
    material::{
        CombinePolicy, Material, MaterialId, MaterialPair, MaterialRegistry, MaterialTable,
        MixingMode,
    },
    rigidbody::{BodyKind, RigidBody},
    shape::{Shape, ShapeFlags, ShapeKind},
    types::{Aabb, MassProperties, Pose},
};
pub use dynamics::{
    DragForce, ForceGenerator, ForceRegistry, GravityField, ImpulseResolver, Integrator,
    RadialGravity, SpringForce, UniformGravity,
};
pub use error::{PhysicsError, PhysicsResult};
pub use utils::{BodyHandle, SpatialVec};
pub use world::{CollisionEvent, ContactEventKind, PhysicsWorld, StepMetrics, StepReport};

/// High-level convenience wrapper that owns a [`PhysicsWorld`] and its
/// terrain, and turns variable frame times into fixed steps.
pub struct PhysicsEngine {
    world: PhysicsWorld,
    terrain: Box<dyn Terrain>,
    accumulator: f32,
    max_steps_per_update: u32,
}

impl PhysicsEngine {
    pub fn new(world: PhysicsWorld) -> Self {
        Self {
            world,
            terrain: Box::new(NoTerrain),
            accumulator: 0.0,
            max_steps_per_update: 8,
        }
    }

    pub fn with_terrain<T: Terrain + 'static>(mut self, terrain: T) -> Self {
        self.terrain = Box::new(terrain);
        self
    }

    /// Caps the steps run by one [`PhysicsEngine::update`]; leftover time is dropped.
    pub fn with_max_steps_per_update(mut self, steps: u32) -> Self {
        self.max_steps_per_update = steps.max(1);
        self
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    /// Adds a rigid body to the world and returns its handle.
    pub fn add_body(&mut self, body: RigidBody) -> PhysicsResult<BodyHandle> {
        self.world.add_body(body)
    }

    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        self.world.remove_body(handle)
    }

    /// Advances by `frame_time` seconds of wall time using fixed steps of
    /// the configured timestep. Returns one report per step taken.
    pub fn update(&mut self, frame_time: f32) -> Vec<StepReport> {
        let step = self.world.config().time_step;
        if frame_time.is_finite() && frame_time > 0.0 {
            self.accumulator += frame_time;
        }

        let mut reports = Vec::new();
        while self.accumulator >= step {
            if reports.len() as u32 == self.max_steps_per_update {
                log::warn!(
                    "physics fell behind; dropping {:.3} s of simulation time",
                    self.accumulator
                );
                self.accumulator = 0.0;
                break;
            }
            self.accumulator -= step;
            reports.push(self.world.step(self.terrain.as_ref(), step));
        }
        reports
    }

    /// Fraction of a step left in the accumulator, for render interpolation.
    pub fn interpolation_alpha(&self) -> f32 {
        self.accumulator / self.world.config().time_step
    }
}
