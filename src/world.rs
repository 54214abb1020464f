//! The simulation container and its per-step pipeline.

mod collision_manager;
mod dynamics_manager;
mod events;

use std::{
    collections::{BTreeSet, HashMap},
    time::{Duration, Instant},
};

use glam::Vec3;
use log::debug;

pub use collision_manager::CollisionManager;
pub use dynamics_manager::DynamicsManager;
pub use events::{CollisionEvent, ContactEventKind};

use crate::{
    collision::{
        broadphase::{BroadPhase, BroadPhaseProxy},
        cache::{CacheStats, PairKey},
        contact::{ContactManifold, ContactPoint, Feature, FeaturePair},
        narrowphase::{CollisionAgent, WarmStart},
        terrain::{Terrain, TerrainContact, TerrainSample},
    },
    config::SimulationConfig,
    core::{
        material::MaterialRegistry,
        rigidbody::RigidBody,
        shape::{ShapeFlags, ShapeGeometry},
    },
    dynamics::{
        integrator::Integrator,
        resolver::{ContactPair, ResolverMetrics, SolverBody},
    },
    error::{PhysicsError, PhysicsResult},
    utils::{
        logging::{warn_if_frame_budget_exceeded, ScopedTimer},
        Arena, BodyHandle,
    },
};
use events::ContactTracker;

/// Radius of the spheres sampled at polytope vertices for terrain queries.
const VERTEX_SAMPLE_RADIUS: f32 = 0.05;

/// Counters and stage timings for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepMetrics {
    pub frame: u64,
    pub candidate_pairs: usize,
    pub manifolds: usize,
    pub terrain_contacts: usize,
    pub woken_bodies: usize,
    pub sleeping_bodies: usize,
    pub evicted_cache_entries: usize,
    pub resolver: ResolverMetrics,
    pub broadphase_time: Duration,
    pub narrowphase_time: Duration,
    pub solver_time: Duration,
    pub integration_time: Duration,
    pub total_time: Duration,
}

/// Output of [`PhysicsWorld::step`].
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub events: Vec<CollisionEvent>,
    pub metrics: StepMetrics,
}

/// Central simulation container orchestrating all subsystems.
pub struct PhysicsWorld {
    config: SimulationConfig,
    materials: MaterialRegistry,
    bodies: Arena<RigidBody>,
    collision: CollisionManager,
    dynamics: DynamicsManager,
    contacts: ContactTracker,
    frame: u64,
}

impl PhysicsWorld {
    pub fn new(config: SimulationConfig, materials: MaterialRegistry) -> PhysicsResult<Self> {
        config.validate()?;
        Ok(Self {
            collision: CollisionManager::new(&config)?,
            dynamics: DynamicsManager::new(&config),
            config,
            materials,
            bodies: Arena::new(),
            contacts: ContactTracker::default(),
            frame: 0,
        })
    }

    /// Replaces the integrator, e.g. to install another gravity field.
    pub fn with_integrator(mut self, integrator: Integrator) -> Self {
        self.dynamics.integrator = integrator;
        self
    }

    pub fn with_broadphase<B: BroadPhase + 'static>(mut self, broadphase: B) -> Self {
        self.collision.broadphase = Box::new(broadphase);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn integrator(&self) -> &Integrator {
        &self.dynamics.integrator
    }

    pub fn integrator_mut(&mut self) -> &mut Integrator {
        &mut self.dynamics.integrator
    }

    pub fn dynamics_mut(&mut self) -> &mut DynamicsManager {
        &mut self.dynamics
    }

    pub fn broadphase_name(&self) -> &'static str {
        self.collision.broadphase.name()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.collision.cache_stats()
    }

    pub fn cached_pairs(&self) -> usize {
        self.collision.cache().len()
    }

    /// Number of completed steps.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn add_body(&mut self, mut body: RigidBody) -> PhysicsResult<BodyHandle> {
        if !self.materials.contains(body.shape().material()) {
            return Err(PhysicsError::MaterialIndexOutOfRange {
                index: body.shape().material().0,
                len: self.materials.read(|table| table.len()),
            });
        }
        body.update_world_aabb();
        let kind = body.kind();
        let handle = self.bodies.insert(body);
        debug!("added {kind:?} body {handle:?}");
        Ok(handle)
    }

    /// Removes the body and every cached pair, contact and force bound to it.
    /// The handle resolves to `None` afterwards.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let body = self.bodies.remove(handle)?;
        self.collision.forget_body(handle);
        self.contacts.forget_body(handle);
        self.dynamics.integrator.forces_mut().remove_body(handle);
        debug!("removed body {handle:?}");
        Some(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the pair touched in the last step.
    pub fn is_touching(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.contacts.is_touching(&PairKey::new(a, b))
    }

    /// Runs narrow-phase detection for two bodies at their current poses,
    /// outside the cache. Normals point from `a` to `b`.
    pub fn detect_pair(&self, a: BodyHandle, b: BodyHandle) -> PhysicsResult<ContactManifold> {
        let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
            return Err(PhysicsError::invalid(format!("unknown body handle in pair {a:?} / {b:?}")));
        };
        CollisionAgent::detect(
            body_a.shape(),
            body_a.pose(),
            body_b.shape(),
            body_b.pose(),
            &mut WarmStart::default(),
        )
    }

    /// Advances the simulation by `dt`.
    ///
    /// Forces are folded into momentum, candidate pairs are detected, contacts
    /// (body and terrain) are resolved, and poses advance with the resolved
    /// momentum. The step never fails: unsupported pairs and degenerate
    /// contacts are skipped.
    pub fn step(&mut self, terrain: &dyn Terrain, dt: f32) -> StepReport {
        debug_assert!(dt.is_finite() && dt > 0.0, "step needs a positive dt, got {dt}");
        let start = Instant::now();
        self.frame += 1;
        let frame = self.frame;
        let mut metrics = StepMetrics {
            frame,
            ..StepMetrics::default()
        };

        {
            let _timer = ScopedTimer::recording("integrator::momentum", &mut metrics.integration_time);
            let integrator = &self.dynamics.integrator;
            for (handle, body) in self.bodies.iter_mut() {
                integrator.integrate_momentum(handle, body, dt);
            }
        }

        let pairs = {
            let _timer = ScopedTimer::recording("broadphase", &mut metrics.broadphase_time);
            let proxies: Vec<BroadPhaseProxy> = self
                .bodies
                .iter()
                .map(|(handle, body)| BroadPhaseProxy {
                    handle,
                    aabb: *body.world_aabb(),
                    active: body.is_active(),
                })
                .collect();
            self.collision.broadphase.find_pairs(&proxies)
        };
        metrics.candidate_pairs = pairs.len();

        let touching = {
            let _timer = ScopedTimer::recording("narrowphase", &mut metrics.narrowphase_time);
            self.collision.narrow_phase(&self.bodies, &pairs, frame)
        };
        metrics.manifolds = touching.len();
        metrics.woken_bodies = self.wake_touched(&touching, frame);

        let corrections = {
            let _timer = ScopedTimer::recording("solver", &mut metrics.solver_time);
            let mut input = SolverInput::default();
            for (key, manifold) in &touching {
                self.add_pair_contact(&mut input, *key, manifold);
            }
            metrics.terrain_contacts = self.add_terrain_contacts(&mut input, terrain);

            metrics.resolver = self.dynamics.resolver.resolve(&mut input.bodies, &input.pairs);
            let mut corrections = HashMap::with_capacity(input.handles.len());
            for (handle, slot) in &input.handles {
                let solved = &input.bodies[*slot];
                if let Some(body) = self.bodies.get_mut(*handle) {
                    body.apply_momentum_delta(solved.momentum_delta());
                }
                corrections.insert(*handle, solved.correction());
            }
            corrections
        };

        {
            let _timer = ScopedTimer::recording("integrator::pose", &mut metrics.integration_time);
            let integrator = &self.dynamics.integrator;
            let config = &self.config;
            for (handle, body) in self.bodies.iter_mut() {
                let correction = corrections.get(&handle).copied().unwrap_or(Vec3::ZERO);
                integrator.integrate_pose(body, correction, dt);
                if body.track_rest(
                    config.sleep_linear_threshold,
                    config.sleep_angular_threshold,
                    config.sleep_frames,
                ) {
                    debug!("body {handle:?} fell asleep at frame {frame}");
                }
            }
        }
        metrics.sleeping_bodies = self.bodies.iter().filter(|(_, body)| body.is_sleeping()).count();

        let current: BTreeSet<PairKey> = touching.iter().map(|(key, _)| *key).collect();
        let bodies = &self.bodies;
        let events = self.contacts.update(current, |key| {
            match (bodies.get(key.low()), bodies.get(key.high())) {
                (Some(a), Some(b)) => !a.is_active() && !b.is_active(),
                _ => false,
            }
        });

        metrics.evicted_cache_entries = self.collision.evict(frame);
        metrics.total_time = start.elapsed();
        warn_if_frame_budget_exceeded(metrics.total_time, dt * 1000.0);

        StepReport { events, metrics }
    }

    /// Wakes sleepers touched by a body that is moving, and stamps every
    /// touching body with `frame`. Returns how many bodies woke.
    fn wake_touched(&mut self, touching: &[(PairKey, ContactManifold)], frame: u64) -> usize {
        let mut woken = 0;
        for (key, _) in touching {
            let moving = |handle: BodyHandle| {
                self.bodies.get(handle).is_some_and(|body| {
                    body.is_active() && (!body.is_dynamic() || body.sleep_state().resting_frames == 0)
                })
            };
            let (low_moving, high_moving) = (moving(key.low()), moving(key.high()));
            for (handle, other_moving) in [(key.low(), high_moving), (key.high(), low_moving)] {
                if let Some(body) = self.bodies.get_mut(handle) {
                    if body.is_sleeping() && other_moving {
                        body.wake();
                        woken += 1;
                        debug!("body {handle:?} woken by contact at frame {frame}");
                    }
                    body.touch(frame);
                }
            }
        }
        woken
    }

    fn add_pair_contact(&self, input: &mut SolverInput, key: PairKey, manifold: &ContactManifold) {
        let (Some(a), Some(b)) = (self.bodies.get(key.low()), self.bodies.get(key.high())) else {
            return;
        };
        if a.shape().flags().contains(ShapeFlags::SENSOR) || b.shape().flags().contains(ShapeFlags::SENSOR) {
            return;
        }
        if a.has_infinite_mass() && b.has_infinite_mass() {
            return;
        }
        let materials = match self.materials.pair(a.shape().material(), b.shape().material()) {
            Ok(materials) => materials,
            Err(err) => {
                debug!("skipping contact {key:?}: {err}");
                return;
            }
        };
        let pair = ContactPair {
            a: input.slot(key.low(), a),
            b: input.slot(key.high(), b),
            manifold: *manifold,
            materials,
        };
        input.pairs.push(pair);
    }

    /// Queries the terrain for every awake dynamic body and adds one manifold
    /// per body. Returns the number of terrain contact points.
    fn add_terrain_contacts(&self, input: &mut SolverInput, terrain: &dyn Terrain) -> usize {
        let mut total = 0;
        let mut samples = Vec::new();
        let mut hits: Vec<TerrainContact> = Vec::new();
        for (handle, body) in self.bodies.iter() {
            let flags = body.shape().flags();
            if !body.is_dynamic()
                || body.is_sleeping()
                || flags.contains(ShapeFlags::NO_TERRAIN)
                || flags.contains(ShapeFlags::SENSOR)
            {
                continue;
            }

            samples.clear();
            terrain_samples(body, &mut samples);
            hits.clear();
            terrain.collide_spheres(&samples, &mut |contact| {
                hits.push(contact);
                true
            });
            let Some(deepest) = hits.iter().max_by(|x, y| x.depth.total_cmp(&y.depth)).copied() else {
                continue;
            };

            let points: Vec<ContactPoint> = hits
                .iter()
                .map(|hit| {
                    ContactPoint::new(
                        hit.point - hit.normal * (0.5 * hit.depth),
                        hit.normal,
                        hit.depth,
                        FeaturePair::new(Feature::Face(0), Feature::Vertex(hit.sample as u16)),
                    )
                })
                .collect();
            let manifold = ContactManifold::from_candidates(deepest.normal, &points);
            let materials = match self.materials.pair(deepest.material, body.shape().material()) {
                Ok(materials) => materials,
                Err(err) => {
                    debug!("skipping terrain contact for {handle:?}: {err}");
                    continue;
                }
            };

            total += hits.len();
            let ground = input.terrain_slot();
            let slot = input.slot(handle, body);
            input.pairs.push(ContactPair {
                a: ground,
                b: slot,
                manifold,
                materials,
            });
        }
        total
    }
}

/// Spheres standing in for the body's shape in terrain queries.
fn terrain_samples(body: &RigidBody, samples: &mut Vec<TerrainSample>) {
    let pose = body.shape_pose();
    match body.shape().geometry() {
        ShapeGeometry::Sphere { radius } => samples.push(TerrainSample::new(pose.position, *radius)),
        ShapeGeometry::Capsule {
            radius,
            half_height,
        } => {
            for end in [Vec3::Y * *half_height, Vec3::NEG_Y * *half_height] {
                samples.push(TerrainSample::new(pose.transform_point(end), *radius));
            }
        }
        ShapeGeometry::Box { .. } | ShapeGeometry::Polyhedron(_) => {
            let Some(hull) = body.shape().hull() else {
                return;
            };
            let center = pose.transform_point(hull.centroid());
            for vertex in hull.vertices() {
                let corner = pose.transform_point(*vertex);
                // Pull the sample inward so its surface touches the corner.
                let inward = (center - corner).normalize_or_zero() * VERTEX_SAMPLE_RADIUS;
                samples.push(TerrainSample::new(corner + inward, VERTEX_SAMPLE_RADIUS));
            }
        }
        ShapeGeometry::Plane { .. } => {}
    }
}

/// Solver scratch slots for the bodies taking part in this step's contacts.
#[derive(Default)]
struct SolverInput {
    bodies: Vec<SolverBody>,
    handles: HashMap<BodyHandle, usize>,
    pairs: Vec<ContactPair>,
    terrain: Option<usize>,
}

impl SolverInput {
    /// Sleeping bodies that were not woken stay put.
    fn slot(&mut self, handle: BodyHandle, body: &RigidBody) -> usize {
        if let Some(slot) = self.handles.get(&handle) {
            return *slot;
        }
        let solver_body = if body.is_sleeping() {
            SolverBody::fixed(body.center_of_mass())
        } else {
            SolverBody::new(body)
        };
        self.bodies.push(solver_body);
        let slot = self.bodies.len() - 1;
        self.handles.insert(handle, slot);
        slot
    }

    fn terrain_slot(&mut self) -> usize {
        if let Some(slot) = self.terrain {
            return slot;
        }
        self.bodies.push(SolverBody::fixed(Vec3::ZERO));
        let slot = self.bodies.len() - 1;
        self.terrain = Some(slot);
        slot
    }
}
