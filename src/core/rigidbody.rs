use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    material::MaterialRegistry,
    shape::Shape,
    types::{Aabb, MassProperties, Pose},
};
use crate::{
    error::{PhysicsError, PhysicsResult},
    utils::{spatial::rotate_tensor, SpatialVec},
};

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyKind {
    /// Finite mass, moved by forces and impulses.
    Dynamic,
    /// Infinite mass, never moves.
    Static,
    /// Infinite mass, moved only by the caller through [`RigidBody::set_pose`].
    Kinematic,
}

/// Rest tracking used to put bodies to sleep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepState {
    pub asleep: bool,
    pub resting_frames: u32,
}

/// Rigid body owning exactly one [`Shape`]. Momentum is the primary dynamic
/// state; velocities are derived through the inverse mass and inertia.
#[derive(Debug, Clone)]
pub struct RigidBody {
    kind: BodyKind,
    pose: Pose,
    momentum: SpatialVec,
    force: Vec3,
    torque: Vec3,
    shape: Shape,
    mass_properties: MassProperties,
    inverse_mass: f32,
    inverse_inertia_local: Mat3,
    inverse_inertia_world: Mat3,
    local_aabb: Aabb,
    world_aabb: Aabb,
    sleep: SleepState,
    last_touched_frame: u64,
    /// `(linear, angular)` damping overriding the integrator's defaults.
    damping: Option<(f32, f32)>,
    pub gravity_scale: f32,
}

impl RigidBody {
    /// Builds a body around `shape`, deriving mass from the shape's material density.
    pub fn new(
        shape: Shape,
        kind: BodyKind,
        pose: Pose,
        materials: &MaterialRegistry,
    ) -> PhysicsResult<Self> {
        let material = materials.get(shape.material())?;
        if !pose.is_finite() {
            return Err(PhysicsError::invalid("body pose must be finite"));
        }

        let mass_properties = match kind {
            BodyKind::Dynamic => {
                if shape.is_unbounded() {
                    return Err(PhysicsError::invalid(
                        "unbounded shapes can only belong to static or kinematic bodies",
                    ));
                }
                shape.mass_properties(material.density())?
            }
            BodyKind::Static | BodyKind::Kinematic => MassProperties {
                center_of_mass: shape.transform().transform_point(shape.center_of_mass()),
                ..MassProperties::INFINITE
            },
        };

        let local_aabb = shape.local_aabb();
        let pose = Pose::new(pose.position, pose.rotation.normalize());
        let mut body = Self {
            kind,
            pose,
            momentum: SpatialVec::ZERO,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            shape,
            mass_properties,
            inverse_mass: mass_properties.inverse_mass(),
            inverse_inertia_local: mass_properties.inverse_inertia(),
            inverse_inertia_world: Mat3::ZERO,
            local_aabb,
            world_aabb: local_aabb.transformed(&pose),
            sleep: SleepState::default(),
            last_touched_frame: 0,
            damping: None,
            gravity_scale: 1.0,
        };
        body.update_world_inertia();
        Ok(body)
    }

    pub fn dynamic(shape: Shape, pose: Pose, materials: &MaterialRegistry) -> PhysicsResult<Self> {
        Self::new(shape, BodyKind::Dynamic, pose, materials)
    }

    pub fn fixed(shape: Shape, pose: Pose, materials: &MaterialRegistry) -> PhysicsResult<Self> {
        Self::new(shape, BodyKind::Static, pose, materials)
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Some((linear.max(0.0), angular.max(0.0)));
        self
    }

    pub fn damping(&self) -> Option<(f32, f32)> {
        self.damping
    }

    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.set_velocity(linear, angular);
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    /// Static and kinematic bodies: zero inverse mass and inertia.
    pub fn has_infinite_mass(&self) -> bool {
        self.kind != BodyKind::Dynamic
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Teleports the body. Kinematic bodies are driven this way.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = Pose::new(pose.position, pose.rotation.normalize());
        self.update_world_inertia();
        self.update_world_aabb();
        self.wake();
    }

    /// Pose of the shape in world space.
    pub fn shape_pose(&self) -> Pose {
        self.pose.combine(self.shape.transform())
    }

    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass_properties
    }

    pub fn mass(&self) -> f32 {
        self.mass_properties.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    pub fn inverse_inertia_world(&self) -> Mat3 {
        self.inverse_inertia_world
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.pose.transform_point(self.mass_properties.center_of_mass)
    }

    pub fn momentum(&self) -> SpatialVec {
        self.momentum
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.momentum.lin * self.inverse_mass
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.inverse_inertia_world * self.momentum.ang
    }

    /// Velocity of the material point at `point` (world space).
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.linear_velocity() + self.angular_velocity().cross(point - self.center_of_mass())
    }

    pub fn set_velocity(&mut self, linear: Vec3, angular: Vec3) {
        if self.has_infinite_mass() {
            return;
        }
        let rotation = self.pose.rotation_matrix();
        let inertia_world = rotate_tensor(rotation, self.mass_properties.inertia);
        self.momentum = SpatialVec::new(inertia_world * angular, linear * self.mass_properties.mass);
        self.wake();
    }

    pub fn set_momentum(&mut self, momentum: SpatialVec) {
        if self.has_infinite_mass() {
            return;
        }
        self.momentum = momentum;
        self.wake();
    }

    pub fn kinetic_energy(&self) -> f32 {
        if self.has_infinite_mass() {
            return 0.0;
        }
        0.5 * (self.linear_velocity().dot(self.momentum.lin)
            + self.angular_velocity().dot(self.momentum.ang))
    }

    pub fn accumulated_force(&self) -> Vec3 {
        self.force
    }

    pub fn accumulated_torque(&self) -> Vec3 {
        self.torque
    }

    pub fn apply_force(&mut self, force: Vec3) {
        if self.has_infinite_mass() {
            return;
        }
        self.force += force;
        self.wake();
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if self.has_infinite_mass() {
            return;
        }
        self.torque += torque;
        self.wake();
    }

    pub fn apply_force_at_point(&mut self, force: Vec3, point: Vec3) {
        if self.has_infinite_mass() {
            return;
        }
        self.force += force;
        self.torque += (point - self.center_of_mass()).cross(force);
        self.wake();
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if self.has_infinite_mass() {
            return;
        }
        let r = point - self.center_of_mass();
        self.momentum += SpatialVec::from_impulse_at(impulse, r);
        self.wake();
    }

    /// Adds a resolver-computed momentum change. Does not wake the body.
    pub(crate) fn apply_momentum_delta(&mut self, delta: SpatialVec) {
        if self.has_infinite_mass() {
            return;
        }
        self.momentum += delta;
    }

    pub(crate) fn take_accumulators(&mut self) -> (Vec3, Vec3) {
        let accumulated = (self.force, self.torque);
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
        accumulated
    }

    pub(crate) fn set_pose_unchecked(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub(crate) fn scale_momentum(&mut self, linear: f32, angular: f32) {
        self.momentum.lin *= linear;
        self.momentum.ang *= angular;
    }

    /// Recomputes the world inverse inertia from the current orientation.
    pub fn update_world_inertia(&mut self) {
        self.inverse_inertia_world =
            rotate_tensor(self.pose.rotation_matrix(), self.inverse_inertia_local);
    }

    pub fn local_aabb(&self) -> &Aabb {
        &self.local_aabb
    }

    pub fn world_aabb(&self) -> &Aabb {
        &self.world_aabb
    }

    pub fn update_world_aabb(&mut self) {
        self.world_aabb = self.local_aabb.transformed(&self.pose);
    }

    pub fn sleep_state(&self) -> SleepState {
        self.sleep
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep.asleep
    }

    /// Awake dynamic or kinematic body: drives the broad-phase scan.
    pub fn is_active(&self) -> bool {
        self.kind != BodyKind::Static && !self.sleep.asleep
    }

    pub fn wake(&mut self) {
        self.sleep = SleepState::default();
    }

    pub fn put_to_sleep(&mut self) {
        if self.kind == BodyKind::Static {
            return;
        }
        self.sleep.asleep = true;
        self.momentum = SpatialVec::ZERO;
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    /// Counts one more resting frame if below both thresholds, otherwise resets.
    /// Returns true when the body just fell asleep.
    pub(crate) fn track_rest(&mut self, linear: f32, angular: f32, frames: u32) -> bool {
        if !self.is_dynamic() || self.sleep.asleep {
            return false;
        }
        let resting = self.linear_velocity().length() < linear
            && self.angular_velocity().length() < angular;
        if !resting {
            self.sleep.resting_frames = 0;
            return false;
        }
        self.sleep.resting_frames += 1;
        if self.sleep.resting_frames >= frames {
            self.put_to_sleep();
            return true;
        }
        false
    }

    pub fn last_touched_frame(&self) -> u64 {
        self.last_touched_frame
    }

    pub(crate) fn touch(&mut self, frame: u64) {
        self.last_touched_frame = frame;
    }

    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.momentum.is_finite()
    }
}
