use glam::Vec3;

use super::forces::{ForceRegistry, GravityField, UniformGravity};
use crate::{
    config::{SimulationConfig, DEFAULT_ANGULAR_DAMPING, DEFAULT_LINEAR_DAMPING},
    core::{rigidbody::RigidBody, types::Pose},
    utils::{angular_velocity_to_quat, BodyHandle, SpatialVec},
};

/// Semi-implicit Euler integrator. Momentum is updated from forces first;
/// the pose then advances with the updated momentum.
///
/// The two halves are exposed separately so the world can resolve contacts
/// in between.
pub struct Integrator {
    gravity: Box<dyn GravityField>,
    forces: ForceRegistry,
    linear_damping: f32,
    angular_damping: f32,
}

impl Default for Integrator {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

impl Integrator {
    pub fn new<G: GravityField + 'static>(gravity: G) -> Self {
        Self {
            gravity: Box::new(gravity),
            forces: ForceRegistry::new(),
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(UniformGravity::new(config.gravity))
            .with_damping(config.linear_damping, config.angular_damping)
    }

    /// Default damping for bodies without their own override.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear.max(0.0);
        self.angular_damping = angular.max(0.0);
        self
    }

    pub fn with_forces(mut self, forces: ForceRegistry) -> Self {
        self.forces = forces;
        self
    }

    pub fn gravity(&self) -> &dyn GravityField {
        self.gravity.as_ref()
    }

    pub fn set_gravity<G: GravityField + 'static>(&mut self, gravity: G) {
        self.gravity = Box::new(gravity);
    }

    pub fn forces(&self) -> &ForceRegistry {
        &self.forces
    }

    pub fn forces_mut(&mut self) -> &mut ForceRegistry {
        &mut self.forces
    }

    /// Folds gravity, registered generators and the body's accumulated
    /// force/torque into its momentum, then applies damping.
    pub fn integrate_momentum(&self, handle: BodyHandle, body: &mut RigidBody, dt: f32) {
        if !body.is_dynamic() || body.is_sleeping() {
            return;
        }

        self.forces.apply_all(handle, body, dt);
        let (force, torque) = body.take_accumulators();
        let weight = self.gravity.acceleration_at(body.center_of_mass())
            * body.mass()
            * body.gravity_scale;
        body.apply_momentum_delta(SpatialVec::new(torque * dt, (force + weight) * dt));

        let (linear, angular) = body
            .damping()
            .unwrap_or((self.linear_damping, self.angular_damping));
        body.scale_momentum(
            (1.0 - linear * dt).max(0.0),
            (1.0 - angular * dt).max(0.0),
        );
    }

    /// Advances the pose from the current momentum. `correction` is a
    /// positional offset computed by the resolver; it moves the body without
    /// touching its velocity.
    pub fn integrate_pose(&self, body: &mut RigidBody, correction: Vec3, dt: f32) {
        if !body.is_dynamic() || body.is_sleeping() {
            return;
        }

        let linear = body.linear_velocity();
        let angular = body.angular_velocity();
        let pose = *body.pose();
        let local_com = body.mass_properties().center_of_mass;

        let rotation = (angular_velocity_to_quat(angular, dt) * pose.rotation).normalize();
        let com = pose.transform_point(local_com) + linear * dt + correction;
        body.set_pose_unchecked(Pose::new(com - rotation * local_com, rotation));
        body.update_world_inertia();
        body.update_world_aabb();

        debug_assert!(body.is_finite(), "body state became non-finite: {body:?}");
    }

    /// Force-only step: both halves back to back.
    pub fn step(&self, handle: BodyHandle, body: &mut RigidBody, dt: f32) {
        self.integrate_momentum(handle, body, dt);
        self.integrate_pose(body, Vec3::ZERO, dt);
    }
}
