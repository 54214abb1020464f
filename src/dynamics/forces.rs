use glam::Vec3;

use crate::{core::rigidbody::RigidBody, utils::BodyHandle};

/// Source of gravitational acceleration, owned by the integrator.
pub trait GravityField: Send + Sync {
    fn acceleration_at(&self, position: Vec3) -> Vec3;
}

/// Same acceleration everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformGravity {
    pub acceleration: Vec3,
}

impl UniformGravity {
    pub fn new(acceleration: Vec3) -> Self {
        Self { acceleration }
    }
}

impl GravityField for UniformGravity {
    fn acceleration_at(&self, _position: Vec3) -> Vec3 {
        self.acceleration
    }
}

/// Inverse-square attraction towards `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialGravity {
    pub center: Vec3,
    /// Gravitational parameter (G·M).
    pub strength: f32,
    /// Distances below this are clamped to keep the field finite.
    pub min_distance: f32,
}

impl RadialGravity {
    pub fn new(center: Vec3, strength: f32) -> Self {
        Self {
            center,
            strength,
            min_distance: 0.1,
        }
    }
}

impl GravityField for RadialGravity {
    fn acceleration_at(&self, position: Vec3) -> Vec3 {
        let offset = self.center - position;
        let distance = offset.length().max(self.min_distance);
        offset.normalize_or_zero() * (self.strength / (distance * distance))
    }
}

/// Trait describing an external force generator applied to rigid bodies.
pub trait ForceGenerator: Send + Sync {
    fn apply(&self, body: &mut RigidBody, dt: f32);
}

/// Quadratic drag resisting the direction of motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragForce {
    pub drag_coefficient: f32,
}

impl ForceGenerator for DragForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let velocity = body.linear_velocity();
        let speed = velocity.length();
        if speed < 1e-6 {
            return;
        }
        body.apply_force(-velocity * speed * self.drag_coefficient);
    }
}

/// Damped Hookean spring tying a body's centre of mass to a fixed anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringForce {
    pub anchor: Vec3,
    pub rest_length: f32,
    pub spring_constant: f32,
    pub damping: f32,
}

impl ForceGenerator for SpringForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let displacement = body.center_of_mass() - self.anchor;
        let distance = displacement.length();
        if distance < 1e-6 {
            return;
        }

        let direction = displacement / distance;
        let extension = distance - self.rest_length;
        let closing_speed = body.linear_velocity().dot(direction);
        let magnitude = -self.spring_constant * extension - self.damping * closing_speed;
        body.apply_force(direction * magnitude);
    }
}

/// Force generators applied each step, either to every dynamic body or to one.
#[derive(Default)]
pub struct ForceRegistry {
    forces: Vec<(Option<BodyHandle>, Box<dyn ForceGenerator>)>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a generator acting on every awake dynamic body.
    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push((None, Box::new(force)));
    }

    /// Registers a generator acting on `target` only.
    pub fn add_force_to<F: ForceGenerator + 'static>(&mut self, target: BodyHandle, force: F) {
        self.forces.push((Some(target), Box::new(force)));
    }

    /// Drops generators bound to `target`.
    pub fn remove_body(&mut self, target: BodyHandle) {
        self.forces.retain(|(bound, _)| *bound != Some(target));
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn apply_all(&self, handle: BodyHandle, body: &mut RigidBody, dt: f32) {
        for (target, force) in &self.forces {
            if target.map_or(true, |target| target == handle) {
                force.apply(body, dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        material::{MaterialRegistry, MaterialTable},
        shape::Shape,
        types::Pose,
    };
    use approx::assert_abs_diff_eq;

    fn ball(position: Vec3) -> RigidBody {
        let registry = MaterialRegistry::new(MaterialTable::with_default_material());
        let shape = Shape::sphere(0.5).expect("sphere");
        RigidBody::dynamic(shape, Pose::from_position(position), &registry).expect("body")
    }

    #[test]
    fn radial_gravity_points_at_the_center() {
        let field = RadialGravity::new(Vec3::ZERO, 8.0);
        let acceleration = field.acceleration_at(Vec3::new(2.0, 0.0, 0.0));
        assert_abs_diff_eq!(acceleration.x, -2.0, epsilon = 1e-6);
        assert!(field.acceleration_at(Vec3::ZERO).is_finite());
    }

    #[test]
    fn drag_opposes_velocity() {
        let mut body = ball(Vec3::ZERO).with_velocity(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
        DragForce {
            drag_coefficient: 0.5,
        }
        .apply(&mut body, 0.1);
        assert_abs_diff_eq!(body.accumulated_force().x, -2.0, epsilon = 1e-6);
    }

    #[test]
    fn stretched_spring_pulls_back() {
        let mut body = ball(Vec3::new(3.0, 0.0, 0.0));
        SpringForce {
            anchor: Vec3::ZERO,
            rest_length: 1.0,
            spring_constant: 10.0,
            damping: 0.0,
        }
        .apply(&mut body, 0.1);
        assert_abs_diff_eq!(body.accumulated_force().x, -20.0, epsilon = 1e-5);
    }

    #[test]
    fn targeted_forces_skip_other_bodies() {
        let mut registry = ForceRegistry::new();
        let target = BodyHandle::new(1, 0);
        registry.add_force_to(
            target,
            SpringForce {
                anchor: Vec3::ZERO,
                rest_length: 0.0,
                spring_constant: 1.0,
                damping: 0.0,
            },
        );

        let mut other = ball(Vec3::X);
        registry.apply_all(BodyHandle::new(2, 0), &mut other, 0.1);
        assert_eq!(other.accumulated_force(), Vec3::ZERO);

        let mut bound = ball(Vec3::X);
        registry.apply_all(target, &mut bound, 0.1);
        assert_abs_diff_eq!(bound.accumulated_force().x, -1.0, epsilon = 1e-6);

        registry.remove_body(target);
        assert!(registry.is_empty());
    }
}
