//! Sequential-impulse contact resolution.
//!
//! Bodies are copied into [`SolverBody`] scratch slots; every manifold is
//! resolved against those slots and the accumulated momentum change is
//! applied to the real bodies once, after all iterations.

use glam::{Mat3, Vec3};
use log::debug;

use crate::{
    collision::contact::ContactManifold,
    config::SimulationConfig,
    core::{material::MaterialPair, rigidbody::RigidBody},
    utils::SpatialVec,
};

/// Effective masses below this are degenerate and skipped.
const EFFECTIVE_MASS_EPSILON: f32 = 1e-9;

/// Scratch copy of a body's dynamic state.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    momentum: SpatialVec,
    initial: SpatialVec,
    inverse_mass: f32,
    inverse_inertia: Mat3,
    center_of_mass: Vec3,
    correction: Vec3,
}

impl SolverBody {
    pub fn new(body: &RigidBody) -> Self {
        if body.has_infinite_mass() {
            return Self::fixed(body.center_of_mass());
        }
        Self {
            momentum: body.momentum(),
            initial: body.momentum(),
            inverse_mass: body.inverse_mass(),
            inverse_inertia: body.inverse_inertia_world(),
            center_of_mass: body.center_of_mass(),
            correction: Vec3::ZERO,
        }
    }

    /// Immovable participant: static geometry, terrain, or a sleeping body.
    pub fn fixed(center_of_mass: Vec3) -> Self {
        Self {
            momentum: SpatialVec::ZERO,
            initial: SpatialVec::ZERO,
            inverse_mass: 0.0,
            inverse_inertia: Mat3::ZERO,
            center_of_mass,
            correction: Vec3::ZERO,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.inverse_mass == 0.0
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.momentum.lin * self.inverse_mass
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.inverse_inertia * self.momentum.ang
    }

    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.linear_velocity() + self.angular_velocity().cross(point - self.center_of_mass)
    }

    /// Momentum gained during resolution.
    pub fn momentum_delta(&self) -> SpatialVec {
        self.momentum - self.initial
    }

    /// Positional correction gathered by the projection pass.
    pub fn correction(&self) -> Vec3 {
        self.correction
    }

    fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if self.is_fixed() {
            return;
        }
        self.momentum += SpatialVec::from_impulse_at(impulse, r);
    }

    fn apply_angular_impulse(&mut self, impulse: Vec3) {
        if self.is_fixed() {
            return;
        }
        self.momentum.ang += impulse;
    }
}

/// One manifold between two solver slots. Normals point from `a` to `b`.
#[derive(Debug, Clone, Copy)]
pub struct ContactPair {
    pub a: usize,
    pub b: usize,
    pub manifold: ContactManifold,
    pub materials: MaterialPair,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolverMetrics {
    pub manifolds_solved: usize,
    pub contacts_solved: usize,
    /// Contact points dropped for a degenerate effective mass.
    pub contacts_skipped: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
    pub rolling_impulse_sum: f32,
    pub torsional_impulse_sum: f32,
    pub max_penetration: f32,
}

#[derive(Debug, Clone, Copy)]
struct PointConstraint {
    position: Vec3,
    normal: Vec3,
    r_a: Vec3,
    r_b: Vec3,
    normal_mass: f32,
    normal_target: f32,
    tangent_target: Vec3,
    normal_impulse: f32,
    tangent_impulse: Vec3,
}

#[derive(Debug, Clone)]
struct ManifoldConstraint {
    a: usize,
    b: usize,
    normal: Vec3,
    points: Vec<PointConstraint>,
    materials: MaterialPair,
    twist_target: f32,
    rolling_impulse: Vec3,
    torsional_impulse: f32,
    depth: f32,
}

impl ManifoldConstraint {
    fn total_normal_impulse(&self) -> f32 {
        self.points.iter().map(|point| point.normal_impulse).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseResolver {
    pub iterations: u32,
    /// Approach speeds below this get no restitution.
    pub restitution_threshold: f32,
    pub penetration_slop: f32,
    pub correction_fraction: f32,
}

impl Default for ImpulseResolver {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

impl ImpulseResolver {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            iterations: config.solver_iterations.max(1),
            restitution_threshold: config.restitution_threshold,
            penetration_slop: config.penetration_slop,
            correction_fraction: config.correction_fraction,
        }
    }

    /// Resolves every pair against `bodies` and returns what was done.
    pub fn resolve(&self, bodies: &mut [SolverBody], pairs: &[ContactPair]) -> ResolverMetrics {
        let mut metrics = ResolverMetrics::default();
        let mut constraints: Vec<ManifoldConstraint> = pairs
            .iter()
            .filter_map(|pair| self.prepare(bodies, pair, &mut metrics))
            .collect();

        for _ in 0..self.iterations {
            for constraint in &mut constraints {
                let (a, b) = pair_mut(bodies, constraint.a, constraint.b);
                Self::solve(a, b, constraint);
            }
        }

        for constraint in &constraints {
            metrics.manifolds_solved += 1;
            metrics.contacts_solved += constraint.points.len();
            for point in &constraint.points {
                metrics.normal_impulse_sum += point.normal_impulse;
                metrics.tangent_impulse_sum += point.tangent_impulse.length();
            }
            metrics.rolling_impulse_sum += constraint.rolling_impulse.length();
            metrics.torsional_impulse_sum += constraint.torsional_impulse.abs();
            metrics.max_penetration = metrics.max_penetration.max(constraint.depth);

            let (a, b) = pair_mut(bodies, constraint.a, constraint.b);
            self.correct_position(a, b, constraint);
        }
        metrics
    }

    /// Convenience for a single manifold between two bodies. Momentum
    /// changes are applied directly; positional correction is returned as
    /// `(correction_a, correction_b)` for the integrator.
    pub fn resolve_pair(
        &self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        manifold: &ContactManifold,
        materials: MaterialPair,
    ) -> (ResolverMetrics, Vec3, Vec3) {
        let mut bodies = [SolverBody::new(body_a), SolverBody::new(body_b)];
        let pair = ContactPair {
            a: 0,
            b: 1,
            manifold: *manifold,
            materials,
        };
        let metrics = self.resolve(&mut bodies, &[pair]);
        body_a.apply_momentum_delta(bodies[0].momentum_delta());
        body_b.apply_momentum_delta(bodies[1].momentum_delta());
        (metrics, bodies[0].correction(), bodies[1].correction())
    }

    fn prepare(
        &self,
        bodies: &[SolverBody],
        pair: &ContactPair,
        metrics: &mut ResolverMetrics,
    ) -> Option<ManifoldConstraint> {
        let manifold = &pair.manifold;
        let normal = manifold.normal();
        if pair.a == pair.b || manifold.is_empty() || !normal.is_finite() {
            return None;
        }
        let (a, b) = (&bodies[pair.a], &bodies[pair.b]);
        if a.is_fixed() && b.is_fixed() {
            return None;
        }

        let materials = pair.materials;
        let mut points = Vec::with_capacity(manifold.len());
        let mut impact = false;
        for contact in manifold.points() {
            let n = contact.normal.normalize_or(normal);
            let r_a = contact.position - a.center_of_mass;
            let r_b = contact.position - b.center_of_mass;
            let k = effective_mass(a, b, r_a, r_b, n);
            if !(k > EFFECTIVE_MASS_EPSILON) {
                debug!("skipping contact at {} with degenerate effective mass", contact.position);
                metrics.contacts_skipped += 1;
                continue;
            }

            let relative = b.velocity_at(contact.position) - a.velocity_at(contact.position);
            let approach = relative.dot(n);
            let bouncing = approach < -self.restitution_threshold;
            impact |= bouncing;
            let tangential = relative - n * approach;

            points.push(PointConstraint {
                position: contact.position,
                normal: n,
                r_a,
                r_b,
                normal_mass: 1.0 / k,
                normal_target: if bouncing {
                    -materials.elasticity_normal * approach
                } else {
                    0.0
                },
                tangent_target: if bouncing {
                    -materials.elasticity_tangential * tangential
                } else {
                    Vec3::ZERO
                },
                normal_impulse: 0.0,
                tangent_impulse: Vec3::ZERO,
            });
        }
        if points.is_empty() {
            return None;
        }

        let twist = (b.angular_velocity() - a.angular_velocity()).dot(normal);
        Some(ManifoldConstraint {
            a: pair.a,
            b: pair.b,
            normal,
            points,
            materials,
            twist_target: if impact {
                -materials.elasticity_torsional * twist
            } else {
                0.0
            },
            rolling_impulse: Vec3::ZERO,
            torsional_impulse: 0.0,
            depth: manifold.max_depth(),
        })
    }

    fn solve(a: &mut SolverBody, b: &mut SolverBody, constraint: &mut ManifoldConstraint) {
        let materials = constraint.materials;
        for point in &mut constraint.points {
            // Normal: accumulated impulse never pulls.
            let relative = b.velocity_at(point.position) - a.velocity_at(point.position);
            let approach = relative.dot(point.normal);
            let lambda = (point.normal_target - approach) * point.normal_mass;
            let accumulated = (point.normal_impulse + lambda).max(0.0);
            let delta = accumulated - point.normal_impulse;
            point.normal_impulse = accumulated;
            let impulse = point.normal * delta;
            a.apply_impulse(-impulse, point.r_a);
            b.apply_impulse(impulse, point.r_b);

            // Tangent: full stopping impulse inside the static cone, scaled
            // down to the dynamic bound outside it.
            let relative = b.velocity_at(point.position) - a.velocity_at(point.position);
            let tangential = relative - point.normal * relative.dot(point.normal);
            let error = point.tangent_target - tangential;
            let Some(direction) = error.try_normalize() else {
                continue;
            };
            let k = effective_mass(a, b, point.r_a, point.r_b, direction);
            if !(k > EFFECTIVE_MASS_EPSILON) {
                continue;
            }
            let mut candidate = point.tangent_impulse + error / k;
            candidate -= point.normal * candidate.dot(point.normal);
            let max_static = materials.static_friction * point.normal_impulse;
            if candidate.length() > max_static {
                candidate = candidate.normalize_or_zero() * materials.dynamic_friction * point.normal_impulse;
            }
            let delta = candidate - point.tangent_impulse;
            point.tangent_impulse = candidate;
            a.apply_impulse(-delta, point.r_a);
            b.apply_impulse(delta, point.r_b);
        }

        let limit = materials.rolling_friction.max(0.0) * constraint.total_normal_impulse();
        Self::solve_rolling(a, b, constraint, limit);
        Self::solve_torsion(a, b, constraint, limit);
    }

    fn solve_rolling(a: &mut SolverBody, b: &mut SolverBody, constraint: &mut ManifoldConstraint, limit: f32) {
        if limit <= f32::EPSILON {
            return;
        }
        let n = constraint.normal;
        let relative = b.angular_velocity() - a.angular_velocity();
        let rolling = relative - n * relative.dot(n);
        let Some(axis) = rolling.try_normalize() else {
            return;
        };
        let k = axis.dot(a.inverse_inertia * axis) + axis.dot(b.inverse_inertia * axis);
        if !(k > EFFECTIVE_MASS_EPSILON) {
            return;
        }
        let desired = constraint.rolling_impulse - axis * (rolling.length() / k);
        let clamped = desired.clamp_length_max(limit);
        let delta = clamped - constraint.rolling_impulse;
        constraint.rolling_impulse = clamped;
        a.apply_angular_impulse(-delta);
        b.apply_angular_impulse(delta);
    }

    fn solve_torsion(a: &mut SolverBody, b: &mut SolverBody, constraint: &mut ManifoldConstraint, limit: f32) {
        if limit <= f32::EPSILON {
            return;
        }
        let n = constraint.normal;
        let k = n.dot(a.inverse_inertia * n) + n.dot(b.inverse_inertia * n);
        if !(k > EFFECTIVE_MASS_EPSILON) {
            return;
        }
        let twist = (b.angular_velocity() - a.angular_velocity()).dot(n);
        let desired = (constraint.torsional_impulse + (constraint.twist_target - twist) / k)
            .clamp(-limit, limit);
        let delta = desired - constraint.torsional_impulse;
        constraint.torsional_impulse = desired;
        a.apply_angular_impulse(-n * delta);
        b.apply_angular_impulse(n * delta);
    }

    /// Projection: pushes the bodies apart by a fraction of the penetration
    /// beyond the slop, split by inverse mass.
    fn correct_position(&self, a: &mut SolverBody, b: &mut SolverBody, constraint: &ManifoldConstraint) {
        let total_inverse_mass = a.inverse_mass + b.inverse_mass;
        if total_inverse_mass <= EFFECTIVE_MASS_EPSILON {
            return;
        }
        let correction = (constraint.depth - self.penetration_slop).max(0.0) * self.correction_fraction;
        if correction == 0.0 {
            return;
        }
        let push = constraint.normal * (correction / total_inverse_mass);
        a.correction -= push * a.inverse_mass;
        b.correction += push * b.inverse_mass;
    }
}

fn effective_mass(a: &SolverBody, b: &SolverBody, r_a: Vec3, r_b: Vec3, direction: Vec3) -> f32 {
    let angular_a = (a.inverse_inertia * r_a.cross(direction)).cross(r_a);
    let angular_b = (b.inverse_inertia * r_b.cross(direction)).cross(r_b);
    a.inverse_mass + b.inverse_mass + direction.dot(angular_a + angular_b)
}

fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
