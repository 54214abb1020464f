//! Global configuration constants and the validated simulation settings.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of sequential-impulse iterations performed per manifold.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 8;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: f32 = 0.02;

/// Default damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.02;

/// Default cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 5.0;

/// Linear speed below which a body counts as resting.
pub const DEFAULT_SLEEP_LINEAR_THRESHOLD: f32 = 0.05;

/// Angular speed below which a body counts as resting.
pub const DEFAULT_SLEEP_ANGULAR_THRESHOLD: f32 = 0.05;

/// Consecutive resting steps before a body is put to sleep.
pub const DEFAULT_SLEEP_FRAMES: u32 = 60;

/// Collision cache slots. Must be prime.
pub const DEFAULT_CACHE_CAPACITY: usize = 1021;

/// Frames an unused cache entry survives before eviction.
pub const DEFAULT_CACHE_EVICTION_FRAMES: u64 = 30;

/// Approach speed under which restitution is not applied. Zero bounces
/// every impact; raise it to quiet resting stacks.
pub const DEFAULT_RESTITUTION_THRESHOLD: f32 = 0.0;

/// Penetration tolerated before positional correction kicks in.
pub const DEFAULT_PENETRATION_SLOP: f32 = 0.005;

/// Fraction of the excess penetration removed per step.
pub const DEFAULT_CORRECTION_FRACTION: f32 = 0.4;

/// Smallest shape volume accepted at construction.
pub const MIN_SHAPE_VOLUME: f32 = 1e-9;

/// Settings consumed by the world, the resolver, and the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub gravity: Vec3,
    pub time_step: f32,
    pub solver_iterations: u32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub broadphase_cell_size: f32,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,
    pub sleep_frames: u32,
    pub cache_capacity: usize,
    pub cache_eviction_frames: u64,
    pub restitution_threshold: f32,
    pub penetration_slop: f32,
    pub correction_fraction: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            time_step: DEFAULT_TIME_STEP,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            linear_damping: DEFAULT_LINEAR_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            broadphase_cell_size: DEFAULT_BROADPHASE_CELL_SIZE,
            sleep_linear_threshold: DEFAULT_SLEEP_LINEAR_THRESHOLD,
            sleep_angular_threshold: DEFAULT_SLEEP_ANGULAR_THRESHOLD,
            sleep_frames: DEFAULT_SLEEP_FRAMES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_eviction_frames: DEFAULT_CACHE_EVICTION_FRAMES,
            restitution_threshold: DEFAULT_RESTITUTION_THRESHOLD,
            penetration_slop: DEFAULT_PENETRATION_SLOP,
            correction_fraction: DEFAULT_CORRECTION_FRACTION,
        }
    }
}

impl SimulationConfig {
    /// Same defaults with gravity switched off. Handy for isolated collision tests.
    pub fn zero_gravity() -> Self {
        Self {
            gravity: Vec3::ZERO,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::invalid("gravity must be finite"));
        }
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(PhysicsError::invalid(format!(
                "time_step must be positive and finite, got {}",
                self.time_step
            )));
        }
        if self.solver_iterations == 0 {
            return Err(PhysicsError::invalid("solver_iterations must be at least 1"));
        }
        if !(self.broadphase_cell_size > 0.0 && self.broadphase_cell_size.is_finite()) {
            return Err(PhysicsError::invalid(format!(
                "broadphase_cell_size must be positive, got {}",
                self.broadphase_cell_size
            )));
        }
        if !(non_negative(self.linear_damping) && non_negative(self.angular_damping)) {
            return Err(PhysicsError::invalid("damping must be non-negative"));
        }
        if !(non_negative(self.sleep_linear_threshold) && non_negative(self.sleep_angular_threshold)) {
            return Err(PhysicsError::invalid("sleep thresholds must be non-negative"));
        }
        if !is_prime(self.cache_capacity) {
            return Err(PhysicsError::invalid(format!(
                "cache_capacity must be prime, got {}",
                self.cache_capacity
            )));
        }
        if !(non_negative(self.restitution_threshold) && non_negative(self.penetration_slop)) {
            return Err(PhysicsError::invalid(
                "restitution_threshold and penetration_slop must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.correction_fraction) {
            return Err(PhysicsError::invalid(format!(
                "correction_fraction must lie in [0, 1], got {}",
                self.correction_fraction
            )));
        }
        Ok(())
    }
}

/// Finite and at least zero. NaN fails.
fn non_negative(value: f32) -> bool {
    value >= 0.0 && value.is_finite()
}

/// Trial division; table sizes stay small.
pub fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(is_prime(DEFAULT_CACHE_CAPACITY));
    }

    #[test]
    fn composite_cache_capacity_is_rejected() {
        let config = SimulationConfig {
            cache_capacity: 1024,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PhysicsError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn correction_fraction_out_of_range_is_rejected() {
        let config = SimulationConfig {
            correction_fraction: 1.5,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn nan_thresholds_are_rejected() {
        let base = SimulationConfig::default();
        let broken = [
            SimulationConfig { linear_damping: f32::NAN, ..base },
            SimulationConfig { angular_damping: f32::INFINITY, ..base },
            SimulationConfig { sleep_linear_threshold: f32::NAN, ..base },
            SimulationConfig { sleep_angular_threshold: f32::NAN, ..base },
            SimulationConfig { restitution_threshold: f32::NAN, ..base },
            SimulationConfig { penetration_slop: -0.1, ..base },
        ];
        for config in broken {
            assert!(
                matches!(config.validate(), Err(PhysicsError::InvalidSettings { .. })),
                "{config:?}"
            );
        }
    }

    #[test]
    fn primes() {
        let primes: Vec<usize> = (0..20).filter(|n| is_prime(*n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19]);
    }
}
