use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// A 6D spatial vector combining angular and linear components.
///
/// Rigid bodies keep their momentum in this form: `ang` is angular momentum
/// about the centre of mass, `lin` is linear momentum. Impulse deltas use the
/// same layout so they can be summed per body before being applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialVec {
    pub ang: Vec3,
    pub lin: Vec3,
}

impl SpatialVec {
    pub const ZERO: Self = Self {
        ang: Vec3::ZERO,
        lin: Vec3::ZERO,
    };

    pub fn new(ang: Vec3, lin: Vec3) -> Self {
        Self { ang, lin }
    }

    pub fn dot(&self, other: &SpatialVec) -> f32 {
        self.ang.dot(other.ang) + self.lin.dot(other.lin)
    }

    /// Linear impulse `impulse` applied at offset `r` from the centre of mass.
    pub fn from_impulse_at(impulse: Vec3, r: Vec3) -> Self {
        Self {
            ang: r.cross(impulse),
            lin: impulse,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.ang.is_finite() && self.lin.is_finite()
    }
}

impl std::ops::Add for SpatialVec {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            ang: self.ang + other.ang,
            lin: self.lin + other.lin,
        }
    }
}

impl std::ops::AddAssign for SpatialVec {
    fn add_assign(&mut self, other: Self) {
        self.ang += other.ang;
        self.lin += other.lin;
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            ang: self.ang - other.ang,
            lin: self.lin - other.lin,
        }
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            ang: -self.ang,
            lin: -self.lin,
        }
    }
}

impl std::ops::Mul<f32> for SpatialVec {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

/// Rotates a body-frame tensor into world space: `R * I * Rᵀ`.
pub fn rotate_tensor(rotation: Mat3, tensor: Mat3) -> Mat3 {
    rotation * tensor * rotation.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_at_offset_produces_torque() {
        let m = SpatialVec::from_impulse_at(Vec3::Y, Vec3::X);
        assert_eq!(m.lin, Vec3::Y);
        assert_eq!(m.ang, Vec3::Z);
        assert_eq!((m - m), SpatialVec::ZERO);
        assert_eq!((-m).lin, -Vec3::Y);
    }
}
