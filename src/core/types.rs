use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid placement: orientation followed by translation. Used both for body
/// poses (body → world) and for shape offsets (shape → body).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Applies another pose on top of this one, returning the composition.
    pub fn combine(&self, other: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate() * (point - self.position)
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }
}

/// Mass and inertia about the centre of mass, in body space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub center_of_mass: Vec3,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            center_of_mass: Vec3::ZERO,
            inertia: Mat3::IDENTITY,
        }
    }
}

impl MassProperties {
    /// Infinite mass: zero inverse mass and inertia.
    pub const INFINITE: Self = Self {
        mass: f32::INFINITY,
        center_of_mass: Vec3::ZERO,
        inertia: Mat3::ZERO,
    };

    pub fn inverse_mass(&self) -> f32 {
        if self.mass.is_finite() && self.mass > f32::EPSILON {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    pub fn inverse_inertia(&self) -> Mat3 {
        if !self.mass.is_finite() || self.inertia.determinant().abs() < f32::EPSILON {
            Mat3::ZERO
        } else {
            self.inertia.inverse()
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Unbounded box, used for half-spaces.
    pub const EVERYTHING: Self = Self {
        min: Vec3::splat(f32::NEG_INFINITY),
        max: Vec3::splat(f32::INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for point in points {
            min = min.min(*point);
            max = max.max(*point);
        }
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Box enclosing this box after it is moved by `pose`.
    pub fn transformed(&self, pose: &Pose) -> Aabb {
        if !self.is_bounded() {
            return Aabb::EVERYTHING;
        }
        let rotation = pose.rotation_matrix();
        let abs_rotation = Mat3::from_cols(
            rotation.x_axis.abs(),
            rotation.y_axis.abs(),
            rotation.z_axis.abs(),
        );
        let center = pose.transform_point(self.center());
        let extents = abs_rotation * self.half_extents();
        Aabb::from_center_half_extents(center, extents)
    }
}

/// Helper methods for inertia calculations about the centre of mass.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
    fn for_solid_capsule(radius: f32, half_height: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let lx = half_extents.x * 2.0;
        let ly = half_extents.y * 2.0;
        let lz = half_extents.z * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (ly * ly + lz * lz),
            factor * (lx * lx + lz * lz),
            factor * (lx * lx + ly * ly),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        let value = 0.4 * mass * radius * radius;
        Mat3::from_diagonal(Vec3::splat(value))
    }

    /// Capsule aligned with local Y: a cylinder of height `2 * half_height`
    /// plus two hemispherical caps, masses split by volume.
    fn for_solid_capsule(radius: f32, half_height: f32, mass: f32) -> Mat3 {
        let r2 = radius * radius;
        let height = 2.0 * half_height;
        let cylinder_volume = std::f32::consts::PI * r2 * height;
        let sphere_volume = 4.0 / 3.0 * std::f32::consts::PI * r2 * radius;
        let total = cylinder_volume + sphere_volume;
        let cylinder_mass = mass * cylinder_volume / total;
        let caps_mass = mass * sphere_volume / total;

        let axial = 0.5 * cylinder_mass * r2 + 0.4 * caps_mass * r2;
        // Caps: hemisphere inertia about its own centre plus parallel-axis shift.
        let caps_lateral = caps_mass
            * (0.4 * r2 + half_height * half_height + 0.75 * half_height * radius);
        let lateral = cylinder_mass * (r2 / 4.0 + height * height / 12.0) + caps_lateral;
        Mat3::from_diagonal(Vec3::new(lateral, axial, lateral))
    }
}
