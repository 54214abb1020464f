//! Collision shapes: a common header hoisted out of a closed set of geometries.

use std::mem::size_of;

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    material::{MaterialId, MaterialRegistry},
    types::{Aabb, InertiaTensorExt, MassProperties, Pose},
};
use crate::{
    config::MIN_SHAPE_VOLUME,
    error::{PhysicsError, PhysicsResult},
};

/// Tag identifying a shape's geometry. The discriminant doubles as the
/// index into the narrow-phase dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere = 0,
    Box = 1,
    Capsule = 2,
    Polyhedron = 3,
    Plane = 4,
}

impl ShapeKind {
    pub const COUNT: usize = 5;
    pub const ALL: [ShapeKind; Self::COUNT] = [
        ShapeKind::Sphere,
        ShapeKind::Box,
        ShapeKind::Capsule,
        ShapeKind::Polyhedron,
        ShapeKind::Plane,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Behaviour flags carried in the shape header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShapeFlags(u32);

impl ShapeFlags {
    pub const NONE: Self = Self(0);
    /// Contacts are detected and reported but never resolved.
    pub const SENSOR: Self = Self(1 << 0);
    /// The world does not query terrain for this shape.
    pub const NO_TERRAIN: Self = Self(1 << 1);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ShapeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Fields shared by every shape, readable without knowing the payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeHeader {
    pub kind: ShapeKind,
    /// Header plus payload size in bytes, for packed iteration.
    pub byte_size: usize,
    /// Shape space → parent (body) space.
    pub transform: Pose,
    pub material: MaterialId,
    pub flags: ShapeFlags,
}

/// One face of a convex hull. Indices wind counter-clockwise seen from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HullFace {
    pub indices: Vec<u32>,
    pub normal: Vec3,
    /// Plane offset: `normal · p == offset` for points on the face.
    pub offset: f32,
}

/// Convex vertex/face soup with derived face planes and unique edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexHull {
    vertices: Vec<Vec3>,
    faces: Vec<HullFace>,
    edges: Vec<[u32; 2]>,
    centroid: Vec3,
}

const HULL_PLANARITY_TOLERANCE: f32 = 1e-3;

impl ConvexHull {
    /// Builds a hull from vertices and face index loops, checking convexity.
    pub fn new(vertices: Vec<Vec3>, face_indices: Vec<Vec<u32>>) -> PhysicsResult<Self> {
        if vertices.len() < 4 || face_indices.len() < 4 {
            return Err(PhysicsError::invalid(format!(
                "polyhedron needs at least 4 vertices and 4 faces, got {} and {}",
                vertices.len(),
                face_indices.len()
            )));
        }
        if vertices.len() > u16::MAX as usize || face_indices.len() > u16::MAX as usize {
            return Err(PhysicsError::invalid("polyhedron has too many vertices or faces"));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::invalid("polyhedron vertices must be finite"));
        }
        let centroid = vertices.iter().copied().sum::<Vec3>() / vertices.len() as f32;

        let mut faces = Vec::with_capacity(face_indices.len());
        for mut indices in face_indices {
            if indices.len() < 3 {
                return Err(PhysicsError::invalid("polyhedron face needs 3 or more vertices"));
            }
            if indices.iter().any(|i| *i as usize >= vertices.len()) {
                return Err(PhysicsError::invalid("polyhedron face index out of bounds"));
            }
            let mut normal = newell_normal(&vertices, &indices);
            if normal.length_squared() < 1e-12 {
                return Err(PhysicsError::invalid("polyhedron face is degenerate"));
            }
            normal = normal.normalize();
            let anchor = vertices[indices[0] as usize];
            if normal.dot(anchor - centroid) < 0.0 {
                indices.reverse();
                normal = -normal;
            }
            let offset = normal.dot(anchor);
            faces.push(HullFace {
                indices,
                normal,
                offset,
            });
        }

        let scale = vertices
            .iter()
            .map(|v| (*v - centroid).length())
            .fold(0.0, f32::max)
            .max(1.0);
        for face in &faces {
            for vertex in &vertices {
                if face.normal.dot(*vertex) - face.offset > HULL_PLANARITY_TOLERANCE * scale {
                    return Err(PhysicsError::invalid("polyhedron is not convex"));
                }
            }
        }

        let mut edges: Vec<[u32; 2]> = Vec::new();
        for face in &faces {
            let count = face.indices.len();
            for i in 0..count {
                let a = face.indices[i];
                let b = face.indices[(i + 1) % count];
                let edge = if a < b { [a, b] } else { [b, a] };
                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
        }

        Ok(Self {
            vertices,
            faces,
            edges,
            centroid,
        })
    }

    /// Box hull with faces ordered +X, -X, +Y, -Y, +Z, -Z. Vertex `i` sits on the
    /// corner named by [`cuboid_corner`] and edges follow [`CUBOID_EDGES`].
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let face = |indices: [u32; 4], normal: Vec3, offset: f32| HullFace {
            indices: indices.to_vec(),
            normal,
            offset,
        };
        let faces = vec![
            face([1, 2, 6, 5], Vec3::X, h.x),
            face([0, 4, 7, 3], Vec3::NEG_X, h.x),
            face([3, 7, 6, 2], Vec3::Y, h.y),
            face([0, 1, 5, 4], Vec3::NEG_Y, h.y),
            face([4, 5, 6, 7], Vec3::Z, h.z),
            face([0, 3, 2, 1], Vec3::NEG_Z, h.z),
        ];
        Self {
            vertices,
            faces,
            edges: CUBOID_EDGES.to_vec(),
            centroid: Vec3::ZERO,
        }
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[HullFace] {
        &self.faces
    }

    pub fn edges(&self) -> &[[u32; 2]] {
        &self.edges
    }

    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Index of the edge joining vertices `a` and `b`, in either order.
    pub fn edge_index(&self, a: u32, b: u32) -> Option<usize> {
        let key = if a < b { [a, b] } else { [b, a] };
        self.edges.iter().position(|edge| *edge == key)
    }

    /// Volume, centre of mass, and unit-density inertia about the centre of mass,
    /// by decomposing the hull into tetrahedra fanned from the vertex centroid.
    pub fn unit_mass_properties(&self) -> (f32, Vec3, Mat3) {
        let canonical = Mat3::from_cols(
            Vec3::new(2.0, 1.0, 1.0),
            Vec3::new(1.0, 2.0, 1.0),
            Vec3::new(1.0, 1.0, 2.0),
        ) * (1.0 / 120.0);
        let origin = self.centroid;

        let mut volume = 0.0;
        let mut weighted_center = Vec3::ZERO;
        let mut covariance = Mat3::ZERO;
        for face in &self.faces {
            let first = self.vertices[face.indices[0] as usize] - origin;
            for window in face.indices[1..].windows(2) {
                let b = self.vertices[window[0] as usize] - origin;
                let c = self.vertices[window[1] as usize] - origin;
                let edges = Mat3::from_cols(first, b, c);
                let det = edges.determinant();
                volume += det / 6.0;
                weighted_center += (det / 6.0) * (first + b + c) / 4.0;
                covariance += (edges * canonical * edges.transpose()) * det;
            }
        }

        if volume.abs() < f32::EPSILON {
            return (volume, origin, Mat3::ZERO);
        }
        let offset = weighted_center / volume;
        let shifted = covariance - outer(offset, offset) * volume;
        let trace = shifted.x_axis.x + shifted.y_axis.y + shifted.z_axis.z;
        let inertia = Mat3::from_diagonal(Vec3::splat(trace)) - shifted;
        (volume, origin + offset, inertia)
    }
}

fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

fn newell_normal(vertices: &[Vec3], indices: &[u32]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    for i in 0..indices.len() {
        let current = vertices[indices[i] as usize];
        let next = vertices[indices[(i + 1) % indices.len()] as usize];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Unique edges of [`ConvexHull::cuboid`], lower vertex index first.
pub(crate) const CUBOID_EDGES: [[u32; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [0, 3],
    [4, 5],
    [5, 6],
    [6, 7],
    [4, 7],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Cuboid vertex index of the corner on the positive side of each flagged axis.
/// The -Z ring runs counter-clockwise from (-X, -Y) and the +Z ring repeats it.
pub(crate) fn cuboid_corner(positive: [bool; 3]) -> u32 {
    let ring = match (positive[0], positive[1]) {
        (false, false) => 0,
        (true, false) => 1,
        (true, true) => 2,
        (false, true) => 3,
    };
    if positive[2] {
        ring + 4
    } else {
        ring
    }
}

/// Cuboid edge index joining two corners, if they share an edge.
pub(crate) fn cuboid_edge(a: u32, b: u32) -> Option<usize> {
    let key = if a < b { [a, b] } else { [b, a] };
    CUBOID_EDGES.iter().position(|edge| *edge == key)
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Segment along local Y from `-half_height` to `+half_height`, swept by `radius`.
    Capsule { radius: f32, half_height: f32 },
    Polyhedron(ConvexHull),
    /// Half-space `normal · p <= offset` in shape space.
    Plane { normal: Vec3, offset: f32 },
}

impl ShapeGeometry {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeGeometry::Sphere { .. } => ShapeKind::Sphere,
            ShapeGeometry::Box { .. } => ShapeKind::Box,
            ShapeGeometry::Capsule { .. } => ShapeKind::Capsule,
            ShapeGeometry::Polyhedron(_) => ShapeKind::Polyhedron,
            ShapeGeometry::Plane { .. } => ShapeKind::Plane,
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            ShapeGeometry::Sphere { .. } => size_of::<f32>(),
            ShapeGeometry::Box { .. } => size_of::<Vec3>(),
            ShapeGeometry::Capsule { .. } => 2 * size_of::<f32>(),
            ShapeGeometry::Plane { .. } => size_of::<Vec3>() + size_of::<f32>(),
            ShapeGeometry::Polyhedron(hull) => {
                let faces: usize = hull
                    .faces()
                    .iter()
                    .map(|f| f.indices.len() * size_of::<u32>() + size_of::<Vec3>() + size_of::<f32>())
                    .sum();
                hull.vertices().len() * size_of::<Vec3>()
                    + faces
                    + hull.edges().len() * size_of::<[u32; 2]>()
                    + size_of::<Vec3>()
            }
        }
    }
}

/// A collision primitive. Immutable once built apart from [`Shape::rematerialize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shape {
    header: ShapeHeader,
    geometry: ShapeGeometry,
    /// Box hull built once by [`Shape::make`]; rebuilt on demand after deserializing.
    #[serde(skip)]
    box_hull: Option<ConvexHull>,
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.geometry == other.geometry
    }
}

impl Shape {
    /// Validates `geometry` and wraps it with a header.
    pub fn make(
        geometry: ShapeGeometry,
        transform: Pose,
        material: MaterialId,
        flags: ShapeFlags,
    ) -> PhysicsResult<Self> {
        if !transform.is_finite() {
            return Err(PhysicsError::invalid("shape transform must be finite"));
        }
        let geometry = validate_geometry(geometry)?;
        let header = ShapeHeader {
            kind: geometry.kind(),
            byte_size: size_of::<ShapeHeader>() + geometry.payload_size(),
            transform: Pose {
                position: transform.position,
                rotation: transform.rotation.normalize(),
            },
            material,
            flags,
        };
        let box_hull = match &geometry {
            ShapeGeometry::Box { half_extents } => Some(ConvexHull::cuboid(*half_extents)),
            _ => None,
        };
        Ok(Self {
            header,
            geometry,
            box_hull,
        })
    }

    pub fn sphere(radius: f32) -> PhysicsResult<Self> {
        Self::basic(ShapeGeometry::Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> PhysicsResult<Self> {
        Self::basic(ShapeGeometry::Box { half_extents })
    }

    pub fn capsule(radius: f32, half_height: f32) -> PhysicsResult<Self> {
        Self::basic(ShapeGeometry::Capsule {
            radius,
            half_height,
        })
    }

    pub fn polyhedron(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>) -> PhysicsResult<Self> {
        Self::basic(ShapeGeometry::Polyhedron(ConvexHull::new(vertices, faces)?))
    }

    /// Half-space below the plane through `normal * offset`.
    pub fn plane(normal: Vec3, offset: f32) -> PhysicsResult<Self> {
        Self::basic(ShapeGeometry::Plane { normal, offset })
    }

    fn basic(geometry: ShapeGeometry) -> PhysicsResult<Self> {
        Self::make(geometry, Pose::IDENTITY, MaterialId::DEFAULT, ShapeFlags::NONE)
    }

    /// Replaces the shape-to-body offset. Non-finite poses are rejected.
    pub fn with_transform(mut self, transform: Pose) -> PhysicsResult<Self> {
        if !transform.is_finite() {
            return Err(PhysicsError::invalid("shape transform must be finite"));
        }
        self.header.transform = Pose {
            position: transform.position,
            rotation: transform.rotation.normalize(),
        };
        Ok(self)
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.header.material = material;
        self
    }

    pub fn with_flags(mut self, flags: ShapeFlags) -> Self {
        self.header.flags = flags;
        self
    }

    /// Swaps the material after checking the registry knows it.
    pub fn rematerialize(
        &mut self,
        material: MaterialId,
        registry: &MaterialRegistry,
    ) -> PhysicsResult<()> {
        registry.get(material)?;
        self.header.material = material;
        Ok(())
    }

    pub fn header(&self) -> &ShapeHeader {
        &self.header
    }

    pub fn geometry(&self) -> &ShapeGeometry {
        &self.geometry
    }

    pub fn kind(&self) -> ShapeKind {
        self.header.kind
    }

    pub fn transform(&self) -> &Pose {
        &self.header.transform
    }

    pub fn material(&self) -> MaterialId {
        self.header.material
    }

    pub fn flags(&self) -> ShapeFlags {
        self.header.flags
    }

    pub fn byte_size(&self) -> usize {
        self.header.byte_size
    }

    /// Half-spaces have no finite volume and can only back infinite-mass bodies.
    pub fn is_unbounded(&self) -> bool {
        matches!(self.geometry, ShapeGeometry::Plane { .. })
    }

    pub fn volume(&self) -> f32 {
        use std::f32::consts::PI;
        match &self.geometry {
            ShapeGeometry::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            ShapeGeometry::Box { half_extents } => 8.0 * half_extents.x * half_extents.y * half_extents.z,
            ShapeGeometry::Capsule {
                radius,
                half_height,
            } => PI * radius * radius * (2.0 * half_height + 4.0 / 3.0 * radius),
            ShapeGeometry::Polyhedron(hull) => hull.unit_mass_properties().0,
            ShapeGeometry::Plane { .. } => f32::INFINITY,
        }
    }

    /// Centre of mass in shape space.
    pub fn center_of_mass(&self) -> Vec3 {
        match &self.geometry {
            ShapeGeometry::Polyhedron(hull) => hull.unit_mass_properties().1,
            _ => Vec3::ZERO,
        }
    }

    /// Inertia about the centre of mass in shape space, for the given mass.
    pub fn inertia(&self, mass: f32) -> Mat3 {
        match &self.geometry {
            ShapeGeometry::Sphere { radius } => Mat3::for_solid_sphere(*radius, mass),
            ShapeGeometry::Box { half_extents } => Mat3::for_solid_box(*half_extents, mass),
            ShapeGeometry::Capsule {
                radius,
                half_height,
            } => Mat3::for_solid_capsule(*radius, *half_height, mass),
            ShapeGeometry::Polyhedron(hull) => {
                let (volume, _, unit_inertia) = hull.unit_mass_properties();
                if volume > 0.0 {
                    unit_inertia * (mass / volume)
                } else {
                    Mat3::ZERO
                }
            }
            ShapeGeometry::Plane { .. } => Mat3::ZERO,
        }
    }

    /// Mass properties expressed in parent (body) space.
    pub fn mass_properties(&self, density: f32) -> PhysicsResult<MassProperties> {
        if self.is_unbounded() {
            return Err(PhysicsError::invalid(
                "planes have no finite mass; attach them to static bodies",
            ));
        }
        let volume = self.volume();
        let mass = density * volume;
        let rotation = self.header.transform.rotation_matrix();
        Ok(MassProperties {
            mass,
            center_of_mass: self.header.transform.transform_point(self.center_of_mass()),
            inertia: rotation * self.inertia(mass) * rotation.transpose(),
        })
    }

    /// Bounds in parent (body) space.
    pub fn local_aabb(&self) -> Aabb {
        let transform = &self.header.transform;
        match &self.geometry {
            ShapeGeometry::Sphere { radius } => {
                Aabb::from_center_half_extents(transform.position, Vec3::splat(*radius))
            }
            ShapeGeometry::Box { half_extents } => {
                Aabb::from_center_half_extents(Vec3::ZERO, *half_extents).transformed(transform)
            }
            ShapeGeometry::Capsule {
                radius,
                half_height,
            } => {
                let axis = transform.transform_vector(Vec3::Y * *half_height);
                Aabb::from_center_half_extents(transform.position, axis.abs() + Vec3::splat(*radius))
            }
            ShapeGeometry::Polyhedron(hull) => {
                let points: Vec<Vec3> = hull
                    .vertices()
                    .iter()
                    .map(|v| transform.transform_point(*v))
                    .collect();
                Aabb::from_points(&points)
            }
            ShapeGeometry::Plane { .. } => Aabb::EVERYTHING,
        }
    }

    pub fn bounding_radius(&self) -> f32 {
        match &self.geometry {
            ShapeGeometry::Sphere { radius } => *radius,
            ShapeGeometry::Box { half_extents } => half_extents.length(),
            ShapeGeometry::Capsule {
                radius,
                half_height,
            } => radius + half_height,
            ShapeGeometry::Polyhedron(hull) => hull
                .vertices()
                .iter()
                .map(|v| v.length())
                .fold(0.0, f32::max),
            ShapeGeometry::Plane { .. } => f32::INFINITY,
        }
    }

    /// Farthest point of the geometry along `direction`, in shape space.
    /// Planes have no support point and return `None`.
    pub fn support(&self, direction: Vec3) -> Option<Vec3> {
        let dir = direction.normalize_or_zero();
        match &self.geometry {
            ShapeGeometry::Sphere { radius } => Some(dir * *radius),
            ShapeGeometry::Box { half_extents } => Some(Vec3::new(
                half_extents.x.copysign(dir.x),
                half_extents.y.copysign(dir.y),
                half_extents.z.copysign(dir.z),
            )),
            ShapeGeometry::Capsule {
                radius,
                half_height,
            } => {
                let end = Vec3::Y * half_height.copysign(dir.y);
                Some(end + dir * *radius)
            }
            ShapeGeometry::Polyhedron(hull) => hull
                .vertices()
                .iter()
                .copied()
                .max_by(|a, b| a.dot(dir).total_cmp(&b.dot(dir))),
            ShapeGeometry::Plane { .. } => None,
        }
    }

    /// Hull view for convex polytopes; `None` for smooth or unbounded kinds.
    pub fn hull(&self) -> Option<std::borrow::Cow<'_, ConvexHull>> {
        match &self.geometry {
            ShapeGeometry::Box { half_extents } => Some(match &self.box_hull {
                Some(hull) => std::borrow::Cow::Borrowed(hull),
                None => std::borrow::Cow::Owned(ConvexHull::cuboid(*half_extents)),
            }),
            ShapeGeometry::Polyhedron(hull) => Some(std::borrow::Cow::Borrowed(hull)),
            _ => None,
        }
    }
}

fn validate_geometry(geometry: ShapeGeometry) -> PhysicsResult<ShapeGeometry> {
    let positive = |name: &str, value: f32| -> PhysicsResult<()> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(PhysicsError::invalid(format!("{name} must be positive, got {value}")))
        }
    };

    let geometry = match geometry {
        ShapeGeometry::Sphere { radius } => {
            positive("sphere radius", radius)?;
            geometry
        }
        ShapeGeometry::Box { half_extents } => {
            positive("box half extent x", half_extents.x)?;
            positive("box half extent y", half_extents.y)?;
            positive("box half extent z", half_extents.z)?;
            geometry
        }
        ShapeGeometry::Capsule {
            radius,
            half_height,
        } => {
            positive("capsule radius", radius)?;
            if !(half_height >= 0.0 && half_height.is_finite()) {
                return Err(PhysicsError::invalid(format!(
                    "capsule half height must be non-negative, got {half_height}"
                )));
            }
            geometry
        }
        ShapeGeometry::Polyhedron(_) => geometry,
        ShapeGeometry::Plane { normal, offset } => {
            if !offset.is_finite() || !normal.is_finite() || normal.length_squared() < 1e-12 {
                return Err(PhysicsError::invalid("plane needs a finite non-zero normal"));
            }
            return Ok(ShapeGeometry::Plane {
                normal: normal.normalize(),
                offset,
            });
        }
    };

    let scratch = Shape {
        header: ShapeHeader {
            kind: geometry.kind(),
            byte_size: 0,
            transform: Pose::IDENTITY,
            material: MaterialId::DEFAULT,
            flags: ShapeFlags::NONE,
        },
        geometry,
        box_hull: None,
    };
    let volume = scratch.volume();
    if !(volume >= MIN_SHAPE_VOLUME) {
        return Err(PhysicsError::VolumeTooSmall {
            volume,
            minimum: MIN_SHAPE_VOLUME,
        });
    }
    Ok(scratch.geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Quat;

    pub(crate) fn tetrahedron() -> Shape {
        Shape::polyhedron(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]],
        )
        .expect("valid tetrahedron")
    }

    #[test]
    fn header_is_consistent_with_payload() {
        let sphere = Shape::sphere(0.5).expect("valid sphere");
        assert_eq!(sphere.kind(), ShapeKind::Sphere);
        assert_eq!(sphere.byte_size(), size_of::<ShapeHeader>() + size_of::<f32>());

        let hull = tetrahedron();
        assert_eq!(hull.kind(), ShapeKind::Polyhedron);
        assert!(hull.byte_size() > sphere.byte_size());
    }

    #[test]
    fn tiny_sphere_is_rejected_as_too_small() {
        assert!(matches!(
            Shape::sphere(1e-4),
            Err(PhysicsError::VolumeTooSmall { .. })
        ));
        assert!(matches!(
            Shape::sphere(-1.0),
            Err(PhysicsError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn flat_polyhedron_is_rejected() {
        let result = Shape::polyhedron(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![vec![0, 1, 2], vec![0, 2, 3], vec![0, 2, 1], vec![0, 3, 2]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn tetrahedron_mass_properties_match_closed_form() {
        let tet = tetrahedron();
        assert_abs_diff_eq!(tet.volume(), 1.0 / 6.0, epsilon = 1e-5);
        let com = tet.center_of_mass();
        assert_abs_diff_eq!(com.x, 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(com.y, 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(com.z, 0.25, epsilon = 1e-5);

        // Right tetrahedron: Ixx about the origin is m/5, shifted to the centroid.
        let mass = 1.0 / 6.0;
        let inertia = tet.inertia(mass);
        let about_origin = mass / 5.0;
        let shift = mass * (0.25_f32 * 0.25 * 2.0);
        assert_abs_diff_eq!(inertia.x_axis.x, about_origin - shift, epsilon = 1e-5);
        assert!(inertia.x_axis.y > 0.0);
    }

    #[test]
    fn box_polyhedron_agrees_with_box_formula() {
        let half = Vec3::new(0.5, 1.0, 1.5);
        let boxed = Shape::cuboid(half).expect("valid box");
        let hull = ConvexHull::cuboid(half);
        let poly = Shape::polyhedron(
            hull.vertices().to_vec(),
            hull.faces().iter().map(|f| f.indices.clone()).collect(),
        )
        .expect("box as polyhedron");

        assert_abs_diff_eq!(poly.volume(), boxed.volume(), epsilon = 1e-4);
        let a = boxed.inertia(3.0);
        let b = poly.inertia(3.0);
        assert_abs_diff_eq!(a.x_axis.x, b.x_axis.x, epsilon = 1e-4);
        assert_abs_diff_eq!(a.y_axis.y, b.y_axis.y, epsilon = 1e-4);
        assert_abs_diff_eq!(a.z_axis.z, b.z_axis.z, epsilon = 1e-4);
        assert_abs_diff_eq!(b.x_axis.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn mass_properties_follow_shape_transform() {
        let shape = Shape::cuboid(Vec3::new(2.0, 0.5, 0.5))
            .expect("valid box")
            .with_transform(Pose::new(
                Vec3::new(0.0, 1.0, 0.0),
                Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            ))
            .expect("finite offset");
        let props = shape.mass_properties(1.0).expect("finite mass");
        assert_abs_diff_eq!(props.mass, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(props.center_of_mass.y, 1.0, epsilon = 1e-6);
        // Long axis now along Y: smallest moment about Y.
        assert!(props.inertia.y_axis.y < props.inertia.x_axis.x);
    }

    #[test]
    fn plane_has_no_finite_mass() {
        let plane = Shape::plane(Vec3::Y, 0.0).expect("valid plane");
        assert!(plane.is_unbounded());
        assert!(plane.mass_properties(1.0).is_err());
        assert!(!plane.local_aabb().is_bounded());
    }

    #[test]
    fn support_points_lie_on_the_surface() {
        let capsule = Shape::capsule(0.5, 1.0).expect("valid capsule");
        let top = capsule.support(Vec3::Y).expect("bounded");
        assert_abs_diff_eq!(top.y, 1.5, epsilon = 1e-6);

        let boxed = Shape::cuboid(Vec3::new(1.0, 2.0, 3.0)).expect("valid box");
        let corner = boxed.support(Vec3::new(-1.0, 1.0, -1.0)).expect("bounded");
        assert_eq!(corner, Vec3::new(-1.0, 2.0, -3.0));

        let tip = tetrahedron().support(Vec3::X).expect("bounded");
        assert_eq!(tip, Vec3::X);
        assert!(Shape::plane(Vec3::Y, 0.0).expect("plane").support(Vec3::Y).is_none());
    }

    #[test]
    fn flags_compose() {
        let flags = ShapeFlags::SENSOR | ShapeFlags::NO_TERRAIN;
        assert!(flags.contains(ShapeFlags::SENSOR));
        assert!(flags.contains(ShapeFlags::NO_TERRAIN));
        assert!(!ShapeFlags::NONE.contains(ShapeFlags::SENSOR));
    }

    #[test]
    fn rematerialize_checks_the_registry() {
        use crate::core::material::{Material, MaterialTable};

        let registry = MaterialRegistry::new(MaterialTable::with_default_material());
        let steel = registry.register(Material::steel(MaterialId(3))).expect("register");
        let mut shape = Shape::sphere(0.5).expect("valid sphere");

        assert!(matches!(
            shape.rematerialize(MaterialId(9), &registry),
            Err(PhysicsError::MaterialIndexOutOfRange { .. })
        ));
        assert_eq!(shape.material(), MaterialId::DEFAULT);
        shape.rematerialize(steel, &registry).expect("known material");
        assert_eq!(shape.material(), steel);
    }

    #[test]
    fn non_finite_offsets_are_rejected() {
        let sphere = Shape::sphere(0.5).expect("valid sphere");
        let nan = Pose::from_position(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(matches!(
            sphere.clone().with_transform(nan),
            Err(PhysicsError::InvalidSettings { .. })
        ));
        let infinite = Pose::new(Vec3::ZERO, Quat::from_xyzw(f32::INFINITY, 0.0, 0.0, 1.0));
        assert!(sphere.clone().with_transform(infinite).is_err());

        let moved = sphere
            .with_transform(Pose::from_position(Vec3::Y))
            .expect("finite offset");
        assert_eq!(moved.transform().position, Vec3::Y);
    }

    #[test]
    fn box_hull_is_built_once() {
        let boxed = Shape::cuboid(Vec3::new(1.0, 2.0, 3.0)).expect("valid box");
        let first = boxed.hull().expect("box hull");
        let second = boxed.hull().expect("box hull");
        assert!(matches!(first, std::borrow::Cow::Borrowed(_)));
        assert!(std::ptr::eq(first.as_ref(), second.as_ref()));
        assert_eq!(*first, ConvexHull::cuboid(Vec3::new(1.0, 2.0, 3.0)));

        let copy = boxed.clone();
        assert_eq!(copy, boxed);
        assert!(matches!(copy.hull(), Some(std::borrow::Cow::Borrowed(_))));
    }

    #[test]
    fn cuboid_corners_and_edges_match_the_hull() {
        let hull = ConvexHull::cuboid(Vec3::new(1.0, 2.0, 3.0));
        for (index, vertex) in hull.vertices().iter().enumerate() {
            let positive = [vertex.x > 0.0, vertex.y > 0.0, vertex.z > 0.0];
            assert_eq!(cuboid_corner(positive) as usize, index);
        }
        for (index, &[a, b]) in hull.edges().iter().enumerate() {
            assert_eq!(cuboid_edge(b, a), Some(index));
            let gap = hull.vertices()[a as usize] - hull.vertices()[b as usize];
            // Every edge changes exactly one coordinate.
            assert_eq!(gap.cmpne(Vec3::ZERO).bitmask().count_ones(), 1);
        }
        assert_eq!(cuboid_edge(0, 6), None);
    }
}
