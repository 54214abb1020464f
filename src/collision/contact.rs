use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Maximum number of points a manifold keeps.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Sub-feature of a shape that generated a contact point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Smooth surface (sphere, capsule side) or unknown.
    #[default]
    None,
    Vertex(u16),
    Edge(u16),
    Face(u16),
}

/// Features of shape A and shape B behind one contact point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeaturePair {
    pub a: Feature,
    pub b: Feature,
}

impl FeaturePair {
    pub const fn new(a: Feature, b: Feature) -> Self {
        Self { a, b }
    }

    pub const fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }
}

/// One world-space contact. The normal points from A to B and `depth` is
/// positive while the shapes overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub features: FeaturePair,
}

impl ContactPoint {
    pub fn new(position: Vec3, normal: Vec3, depth: f32, features: FeaturePair) -> Self {
        Self {
            position,
            normal,
            depth,
            features,
        }
    }
}

/// Fixed-capacity set of contact points sharing one normal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactManifold {
    normal: Vec3,
    points: [ContactPoint; MAX_MANIFOLD_POINTS],
    len: u8,
}

impl ContactManifold {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(normal: Vec3) -> Self {
        Self {
            normal,
            ..Self::default()
        }
    }

    /// Builds a manifold from any number of candidates, reducing to
    /// [`MAX_MANIFOLD_POINTS`] while keeping the deepest point and the widest
    /// spread of the rest.
    pub fn from_candidates(normal: Vec3, candidates: &[ContactPoint]) -> Self {
        let mut manifold = Self::new(normal);
        for index in reduce_candidates(normal, candidates) {
            manifold.push(candidates[index]);
        }
        manifold
    }

    /// Adds a point; returns false once the manifold is full.
    pub fn push(&mut self, point: ContactPoint) -> bool {
        let len = self.len as usize;
        if len == MAX_MANIFOLD_POINTS {
            return false;
        }
        self.points[len] = point;
        self.len += 1;
        true
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_depth(&self) -> f32 {
        self.points()
            .iter()
            .map(|p| p.depth)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn deepest(&self) -> Option<&ContactPoint> {
        self.points()
            .iter()
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
    }

    /// Average contact position.
    pub fn centroid(&self) -> Option<Vec3> {
        if self.is_empty() {
            return None;
        }
        let sum: Vec3 = self.points().iter().map(|p| p.position).sum();
        Some(sum / self.len() as f32)
    }

    /// Feature ids of every point, in point order.
    pub fn features(&self) -> impl Iterator<Item = FeaturePair> + '_ {
        self.points().iter().map(|p| p.features)
    }

    /// Same contact seen from B: normals flipped and features exchanged.
    pub fn swapped(mut self) -> Self {
        self.normal = -self.normal;
        let len = self.len as usize;
        for point in &mut self.points[..len] {
            point.normal = -point.normal;
            point.features = point.features.swapped();
        }
        self
    }
}

fn reduce_candidates(normal: Vec3, candidates: &[ContactPoint]) -> Vec<usize> {
    if candidates.len() <= MAX_MANIFOLD_POINTS {
        return (0..candidates.len()).collect();
    }

    let deepest = candidates
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.depth.total_cmp(&b.depth))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let origin = candidates[deepest].position;

    let farthest = candidates
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            (a.position - origin)
                .length_squared()
                .total_cmp(&(b.position - origin).length_squared())
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    if farthest == deepest {
        return vec![deepest];
    }
    let second = candidates[farthest].position;

    // Third point: largest triangle with the first two.
    let mut third = None;
    let mut best_area = 0.0;
    for (i, candidate) in candidates.iter().enumerate() {
        let area = (second - origin)
            .cross(candidate.position - origin)
            .dot(normal)
            .abs();
        if area > best_area {
            best_area = area;
            third = Some(i);
        }
    }
    let Some(third) = third else {
        return vec![deepest, farthest];
    };

    // Wind the triangle counter-clockwise about the normal so that outside
    // points give a negative edge test.
    let mut triangle = [deepest, farthest, third];
    let [a, b, c] = triangle.map(|i| candidates[i].position);
    if (b - a).cross(c - a).dot(normal) < 0.0 {
        triangle.swap(1, 2);
    }

    let mut fourth = None;
    let mut best_gain = 0.0;
    for (i, candidate) in candidates.iter().enumerate() {
        if triangle.contains(&i) {
            continue;
        }
        for edge in 0..3 {
            let start = candidates[triangle[edge]].position;
            let end = candidates[triangle[(edge + 1) % 3]].position;
            let gain = -(end - start).cross(candidate.position - start).dot(normal);
            if gain > best_gain {
                best_gain = gain;
                fourth = Some(i);
            }
        }
    }

    let mut selected = triangle.to_vec();
    if let Some(fourth) = fourth {
        selected.push(fourth);
    }
    selected.sort_unstable();
    selected
}
