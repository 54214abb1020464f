//! Separating-axis test between convex hulls, with face clipping for the
//! manifold.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{
    clipping::{clip_polygon, face_side_planes, ClipVertex},
    contact::{ContactManifold, ContactPoint, Feature, FeaturePair},
};
use crate::{
    core::{shape::ConvexHull, types::Pose},
    utils::closest_points_between_segments,
};

/// Face axes win over slightly better edge (or opposite face) axes, which
/// keeps the chosen feature stable from frame to frame.
const RELATIVE_TOLERANCE: f32 = 0.98;
const ABSOLUTE_TOLERANCE: f32 = 0.001;
/// Squared sine below which two edge directions count as parallel.
const PARALLEL_EPSILON: f32 = 1e-6;

/// Axis found by the last test of a pair, tried first on the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SatAxis {
    FaceA(u16),
    FaceB(u16),
    Edges(u16, u16),
}

struct WorldHull<'a> {
    hull: &'a ConvexHull,
    vertices: Vec<Vec3>,
    normals: Vec<Vec3>,
    offsets: Vec<f32>,
    centroid: Vec3,
    /// One representative edge per distinct direction.
    edge_directions: Vec<(u16, Vec3)>,
}

impl<'a> WorldHull<'a> {
    fn new(hull: &'a ConvexHull, pose: &Pose) -> Self {
        let vertices: Vec<Vec3> = hull
            .vertices()
            .iter()
            .map(|v| pose.transform_point(*v))
            .collect();

        let mut normals = Vec::with_capacity(hull.faces().len());
        let mut offsets = Vec::with_capacity(hull.faces().len());
        for face in hull.faces() {
            let normal = pose.transform_vector(face.normal);
            normals.push(normal);
            offsets.push(normal.dot(vertices[face.indices[0] as usize]));
        }

        let mut edge_directions: Vec<(u16, Vec3)> = Vec::new();
        for (index, [start, end]) in hull.edges().iter().enumerate() {
            let direction = (vertices[*end as usize] - vertices[*start as usize]).normalize_or_zero();
            if direction == Vec3::ZERO {
                continue;
            }
            let duplicate = edge_directions
                .iter()
                .any(|(_, known)| known.cross(direction).length_squared() < PARALLEL_EPSILON);
            if !duplicate {
                edge_directions.push((index as u16, direction));
            }
        }

        Self {
            hull,
            centroid: pose.transform_point(hull.centroid()),
            vertices,
            normals,
            offsets,
            edge_directions,
        }
    }

    fn min_along(&self, axis: Vec3) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.dot(axis))
            .fold(f32::INFINITY, f32::min)
    }

    fn max_along(&self, axis: Vec3) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.dot(axis))
            .fold(f32::NEG_INFINITY, f32::max)
    }

    fn edge(&self, index: usize) -> (Vec3, Vec3) {
        let [start, end] = self.hull.edges()[index];
        (self.vertices[start as usize], self.vertices[end as usize])
    }

    fn edge_direction(&self, index: usize) -> Vec3 {
        let (start, end) = self.edge(index);
        (end - start).normalize_or_zero()
    }

    /// Edge parallel to edge `representative` lying farthest along `along`.
    fn support_edge(&self, representative: u16, along: Vec3) -> u16 {
        let direction = self.edge_direction(representative as usize);
        let mut best = representative;
        let mut best_score = f32::NEG_INFINITY;
        for index in 0..self.hull.edges().len() {
            if self.edge_direction(index).cross(direction).length_squared() >= PARALLEL_EPSILON {
                continue;
            }
            let (start, end) = self.edge(index);
            let score = along.dot((start + end) * 0.5);
            if score > best_score {
                best_score = score;
                best = index as u16;
            }
        }
        best
    }
}

fn face_separation(reference: &WorldHull, face: usize, other: &WorldHull) -> f32 {
    other.min_along(reference.normals[face]) - reference.offsets[face]
}

/// Cross product of two edge directions, oriented from A towards B.
/// Parallel edges give no axis.
fn edge_axis(a: &WorldHull, dir_a: Vec3, b: &WorldHull, dir_b: Vec3) -> Option<Vec3> {
    let axis = dir_a.cross(dir_b);
    if axis.length_squared() < PARALLEL_EPSILON {
        return None;
    }
    let axis = axis.normalize();
    if axis.dot(b.centroid - a.centroid) < 0.0 {
        Some(-axis)
    } else {
        Some(axis)
    }
}

fn edge_separation(a: &WorldHull, b: &WorldHull, axis: Vec3) -> f32 {
    b.min_along(axis) - a.max_along(axis)
}

fn axis_separation(a: &WorldHull, b: &WorldHull, axis: SatAxis) -> Option<f32> {
    match axis {
        SatAxis::FaceA(face) => {
            let face = face as usize;
            (face < a.normals.len()).then(|| face_separation(a, face, b))
        }
        SatAxis::FaceB(face) => {
            let face = face as usize;
            (face < b.normals.len()).then(|| face_separation(b, face, a))
        }
        SatAxis::Edges(edge_a, edge_b) => {
            if edge_a as usize >= a.hull.edges().len() || edge_b as usize >= b.hull.edges().len() {
                return None;
            }
            let dir_a = a.edge_direction(edge_a as usize);
            let dir_b = b.edge_direction(edge_b as usize);
            edge_axis(a, dir_a, b, dir_b).map(|axis| edge_separation(a, b, axis))
        }
    }
}

/// Tests two convex hulls placed at `pose_a` and `pose_b`.
///
/// `hint` is read as the axis to try first and overwritten with the axis this
/// call settled on. The hint only enables an early exit for separated pairs,
/// so the returned manifold never depends on it.
pub fn collide_hulls(
    hull_a: &ConvexHull,
    pose_a: &Pose,
    hull_b: &ConvexHull,
    pose_b: &Pose,
    hint: &mut Option<SatAxis>,
) -> ContactManifold {
    let a = WorldHull::new(hull_a, pose_a);
    let b = WorldHull::new(hull_b, pose_b);

    if let Some(axis) = *hint {
        if axis_separation(&a, &b, axis).is_some_and(|separation| separation > 0.0) {
            return ContactManifold::empty();
        }
    }

    let mut best_face_a = (f32::NEG_INFINITY, 0usize);
    for face in 0..a.normals.len() {
        let separation = face_separation(&a, face, &b);
        if separation > 0.0 {
            *hint = Some(SatAxis::FaceA(face as u16));
            return ContactManifold::empty();
        }
        if separation > best_face_a.0 {
            best_face_a = (separation, face);
        }
    }

    let mut best_face_b = (f32::NEG_INFINITY, 0usize);
    for face in 0..b.normals.len() {
        let separation = face_separation(&b, face, &a);
        if separation > 0.0 {
            *hint = Some(SatAxis::FaceB(face as u16));
            return ContactManifold::empty();
        }
        if separation > best_face_b.0 {
            best_face_b = (separation, face);
        }
    }

    let mut best_edge: Option<(f32, u16, u16, Vec3)> = None;
    for &(edge_a, dir_a) in &a.edge_directions {
        for &(edge_b, dir_b) in &b.edge_directions {
            let Some(axis) = edge_axis(&a, dir_a, &b, dir_b) else {
                continue;
            };
            let separation = edge_separation(&a, &b, axis);
            if separation > 0.0 {
                *hint = Some(SatAxis::Edges(edge_a, edge_b));
                return ContactManifold::empty();
            }
            if best_edge.map_or(true, |(best, ..)| separation > best) {
                best_edge = Some((separation, edge_a, edge_b, axis));
            }
        }
    }

    let (mut chosen, mut best) = (SatAxis::FaceA(best_face_a.1 as u16), best_face_a.0);
    if best_face_b.0 > RELATIVE_TOLERANCE * best_face_a.0 + ABSOLUTE_TOLERANCE {
        chosen = SatAxis::FaceB(best_face_b.1 as u16);
        best = best_face_b.0;
    }
    if let Some((separation, edge_a, edge_b, axis)) = best_edge {
        if separation > RELATIVE_TOLERANCE * best + ABSOLUTE_TOLERANCE {
            *hint = Some(SatAxis::Edges(edge_a, edge_b));
            return edge_contact(&a, edge_a, &b, edge_b, axis, separation);
        }
    }

    *hint = Some(chosen);
    match chosen {
        SatAxis::FaceA(face) => face_contact(&a, face as usize, &b, false),
        SatAxis::FaceB(face) => face_contact(&b, face as usize, &a, true),
        SatAxis::Edges(..) => ContactManifold::empty(),
    }
}

fn edge_contact(
    a: &WorldHull,
    edge_a: u16,
    b: &WorldHull,
    edge_b: u16,
    axis: Vec3,
    separation: f32,
) -> ContactManifold {
    let edge_a = a.support_edge(edge_a, axis);
    let edge_b = b.support_edge(edge_b, -axis);
    let (start_a, end_a) = a.edge(edge_a as usize);
    let (start_b, end_b) = b.edge(edge_b as usize);
    let (on_a, on_b) = closest_points_between_segments(start_a, end_a, start_b, end_b);

    let mut manifold = ContactManifold::new(axis);
    manifold.push(ContactPoint::new(
        (on_a + on_b) * 0.5,
        axis,
        -separation,
        FeaturePair::new(Feature::Edge(edge_a), Feature::Edge(edge_b)),
    ));
    manifold
}

fn edge_ids(hull: &ConvexHull, loop_indices: &[u32]) -> Vec<u16> {
    let count = loop_indices.len();
    (0..count)
        .map(|i| {
            hull.edge_index(loop_indices[i], loop_indices[(i + 1) % count])
                .map_or(u16::MAX, |index| index as u16)
        })
        .collect()
}

/// Clips the most anti-parallel incident face against the reference face's
/// side planes and keeps the points below the reference face.
fn face_contact(
    reference: &WorldHull,
    face: usize,
    incident: &WorldHull,
    reference_is_b: bool,
) -> ContactManifold {
    let normal = reference.normals[face];
    let offset = reference.offsets[face];
    let contact_normal = if reference_is_b { -normal } else { normal };
    let orient = |features: FeaturePair| {
        if reference_is_b {
            features.swapped()
        } else {
            features
        }
    };

    let incident_face = (0..incident.normals.len())
        .min_by(|x, y| {
            incident.normals[*x]
                .dot(normal)
                .total_cmp(&incident.normals[*y].dot(normal))
        })
        .unwrap_or(0);

    let reference_loop = &reference.hull.faces()[face].indices;
    let reference_polygon: Vec<Vec3> = reference_loop
        .iter()
        .map(|i| reference.vertices[*i as usize])
        .collect();
    let planes = face_side_planes(
        &reference_polygon,
        normal,
        &edge_ids(reference.hull, reference_loop),
    );

    let incident_loop = &incident.hull.faces()[incident_face].indices;
    let polygon: Vec<ClipVertex> = incident_loop
        .iter()
        .zip(edge_ids(incident.hull, incident_loop))
        .map(|(vertex, edge)| {
            ClipVertex::new(
                incident.vertices[*vertex as usize],
                Feature::Face(face as u16),
                *vertex as u16,
                edge,
            )
        })
        .collect();

    let mut candidates = Vec::with_capacity(polygon.len() + reference_polygon.len());
    for vertex in clip_polygon(&polygon, &planes) {
        let depth = offset - normal.dot(vertex.position);
        if depth < 0.0 {
            continue;
        }
        candidates.push(ContactPoint::new(
            vertex.position + normal * (depth * 0.5),
            contact_normal,
            depth,
            orient(FeaturePair::new(vertex.reference, vertex.incident)),
        ));
    }

    if candidates.is_empty() {
        // Clipping lost every point to round-off: fall back to the deepest vertex.
        let deepest = incident
            .vertices
            .iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| x.dot(normal).total_cmp(&y.dot(normal)));
        if let Some((index, vertex)) = deepest {
            let depth = (offset - normal.dot(*vertex)).max(0.0);
            candidates.push(ContactPoint::new(
                *vertex + normal * (depth * 0.5),
                contact_normal,
                depth,
                orient(FeaturePair::new(
                    Feature::Face(face as u16),
                    Feature::Vertex(index as u16),
                )),
            ));
        }
    }

    ContactManifold::from_candidates(contact_normal, &candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_4;

    fn unit_box() -> ConvexHull {
        ConvexHull::cuboid(Vec3::ONE)
    }

    #[test]
    fn stacked_boxes_produce_four_face_points() {
        let mut hint = None;
        let manifold = collide_hulls(
            &unit_box(),
            &Pose::IDENTITY,
            &unit_box(),
            &Pose::from_position(Vec3::new(0.0, 1.9, 0.0)),
            &mut hint,
        );
        assert_eq!(manifold.len(), 4);
        assert_eq!(hint, Some(SatAxis::FaceA(2)));
        for point in manifold.points() {
            assert_abs_diff_eq!(point.normal.y, 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(point.depth, 0.1, epsilon = 1e-5);
            assert_abs_diff_eq!(point.position.y, 0.95, epsilon = 1e-5);
        }
    }

    #[test]
    fn separated_boxes_give_an_empty_manifold() {
        let mut hint = None;
        let manifold = collide_hulls(
            &unit_box(),
            &Pose::IDENTITY,
            &unit_box(),
            &Pose::from_position(Vec3::new(2.5, 0.0, 0.0)),
            &mut hint,
        );
        assert!(manifold.is_empty());
        assert!(hint.is_some());
    }

    #[test]
    fn crossed_edges_meet_along_their_common_normal() {
        let pose_a = Pose::new(Vec3::ZERO, Quat::from_rotation_z(FRAC_PI_4));
        let height = 2.0 * 2.0_f32.sqrt() - 0.1;
        let pose_b = Pose::new(Vec3::new(0.0, height, 0.0), Quat::from_rotation_x(FRAC_PI_4));
        let mut hint = None;
        let manifold = collide_hulls(&unit_box(), &pose_a, &unit_box(), &pose_b, &mut hint);

        assert_eq!(manifold.len(), 1);
        assert!(matches!(hint, Some(SatAxis::Edges(..))));
        let point = manifold.points()[0];
        assert_abs_diff_eq!(point.normal.y, 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(point.depth, 0.1, epsilon = 1e-4);
        assert_abs_diff_eq!(point.position.x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(point.position.z, 0.0, epsilon = 1e-4);
        assert!(matches!(point.features.a, Feature::Edge(_)));
        assert!(matches!(point.features.b, Feature::Edge(_)));
    }

    #[test]
    fn hint_never_changes_the_manifold() {
        let pose_b = Pose::new(Vec3::new(0.3, 1.8, -0.2), Quat::from_rotation_y(0.3));
        let mut cold = None;
        let first = collide_hulls(&unit_box(), &Pose::IDENTITY, &unit_box(), &pose_b, &mut cold);

        for hint in [
            Some(SatAxis::FaceA(0)),
            Some(SatAxis::FaceB(5)),
            Some(SatAxis::Edges(3, 7)),
            Some(SatAxis::FaceA(400)),
            cold,
        ] {
            let mut warm = hint;
            let again = collide_hulls(&unit_box(), &Pose::IDENTITY, &unit_box(), &pose_b, &mut warm);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn box_resting_on_a_slab_points_the_normal_down() {
        let small = ConvexHull::cuboid(Vec3::splat(0.5));
        let large = ConvexHull::cuboid(Vec3::new(3.0, 1.0, 3.0));
        let mut hint = None;
        let manifold = collide_hulls(
            &small,
            &Pose::from_position(Vec3::new(0.0, 1.4, 0.0)),
            &large,
            &Pose::IDENTITY,
            &mut hint,
        );
        assert!(!manifold.is_empty());
        assert_abs_diff_eq!(manifold.normal().y, -1.0, epsilon = 1e-6);
        for point in manifold.points() {
            assert_abs_diff_eq!(point.depth, 0.1, epsilon = 1e-5);
        }
    }
}
