//! Closed-form routines for smooth primitives and half-spaces. Every routine
//! takes shape-to-world poses and reports normals from A to B.

use glam::Vec3;

use super::{
    contact::{ContactManifold, ContactPoint, Feature, FeaturePair},
    narrowphase::WarmStart,
    sat::collide_hulls,
};
use crate::{
    core::{
        shape::{cuboid_corner, cuboid_edge, ConvexHull, Shape, ShapeGeometry},
        types::Pose,
    },
    utils::{any_perpendicular, closest_point_on_segment, closest_points_between_segments, DIRECTION_EPSILON},
};

/// Segments closer to parallel than this get two contacts instead of one.
const PARALLEL_SEGMENT_COSINE: f32 = 0.999;

fn single(point: Option<ContactPoint>) -> ContactManifold {
    match point {
        Some(point) => {
            let mut manifold = ContactManifold::new(point.normal);
            manifold.push(point);
            manifold
        }
        None => ContactManifold::empty(),
    }
}

/// Contact between two spheres; `fallback` is used when the centres coincide.
fn sphere_contact(
    center_a: Vec3,
    radius_a: f32,
    center_b: Vec3,
    radius_b: f32,
    fallback: Vec3,
    features: FeaturePair,
) -> Option<ContactPoint> {
    let delta = center_b - center_a;
    let distance = delta.length();
    let reach = radius_a + radius_b;
    if distance > reach {
        return None;
    }
    let normal = if distance > DIRECTION_EPSILON {
        delta / distance
    } else {
        fallback
    };
    let depth = reach - distance;
    Some(ContactPoint::new(
        center_a + normal * (radius_a - depth * 0.5),
        normal,
        depth,
        features,
    ))
}

fn capsule_segment(pose: &Pose, half_height: f32) -> (Vec3, Vec3) {
    (
        pose.transform_point(Vec3::new(0.0, -half_height, 0.0)),
        pose.transform_point(Vec3::new(0.0, half_height, 0.0)),
    )
}

/// Capsule feature at segment parameter `t`: end caps are vertices, the shaft an edge.
fn segment_feature(t: f32) -> Feature {
    if t <= 0.0 {
        Feature::Vertex(0)
    } else if t >= 1.0 {
        Feature::Vertex(1)
    } else {
        Feature::Edge(0)
    }
}

/// World-space plane as `(normal, offset)` with solid side `normal · p <= offset`.
fn world_plane(normal: Vec3, offset: f32, pose: &Pose) -> (Vec3, f32) {
    let normal = pose.transform_vector(normal);
    (normal, offset + normal.dot(pose.position))
}

pub(super) fn sphere_sphere(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (ShapeGeometry::Sphere { radius: ra }, ShapeGeometry::Sphere { radius: rb }) =
        (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    single(sphere_contact(
        pose_a.position,
        *ra,
        pose_b.position,
        *rb,
        Vec3::Y,
        FeaturePair::default(),
    ))
}

pub(super) fn sphere_box(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (ShapeGeometry::Sphere { radius }, ShapeGeometry::Box { half_extents }) =
        (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    let radius = *radius;
    let center = pose_b.inverse_transform_point(pose_a.position);
    let clamped = center.clamp(-*half_extents, *half_extents);

    // Box faces are numbered +X, -X, +Y, -Y, +Z, -Z.
    let mut mask = 0u16;
    for axis in 0..3 {
        if clamped[axis] != center[axis] {
            let face = 2 * axis + usize::from(center[axis] < 0.0);
            mask |= 1 << face;
        }
    }

    if mask == 0 {
        // Centre inside the box: push out through the nearest face.
        let gaps = *half_extents - center.abs();
        let axis = if gaps.x <= gaps.y && gaps.x <= gaps.z {
            0
        } else if gaps.y <= gaps.z {
            1
        } else {
            2
        };
        let sign = if center[axis] < 0.0 { -1.0 } else { 1.0 };
        let mut outward = Vec3::ZERO;
        outward[axis] = sign;
        let mut face_point = center;
        face_point[axis] = sign * half_extents[axis];

        let outward_world = pose_b.transform_vector(outward);
        let face_world = pose_b.transform_point(face_point);
        let deepest = pose_a.position - outward_world * radius;
        let face = 2 * axis as u16 + u16::from(sign < 0.0);
        let mut manifold = ContactManifold::new(-outward_world);
        manifold.push(ContactPoint::new(
            (face_world + deepest) * 0.5,
            -outward_world,
            radius + gaps[axis],
            FeaturePair::new(Feature::None, Feature::Face(face)),
        ));
        return manifold;
    }

    // Clamped axes pick a side; edges and corners use the cuboid hull's indices.
    let positive = [center.x > 0.0, center.y > 0.0, center.z > 0.0];
    let feature = match mask.count_ones() {
        1 => Feature::Face(mask.trailing_zeros() as u16),
        2 => {
            let free = (0..3).find(|&axis| clamped[axis] == center[axis]).unwrap_or(0);
            let (mut low, mut high) = (positive, positive);
            low[free] = false;
            high[free] = true;
            cuboid_edge(cuboid_corner(low), cuboid_corner(high))
                .map_or(Feature::None, |edge| Feature::Edge(edge as u16))
        }
        _ => Feature::Vertex(cuboid_corner(positive) as u16),
    };
    let closest = pose_b.transform_point(clamped);
    let fallback = pose_b.position - pose_a.position;
    single(sphere_contact(
        pose_a.position,
        radius,
        closest,
        0.0,
        fallback.normalize_or(Vec3::Y),
        FeaturePair::new(Feature::None, feature),
    ))
}

pub(super) fn sphere_capsule(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (
        ShapeGeometry::Sphere { radius },
        ShapeGeometry::Capsule {
            radius: capsule_radius,
            half_height,
        },
    ) = (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    let (start, end) = capsule_segment(pose_b, *half_height);
    let (closest, t) = closest_point_on_segment(pose_a.position, start, end);
    single(sphere_contact(
        pose_a.position,
        *radius,
        closest,
        *capsule_radius,
        any_perpendicular(end - start).normalize_or(Vec3::Y),
        FeaturePair::new(Feature::None, segment_feature(t)),
    ))
}

/// Closest point on a convex face polygon, with the feature it lies on.
fn closest_on_face(hull: &ConvexHull, face: usize, point: Vec3) -> (Vec3, Feature) {
    let hull_face = &hull.faces()[face];
    let distance = hull_face.normal.dot(point) - hull_face.offset;
    let projected = point - hull_face.normal * distance;
    let loop_indices = &hull_face.indices;
    let count = loop_indices.len();

    let inside = (0..count).all(|i| {
        let start = hull.vertices()[loop_indices[i] as usize];
        let end = hull.vertices()[loop_indices[(i + 1) % count] as usize];
        (end - start).cross(projected - start).dot(hull_face.normal) >= 0.0
    });
    if inside {
        return (projected, Feature::Face(face as u16));
    }

    let mut best = (f32::INFINITY, projected, Feature::Face(face as u16));
    for i in 0..count {
        let (from, to) = (loop_indices[i], loop_indices[(i + 1) % count]);
        let (candidate, t) = closest_point_on_segment(
            point,
            hull.vertices()[from as usize],
            hull.vertices()[to as usize],
        );
        let gap = (candidate - point).length_squared();
        if gap < best.0 {
            let feature = if t <= 0.0 {
                Feature::Vertex(from as u16)
            } else if t >= 1.0 {
                Feature::Vertex(to as u16)
            } else {
                hull.edge_index(from, to)
                    .map_or(Feature::None, |edge| Feature::Edge(edge as u16))
            };
            best = (gap, candidate, feature);
        }
    }
    (best.1, best.2)
}

pub(super) fn sphere_polyhedron(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (ShapeGeometry::Sphere { radius }, ShapeGeometry::Polyhedron(hull)) =
        (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    let radius = *radius;
    let center = pose_b.inverse_transform_point(pose_a.position);

    let (nearest_face, face_distance) = hull
        .faces()
        .iter()
        .enumerate()
        .map(|(i, face)| (i, face.normal.dot(center) - face.offset))
        .fold((0, f32::NEG_INFINITY), |best, item| if item.1 > best.1 { item } else { best });

    if face_distance <= 0.0 {
        // Centre inside the hull: exit through the least-penetrated face.
        let outward = hull.faces()[nearest_face].normal;
        let outward_world = pose_b.transform_vector(outward);
        let face_world = pose_b.transform_point(center - outward * face_distance);
        let deepest = pose_a.position - outward_world * radius;
        let mut manifold = ContactManifold::new(-outward_world);
        manifold.push(ContactPoint::new(
            (face_world + deepest) * 0.5,
            -outward_world,
            radius - face_distance,
            FeaturePair::new(Feature::None, Feature::Face(nearest_face as u16)),
        ));
        return manifold;
    }
    if face_distance > radius {
        return ContactManifold::empty();
    }

    let mut best: Option<(f32, Vec3, Feature)> = None;
    for (index, face) in hull.faces().iter().enumerate() {
        if face.normal.dot(center) - face.offset <= 0.0 {
            continue;
        }
        let (candidate, feature) = closest_on_face(hull, index, center);
        let gap = (candidate - center).length_squared();
        if best.map_or(true, |(known, ..)| gap < known) {
            best = Some((gap, candidate, feature));
        }
    }
    let Some((_, closest, feature)) = best else {
        return ContactManifold::empty();
    };

    let fallback = -pose_b.transform_vector(hull.faces()[nearest_face].normal);
    single(sphere_contact(
        pose_a.position,
        radius,
        pose_b.transform_point(closest),
        0.0,
        fallback,
        FeaturePair::new(Feature::None, feature),
    ))
}

pub(super) fn sphere_plane(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (ShapeGeometry::Sphere { radius }, ShapeGeometry::Plane { normal, offset }) =
        (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    let (normal, offset) = world_plane(*normal, *offset, pose_b);
    single(sphere_below_plane(
        pose_a.position,
        *radius,
        normal,
        offset,
        FeaturePair::new(Feature::None, Feature::Face(0)),
    ))
}

fn sphere_below_plane(
    center: Vec3,
    radius: f32,
    normal: Vec3,
    offset: f32,
    features: FeaturePair,
) -> Option<ContactPoint> {
    let distance = normal.dot(center) - offset;
    if distance > radius {
        return None;
    }
    Some(ContactPoint::new(
        center - normal * ((radius + distance) * 0.5),
        -normal,
        radius - distance,
        features,
    ))
}

pub(super) fn capsule_capsule(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (
        ShapeGeometry::Capsule {
            radius: ra,
            half_height: ha,
        },
        ShapeGeometry::Capsule {
            radius: rb,
            half_height: hb,
        },
    ) = (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    let (start_a, end_a) = capsule_segment(pose_a, *ha);
    let (start_b, end_b) = capsule_segment(pose_b, *hb);
    let fallback = (pose_b.position - pose_a.position).normalize_or(Vec3::Y);

    let contact_at = |on_a: Vec3| {
        let (_, s) = closest_point_on_segment(on_a, start_a, end_a);
        let (on_b, t) = closest_point_on_segment(on_a, start_b, end_b);
        sphere_contact(
            on_a,
            *ra,
            on_b,
            *rb,
            fallback,
            FeaturePair::new(segment_feature(s), segment_feature(t)),
        )
    };

    let dir_a = (end_a - start_a).normalize_or_zero();
    let dir_b = (end_b - start_b).normalize_or_zero();
    if dir_a != Vec3::ZERO
        && dir_b != Vec3::ZERO
        && dir_a.dot(dir_b).abs() > PARALLEL_SEGMENT_COSINE
    {
        // Lying side by side: contacts at both ends of the shared span.
        let (_, t0) = closest_point_on_segment(start_b, start_a, end_a);
        let (_, t1) = closest_point_on_segment(end_b, start_a, end_a);
        let (low, high) = (t0.min(t1), t0.max(t1));
        let span = end_a - start_a;
        if (high - low) * span.length() > DIRECTION_EPSILON.sqrt() {
            let mut points = Vec::with_capacity(2);
            for t in [low, high] {
                if let Some(point) = contact_at(start_a + span * t) {
                    points.push(point);
                }
            }
            if let Some(first) = points.first() {
                return ContactManifold::from_candidates(first.normal, &points);
            }
            return ContactManifold::empty();
        }
    }

    let (on_a, _) = closest_points_between_segments(start_a, end_a, start_b, end_b);
    single(contact_at(on_a))
}

pub(super) fn capsule_plane(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (
        ShapeGeometry::Capsule {
            radius,
            half_height,
        },
        ShapeGeometry::Plane { normal, offset },
    ) = (a.geometry(), b.geometry())
    else {
        return ContactManifold::empty();
    };
    let (normal, offset) = world_plane(*normal, *offset, pose_b);
    let (start, end) = capsule_segment(pose_a, *half_height);
    let mut manifold = ContactManifold::new(-normal);
    for (index, center) in [start, end].into_iter().enumerate() {
        let features = FeaturePair::new(Feature::Vertex(index as u16), Feature::Face(0));
        if let Some(point) = sphere_below_plane(center, *radius, normal, offset, features) {
            manifold.push(point);
        }
    }
    manifold
}

/// Box or polyhedron against a half-space: every vertex below the plane.
pub(super) fn hull_plane(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    _warm: &mut WarmStart,
) -> ContactManifold {
    let (Some(hull), ShapeGeometry::Plane { normal, offset }) = (a.hull(), b.geometry()) else {
        return ContactManifold::empty();
    };
    let (normal, offset) = world_plane(*normal, *offset, pose_b);
    let candidates: Vec<ContactPoint> = hull
        .vertices()
        .iter()
        .enumerate()
        .filter_map(|(index, vertex)| {
            let world = pose_a.transform_point(*vertex);
            let depth = offset - normal.dot(world);
            (depth >= 0.0).then(|| {
                ContactPoint::new(
                    world + normal * (depth * 0.5),
                    -normal,
                    depth,
                    FeaturePair::new(Feature::Vertex(index as u16), Feature::Face(0)),
                )
            })
        })
        .collect();
    if candidates.is_empty() {
        return ContactManifold::empty();
    }
    ContactManifold::from_candidates(-normal, &candidates)
}

/// Any pair of boxes and polyhedra, through the separating-axis test.
pub(super) fn hull_hull(
    a: &Shape,
    pose_a: &Pose,
    b: &Shape,
    pose_b: &Pose,
    warm: &mut WarmStart,
) -> ContactManifold {
    let (Some(hull_a), Some(hull_b)) = (a.hull(), b.hull()) else {
        return ContactManifold::empty();
    };
    collide_hulls(&hull_a, pose_a, &hull_b, pose_b, &mut warm.axis)
}
