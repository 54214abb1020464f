use glam::Vec3;

use super::contact::Feature;

const EPSILON: f32 = 1e-4;

/// Polygon vertex tagged with the features it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex {
    pub position: Vec3,
    /// Reference-side feature that produced this vertex, if any.
    pub reference: Feature,
    /// Incident polygon feature: the original vertex, or the edge that was cut.
    pub incident: Feature,
    /// Incident edge leaving this vertex.
    edge_out: u16,
}

impl ClipVertex {
    pub fn new(position: Vec3, reference: Feature, vertex: u16, edge_out: u16) -> Self {
        Self {
            position,
            reference,
            incident: Feature::Vertex(vertex),
            edge_out,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClipPlane {
    normal: Vec3,
    distance: f32,
    feature: Feature,
}

impl ClipPlane {
    pub fn from_point_normal(point: Vec3, normal: Vec3, feature: Feature) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: n.dot(point),
            feature,
        }
    }

    fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// Clips the polygon against each plane in turn (Sutherland-Hodgman), keeping
/// the part behind every plane.
pub fn clip_polygon(vertices: &[ClipVertex], planes: &[ClipPlane]) -> Vec<ClipVertex> {
    let mut output = vertices.to_vec();
    for plane in planes {
        output = clip_against_plane(&output, plane);
        if output.is_empty() {
            break;
        }
    }
    output
}

fn clip_against_plane(vertices: &[ClipVertex], plane: &ClipPlane) -> Vec<ClipVertex> {
    if vertices.is_empty() {
        return Vec::new();
    }

    let mut clipped = Vec::with_capacity(vertices.len() + 1);
    for i in 0..vertices.len() {
        let current = vertices[i];
        let next = vertices[(i + 1) % vertices.len()];

        let current_dist = plane.signed_distance(current.position);
        let next_dist = plane.signed_distance(next.position);

        let current_inside = current_dist <= EPSILON;
        let next_inside = next_dist <= EPSILON;

        match (current_inside, next_inside) {
            (true, true) => clipped.push(next),
            (true, false) => {
                if let Some(cut) = intersect(&current, &next, current_dist, next_dist, plane) {
                    clipped.push(cut);
                }
            }
            (false, true) => {
                if let Some(cut) = intersect(&current, &next, current_dist, next_dist, plane) {
                    clipped.push(cut);
                }
                clipped.push(next);
            }
            (false, false) => {}
        }
    }

    clipped
}

fn intersect(
    start: &ClipVertex,
    end: &ClipVertex,
    start_dist: f32,
    end_dist: f32,
    plane: &ClipPlane,
) -> Option<ClipVertex> {
    let denom = start_dist - end_dist;
    if denom.abs() <= EPSILON {
        return None;
    }
    let t = start_dist / denom;
    Some(ClipVertex {
        position: start.position + (end.position - start.position) * t,
        reference: plane.feature,
        incident: Feature::Edge(start.edge_out),
        edge_out: start.edge_out,
    })
}

/// Side planes of a convex face wound counter-clockwise about `normal`.
/// Each plane faces outward through one edge and carries that edge's id.
pub fn face_side_planes(polygon: &[Vec3], normal: Vec3, edge_ids: &[u16]) -> Vec<ClipPlane> {
    let count = polygon.len();
    (0..count)
        .map(|i| {
            let start = polygon[i];
            let end = polygon[(i + 1) % count];
            let outward = (end - start).cross(normal);
            let feature = edge_ids.get(i).map_or(Feature::None, |id| Feature::Edge(*id));
            ClipPlane::from_point_normal(start, outward, feature)
        })
        .collect()
}
