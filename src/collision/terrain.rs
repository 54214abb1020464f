//! Terrain collaborators. The world only ever talks to [`Terrain`]; the
//! representations behind it are interchangeable.

use std::collections::HashMap;

use glam::Vec3;

use crate::{
    core::material::MaterialId,
    error::{PhysicsError, PhysicsResult},
    utils::DIRECTION_EPSILON,
};

/// A sphere to test against the terrain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSample {
    pub center: Vec3,
    pub radius: f32,
}

impl TerrainSample {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Penetration of one sample into the terrain. `normal` points out of the
/// terrain towards the sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainContact {
    /// Index of the sample in the query slice.
    pub sample: usize,
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub material: MaterialId,
}

pub trait Terrain: Send + Sync {
    /// Calls `on_contact` for each penetrating sample, in sample order.
    /// Stops as soon as the callback returns `false`.
    fn collide_spheres(
        &self,
        samples: &[TerrainSample],
        on_contact: &mut dyn FnMut(TerrainContact) -> bool,
    );
}

/// World without terrain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerrain;

impl Terrain for NoTerrain {
    fn collide_spheres(&self, _: &[TerrainSample], _: &mut dyn FnMut(TerrainContact) -> bool) {}
}

/// Infinite ground plane `normal · p = offset`.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    normal: Vec3,
    offset: f32,
    material: MaterialId,
}

impl FlatTerrain {
    pub fn new(normal: Vec3, offset: f32, material: MaterialId) -> PhysicsResult<Self> {
        let normal = normal.normalize_or_zero();
        if normal == Vec3::ZERO || !offset.is_finite() {
            return Err(PhysicsError::invalid("flat terrain needs a non-zero normal and finite offset"));
        }
        Ok(Self {
            normal,
            offset,
            material,
        })
    }

    /// Horizontal ground at `height`.
    pub fn horizontal(height: f32, material: MaterialId) -> Self {
        Self {
            normal: Vec3::Y,
            offset: height,
            material,
        }
    }
}

impl Terrain for FlatTerrain {
    fn collide_spheres(
        &self,
        samples: &[TerrainSample],
        on_contact: &mut dyn FnMut(TerrainContact) -> bool,
    ) {
        for (index, sample) in samples.iter().enumerate() {
            let distance = self.normal.dot(sample.center) - self.offset;
            if distance >= sample.radius {
                continue;
            }
            let contact = TerrainContact {
                sample: index,
                point: sample.center - self.normal * distance,
                normal: self.normal,
                depth: sample.radius - distance,
                material: self.material,
            };
            if !on_contact(contact) {
                return;
            }
        }
    }
}

/// Ground given by an implicit height function `y = height(x, z)`.
pub struct HeightFieldTerrain<F> {
    height: F,
    material: MaterialId,
    /// Step used for the central-difference normal.
    step: f32,
}

impl<F> HeightFieldTerrain<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    pub fn new(height: F, material: MaterialId) -> Self {
        Self {
            height,
            material,
            step: 0.01,
        }
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step.max(DIRECTION_EPSILON);
        self
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        (self.height)(x, z)
    }

    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let h = self.step;
        let dx = (self.height_at(x + h, z) - self.height_at(x - h, z)) / (2.0 * h);
        let dz = (self.height_at(x, z + h) - self.height_at(x, z - h)) / (2.0 * h);
        Vec3::new(-dx, 1.0, -dz).normalize()
    }
}

impl<F> Terrain for HeightFieldTerrain<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    fn collide_spheres(
        &self,
        samples: &[TerrainSample],
        on_contact: &mut dyn FnMut(TerrainContact) -> bool,
    ) {
        for (index, sample) in samples.iter().enumerate() {
            let c = sample.center;
            let ground = self.height_at(c.x, c.z);
            let normal = self.normal_at(c.x, c.z);
            // Vertical gap projected on the local normal: exact for planar patches.
            let distance = (c.y - ground) * normal.y;
            if distance >= sample.radius {
                continue;
            }
            let contact = TerrainContact {
                sample: index,
                point: c - normal * distance,
                normal,
                depth: sample.radius - distance,
                material: self.material,
            };
            if !on_contact(contact) {
                return;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainTriangle {
    pub vertices: [Vec3; 3],
    pub material: MaterialId,
}

/// Triangle soup bucketed in a uniform grid over the XZ plane. Triangles are
/// one-sided with normals facing up (+Y) and a solid layer of `thickness`
/// below them.
pub struct TriangleSoupTerrain {
    triangles: Vec<TerrainTriangle>,
    normals: Vec<Vec3>,
    cell_size: f32,
    thickness: f32,
    cells: HashMap<(i32, i32), Vec<u32>>,
}

impl TriangleSoupTerrain {
    pub fn new(triangles: Vec<TerrainTriangle>, cell_size: f32) -> PhysicsResult<Self> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(PhysicsError::invalid(format!(
                "terrain cell size must be positive, got {cell_size}"
            )));
        }
        if triangles.len() > u32::MAX as usize {
            return Err(PhysicsError::invalid("too many terrain triangles"));
        }

        let mut normals = Vec::with_capacity(triangles.len());
        let mut cells: HashMap<(i32, i32), Vec<u32>> = HashMap::new();
        for (index, triangle) in triangles.iter().enumerate() {
            let [a, b, c] = triangle.vertices;
            if !(a.is_finite() && b.is_finite() && c.is_finite()) {
                return Err(PhysicsError::invalid("terrain triangle vertices must be finite"));
            }
            let normal = (b - a).cross(c - a);
            if normal.length_squared() < DIRECTION_EPSILON * DIRECTION_EPSILON {
                return Err(PhysicsError::invalid(format!("terrain triangle {index} is degenerate")));
            }
            let normal = normal.normalize();
            normals.push(if normal.y < 0.0 { -normal } else { normal });

            let min = a.min(b).min(c);
            let max = a.max(b).max(c);
            let (x0, z0) = cell_of(min, cell_size);
            let (x1, z1) = cell_of(max, cell_size);
            for x in x0..=x1 {
                for z in z0..=z1 {
                    cells.entry((x, z)).or_default().push(index as u32);
                }
            }
        }

        Ok(Self {
            triangles,
            normals,
            cell_size,
            thickness: 0.25,
            cells,
        })
    }

    pub fn with_thickness(mut self, thickness: f32) -> Self {
        self.thickness = thickness.max(0.0);
        self
    }

    pub fn triangles(&self) -> &[TerrainTriangle] {
        &self.triangles
    }

    fn candidates(&self, sample: &TerrainSample) -> Vec<u32> {
        let reach = Vec3::splat(sample.radius);
        let (x0, z0) = cell_of(sample.center - reach, self.cell_size);
        let (x1, z1) = cell_of(sample.center + reach, self.cell_size);
        let mut found = Vec::new();
        for x in x0..=x1 {
            for z in z0..=z1 {
                if let Some(bucket) = self.cells.get(&(x, z)) {
                    found.extend_from_slice(bucket);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Deepest contact between `sample` and triangle `index`, if any.
    fn triangle_contact(&self, index: usize, sample: &TerrainSample) -> Option<(f32, Vec3, Vec3)> {
        let [a, b, c] = self.triangles[index].vertices;
        let normal = self.normals[index];
        let center = sample.center;
        let closest = closest_point_on_triangle(center, a, b, c);
        let plane_distance = normal.dot(center - a);
        let projected = center - normal * plane_distance;

        if (projected - closest).length_squared() < DIRECTION_EPSILON {
            // Over the face: one-sided, so centres below still push up.
            if plane_distance >= sample.radius || plane_distance < -(sample.radius + self.thickness) {
                return None;
            }
            return Some((sample.radius - plane_distance, closest, normal));
        }

        let offset = center - closest;
        let distance = offset.length();
        if distance >= sample.radius || distance < DIRECTION_EPSILON {
            return None;
        }
        Some((sample.radius - distance, closest, offset / distance))
    }
}

fn cell_of(point: Vec3, cell_size: f32) -> (i32, i32) {
    (
        (point.x / cell_size).floor() as i32,
        (point.z / cell_size).floor() as i32,
    )
}

/// Closest point to `p` on triangle `abc` (Voronoi region walk).
fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

impl Terrain for TriangleSoupTerrain {
    fn collide_spheres(
        &self,
        samples: &[TerrainSample],
        on_contact: &mut dyn FnMut(TerrainContact) -> bool,
    ) {
        for (index, sample) in samples.iter().enumerate() {
            let deepest = self
                .candidates(sample)
                .into_iter()
                .filter_map(|triangle| {
                    self.triangle_contact(triangle as usize, sample)
                        .map(|hit| (triangle as usize, hit))
                })
                .max_by(|(_, x), (_, y)| x.0.total_cmp(&y.0));
            let Some((triangle, (depth, point, normal))) = deepest else {
                continue;
            };
            let contact = TerrainContact {
                sample: index,
                point,
                normal,
                depth,
                material: self.triangles[triangle].material,
            };
            if !on_contact(contact) {
                return;
            }
        }
    }
}
