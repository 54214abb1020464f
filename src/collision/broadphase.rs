use std::collections::HashMap;

use glam::Vec3;

use crate::{core::types::Aabb, utils::BodyHandle};

/// Cells a single proxy may cover before it is handled as unbounded.
const MAX_CELLS_PER_PROXY: i64 = 512;

/// One body as seen by the broad phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhaseProxy {
    pub handle: BodyHandle,
    pub aabb: Aabb,
    /// Awake and not static: drives the pair search.
    pub active: bool,
}

/// Spatial index proposing candidate pairs from world-space boxes.
///
/// Implementations must report every overlapping pair in which at least one
/// proxy is active. Pairs of two inactive proxies are never reported. Output
/// pairs are ordered `(lower, higher)` by handle, sorted, and free of duplicates.
pub trait BroadPhase: Send + Sync {
    fn find_pairs(&mut self, proxies: &[BroadPhaseProxy]) -> Vec<(BodyHandle, BodyHandle)>;

    fn name(&self) -> &'static str;
}

fn ordered(a: BodyHandle, b: BodyHandle) -> (BodyHandle, BodyHandle) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn finish(mut pairs: Vec<(BodyHandle, BodyHandle)>) -> Vec<(BodyHandle, BodyHandle)> {
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

/// Hashed uniform grid spatial partitioning.
pub struct UniformGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32, i32), Vec<usize>>,
    /// Proxies too large for the grid (planes, huge boxes), tested against everyone.
    unbounded: Vec<usize>,
}

impl UniformGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: HashMap::new(),
            unbounded: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn world_to_grid(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    /// Cell range covered by `aabb`, or `None` if it belongs in the unbounded list.
    fn cell_range(&self, aabb: &Aabb) -> Option<((i32, i32, i32), (i32, i32, i32))> {
        if !aabb.is_bounded() {
            return None;
        }
        let min = self.world_to_grid(aabb.min);
        let max = self.world_to_grid(aabb.max);
        let span = |lo: i32, hi: i32| i64::from(hi) - i64::from(lo) + 1;
        let cells = span(min.0, max.0)
            .checked_mul(span(min.1, max.1))
            .and_then(|area| area.checked_mul(span(min.2, max.2)))?;
        (cells <= MAX_CELLS_PER_PROXY).then_some((min, max))
    }

    fn rebuild(&mut self, proxies: &[BroadPhaseProxy]) {
        self.cells.clear();
        self.unbounded.clear();
        for (index, proxy) in proxies.iter().enumerate() {
            let Some((min, max)) = self.cell_range(&proxy.aabb) else {
                self.unbounded.push(index);
                continue;
            };
            for x in min.0..=max.0 {
                for y in min.1..=max.1 {
                    for z in min.2..=max.2 {
                        self.cells.entry((x, y, z)).or_default().push(index);
                    }
                }
            }
        }
    }
}

impl BroadPhase for UniformGrid {
    fn find_pairs(&mut self, proxies: &[BroadPhaseProxy]) -> Vec<(BodyHandle, BodyHandle)> {
        self.rebuild(proxies);

        let mut pairs = Vec::new();
        let consider = |i: usize, j: usize, pairs: &mut Vec<(BodyHandle, BodyHandle)>| {
            if i == j {
                return;
            }
            let (a, b) = (&proxies[i], &proxies[j]);
            if (a.active || b.active) && a.aabb.overlaps(&b.aabb) {
                pairs.push(ordered(a.handle, b.handle));
            }
        };

        // Inactive proxies are in the grid but never start a query.
        for (index, proxy) in proxies.iter().enumerate() {
            if !proxy.active {
                continue;
            }
            match self.cell_range(&proxy.aabb) {
                Some((min, max)) => {
                    for x in min.0..=max.0 {
                        for y in min.1..=max.1 {
                            for z in min.2..=max.2 {
                                if let Some(bucket) = self.cells.get(&(x, y, z)) {
                                    for &other in bucket {
                                        consider(index, other, &mut pairs);
                                    }
                                }
                            }
                        }
                    }
                }
                None => {
                    for other in 0..proxies.len() {
                        consider(index, other, &mut pairs);
                    }
                }
            }
            for &other in &self.unbounded {
                consider(index, other, &mut pairs);
            }
        }

        finish(pairs)
    }

    fn name(&self) -> &'static str {
        "uniform-grid"
    }
}

/// Sort-and-sweep along the X axis.
#[derive(Default)]
pub struct SweepAndPrune {
    order: Vec<usize>,
}

impl SweepAndPrune {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhase for SweepAndPrune {
    fn find_pairs(&mut self, proxies: &[BroadPhaseProxy]) -> Vec<(BodyHandle, BodyHandle)> {
        self.order.clear();
        self.order.extend(0..proxies.len());
        self.order
            .sort_by(|a, b| proxies[*a].aabb.min.x.total_cmp(&proxies[*b].aabb.min.x));

        let mut pairs = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        for &index in &self.order {
            let proxy = &proxies[index];
            open.retain(|other| proxies[*other].aabb.max.x >= proxy.aabb.min.x);
            for &other in &open {
                let candidate = &proxies[other];
                if (proxy.active || candidate.active) && proxy.aabb.overlaps(&candidate.aabb) {
                    pairs.push(ordered(proxy.handle, candidate.handle));
                }
            }
            open.push(index);
        }

        finish(pairs)
    }

    fn name(&self) -> &'static str {
        "sweep-and-prune"
    }
}
