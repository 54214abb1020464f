//! Narrow-phase dispatch: a static table from shape-kind pairs to detection
//! routines.

use serde::{Deserialize, Serialize};

use super::{
    contact::{ContactManifold, FeaturePair, MAX_MANIFOLD_POINTS},
    primitives::{
        capsule_capsule, capsule_plane, hull_hull, hull_plane, sphere_box, sphere_capsule,
        sphere_plane, sphere_polyhedron, sphere_sphere,
    },
    sat::SatAxis,
};
use crate::{
    core::{
        shape::{Shape, ShapeKind},
        types::Pose,
    },
    error::{PhysicsError, PhysicsResult},
};

/// Per-pair state carried between frames to speed up detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmStart {
    /// Axis the separating-axis test settled on last time.
    pub axis: Option<SatAxis>,
    features: [FeaturePair; MAX_MANIFOLD_POINTS],
    feature_count: u8,
}

impl WarmStart {
    /// Feature ids of the last manifold produced for the pair.
    pub fn features(&self) -> &[FeaturePair] {
        &self.features[..self.feature_count as usize]
    }

    fn record(&mut self, manifold: &ContactManifold) {
        self.feature_count = 0;
        for features in manifold.features() {
            self.features[self.feature_count as usize] = features;
            self.feature_count += 1;
        }
    }
}

/// Detection routine over shape-to-world poses.
pub type DetectFn = fn(&Shape, &Pose, &Shape, &Pose, &mut WarmStart) -> ContactManifold;

/// Entry of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch {
    /// `swapped` routines are written for `(B, A)`: arguments are exchanged
    /// on the way in and the manifold mirrored on the way out.
    Routine { detect: DetectFn, swapped: bool },
    Unsupported,
}

impl Dispatch {
    pub const fn is_supported(&self) -> bool {
        matches!(self, Dispatch::Routine { .. })
    }
}

const fn direct(detect: DetectFn) -> Dispatch {
    Dispatch::Routine {
        detect,
        swapped: false,
    }
}

const fn mirrored(detect: DetectFn) -> Dispatch {
    Dispatch::Routine {
        detect,
        swapped: true,
    }
}

const UNSUPPORTED: Dispatch = Dispatch::Unsupported;

/// Rows are A's kind, columns B's kind, both in [`ShapeKind`] order.
static DISPATCH_TABLE: [[Dispatch; ShapeKind::COUNT]; ShapeKind::COUNT] = [
    // Sphere
    [
        direct(sphere_sphere),
        direct(sphere_box),
        direct(sphere_capsule),
        direct(sphere_polyhedron),
        direct(sphere_plane),
    ],
    // Box
    [
        mirrored(sphere_box),
        direct(hull_hull),
        UNSUPPORTED,
        direct(hull_hull),
        direct(hull_plane),
    ],
    // Capsule
    [
        mirrored(sphere_capsule),
        UNSUPPORTED,
        direct(capsule_capsule),
        UNSUPPORTED,
        direct(capsule_plane),
    ],
    // Polyhedron
    [
        mirrored(sphere_polyhedron),
        direct(hull_hull),
        UNSUPPORTED,
        direct(hull_hull),
        direct(hull_plane),
    ],
    // Plane
    [
        mirrored(sphere_plane),
        mirrored(hull_plane),
        mirrored(capsule_plane),
        mirrored(hull_plane),
        UNSUPPORTED,
    ],
];

/// Selects and runs detection routines for shape pairs.
pub struct CollisionAgent;

impl CollisionAgent {
    pub fn dispatch(a: ShapeKind, b: ShapeKind) -> Dispatch {
        DISPATCH_TABLE[a.index()][b.index()]
    }

    pub fn supports(a: ShapeKind, b: ShapeKind) -> bool {
        Self::dispatch(a, b).is_supported()
    }

    /// Detects contact between two shapes placed by their owners' poses.
    ///
    /// Returns an empty manifold for separated shapes and
    /// [`PhysicsError::UnsupportedShapePair`] when no routine exists.
    pub fn detect(
        shape_a: &Shape,
        pose_a: &Pose,
        shape_b: &Shape,
        pose_b: &Pose,
        warm: &mut WarmStart,
    ) -> PhysicsResult<ContactManifold> {
        let dispatch = Self::dispatch(shape_a.kind(), shape_b.kind());
        Self::detect_with(dispatch, shape_a, pose_a, shape_b, pose_b, warm)
    }

    /// Same as [`CollisionAgent::detect`] with an already resolved table entry.
    pub fn detect_with(
        dispatch: Dispatch,
        shape_a: &Shape,
        pose_a: &Pose,
        shape_b: &Shape,
        pose_b: &Pose,
        warm: &mut WarmStart,
    ) -> PhysicsResult<ContactManifold> {
        let world_a = pose_a.combine(shape_a.transform());
        let world_b = pose_b.combine(shape_b.transform());
        let manifold = match dispatch {
            Dispatch::Unsupported => {
                return Err(PhysicsError::UnsupportedShapePair {
                    a: shape_a.kind(),
                    b: shape_b.kind(),
                })
            }
            Dispatch::Routine {
                detect,
                swapped: false,
            } => detect(shape_a, &world_a, shape_b, &world_b, warm),
            Dispatch::Routine {
                detect,
                swapped: true,
            } => detect(shape_b, &world_b, shape_a, &world_a, warm).swapped(),
        };
        warm.record(&manifold);
        Ok(manifold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn table_is_symmetric() {
        for a in ShapeKind::ALL {
            for b in ShapeKind::ALL {
                assert_eq!(
                    CollisionAgent::supports(a, b),
                    CollisionAgent::supports(b, a),
                    "{a:?} / {b:?}"
                );
            }
        }
    }

    #[test]
    fn unsupported_pairs_fail_loudly() {
        let capsule = Shape::capsule(0.5, 1.0).expect("capsule");
        let boxed = Shape::cuboid(Vec3::ONE).expect("box");
        let result = CollisionAgent::detect(
            &capsule,
            &Pose::IDENTITY,
            &boxed,
            &Pose::IDENTITY,
            &mut WarmStart::default(),
        );
        assert_eq!(
            result,
            Err(PhysicsError::UnsupportedShapePair {
                a: ShapeKind::Capsule,
                b: ShapeKind::Box,
            })
        );
    }

    #[test]
    fn warm_start_records_manifold_features() {
        let boxed = Shape::cuboid(Vec3::ONE).expect("box");
        let mut warm = WarmStart::default();
        let manifold = CollisionAgent::detect(
            &boxed,
            &Pose::IDENTITY,
            &boxed,
            &Pose::from_position(Vec3::new(0.0, 1.95, 0.0)),
            &mut warm,
        )
        .expect("supported");
        assert_eq!(warm.features().len(), manifold.len());
        assert!(warm.axis.is_some());
    }

    #[test]
    fn shape_offsets_are_applied() {
        let offset = Shape::sphere(0.5)
            .expect("sphere")
            .with_transform(Pose::from_position(Vec3::new(2.0, 0.0, 0.0)))
            .expect("finite offset");
        let centred = Shape::sphere(0.5).expect("sphere");
        let manifold = CollisionAgent::detect(
            &offset,
            &Pose::IDENTITY,
            &centred,
            &Pose::from_position(Vec3::new(2.8, 0.0, 0.0)),
            &mut WarmStart::default(),
        )
        .expect("supported");
        assert_eq!(manifold.len(), 1);
    }
}
