//! Core types describing bodies, shapes, materials, and shared math data.

pub mod types;
pub mod material;
pub mod shape;
pub mod rigidbody;

pub use types::{Aabb, InertiaTensorExt, MassProperties, Pose};
pub use material::{
    CombinePolicy, Material, MaterialBuilder, MaterialId, MaterialPair, MaterialRegistry,
    MaterialTable, MixingMode,
};
pub use shape::{ConvexHull, HullFace, Shape, ShapeFlags, ShapeGeometry, ShapeHeader, ShapeKind};
pub use rigidbody::{BodyKind, RigidBody, SleepState};
